//! REST client for the remote blog service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{BlogService, RemoteError, RemoteResult};
use crate::models::{Blog, BlogMutationPayload};
use crate::util::{compact_text, is_http_url, normalize_text_option};

#[derive(Clone)]
pub struct HttpBlogService {
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpBlogService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpBlogService")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpBlogService {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|error| RemoteError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            base_url,
            api_token: normalize_text_option(api_token),
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn blogs_url(&self) -> String {
        format!("{}/api/blogs", self.base_url)
    }

    fn blog_url(&self, blog_id: &str) -> String {
        format!(
            "{}/api/blogs/{}",
            self.base_url,
            urlencoding::encode(blog_id.trim())
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RemoteResult<Blog> {
        let request = match self.api_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| self.transport_error(&error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| self.transport_error(&error))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        parse_blog_response(&body)
    }

    fn transport_error(&self, error: &reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else if error.is_decode() {
            RemoteError::InvalidPayload(error.to_string())
        } else {
            RemoteError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl BlogService for HttpBlogService {
    async fn create_blog(&self, payload: &BlogMutationPayload) -> RemoteResult<Blog> {
        self.send(self.client.post(self.blogs_url()).json(payload))
            .await
    }

    async fn update_blog(
        &self,
        blog_id: &str,
        payload: &BlogMutationPayload,
    ) -> RemoteResult<Blog> {
        self.send(self.client.put(self.blog_url(blog_id)).json(payload))
            .await
    }

    async fn get_blog_by_id(&self, blog_id: &str) -> RemoteResult<Blog> {
        self.send(self.client.get(self.blog_url(blog_id))).await
    }
}

/// Map a non-success HTTP status to the transient/permanent taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    match status.as_u16() {
        408 | 429 | 500..=599 => RemoteError::Server {
            status: status.as_u16(),
            message,
        },
        404 | 410 => RemoteError::NotFound(message),
        409 | 412 => RemoteError::Conflict(message),
        _ => RemoteError::Validation(message),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlogEnvelope {
    Data { data: Blog },
    Named { blog: Blog },
    Bare(Blog),
}

fn parse_blog_response(body: &str) -> RemoteResult<Blog> {
    let envelope = serde_json::from_str::<BlogEnvelope>(body)
        .map_err(|error| RemoteError::InvalidPayload(format!("{error}: {}", compact_text(body))))?;
    Ok(match envelope {
        BlogEnvelope::Data { data } => data,
        BlogEnvelope::Named { blog } => blog,
        BlogEnvelope::Bare(blog) => blog,
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        RemoteError::InvalidConfiguration("api base url must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "api base url must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url(" https://api.example.com/ ".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn blog_url_encodes_identifier() {
        let service =
            HttpBlogService::new("https://api.example.com", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            service.blog_url("a b/c"),
            "https://api.example.com/api/blogs/a%20b%2Fc"
        );
        assert_eq!(service.blogs_url(), "https://api.example.com/api/blogs");
    }

    #[test]
    fn debug_redacts_token() {
        let service = HttpBlogService::new(
            "https://api.example.com",
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{service:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn classify_status_splits_transient_and_permanent() {
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_transient());
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, ""),
            RemoteError::Conflict(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::GONE, ""),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, ""),
            RemoteError::Validation(_)
        ));
    }

    #[test]
    fn classify_status_uses_error_body_message() {
        let error = classify_status(
            StatusCode::BAD_REQUEST,
            r#"{ "message": " Title is required " }"#,
        );
        assert_eq!(
            error,
            RemoteError::Validation("Title is required (400)".to_string())
        );

        let error = classify_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(error.to_string(), "Server error (502): HTTP 502");
    }

    #[test]
    fn parse_blog_response_accepts_envelopes() {
        let bare = parse_blog_response(r#"{ "id": "b1", "title": "One" }"#).unwrap();
        assert_eq!(bare.id, "b1");

        let data = parse_blog_response(r#"{ "data": { "_id": "b2", "title": "Two" } }"#).unwrap();
        assert_eq!(data.id, "b2");

        let named =
            parse_blog_response(r#"{ "blog": { "id": "b3", "title": "Three" } }"#).unwrap();
        assert_eq!(named.id, "b3");

        assert!(matches!(
            parse_blog_response("<html>oops</html>"),
            Err(RemoteError::InvalidPayload(_))
        ));
    }
}
