//! Connectivity check feeding the offline engine's network monitor.

use std::time::Duration;

use async_trait::async_trait;
use inkpost_core::models::{Blog, BlogMutationPayload};
use inkpost_core::remote::RemoteResult;
use inkpost_core::{BlogService, ConnectionType, NetworkState, RemoteError};

const CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Check the API once. Any HTTP response counts as online.
pub async fn check_connectivity(api_base_url: Option<&str>) -> NetworkState {
    let Some(api_base_url) = api_base_url else {
        tracing::debug!("No API base URL configured; working offline");
        return NetworkState::offline();
    };

    let client = match reqwest::Client::builder().timeout(CHECK_TIMEOUT).build() {
        Ok(client) => client,
        Err(error) => {
            tracing::warn!("Failed to build connectivity check client: {error}");
            return NetworkState::unknown();
        }
    };

    match client.head(api_base_url).send().await {
        Ok(response) => {
            tracing::debug!("API reachable ({})", response.status());
            NetworkState::online(ConnectionType::Unknown)
        }
        Err(error) if error.is_connect() || error.is_timeout() => {
            tracing::debug!("API unreachable: {error}");
            NetworkState::offline()
        }
        Err(error) => {
            tracing::debug!("Connectivity check failed: {error}");
            NetworkState {
                is_connected: true,
                is_internet_reachable: Some(false),
                connection_type: ConnectionType::Unknown,
            }
        }
    }
}

/// Stand-in service used when no API is configured.
///
/// Its errors are transient so queued drafts are never marked failed because
/// of missing configuration.
#[derive(Debug, Default)]
pub struct UnconfiguredBlogService;

impl UnconfiguredBlogService {
    fn error() -> RemoteError {
        RemoteError::Network(
            "no API base URL configured; run `inkpost config init --api-base-url <URL>`"
                .to_string(),
        )
    }
}

#[async_trait]
impl BlogService for UnconfiguredBlogService {
    async fn create_blog(&self, _payload: &BlogMutationPayload) -> RemoteResult<Blog> {
        Err(Self::error())
    }

    async fn update_blog(
        &self,
        _blog_id: &str,
        _payload: &BlogMutationPayload,
    ) -> RemoteResult<Blog> {
        Err(Self::error())
    }

    async fn get_blog_by_id(&self, _blog_id: &str) -> RemoteResult<Blog> {
        Err(Self::error())
    }
}
