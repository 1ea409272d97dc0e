//! Scripted in-memory blog service for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Blog, BlogMutationPayload};
use crate::remote::{BlogService, RemoteError, RemoteResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Create { title: String },
    Update { blog_id: String, title: String },
    Get { blog_id: String },
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    submit_failures: VecDeque<RemoteError>,
    fetch_failures: HashMap<String, RemoteError>,
    blogs: HashMap<String, Blog>,
    created: u64,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct MockBlogService {
    state: Mutex<MockState>,
}

impl MockBlogService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next create/update calls, in order, with these errors.
    pub fn fail_submits(&self, errors: impl IntoIterator<Item = RemoteError>) {
        self.state.lock().unwrap().submit_failures.extend(errors);
    }

    pub fn fail_fetch(&self, blog_id: &str, error: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .fetch_failures
            .insert(blog_id.to_string(), error);
    }

    /// Make every call sleep this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn insert_blog(&self, blog: Blog) {
        self.state
            .lock()
            .unwrap()
            .blogs
            .insert(blog.id.clone(), blog);
    }

    /// Serve `blog` when it is requested as `requested_id`.
    pub fn insert_blog_as(&self, requested_id: &str, blog: Blog) {
        self.state
            .lock()
            .unwrap()
            .blogs
            .insert(requested_id.to_string(), blog);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Titles of submitted payloads, in call order.
    pub fn submitted_titles(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Create { title } | MockCall::Update { title, .. } => Some(title),
                MockCall::Get { .. } => None,
            })
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::Get { .. }))
            .count()
    }

    async fn record(&self, call: MockCall) {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn save(&self, blog_id: String, payload: &BlogMutationPayload) -> RemoteResult<Blog> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.submit_failures.pop_front() {
            return Err(error);
        }
        let blog = Blog::from_payload(blog_id, payload);
        state.blogs.insert(blog.id.clone(), blog.clone());
        Ok(blog)
    }
}

#[async_trait]
impl BlogService for MockBlogService {
    async fn create_blog(&self, payload: &BlogMutationPayload) -> RemoteResult<Blog> {
        self.record(MockCall::Create {
            title: payload.title.clone(),
        })
        .await;
        let blog_id = {
            let mut state = self.state.lock().unwrap();
            state.created += 1;
            format!("blog-{}", state.created)
        };
        self.save(blog_id, payload)
    }

    async fn update_blog(
        &self,
        blog_id: &str,
        payload: &BlogMutationPayload,
    ) -> RemoteResult<Blog> {
        self.record(MockCall::Update {
            blog_id: blog_id.to_string(),
            title: payload.title.clone(),
        })
        .await;
        self.save(blog_id.to_string(), payload)
    }

    async fn get_blog_by_id(&self, blog_id: &str) -> RemoteResult<Blog> {
        self.record(MockCall::Get {
            blog_id: blog_id.to_string(),
        })
        .await;
        let state = self.state.lock().unwrap();
        if let Some(error) = state.fetch_failures.get(blog_id) {
            return Err(error.clone());
        }
        state
            .blogs
            .get(blog_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("blog {blog_id}")))
    }
}
