//! Scripted HTTP transport for deterministic adapter tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};

/// Transport that replays a queue of canned responses and records every
/// request it sees. When the queue runs dry it fails the call.
#[derive(Default)]
pub struct ScriptedHttpClient {
    inner: Arc<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, body: &str) {
        self.push(Ok(HttpResponse::ok_json(body)));
    }

    pub fn push_body(&self, body: &str) {
        self.push(Ok(HttpResponse::ok_json(body)));
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.push(Ok(HttpResponse::with_status(status, body)));
    }

    pub fn push_error(&self, error: HttpError) {
        self.push(Err(error));
    }

    fn push(&self, response: Result<HttpResponse, HttpError>) {
        self.inner
            .responses
            .lock()
            .expect("script queue should not be poisoned")
            .push_back(response);
    }

    pub fn clone_arc(&self) -> Arc<dyn HttpClient> {
        Arc::new(Self {
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn request_urls(&self) -> Vec<String> {
        self.inner
            .requests
            .lock()
            .expect("request log should not be poisoned")
            .iter()
            .map(HttpRequest::full_url)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.inner
            .requests
            .lock()
            .expect("request log should not be poisoned")
            .len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.inner
            .requests
            .lock()
            .expect("request log should not be poisoned")
            .push(request);

        let response = self
            .inner
            .responses
            .lock()
            .expect("script queue should not be poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::other("script queue exhausted")));

        Box::pin(async move { response })
    }
}
