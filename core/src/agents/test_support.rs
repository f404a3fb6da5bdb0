use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::transport::{HttpRequest, HttpResponse, Transport, TransportFault};

/// Records every request and answers each with the same canned reply.
pub(crate) struct SpyTransport {
    reply: Result<HttpResponse, TransportFault>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl SpyTransport {
    pub(crate) fn replying(status: u16, body: Value) -> Arc<Self> {
        Self::replying_raw(status, &body.to_string())
    }

    pub(crate) fn replying_raw(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(TransportFault(message.to_string())),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

#[async_trait]
impl Transport for SpyTransport {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse, TransportFault> {
        self.requests.lock().unwrap().push(request);
        self.reply.clone()
    }
}
