//! Shared fixtures: a scripted generative backend and registry wiring.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use toolflow::config::ShortenerConfig;
use toolflow::invoker::{
    GenerateRequest, GenerateResponse, GenerativeBackend, ProxyInvoker, ResponseCheck,
};
use toolflow::{InvocationError, TaskRegistry};

pub const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";
pub const PDF: &str = "data:application/pdf;base64,JVBERi0xLjc=";

/// Backend that answers every call with the same scripted reply and records requests.
pub struct ScriptedBackend {
    reply: Result<GenerateResponse, InvocationError>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    pub fn replying(reply: GenerateResponse) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: InvocationError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, InvocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.reply.clone()
    }
}

pub fn proxy(endpoint: &str, check: ResponseCheck) -> ProxyInvoker {
    ProxyInvoker::from_config(&ShortenerConfig {
        endpoint: endpoint.to_string(),
        response_check: check,
        ..ShortenerConfig::default()
    })
    .unwrap()
}

/// Full catalogue over `backend`, with the shortener pointed at an unroutable
/// address so an accidental network call fails fast.
pub fn registry(backend: Arc<ScriptedBackend>) -> TaskRegistry {
    registry_with_shortener(backend, "http://127.0.0.1:9/api-create.php", ResponseCheck::Strict)
}

pub fn registry_with_shortener(
    backend: Arc<ScriptedBackend>,
    endpoint: &str,
    check: ResponseCheck,
) -> TaskRegistry {
    TaskRegistry::new(backend, proxy(endpoint, check)).unwrap()
}
