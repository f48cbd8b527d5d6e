//! Invocation strategies.
//!
//! - [`GenerativeInvoker`] sends a [`RenderedRequest`](crate::template::RenderedRequest) to a
//!   [`GenerativeBackend`] and shapes the reply into the task's output contract.
//! - [`ProxyInvoker`] calls a plain HTTP upstream with one percent-encoded query
//!   parameter (URL shortening).
//!
//! Both report failures through [`InvocationError`](crate::InvocationError) and never
//! retry.

mod gemini;
mod generative;
mod proxy;

pub use gemini::GeminiBackend;
pub use generative::{
    GenerateRequest, GenerateResponse, GenerativeBackend, GenerativeInvoker, Modality,
    ResponseShape,
};
pub use proxy::{ProxyInvoker, ProxySpec, ResponseCheck};

/// Longest upstream body excerpt carried in an error message.
const MAX_BODY_EXCERPT: usize = 512;

/// Cut an upstream body down for an error message.
pub(crate) fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
