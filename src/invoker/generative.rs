//! Generative backend seam and invoker.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::contract::{Contract, DataUri, Validated};
use crate::error::{InvocationError, TaskError};
use crate::template::RenderedRequest;

/// What kind of output the backend is steered towards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Modality {
    /// Fill the supplied JSON Schema.
    #[default]
    Structured,
    /// Produce a media part (e.g. a re-encoded image).
    Media,
}

/// One call to a generative backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Text and media parts, in order.
    pub parts: RenderedRequest,
    /// JSON Schema the structured reply must satisfy.
    pub output_schema: Value,
    /// Requested output modality.
    pub modality: Modality,
}

/// What a backend produced.
///
/// Either side may be absent; the invoker decides what counts as empty for the task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    /// Parsed structured payload.
    pub structured: Option<Value>,
    /// First media part of the reply.
    pub media: Option<DataUri>,
}

impl GenerateResponse {
    /// A structured reply.
    pub fn structured(value: Value) -> Self {
        Self {
            structured: Some(value),
            media: None,
        }
    }

    /// A media reply.
    pub fn media(uri: DataUri) -> Self {
        Self {
            structured: None,
            media: Some(uri),
        }
    }

    /// A reply with nothing in it.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A generative model that accepts text and media parts.
///
/// Implementations can be steered either to fill a JSON Schema or to emit media.
/// They must not retry on their own.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Run one generation.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, InvocationError>;
}

/// How a backend reply maps onto a task's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// The structured payload is the output object.
    Structured,
    /// The media part is wrapped as `{ field: "<data uri>" }`.
    Media {
        /// Output field receiving the media reference.
        field: &'static str,
    },
}

impl ResponseShape {
    /// The modality to ask the backend for.
    pub fn modality(&self) -> Modality {
        match self {
            Self::Structured => Modality::Structured,
            Self::Media { .. } => Modality::Media,
        }
    }
}

/// Calls a [`GenerativeBackend`] and holds its reply to the output contract.
#[derive(Clone)]
pub struct GenerativeInvoker {
    backend: Arc<dyn GenerativeBackend>,
}

impl fmt::Debug for GenerativeInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerativeInvoker").finish_non_exhaustive()
    }
}

impl GenerativeInvoker {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }

    /// Call the backend and return the raw, not yet validated, output object.
    ///
    /// A reply with no payload, a `null` payload, an empty object or (for media shapes)
    /// no media part is [`InvocationError::EmptyResult`].
    pub async fn fetch(
        &self,
        parts: RenderedRequest,
        output: &Contract,
        shape: ResponseShape,
    ) -> Result<Value, InvocationError> {
        let request = GenerateRequest {
            parts,
            output_schema: output.schema().clone(),
            modality: shape.modality(),
        };
        debug!(
            parts = request.parts.len(),
            media = request.parts.media().count(),
            modality = ?request.modality,
            "calling generative backend"
        );

        let response = self.backend.generate(request).await?;

        match shape {
            ResponseShape::Structured => match response.structured {
                None | Some(Value::Null) => Err(InvocationError::EmptyResult(
                    "no structured payload".to_string(),
                )),
                Some(Value::Object(map)) if map.is_empty() => Err(InvocationError::EmptyResult(
                    "structured payload is an empty object".to_string(),
                )),
                Some(value) => Ok(value),
            },
            ResponseShape::Media { field } => match response.media {
                None => Err(InvocationError::EmptyResult("no media part".to_string())),
                Some(uri) => {
                    let mut object = Map::new();
                    object.insert(field.to_string(), Value::String(uri.to_string()));
                    Ok(Value::Object(object))
                },
            },
        }
    }

    /// Call the backend and validate the reply against `output`.
    pub async fn invoke(
        &self,
        parts: RenderedRequest,
        output: &Contract,
        shape: ResponseShape,
    ) -> Result<Validated, TaskError> {
        let raw = self.fetch(parts, output, shape).await?;
        Ok(output.validate_output(raw)?)
    }
}
