//! Error types for task execution.
//!
//! Every failure a task can produce is one of:
//!
//! - [`ContractError`] - a value crossing the input or output boundary broke its contract
//! - [`InvocationError`] - the backend or upstream call produced nothing usable, could not
//!   be completed, or was rejected in-band
//! - [`TemplateError`] - the request could not be rendered
//!
//! [`TaskError`] wraps all of them and is what [`TaskRegistry::run`](crate::TaskRegistry::run)
//! returns. None of these are recovered locally.

use std::fmt;

use thiserror::Error;

pub use crate::template::TemplateError;

/// Which side of a task a contract guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    /// Raw caller input.
    Input,
    /// Backend or upstream output.
    Output,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// A value does not satisfy its declared contract.
///
/// `field` is the dotted path of the offending field (`$` for the value itself) and
/// `constraint` is the expectation it broke.
///
/// # Examples
///
/// ```
/// use toolflow::{Boundary, ContractError};
///
/// let err = ContractError::new(Boundary::Input, "url", "must be an absolute http(s) URL");
/// assert_eq!(
///     err.to_string(),
///     "input contract violated at 'url': must be an absolute http(s) URL"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{boundary} contract violated at '{field}': {constraint}")]
pub struct ContractError {
    /// The boundary where validation failed.
    pub boundary: Boundary,
    /// Path of the offending field.
    pub field: String,
    /// The constraint that was not met.
    pub constraint: String,
}

impl ContractError {
    /// Create a contract error.
    pub fn new(boundary: Boundary, field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            boundary,
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

/// The backend or upstream call did not yield a usable result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// The call completed but carried no usable payload.
    #[error("backend returned no usable payload: {0}")]
    EmptyResult(String),

    /// The call could not be completed or returned a non-success status.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The upstream signaled failure in-band despite a success status.
    #[error("upstream rejected the request: {0}")]
    UpstreamRejected(String),
}

impl InvocationError {
    /// Stable category name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyResult(_) => "empty_result",
            Self::TransportFailure(_) => "transport_failure",
            Self::UpstreamRejected(_) => "upstream_rejected",
        }
    }

    /// Classify a [`reqwest::Error`] raised while talking to a backend or upstream.
    ///
    /// Every reqwest failure (timeout, connect, decode, non-success status) means the
    /// call could not be completed, so all of them map to [`Self::TransportFailure`].
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out"
        } else if err.is_connect() {
            "connection failed"
        } else if err.is_decode() {
            "response body could not be decoded"
        } else {
            "request failed"
        };
        Self::TransportFailure(format!("{reason}: {err}"))
    }
}

/// Errors returned by [`TaskRegistry::run`](crate::TaskRegistry::run).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// No task is registered under this name.
    #[error("unknown task '{name}'")]
    UnknownTask {
        /// The name the caller asked for.
        name: String,
    },

    /// Input or output contract violation.
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Backend or upstream failure.
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// The request could not be rendered.
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl TaskError {
    /// Stable category name for logs.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolflow::{InvocationError, TaskError};
    ///
    /// let err = TaskError::from(InvocationError::EmptyResult("no candidates".into()));
    /// assert_eq!(err.kind(), "empty_result");
    /// ```
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTask { .. } => "unknown_task",
            Self::Contract(_) => "contract",
            Self::Invocation(err) => err.kind(),
            Self::Template(_) => "template",
        }
    }

    /// The contract error, if this is one.
    pub fn as_contract(&self) -> Option<&ContractError> {
        match self {
            Self::Contract(err) => Some(err),
            _ => None,
        }
    }

    /// The invocation error, if this is one.
    pub fn as_invocation(&self) -> Option<&InvocationError> {
        match self {
            Self::Invocation(err) => Some(err),
            _ => None,
        }
    }
}

/// Crate-level error alias.
pub type Error = TaskError;

/// Crate-level result alias.
pub type Result<T, E = TaskError> = std::result::Result<T, E>;
