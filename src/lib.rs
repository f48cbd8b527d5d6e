//! # toolflow
//!
//! Contract-checked generative tasks.
//!
//! Every task follows the same protocol: the raw input is validated against the
//! task's input [`Contract`](contract::Contract), a [`RenderedRequest`](template::RenderedRequest)
//! is produced from an instruction template (or built programmatically), the request
//! is handed to a [`GenerativeBackend`](invoker::GenerativeBackend) (or, for
//! `shorten-url`, to a plain HTTP upstream through the [`ProxyInvoker`](invoker::ProxyInvoker)),
//! and the result is validated against the task's output contract before it reaches
//! the caller.
//!
//! A run either fully succeeds with a contract-valid value or fails with a typed
//! [`TaskError`]. Nothing is retried, cached or defaulted.
//!
//! # Example
//!
//! ```rust,no_run
//! use toolflow::config::Config;
//! use toolflow::registry::TaskRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env();
//! let registry = TaskRegistry::from_config(&config)?;
//!
//! let output = registry
//!     .run(
//!         "generate-lorem-ipsum",
//!         serde_json::json!({ "count": 2, "type": "sentences" }),
//!     )
//!     .await?;
//! println!("{}", output["text"]);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`contract`] - input/output contracts and media references
//! - [`template`] - instruction templates and rendered requests
//! - [`invoker`] - generative backend and direct-proxy invocation
//! - [`tasks`] - the task catalogue
//! - [`registry`] - lookup by name and the per-run state machine
//! - [`config`] - TOML/environment configuration

#![warn(missing_docs)]

pub mod config;
pub mod contract;
pub mod error;
pub mod invoker;
#[cfg(feature = "logging")]
pub mod logging;
pub mod registry;
pub mod tasks;
pub mod template;

pub use error::{Boundary, ContractError, Error, InvocationError, Result, TaskError};
pub use registry::{TaskInfo, TaskRegistry};
pub use tasks::TaskName;
