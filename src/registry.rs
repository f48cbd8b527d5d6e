//! Task lookup and the per-run protocol.
//!
//! [`TaskRegistry::run`] drives every invocation through the same phases:
//!
//! ```text
//! Received -> InputValidated -> [Rendered ->] Invoked -> OutputValidated -> Completed
//!      \______________\________________\__________\______________\-> Failed
//! ```
//!
//! `Rendered` is skipped by the direct-proxy strategy. Nothing is retried or resumed.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::contract::Validated;
use crate::error::TaskError;
use crate::invoker::{GeminiBackend, GenerativeBackend, GenerativeInvoker, ProxyInvoker};
use crate::tasks::{self, Strategy, TaskDefinition, TaskName};
use crate::template::TemplateError;

/// Phase of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Raw input accepted for processing.
    Received,
    /// Input passed its contract.
    InputValidated,
    /// Request rendered from the prompt.
    Rendered,
    /// Backend or upstream answered.
    Invoked,
    /// Result passed the output contract.
    OutputValidated,
    /// Result handed back.
    Completed,
    /// Run ended with an error.
    Failed,
}

impl RunPhase {
    /// Whether the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` may follow this phase.
    ///
    /// ```
    /// use toolflow::registry::RunPhase;
    ///
    /// assert!(RunPhase::InputValidated.can_transition_to(&RunPhase::Rendered));
    /// assert!(RunPhase::InputValidated.can_transition_to(&RunPhase::Invoked));
    /// assert!(RunPhase::Rendered.can_transition_to(&RunPhase::Failed));
    /// assert!(!RunPhase::Completed.can_transition_to(&RunPhase::Failed));
    /// assert!(!RunPhase::Received.can_transition_to(&RunPhase::Invoked));
    /// ```
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *next == Self::Failed {
            return true;
        }
        match self {
            Self::Received => *next == Self::InputValidated,
            Self::InputValidated => matches!(next, Self::Rendered | Self::Invoked),
            Self::Rendered => *next == Self::Invoked,
            Self::Invoked => *next == Self::OutputValidated,
            Self::OutputValidated => *next == Self::Completed,
            Self::Completed | Self::Failed => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::InputValidated => "input_validated",
            Self::Rendered => "rendered",
            Self::Invoked => "invoked",
            Self::OutputValidated => "output_validated",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the phase of one run and logs each step.
#[derive(Debug)]
struct RunState {
    phase: RunPhase,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: RunPhase::Received,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_transition_to(&next),
            "invalid run transition {} -> {}",
            self.phase,
            next
        );
        debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }
}

/// Errors raised while assembling a [`TaskRegistry`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// Configuration could not be turned into invokers.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A task template failed to parse.
    #[error("task template is invalid: {0}")]
    Template(#[from] TemplateError),

    /// The same task was registered twice.
    #[error("task '{0}' is registered more than once")]
    DuplicateTask(TaskName),

    /// A required component was not supplied to the builder.
    #[error("registry builder is missing a {0}")]
    Missing(&'static str),
}

/// Public description of a registered task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Task name.
    pub name: TaskName,
    /// One-line description.
    pub description: &'static str,
    /// `generative` or `direct-proxy`.
    pub strategy: &'static str,
    /// JSON Schema of the input.
    pub input_schema: Value,
    /// JSON Schema of the output.
    pub output_schema: Value,
}

impl From<&TaskDefinition> for TaskInfo {
    fn from(definition: &TaskDefinition) -> Self {
        Self {
            name: definition.name,
            description: definition.description,
            strategy: definition.strategy.kind(),
            input_schema: definition.input.schema().clone(),
            output_schema: definition.output.schema().clone(),
        }
    }
}

/// Builder for [`TaskRegistry`].
#[derive(Default)]
pub struct TaskRegistryBuilder {
    backend: Option<Arc<dyn GenerativeBackend>>,
    proxy: Option<ProxyInvoker>,
    catalogue: bool,
    tasks: Vec<TaskDefinition>,
}

impl fmt::Debug for TaskRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistryBuilder")
            .field("backend", &self.backend.is_some())
            .field("proxy", &self.proxy)
            .field("catalogue", &self.catalogue)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl TaskRegistryBuilder {
    /// Generative backend used by every generative task.
    pub fn backend(mut self, backend: Arc<dyn GenerativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Invoker used by direct-proxy tasks.
    pub fn proxy(mut self, proxy: ProxyInvoker) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Register the full built-in catalogue.
    pub fn catalogue(mut self) -> Self {
        self.catalogue = true;
        self
    }

    /// Register one task.
    pub fn task(mut self, definition: TaskDefinition) -> Self {
        self.tasks.push(definition);
        self
    }

    /// Assemble the registry. Every template has been parsed by the time this returns.
    pub fn build(self) -> Result<TaskRegistry, RegistryError> {
        let backend = self.backend.ok_or(RegistryError::Missing("generative backend"))?;
        let proxy = self.proxy.ok_or(RegistryError::Missing("proxy invoker"))?;

        let mut definitions = if self.catalogue {
            tasks::catalogue()?
        } else {
            Vec::new()
        };
        definitions.extend(self.tasks);

        let mut tasks = IndexMap::with_capacity(definitions.len());
        for definition in definitions {
            let name = definition.name;
            if tasks.insert(name, definition).is_some() {
                return Err(RegistryError::DuplicateTask(name));
            }
        }

        debug!(tasks = tasks.len(), "task registry assembled");
        Ok(TaskRegistry {
            tasks,
            generative: GenerativeInvoker::new(backend),
            proxy,
        })
    }
}

/// Looks tasks up by name and runs them.
///
/// Cheap to share: wrap it in an [`Arc`] or borrow it across concurrent runs.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: IndexMap<TaskName, TaskDefinition>,
    generative: GenerativeInvoker,
    proxy: ProxyInvoker,
}

impl TaskRegistry {
    /// Start an empty builder.
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    /// The full catalogue over the given backend and proxy.
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        proxy: ProxyInvoker,
    ) -> Result<Self, RegistryError> {
        Self::builder()
            .backend(backend)
            .proxy(proxy)
            .catalogue()
            .build()
    }

    /// The full catalogue over the HTTP backend and shortener described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        config.validate()?;
        let backend = GeminiBackend::from_config(&config.backend)?;
        let proxy = ProxyInvoker::from_config(&config.shortener)?;
        Self::new(Arc::new(backend), proxy)
    }

    /// Descriptions of every task, in registration order.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.tasks.values().map(TaskInfo::from).collect()
    }

    /// Description of one task.
    pub fn info(&self, task: &str) -> Result<TaskInfo, TaskError> {
        self.definition(task).map(TaskInfo::from)
    }

    fn definition(&self, task: &str) -> Result<&TaskDefinition, TaskError> {
        let name: TaskName = task.parse()?;
        self.tasks.get(&name).ok_or_else(|| TaskError::UnknownTask {
            name: task.to_string(),
        })
    }

    /// Run `task` on `raw` input.
    ///
    /// Returns a value that satisfies the task's output contract, or the first error
    /// encountered. Input that breaks the input contract never reaches the backend.
    pub async fn run(&self, task: &str, raw: Value) -> Result<Value, TaskError> {
        let invocation_id = Uuid::new_v4();
        let span = info_span!("task", task = %task, invocation_id = %invocation_id);
        self.run_in_span(task, raw).instrument(span).await
    }

    async fn run_in_span(&self, task: &str, raw: Value) -> Result<Value, TaskError> {
        let mut state = RunState::new();
        match self.execute(task, raw, &mut state).await {
            Ok(output) => {
                state.advance(RunPhase::Completed);
                info!("task completed");
                Ok(output.into_value())
            },
            Err(err) => {
                let failed_in = state.phase;
                state.advance(RunPhase::Failed);
                warn!(kind = err.kind(), after = %failed_in, error = %err, "task failed");
                Err(err)
            },
        }
    }

    async fn execute(
        &self,
        task: &str,
        raw: Value,
        state: &mut RunState,
    ) -> Result<Validated, TaskError> {
        let definition = self.definition(task)?;
        let input = definition.input.validate_input(raw)?;
        state.advance(RunPhase::InputValidated);

        let output = match &definition.strategy {
            Strategy::Generative(spec) => {
                let request = spec.prompt.render(&input)?;
                state.advance(RunPhase::Rendered);
                self.generative
                    .invoke(request, &definition.output, spec.shape)
                    .await?
            },
            Strategy::DirectProxy(spec) => {
                self.proxy.invoke(&input, spec, &definition.output).await?
            },
        };
        state.advance(RunPhase::Invoked);
        state.advance(RunPhase::OutputValidated);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShortenerConfig;
    use crate::invoker::{GenerateRequest, GenerateResponse};
    use crate::InvocationError;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl GenerativeBackend for Silent {
        async fn generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<GenerateResponse, InvocationError> {
            Ok(GenerateResponse::empty())
        }
    }

    fn proxy() -> ProxyInvoker {
        ProxyInvoker::from_config(&ShortenerConfig::default()).unwrap()
    }

    #[test]
    fn every_phase_can_fail_until_terminal() {
        for phase in [
            RunPhase::Received,
            RunPhase::InputValidated,
            RunPhase::Rendered,
            RunPhase::Invoked,
            RunPhase::OutputValidated,
        ] {
            assert!(phase.can_transition_to(&RunPhase::Failed), "{phase}");
            assert!(!phase.is_terminal());
        }
        assert!(!RunPhase::Failed.can_transition_to(&RunPhase::Failed));
        assert!(!RunPhase::Completed.can_transition_to(&RunPhase::Received));
    }

    #[test]
    fn phases_cannot_be_skipped() {
        assert!(!RunPhase::Received.can_transition_to(&RunPhase::Completed));
        assert!(!RunPhase::Rendered.can_transition_to(&RunPhase::OutputValidated));
        assert!(!RunPhase::Invoked.can_transition_to(&RunPhase::Completed));
    }

    #[test]
    fn builder_requires_backend_and_proxy() {
        assert_eq!(
            TaskRegistry::builder().proxy(proxy()).build().unwrap_err(),
            RegistryError::Missing("generative backend")
        );
        assert_eq!(
            TaskRegistry::builder()
                .backend(Arc::new(Silent))
                .build()
                .unwrap_err(),
            RegistryError::Missing("proxy invoker")
        );
    }

    #[test]
    fn duplicate_tasks_are_rejected() {
        let err = TaskRegistry::builder()
            .backend(Arc::new(Silent))
            .proxy(proxy())
            .catalogue()
            .task(tasks::shorten::shorten_url())
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTask(TaskName::ShortenUrl));
    }

    #[test]
    fn tasks_are_listed_in_catalogue_order() {
        let registry = TaskRegistry::new(Arc::new(Silent), proxy()).unwrap();
        let names: Vec<TaskName> = registry.tasks().into_iter().map(|t| t.name).collect();
        assert_eq!(names, TaskName::ALL.to_vec());
        assert_eq!(registry.info("shorten-url").unwrap().strategy, "direct-proxy");
    }

    #[tokio::test]
    async fn unregistered_task_is_unknown() {
        let registry = TaskRegistry::builder()
            .backend(Arc::new(Silent))
            .proxy(proxy())
            .task(tasks::shorten::shorten_url())
            .build()
            .unwrap();
        let err = registry
            .run("format-code", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::UnknownTask {
                name: "format-code".to_string()
            }
        );
    }
}
