//! Direct HTTP proxy for upstreams that answer a single GET with a plain-text body.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::excerpt;
use crate::config::{ConfigError, ShortenerConfig};
use crate::contract::{Contract, Validated};
use crate::error::{Boundary, ContractError, InvocationError, TaskError};

/// How a 2xx body is judged before it is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseCheck {
    /// Accept only a body that is an absolute `http`/`https` URL.
    #[default]
    Strict,
    /// Reject iff the body contains "error" in any case.
    Sentinel,
}

impl ResponseCheck {
    fn rejects(&self, body: &str) -> bool {
        match self {
            Self::Strict => !matches!(
                url::Url::parse(body),
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host()
            ),
            Self::Sentinel => body.to_ascii_lowercase().contains("error"),
        }
    }
}

impl std::str::FromStr for ResponseCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "sentinel" => Ok(Self::Sentinel),
            other => Err(format!(
                "unknown response check '{other}' (expected 'strict' or 'sentinel')"
            )),
        }
    }
}

/// Which input field is forwarded and which output field receives the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxySpec {
    /// Input field holding the value to forward.
    pub input_field: &'static str,
    /// Output field that receives the upstream body.
    pub output_field: &'static str,
}

/// Calls the URL-shortening upstream.
#[derive(Debug, Clone)]
pub struct ProxyInvoker {
    client: reqwest::Client,
    endpoint: String,
    query_param: String,
    check: ResponseCheck,
}

impl ProxyInvoker {
    /// Build from configuration.
    pub fn from_config(config: &ShortenerConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            query_param: config.query_param.clone(),
            check: config.response_check,
        })
    }

    /// The active response check.
    pub fn response_check(&self) -> ResponseCheck {
        self.check
    }

    /// Full request URL for `value`.
    pub fn request_url(&self, value: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            self.endpoint,
            separator,
            self.query_param,
            urlencoding::encode(value)
        )
    }

    /// GET the upstream and return its trimmed body.
    pub async fn fetch(&self, value: &str) -> Result<String, InvocationError> {
        let url = self.request_url(value);
        debug!(endpoint = %self.endpoint, "calling proxy upstream");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InvocationError::from_reqwest(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InvocationError::from_reqwest(&e))?;

        if !status.is_success() {
            return Err(InvocationError::TransportFailure(format!(
                "upstream returned HTTP {}: {}",
                status.as_u16(),
                excerpt(&body)
            )));
        }

        let body = body.trim();
        if body.is_empty() {
            return Err(InvocationError::EmptyResult(
                "upstream returned an empty body".to_string(),
            ));
        }
        if self.check.rejects(body) {
            warn!(check = ?self.check, body = %excerpt(body), "upstream signaled failure in-band");
            return Err(InvocationError::UpstreamRejected(excerpt(body)));
        }
        Ok(body.to_string())
    }

    /// Forward `spec.input_field` of a validated input and wrap the reply as
    /// `{ spec.output_field: body }`, not yet validated.
    pub async fn forward(&self, input: &Validated, spec: &ProxySpec) -> Result<Value, TaskError> {
        let value = input
            .get(spec.input_field)
            .and_then(Value::as_str)
            .ok_or_else(|| ContractError::new(Boundary::Input, spec.input_field, "is required"))?;

        let body = self.fetch(value).await?;

        let mut object = Map::new();
        object.insert(spec.output_field.to_string(), Value::String(body));
        Ok(Value::Object(object))
    }

    /// [`forward`](Self::forward) and validate the result against `output`.
    pub async fn invoke(
        &self,
        input: &Validated,
        spec: &ProxySpec,
        output: &Contract,
    ) -> Result<Validated, TaskError> {
        let raw = self.forward(input, spec).await?;
        Ok(output.validate_output(raw)?)
    }
}
