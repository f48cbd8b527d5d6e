//! `shorten-url`, the only task that bypasses the generative backend.

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Strategy, TaskDefinition, TaskName};
use crate::contract::media::http_url;
use crate::contract::Contract;
use crate::invoker::ProxySpec;

/// Input of `shorten-url`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShortenUrlInput {
    /// Absolute `http` or `https` URL to shorten.
    #[garde(custom(http_url))]
    pub url: String,
}

/// Output of `shorten-url`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShortenUrlOutput {
    /// The shortened URL.
    #[garde(url)]
    pub short_url: String,
}

pub(crate) fn shorten_url() -> TaskDefinition {
    TaskDefinition {
        name: TaskName::ShortenUrl,
        description: "Shorten a URL through the configured shortening service",
        input: Contract::of::<ShortenUrlInput>(),
        output: Contract::of::<ShortenUrlOutput>(),
        strategy: Strategy::DirectProxy(ProxySpec {
            input_field: "url",
            output_field: "shortUrl",
        }),
    }
}
