//! `format-code` and `minify-code`.

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{GenerativeSpec, Prompt, Strategy, TaskDefinition, TaskName};
use crate::contract::Contract;
use crate::invoker::ResponseShape;
use crate::template::TemplateError;

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// JavaScript.
    Javascript,
    /// CSS.
    Css,
    /// HTML.
    Html,
}

/// Input of `format-code`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FormatCodeInput {
    /// Source to format.
    #[garde(length(min = 1))]
    pub code: String,
    /// Language of `code`.
    #[garde(skip)]
    pub language: Language,
}

/// Output of `format-code`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FormatCodeOutput {
    /// The formatted source.
    #[garde(skip)]
    pub formatted_code: String,
}

/// Input of `minify-code`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MinifyCodeInput {
    /// Source to minify. May be empty.
    #[garde(skip)]
    pub code: String,
    /// Language of `code`.
    #[garde(skip)]
    pub language: Language,
}

/// Output of `minify-code`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MinifyCodeOutput {
    /// The minified source.
    #[garde(skip)]
    pub minified_code: String,
}

const FORMAT_CODE: &str = r#"Format the following {{language}} code with conventional indentation and line breaks without changing its behavior.
{{#eq language "javascript"}}Use two-space indentation and terminate statements with semicolons.{{/eq}}{{#eq language "css"}}Put every declaration on its own line and leave one blank line between rules.{{/eq}}{{#eq language "html"}}Indent nested elements by two spaces and keep attribute order.{{/eq}}

{{code}}"#;

const MINIFY_CODE: &str = r#"Minify the following {{language}} code to the smallest equivalent source.
{{#eq language "javascript"}}Remove comments and unnecessary whitespace; do not rename exported identifiers.{{/eq}}{{#eq language "css"}}Remove comments, whitespace and the last semicolon of each block.{{/eq}}{{#eq language "html"}}Remove comments and collapse whitespace between tags; keep the content of pre and textarea elements.{{/eq}}

{{code}}"#;

pub(crate) fn format_code() -> Result<TaskDefinition, TemplateError> {
    Ok(TaskDefinition {
        name: TaskName::FormatCode,
        description: "Pretty-print JavaScript, CSS or HTML source",
        input: Contract::of::<FormatCodeInput>(),
        output: Contract::of::<FormatCodeOutput>(),
        strategy: Strategy::Generative(GenerativeSpec {
            prompt: Prompt::template(FORMAT_CODE)?,
            shape: ResponseShape::Structured,
        }),
    })
}

pub(crate) fn minify_code() -> Result<TaskDefinition, TemplateError> {
    Ok(TaskDefinition {
        name: TaskName::MinifyCode,
        description: "Minify JavaScript, CSS or HTML source",
        input: Contract::of::<MinifyCodeInput>(),
        output: Contract::of::<MinifyCodeOutput>(),
        strategy: Strategy::Generative(GenerativeSpec {
            prompt: Prompt::template(MINIFY_CODE)?,
            shape: ResponseShape::Structured,
        }),
    })
}
