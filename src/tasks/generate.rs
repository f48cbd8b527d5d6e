//! Text and data generators: `generate-lorem-ipsum` and `generate-mock-data`.

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GenerativeSpec, Prompt, Strategy, TaskDefinition, TaskName};
use crate::contract::Contract;
use crate::invoker::ResponseShape;
use crate::template::TemplateError;

/// Unit that `count` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoremUnit {
    /// Single words.
    Words,
    /// Sentences.
    Sentences,
    /// Paragraphs.
    Paragraphs,
}

/// Input of `generate-lorem-ipsum`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoremIpsumInput {
    /// How many units to generate.
    #[garde(range(min = 1, max = 100))]
    pub count: u32,
    /// What to count.
    #[serde(rename = "type")]
    #[garde(skip)]
    pub kind: LoremUnit,
}

/// Output of `generate-lorem-ipsum`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoremIpsumOutput {
    /// The generated text.
    #[garde(length(min = 1))]
    pub text: String,
}

fn default_record_count() -> u32 {
    10
}

/// Input of `generate-mock-data`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MockDataInput {
    /// What each record describes, e.g. "users with a name, email and signup date".
    #[garde(length(min = 1))]
    pub description: String,
    /// How many records to generate.
    #[serde(default = "default_record_count")]
    #[garde(range(min = 1, max = 100))]
    pub count: u32,
    /// Sample records whose structure and style the output should follow.
    #[serde(default)]
    #[garde(length(max = 20))]
    pub examples: Option<Vec<String>>,
}

/// Output of `generate-mock-data`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MockDataOutput {
    /// The generated records.
    #[garde(length(min = 1))]
    pub data: Vec<Value>,
}

const LOREM_IPSUM: &str = r#"Generate Lorem Ipsum placeholder text consisting of exactly {{count}} {{#eq type "words"}}words separated by single spaces, with no punctuation at the end{{else}}{{#eq type "sentences"}}sentences{{else}}paragraphs separated by blank lines{{/eq}}{{/eq}}.
Use the classic pseudo-Latin vocabulary and start with "Lorem ipsum"."#;

const MOCK_DATA: &str = r#"Generate {{count}} realistic mock data records.
Each record describes: {{description}}
{{#if examples}}Follow the structure and style of these examples:
{{#each examples}}- {{this}}
{{/each}}{{/if}}Return the records in the data array, one JSON value per record, with no duplicates."#;

pub(crate) fn generate_lorem_ipsum() -> Result<TaskDefinition, TemplateError> {
    Ok(TaskDefinition {
        name: TaskName::GenerateLoremIpsum,
        description: "Generate Lorem Ipsum placeholder words, sentences or paragraphs",
        input: Contract::of::<LoremIpsumInput>(),
        output: Contract::of::<LoremIpsumOutput>(),
        strategy: Strategy::Generative(GenerativeSpec {
            prompt: Prompt::template(LOREM_IPSUM)?,
            shape: ResponseShape::Structured,
        }),
    })
}

pub(crate) fn generate_mock_data() -> Result<TaskDefinition, TemplateError> {
    Ok(TaskDefinition {
        name: TaskName::GenerateMockData,
        description: "Generate realistic mock records from a description",
        input: Contract::of::<MockDataInput>(),
        output: Contract::of::<MockDataOutput>(),
        strategy: Strategy::Generative(GenerativeSpec {
            prompt: Prompt::template(MOCK_DATA)?,
            shape: ResponseShape::Structured,
        }),
    })
}
