//! `translate-document`.

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{GenerativeSpec, Prompt, Strategy, TaskDefinition, TaskName};
use crate::contract::media::any_data_uri;
use crate::contract::Contract;
use crate::invoker::ResponseShape;
use crate::template::TemplateError;

/// Input of `translate-document`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TranslateDocumentInput {
    /// The document to translate, as a `data:<mime-type>;base64,...` URI.
    #[garde(custom(any_data_uri))]
    pub document: String,
    /// Language to translate into, e.g. "German".
    #[garde(length(min = 1))]
    pub target_language: String,
    /// Language the document is written in. Detected when absent.
    #[serde(default)]
    #[garde(skip)]
    pub source_language: Option<String>,
}

/// Output of `translate-document`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TranslateDocumentOutput {
    /// The translation.
    #[garde(skip)]
    pub translated_text: String,
}

const TRANSLATE_DOCUMENT: &str = "\
Translate the text of the attached document into {{targetLanguage}}.\
{{#if sourceLanguage}} The document is written in {{sourceLanguage}}.\
{{else}} Detect the language of the document yourself.{{/if}} \
Keep the paragraph structure and return only the translation.
{{media url=document}}";

pub(crate) fn translate_document() -> Result<TaskDefinition, TemplateError> {
    Ok(TaskDefinition {
        name: TaskName::TranslateDocument,
        description: "Translate a document into a target language",
        input: Contract::of::<TranslateDocumentInput>(),
        output: Contract::of::<TranslateDocumentOutput>(),
        strategy: Strategy::Generative(GenerativeSpec {
            prompt: Prompt::template(TRANSLATE_DOCUMENT)?,
            shape: ResponseShape::Structured,
        }),
    })
}
