//! `extract-text-from-pdf`.

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::image::ExtractedText;
use super::{GenerativeSpec, Prompt, Strategy, TaskDefinition, TaskName};
use crate::contract::media::pdf_data_uri;
use crate::contract::Contract;
use crate::invoker::ResponseShape;
use crate::template::TemplateError;

/// Input of `extract-text-from-pdf`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTextFromPdfInput {
    /// The document, as a `data:application/pdf;base64,...` URI.
    #[garde(custom(pdf_data_uri))]
    pub pdf: String,
}

const EXTRACT_TEXT_FROM_PDF: &str = "\
Extract the full text of the following PDF document, page by page, in reading order. \
Separate paragraphs with blank lines and leave out page headers, footers and page numbers.
{{media url=pdf}}";

pub(crate) fn extract_text_from_pdf() -> Result<TaskDefinition, TemplateError> {
    Ok(TaskDefinition {
        name: TaskName::ExtractTextFromPdf,
        description: "Extract the text of a PDF document",
        input: Contract::of::<ExtractTextFromPdfInput>(),
        output: Contract::of::<ExtractedText>(),
        strategy: Strategy::Generative(GenerativeSpec {
            prompt: Prompt::template(EXTRACT_TEXT_FROM_PDF)?,
            shape: ResponseShape::Structured,
        }),
    })
}
