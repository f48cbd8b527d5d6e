//! Image tasks: `compress-image` and `extract-text-from-image`.

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{GenerativeSpec, Prompt, Strategy, TaskDefinition, TaskName};
use crate::contract::media::image_data_uri;
use crate::contract::{Contract, DataUri, Validated};
use crate::invoker::ResponseShape;
use crate::template::{RenderedRequest, TemplateError};

fn default_quality() -> u8 {
    75
}

/// Input of `compress-image`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompressImageInput {
    /// Image to compress, as a `data:image/*;base64,...` URI.
    #[garde(custom(image_data_uri))]
    pub image: String,
    /// Target quality from 1 (smallest) to 100 (best).
    #[serde(default = "default_quality")]
    #[garde(range(min = 1, max = 100))]
    pub quality: u8,
}

/// Output of `compress-image`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompressImageOutput {
    /// The re-encoded image as a `data:image/*;base64,...` URI.
    #[garde(custom(image_data_uri))]
    pub compressed_image: String,
}

/// Input of `extract-text-from-image`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTextFromImageInput {
    /// Image to read, as a `data:image/*;base64,...` URI.
    #[garde(custom(image_data_uri))]
    pub image: String,
}

/// Output of the text-extraction tasks.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedText {
    /// All text found, in reading order. Empty when there is none.
    #[garde(skip)]
    pub text: String,
}

const EXTRACT_TEXT_FROM_IMAGE: &str = "\
Extract all text visible in the following image. Keep the reading order and line breaks. \
If the image contains no text, return an empty string.
{{media url=image}}";

fn compress_request(input: &Validated) -> Result<RenderedRequest, TemplateError> {
    let input: CompressImageInput = input
        .to_typed()
        .map_err(|e| TemplateError::InvalidInput(e.to_string()))?;
    let image = DataUri::parse(&input.image).map_err(|e| TemplateError::InvalidMedia {
        path: "image".to_string(),
        reason: e.to_string(),
    })?;
    Ok(RenderedRequest::builder()
        .text(format!(
            "Re-encode the following image at quality {} out of 100 to reduce its file size. \
             Keep its dimensions and content unchanged and reply with the image only.",
            input.quality
        ))
        .media(image)
        .build())
}

pub(crate) fn compress_image() -> TaskDefinition {
    TaskDefinition {
        name: TaskName::CompressImage,
        description: "Re-encode an image at a target quality to reduce its size",
        input: Contract::of::<CompressImageInput>(),
        output: Contract::of::<CompressImageOutput>(),
        strategy: Strategy::Generative(GenerativeSpec {
            prompt: Prompt::Programmatic(compress_request),
            shape: ResponseShape::Media {
                field: "compressedImage",
            },
        }),
    }
}

pub(crate) fn extract_text_from_image() -> Result<TaskDefinition, TemplateError> {
    Ok(TaskDefinition {
        name: TaskName::ExtractTextFromImage,
        description: "Extract the text visible in an image",
        input: Contract::of::<ExtractTextFromImageInput>(),
        output: Contract::of::<ExtractedText>(),
        strategy: Strategy::Generative(GenerativeSpec {
            prompt: Prompt::template(EXTRACT_TEXT_FROM_IMAGE)?,
            shape: ResponseShape::Structured,
        }),
    })
}
