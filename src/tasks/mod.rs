//! The task catalogue.
//!
//! Each task pairs an input contract, an output contract and an execution strategy.
//! The set is closed: [`TaskName`] lists every task and [`catalogue`] builds their
//! definitions, parsing all templates up front.

pub mod code;
pub mod generate;
pub mod image;
pub mod pdf;
pub mod shorten;
pub mod translate;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::contract::{Contract, Validated};
use crate::error::TaskError;
use crate::invoker::{ProxySpec, ResponseShape};
use crate::template::{RenderedRequest, Template, TemplateError};

/// Name of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskName {
    /// Re-encode an image at a target quality.
    CompressImage,
    /// OCR an image.
    ExtractTextFromImage,
    /// Pull the text out of a PDF.
    ExtractTextFromPdf,
    /// Pretty-print JavaScript, CSS or HTML.
    FormatCode,
    /// Minify JavaScript, CSS or HTML.
    MinifyCode,
    /// Placeholder text.
    GenerateLoremIpsum,
    /// Synthetic records from a description.
    GenerateMockData,
    /// Shorten a URL through the shortening upstream.
    ShortenUrl,
    /// Translate a document.
    TranslateDocument,
}

impl TaskName {
    /// Every task, in catalogue order.
    pub const ALL: [TaskName; 9] = [
        Self::CompressImage,
        Self::ExtractTextFromImage,
        Self::ExtractTextFromPdf,
        Self::FormatCode,
        Self::MinifyCode,
        Self::GenerateLoremIpsum,
        Self::GenerateMockData,
        Self::ShortenUrl,
        Self::TranslateDocument,
    ];

    /// The wire name, e.g. `compress-image`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompressImage => "compress-image",
            Self::ExtractTextFromImage => "extract-text-from-image",
            Self::ExtractTextFromPdf => "extract-text-from-pdf",
            Self::FormatCode => "format-code",
            Self::MinifyCode => "minify-code",
            Self::GenerateLoremIpsum => "generate-lorem-ipsum",
            Self::GenerateMockData => "generate-mock-data",
            Self::ShortenUrl => "shorten-url",
            Self::TranslateDocument => "translate-document",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| TaskError::UnknownTask {
                name: s.to_string(),
            })
    }
}

/// Builds a request without a template.
pub type RequestBuilderFn = fn(&Validated) -> Result<RenderedRequest, TemplateError>;

/// Where a generative task's request comes from.
#[derive(Debug, Clone)]
pub enum Prompt {
    /// Rendered from an instruction template.
    Template(Template),
    /// Built in code.
    Programmatic(RequestBuilderFn),
}

impl Prompt {
    /// Parse `source` into a template prompt.
    pub fn template(source: &str) -> Result<Self, TemplateError> {
        Template::parse(source).map(Self::Template)
    }

    /// Produce the request for a validated input.
    pub fn render(&self, input: &Validated) -> Result<RenderedRequest, TemplateError> {
        match self {
            Self::Template(template) => template.render_validated(input),
            Self::Programmatic(build) => build(input),
        }
    }
}

/// A generative task's request and reply handling.
#[derive(Debug, Clone)]
pub struct GenerativeSpec {
    /// How the request is produced.
    pub prompt: Prompt,
    /// How the reply becomes the output object.
    pub shape: ResponseShape,
}

/// How a task is executed.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Through the generative backend.
    Generative(GenerativeSpec),
    /// Through a plain HTTP upstream.
    DirectProxy(ProxySpec),
}

impl Strategy {
    /// Stable name: `generative` or `direct-proxy`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generative(_) => "generative",
            Self::DirectProxy(_) => "direct-proxy",
        }
    }
}

/// A registered task.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Task identity.
    pub name: TaskName,
    /// One-line description.
    pub description: &'static str,
    /// Contract for caller input.
    pub input: Contract,
    /// Contract for the result.
    pub output: Contract,
    /// Execution strategy.
    pub strategy: Strategy,
}

/// Definitions for every [`TaskName`], in [`TaskName::ALL`] order.
pub fn catalogue() -> Result<Vec<TaskDefinition>, TemplateError> {
    Ok(vec![
        image::compress_image(),
        image::extract_text_from_image()?,
        pdf::extract_text_from_pdf()?,
        code::format_code()?,
        code::minify_code()?,
        generate::generate_lorem_ipsum()?,
        generate::generate_mock_data()?,
        shorten::shorten_url(),
        translate::translate_document()?,
    ])
}
