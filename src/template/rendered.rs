//! The request shape handed to a generative backend.

use smallvec::SmallVec;

use crate::contract::DataUri;

/// One part of a [`RenderedRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Literal instruction text.
    Text(String),
    /// An inline media reference.
    Media(DataUri),
}

impl Part {
    /// The text, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Media(_) => None,
        }
    }

    /// The media reference, if this is a media part.
    pub fn as_media(&self) -> Option<&DataUri> {
        match self {
            Self::Media(uri) => Some(uri),
            Self::Text(_) => None,
        }
    }
}

/// An ordered sequence of text and media parts.
///
/// Adjacent text is always merged into one part and whitespace-only text parts are
/// dropped, whether the request came from a template or from [`RenderedRequestBuilder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedRequest {
    parts: SmallVec<[Part; 4]>,
}

impl RenderedRequest {
    /// Start building a request by hand.
    ///
    /// ```
    /// use toolflow::contract::DataUri;
    /// use toolflow::template::{Part, RenderedRequest};
    ///
    /// let image = DataUri::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
    /// let request = RenderedRequest::builder()
    ///     .text("Compress this image.")
    ///     .media(image.clone())
    ///     .text("  ")
    ///     .build();
    ///
    /// assert_eq!(
    ///     request.parts(),
    ///     &[Part::Text("Compress this image.".into()), Part::Media(image)]
    /// );
    /// ```
    pub fn builder() -> RenderedRequestBuilder {
        RenderedRequestBuilder::default()
    }

    /// The parts in order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Consume the request and return its parts.
    pub fn into_parts(self) -> Vec<Part> {
        self.parts.into_vec()
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the request has no parts at all.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Iterate over the media parts only.
    pub fn media(&self) -> impl Iterator<Item = &DataUri> {
        self.parts.iter().filter_map(Part::as_media)
    }

    /// All text parts joined with blank lines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Incremental builder for [`RenderedRequest`].
///
/// Surrounding whitespace is trimmed from literal text only; interpolated values
/// keep theirs.
#[derive(Debug, Default)]
pub struct RenderedRequestBuilder {
    parts: SmallVec<[Part; 4]>,
    pending: Vec<Segment>,
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Value(String),
}

impl Segment {
    fn as_str(&self) -> &str {
        match self {
            Self::Literal(text) | Self::Value(text) => text,
        }
    }
}

impl RenderedRequestBuilder {
    /// Append text; merged with any text appended right before it.
    pub fn text(mut self, text: impl AsRef<str>) -> Self {
        self.push_text(text.as_ref());
        self
    }

    /// Append a media part.
    pub fn media(mut self, uri: DataUri) -> Self {
        self.push_media(uri);
        self
    }

    /// Finish the request.
    pub fn build(mut self) -> RenderedRequest {
        self.flush();
        RenderedRequest { parts: self.parts }
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        self.pending.push(Segment::Literal(text.to_string()));
    }

    pub(crate) fn push_value(&mut self, value: &str) {
        self.pending.push(Segment::Value(value.to_string()));
    }

    pub(crate) fn push_media(&mut self, uri: DataUri) {
        self.flush();
        self.parts.push(Part::Media(uri));
    }

    fn flush(&mut self) {
        let mut segments = std::mem::take(&mut self.pending);
        if segments.iter().all(|s| s.as_str().trim().is_empty()) {
            return;
        }

        for segment in segments.iter_mut() {
            match segment {
                Segment::Literal(text) => {
                    *text = text.trim_start().to_string();
                    if !text.is_empty() {
                        break;
                    }
                },
                Segment::Value(_) => break,
            }
        }
        for segment in segments.iter_mut().rev() {
            match segment {
                Segment::Literal(text) => {
                    text.truncate(text.trim_end().len());
                    if !text.is_empty() {
                        break;
                    }
                },
                Segment::Value(_) => break,
            }
        }

        let text: String = segments.iter().map(Segment::as_str).collect();
        self.parts.push(Part::Text(text));
    }
}
