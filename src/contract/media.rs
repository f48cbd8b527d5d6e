//! Media references carried as `data:` URIs.
//!
//! Images, PDFs and documents cross every task boundary as a single string of the
//! form `data:<mime-type>;base64,<payload>`. [`DataUri`] is the parsed form; the
//! `*_data_uri` functions are `garde` custom validators used by task contracts.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";

static MIME_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9!#$&^_.+-]*/[A-Za-z0-9][A-Za-z0-9!#$&^_.+-]*$")
        .expect("MIME type pattern is valid")
});

/// Reasons a string is not a well-formed media reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataUriError {
    /// The value does not start with `data:`.
    #[error("must start with 'data:'")]
    MissingScheme,

    /// No `,` separates the header from the payload.
    #[error("must contain ',' between the media type and the payload")]
    MissingPayloadSeparator,

    /// The header does not end with `;base64`.
    #[error("must be base64-encoded (';base64,' marker missing)")]
    NotBase64,

    /// The MIME type is absent or malformed.
    #[error("'{0}' is not a valid MIME type")]
    InvalidMimeType(String),

    /// The payload is empty.
    #[error("payload is empty")]
    EmptyPayload,

    /// The payload is not valid standard base64.
    #[error("payload is not valid base64: {0}")]
    InvalidBase64(String),
}

/// A parsed `data:<mime-type>;base64,<payload>` reference.
///
/// # Examples
///
/// ```
/// use toolflow::contract::DataUri;
///
/// let uri: DataUri = "data:image/png;base64,iVBORw0KGgo=".parse().unwrap();
/// assert_eq!(uri.mime_type(), "image/png");
/// assert!(uri.is_image());
/// assert_eq!(uri.to_string(), "data:image/png;base64,iVBORw0KGgo=");
///
/// assert!("data:;base64,AAAA".parse::<DataUri>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataUri {
    media_type: String,
    data: String,
}

impl DataUri {
    /// Encode raw bytes as a data URI.
    pub fn encode(mime_type: &str, bytes: &[u8]) -> Result<Self, DataUriError> {
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::from_base64(mime_type, data)
    }

    /// Build a data URI from an already base64-encoded payload.
    pub fn from_base64(mime_type: &str, data: impl Into<String>) -> Result<Self, DataUriError> {
        let data = data.into();
        check_media_type(mime_type)?;
        check_payload(&data)?;
        Ok(Self {
            media_type: mime_type.to_string(),
            data,
        })
    }

    /// Parse a `data:` URI string.
    pub fn parse(value: &str) -> Result<Self, DataUriError> {
        let rest = value
            .strip_prefix(SCHEME)
            .ok_or(DataUriError::MissingScheme)?;
        let (header, data) = rest
            .split_once(',')
            .ok_or(DataUriError::MissingPayloadSeparator)?;
        let media_type = header
            .strip_suffix(BASE64_MARKER)
            .ok_or(DataUriError::NotBase64)?;
        Self::from_base64(media_type, data)
    }

    /// The MIME type without parameters, e.g. `image/png`.
    pub fn mime_type(&self) -> &str {
        self.media_type
            .split(';')
            .next()
            .unwrap_or(&self.media_type)
            .trim()
    }

    /// The full media type as declared, including parameters such as `charset`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The base64 payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Decode the payload.
    pub fn decode(&self) -> Result<Vec<u8>, DataUriError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| DataUriError::InvalidBase64(e.to_string()))
    }

    /// Whether this references an image.
    pub fn is_image(&self) -> bool {
        self.mime_type().to_ascii_lowercase().starts_with("image/")
    }

    /// Whether this references a PDF.
    pub fn is_pdf(&self) -> bool {
        self.mime_type().eq_ignore_ascii_case("application/pdf")
    }
}

fn check_media_type(media_type: &str) -> Result<(), DataUriError> {
    let mut segments = media_type.split(';');
    let essence = segments.next().unwrap_or_default().trim();
    if !MIME_TYPE.is_match(essence) {
        return Err(DataUriError::InvalidMimeType(essence.to_string()));
    }
    // Parameters must be key=value pairs.
    if segments.any(|param| !param.contains('=')) {
        return Err(DataUriError::InvalidMimeType(media_type.to_string()));
    }
    Ok(())
}

fn check_payload(data: &str) -> Result<(), DataUriError> {
    if data.is_empty() {
        return Err(DataUriError::EmptyPayload);
    }
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map(|_| ())
        .map_err(|e| DataUriError::InvalidBase64(e.to_string()))
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}{BASE64_MARKER},{}", self.media_type, self.data)
    }
}

impl FromStr for DataUri {
    type Err = DataUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DataUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// `garde` validator: any well-formed data URI.
pub fn any_data_uri(value: &str, _ctx: &()) -> garde::Result {
    DataUri::parse(value)
        .map(|_| ())
        .map_err(|e| garde::Error::new(format!("not a valid data URI: {e}")))
}

/// `garde` validator: a data URI whose MIME type is `image/*`.
pub fn image_data_uri(value: &str, _ctx: &()) -> garde::Result {
    let uri = DataUri::parse(value)
        .map_err(|e| garde::Error::new(format!("not a valid data URI: {e}")))?;
    if !uri.is_image() {
        return Err(garde::Error::new(format!(
            "must be an image/* data URI, got '{}'",
            uri.mime_type()
        )));
    }
    Ok(())
}

/// `garde` validator: a data URI whose MIME type is `application/pdf`.
pub fn pdf_data_uri(value: &str, _ctx: &()) -> garde::Result {
    let uri = DataUri::parse(value)
        .map_err(|e| garde::Error::new(format!("not a valid data URI: {e}")))?;
    if !uri.is_pdf() {
        return Err(garde::Error::new(format!(
            "must be an application/pdf data URI, got '{}'",
            uri.mime_type()
        )));
    }
    Ok(())
}

/// `garde` validator: an absolute `http` or `https` URL.
pub fn http_url(value: &str, _ctx: &()) -> garde::Result {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        Ok(url) => Err(garde::Error::new(format!(
            "must be an absolute http(s) URL, got scheme '{}'",
            url.scheme()
        ))),
        Err(e) => Err(garde::Error::new(format!(
            "must be an absolute http(s) URL: {e}"
        ))),
    }
}
