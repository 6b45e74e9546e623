//! Acquirer data types

use base64::Engine;
use std::time::Duration;

/// Content type used when a response does not declare a usable one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One acquired image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encoded image bytes (JPEG for local capture)
    pub data: Vec<u8>,
    /// MIME type without parameters
    pub content_type: String,
}

impl Frame {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
        }
    }

    /// Render as a `data:` URI the display can use as an image source
    pub fn to_data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.content_type, encoded)
    }
}

/// Strip parameters from a declared content type.
///
/// `"image/jpeg; charset=binary"` becomes `"image/jpeg"`; an empty value
/// falls back to [`DEFAULT_CONTENT_TYPE`].
pub fn normalize_content_type(declared: Option<&str>) -> String {
    declared
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Failure of a single acquisition attempt
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// Capture process killed or transfer aborted at the bound
    #[error("acquisition timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Capture program produced no bytes
    #[error("capture produced an empty image")]
    EmptyCapture,

    /// Capture program exited unsuccessfully
    #[error("capture program failed ({status}): {stderr}")]
    CaptureFailed { status: String, stderr: String },

    /// Capture output exceeded the frame buffer
    #[error("capture output exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    /// Non-2xx remote response
    #[error("HTTP {code}")]
    HttpError { code: u16 },

    /// Network or process-spawn failure
    #[error("transport error: {0}")]
    TransportError(String),

    /// Source configuration cannot be acquired from
    #[error("config error: {0}")]
    ConfigError(String),
}

impl AcquireError {
    /// Short stable name for logs and status payloads
    pub fn kind(&self) -> &'static str {
        match self {
            AcquireError::Timeout(_) => "timeout",
            AcquireError::EmptyCapture => "empty_capture",
            AcquireError::CaptureFailed { .. } => "capture_failed",
            AcquireError::FrameTooLarge { .. } => "frame_too_large",
            AcquireError::HttpError { .. } => "http_error",
            AcquireError::TransportError(_) => "transport_error",
            AcquireError::ConfigError(_) => "config_error",
        }
    }
}

impl From<reqwest::Error> for AcquireError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AcquireError::HttpError {
                code: status.as_u16(),
            },
            None => AcquireError::TransportError(e.to_string()),
        }
    }
}
