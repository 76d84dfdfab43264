//! Error types for the provenance codec

use crate::path::PathError;

/// Errors produced while encoding or decoding provenance data
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Record URLs for a key do not form exactly one well-formed record
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A provenance URL that cannot be parsed
    #[error("invalid provenance url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A `name=value` assignment that cannot be parsed
    #[error("invalid parameter '{0}': expected <name>=<value>")]
    InvalidParameter(String),

    /// Same parameter name given twice with different values
    #[error("parameter '{0}' given more than once")]
    DuplicateParameter(String),

    /// Value that the record grammar cannot represent
    #[error("cannot encode {field} value '{value}': reserved character or trailing newline")]
    Unencodable { field: &'static str, value: String },

    /// Method name that does not name a file of the methods directory
    #[error("invalid method name '{0}': expected a file name below .datalad/compute/methods")]
    InvalidMethod(String),

    /// Dataset path error
    #[error("invalid path: {0}")]
    Path(#[from] PathError),
}

impl CodecError {
    /// Create malformed-record error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord(message.into())
    }

    /// Create invalid-url error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the stored provenance itself is unusable
    #[inline]
    #[must_use]
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, Self::MalformedRecord(_) | Self::InvalidUrl { .. })
    }
}
