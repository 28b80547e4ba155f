//! Frame decoding errors.
//!
//! - [`ParseError`]: top-level failure returned by [`crate::parse`]
//! - [`ValidationError`]: a well-formed JSON frame that does not match the
//!   event schema, carrying the dotted path of the offending field

use std::fmt;

use thiserror::Error;

/// Why a field failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationReason {
    /// The field is required but absent.
    Missing,
    /// The field is present with the wrong JSON type.
    WrongType {
        /// Human-readable expected shape (e.g. `"integer"`).
        expected: &'static str,
    },
    /// A discriminator carried a value outside the closed set.
    UnknownVariant {
        /// The value received.
        found: String,
        /// The accepted values.
        expected: &'static [&'static str],
    },
    /// The field is present and well-typed but violates a constraint.
    Invalid(String),
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing field"),
            Self::WrongType { expected } => write!(f, "expected {expected}"),
            Self::UnknownVariant { found, expected } => {
                write!(f, "unknown variant `{found}`, expected one of {expected:?}")
            }
            Self::Invalid(message) => write!(f, "{message}"),
        }
    }
}

/// A schema violation at a specific field path.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct ValidationError {
    /// Dotted field path, with array indices (e.g. `message[1].data.id`).
    pub path: String,
    /// What went wrong.
    pub reason: ValidationReason,
}

impl ValidationError {
    /// Required field absent.
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: ValidationReason::Missing,
        }
    }

    /// Field has the wrong JSON type.
    pub fn wrong_type(path: impl Into<String>, expected: &'static str) -> Self {
        Self {
            path: path.into(),
            reason: ValidationReason::WrongType { expected },
        }
    }

    /// Discriminator outside the closed set.
    pub fn unknown_variant(
        path: impl Into<String>,
        found: impl Into<String>,
        expected: &'static [&'static str],
    ) -> Self {
        Self {
            path: path.into(),
            reason: ValidationReason::UnknownVariant {
                found: found.into(),
                expected,
            },
        }
    }

    /// Constraint violation with a free-form message.
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: ValidationReason::Invalid(message.into()),
        }
    }
}

/// Failure to turn a raw text frame into an [`InboundFrame`](crate::InboundFrame).
#[derive(Debug, Error)]
pub enum ParseError {
    /// The frame is not syntactically valid JSON, or not a JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The frame is JSON but does not match any schema variant.
    #[error("validation failed at {0}")]
    Validation(#[from] ValidationError),
}

impl ParseError {
    /// Whether the frame was rejected before schema validation.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedPayload(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPayload(_) => "malformed",
            Self::Validation(_) => "validation",
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}
