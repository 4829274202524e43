//! Crate-level error type.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants follow
//! how the UI reacts to a failure: transport and HTTP failures become a
//! localized toast, an abort stays silent, and a malformed streamed fragment
//! never reaches this type at all (the assembler falls back to raw text).

use thiserror::Error;

use crate::language::{translations, Language};

#[derive(Debug, Error)]
pub enum HospitalError {
    /// A TCP-level connection could not be established, or the body read failed.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The remote server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A non-streaming response body could not be parsed.
    #[error("JSON parse error on '{field}': {detail}")]
    Json { field: String, detail: String },

    /// No chunk arrived before the first-chunk guard fired.
    #[error("no response within {secs}s")]
    Timeout { secs: u64 },

    /// The request was cancelled by the user or by the session lifecycle.
    #[error("request aborted")]
    Aborted,

    /// A request is already outstanding for this session.
    #[error("a request is already in flight")]
    Busy,

    /// The server rejected an auth operation (`success: false`).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Client-side form validation failed before any request was made.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    /// Persisted user/token state could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HospitalError>;

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub destructive: bool,
}

impl Toast {
    pub fn info(description: impl Into<String>) -> Self {
        Toast {
            title: String::new(),
            description: description.into(),
            destructive: false,
        }
    }

    pub fn error(language: Language, description: impl Into<String>) -> Self {
        Toast {
            title: translations::ERROR_TITLE.get(language).to_string(),
            description: description.into(),
            destructive: true,
        }
    }
}

impl HospitalError {
    /// Silent errors are never surfaced as a toast.
    pub fn is_silent(&self) -> bool {
        matches!(self, HospitalError::Aborted)
    }

    /// Map the error to the toast the UI shows, or `None` for silent errors.
    pub fn toast(&self, language: Language) -> Option<Toast> {
        let text = match self {
            HospitalError::Aborted => return None,
            HospitalError::Timeout { .. } => translations::TIMEOUT_ERROR,
            HospitalError::Connect { .. } => translations::NETWORK_ERROR,
            HospitalError::Http { .. } | HospitalError::Json { .. } => translations::REQUEST_FAILED,
            HospitalError::Busy => translations::WAITING_FOR_RESPONSE,
            HospitalError::Auth(msg) | HospitalError::Validation(msg) => {
                return Some(Toast::error(language, msg.clone()));
            }
            HospitalError::Config(_) | HospitalError::Storage(_) | HospitalError::Io(_) => {
                translations::GENERIC_ERROR
            }
        };
        Some(Toast::error(language, text.get(language)))
    }
}

impl From<serde_json::Error> for HospitalError {
    fn from(e: serde_json::Error) -> Self {
        HospitalError::Json {
            field: "body".into(),
            detail: e.to_string(),
        }
    }
}
