//! Remote outcome classification
//!
//! Vendor APIs report "already exists", "not found" and "associated" only as
//! error codes inside non-2xx JSON bodies, in one of two shapes:
//!
//! ```json
//! {"request_id": "...", "error_code": "LTS.0205", "error_msg": "..."}
//! {"request_id": "...", "message": {"code": "LTS.0740", "details": "..."}}
//! ```
//!
//! Both are normalized into [`RemoteError`] and then mapped onto a
//! [`RemoteOutcome`] by looking the code up in an [`OutcomeClassifier`].

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical remote error record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub status: u16,
    pub request_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Deserialize)]
struct NestedMessage {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    details: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested {
        #[serde(default)]
        request_id: String,
        message: NestedMessage,
    },
    Flat {
        #[serde(default)]
        request_id: String,
        #[serde(default)]
        error_code: String,
        #[serde(default)]
        error_msg: String,
    },
}

const MAX_RAW_BODY: usize = 512;

impl RemoteError {
    /// Normalize an error response body
    ///
    /// Bodies that match neither shape keep the raw text as the message and
    /// carry an empty code, which classifies as [`RemoteOutcome::Other`].
    pub fn parse(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(ErrorBody::Nested {
                request_id,
                message,
            }) => Self {
                status,
                request_id: if request_id.is_empty() {
                    message.request_id
                } else {
                    request_id
                },
                code: message.code,
                message: message.details,
            },
            Ok(ErrorBody::Flat {
                request_id,
                error_code,
                error_msg,
            }) => Self {
                status,
                request_id,
                code: error_code,
                message: error_msg,
            },
            Err(_) => {
                let text = String::from_utf8_lossy(body);
                let message: String = text.chars().take(MAX_RAW_BODY).collect();
                Self {
                    status,
                    message,
                    ..Self::default()
                }
            }
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status({}), request_id({}), error_code({}), error_msg({})",
            self.status, self.request_id, self.code, self.message
        )
    }
}

impl std::error::Error for RemoteError {}

/// Canonical result of one remote call
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome<T> {
    Success(T),
    AlreadyExists(RemoteError),
    NotFound(RemoteError),
    /// Deletion blocked by a dependent resource
    Associated(RemoteError),
    Other(RemoteError),
}

impl<T> RemoteOutcome<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RemoteOutcome<U> {
        match self {
            RemoteOutcome::Success(value) => RemoteOutcome::Success(f(value)),
            RemoteOutcome::AlreadyExists(e) => RemoteOutcome::AlreadyExists(e),
            RemoteOutcome::NotFound(e) => RemoteOutcome::NotFound(e),
            RemoteOutcome::Associated(e) => RemoteOutcome::Associated(e),
            RemoteOutcome::Other(e) => RemoteOutcome::Other(e),
        }
    }

    /// Split off the success value, re-typing any failure outcome
    pub fn split<U>(self) -> std::result::Result<T, RemoteOutcome<U>> {
        match self {
            RemoteOutcome::Success(value) => Ok(value),
            RemoteOutcome::AlreadyExists(e) => Err(RemoteOutcome::AlreadyExists(e)),
            RemoteOutcome::NotFound(e) => Err(RemoteOutcome::NotFound(e)),
            RemoteOutcome::Associated(e) => Err(RemoteOutcome::Associated(e)),
            RemoteOutcome::Other(e) => Err(RemoteOutcome::Other(e)),
        }
    }

    /// Treat anything but success as a remote error
    pub fn into_result(self) -> Result<T> {
        match self {
            RemoteOutcome::Success(value) => Ok(value),
            RemoteOutcome::AlreadyExists(e)
            | RemoteOutcome::NotFound(e)
            | RemoteOutcome::Associated(e)
            | RemoteOutcome::Other(e) => Err(CloudError::Remote(e)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RemoteOutcome::Success(_))
    }
}

/// Outcomes a vendor error code can be mapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    AlreadyExists,
    NotFound,
    Associated,
}

/// Declarative vendor error code table
///
/// Codes are matched first; HTTP statuses are a fallback for APIs that do not
/// return a usable code.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeClassifier {
    codes: &'static [(&'static str, OutcomeKind)],
    statuses: &'static [(u16, OutcomeKind)],
}

impl OutcomeClassifier {
    pub const fn new(codes: &'static [(&'static str, OutcomeKind)]) -> Self {
        Self {
            codes,
            statuses: &[],
        }
    }

    pub const fn with_statuses(self, statuses: &'static [(u16, OutcomeKind)]) -> Self {
        Self {
            codes: self.codes,
            statuses,
        }
    }

    pub fn kind_of(&self, error: &RemoteError) -> Option<OutcomeKind> {
        self.codes
            .iter()
            .find(|(code, _)| *code == error.code)
            .map(|(_, kind)| *kind)
            .or_else(|| {
                self.statuses
                    .iter()
                    .find(|(status, _)| *status == error.status)
                    .map(|(_, kind)| *kind)
            })
    }

    pub fn classify<T>(&self, error: RemoteError) -> RemoteOutcome<T> {
        match self.kind_of(&error) {
            Some(OutcomeKind::AlreadyExists) => RemoteOutcome::AlreadyExists(error),
            Some(OutcomeKind::NotFound) => RemoteOutcome::NotFound(error),
            Some(OutcomeKind::Associated) => RemoteOutcome::Associated(error),
            None => RemoteOutcome::Other(error),
        }
    }
}
