//! Error taxonomy for the access-control core.
//!
//! Every fallible core operation returns [`AccessError`]. The variants map
//! one-to-one onto the classifications the outer layer needs to translate
//! into user-visible behaviour:
//!
//! - [`AccessError::Decode`]: malformed or unrecognised code; recoverable,
//!   prompts a re-scan.
//! - [`AccessError::NotFound`]: unknown patient, doctor, or request.
//! - [`AccessError::Unauthorized`]: role mismatch, ungranted access, or a
//!   response to a foreign/non-pending request.
//! - [`AccessError::Conflict`]: would violate the one-active-request-per-pair
//!   constraint (normally absorbed by the idempotent merge).
//! - [`AccessError::Transient`]: storage failure; safe to retry.
//! - [`AccessError::Validation`]: malformed input data.

use crate::codec::DecodeError;
use crate::store::StoreError;

/// The kind of resource a [`AccessError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Patient,
    Doctor,
    Request,
}

impl ResourceKind {
    /// Human-readable name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::Patient => "patient",
            ResourceKind::Doctor => "doctor",
            ResourceKind::Request => "access request",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("{} not found", kind.display_name())]
    NotFound { kind: ResourceKind },
    #[error("access denied: {0}")]
    Unauthorized(String),
    #[error("an active access request already exists for this patient and doctor")]
    Conflict,
    #[error("storage temporarily unavailable: {0}")]
    Transient(String),
    #[error("invalid input: {0}")]
    Validation(String),
}

impl AccessError {
    /// Shorthand for a [`AccessError::NotFound`] of the given kind.
    pub fn not_found(kind: ResourceKind) -> Self {
        AccessError::NotFound { kind }
    }

    /// Shorthand for a [`AccessError::Unauthorized`] with the given message.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AccessError::Unauthorized(message.into())
    }

    /// True if a client may retry the same call unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, AccessError::Transient(_))
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AccessError::not_found(ResourceKind::Request),
            StoreError::ActiveRequestExists => AccessError::Conflict,
            // A CAS mismatch means the request left the expected state; to
            // the caller that is an attempt to act on a non-actionable
            // request, which is an authorization failure, not a system one.
            StoreError::StatusMismatch { actual } => AccessError::unauthorized(format!(
                "request is not actionable in status '{actual}'"
            )),
            StoreError::Io(message) => AccessError::Transient(message),
            StoreError::Corrupt(message) => AccessError::Transient(message),
        }
    }
}

pub type AccessResult<T> = std::result::Result<T, AccessError>;
