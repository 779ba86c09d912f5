//! Reference identifiers and sharded-path utilities.
//!
//! MediPass refers to every party and stored object through an opaque stable
//! identifier. To keep storage paths and wire payloads deterministic, all
//! identifiers use a *canonical* representation: **32 lowercase hexadecimal
//! characters** (no hyphens).
//!
//! This module provides:
//! - A wrapper type ([`RefId`]) that *guarantees* the canonical format once
//!   constructed.
//! - Role-specific newtypes ([`PatientRef`], [`DoctorRef`], [`RequestId`],
//!   [`EntryId`]) so a doctor identifier cannot be passed where a patient
//!   identifier is expected.
//! - Shared sharding logic to derive storage directory locations from an
//!   identifier.
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Notes:
//! - This is the same value you would get from
//!   `Uuid::new_v4().simple().to_string()`.
//! - Canonical form is *required* for externally supplied identifiers (codes,
//!   API inputs). Use [`RefId::parse`] to validate an input string.
//! - Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are
//!   rejected.
//!
//! ## Sharded directory layout
//! For a canonical identifier `u`, file-backed stores place data under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! This scheme prevents very large fan-out in a single directory.

mod refs;

pub use refs::{DoctorRef, EntryId, PatientRef, RefId, RequestId};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    /// Invalid input provided
    #[error("invalid identifier: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type RefResult<T> = Result<T, RefError>;
