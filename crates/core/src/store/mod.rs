//! Storage collaborators for access requests and record entries.
//!
//! Persistence is an external concern: the core talks to durable storage
//! through the [`AccessRequestStore`] and [`RecordEntryStore`] traits and the
//! ledger/gate never assume a particular engine. Two implementations ship
//! with the crate:
//!
//! - [`memory::MemoryStore`]: in-process maps, used by tests and as a
//!   zero-setup default.
//! - [`fs::FsStore`]: JSON files under sharded directories, the same layout
//!   the rest of the system uses for durable data.
//!
//! ## Invariants the store enforces
//!
//! - **One active request per pair**: [`AccessRequestStore::insert`] fails
//!   with [`StoreError::ActiveRequestExists`] when a `pending` or unexpired
//!   `approved` request already exists for the same (patient, doctor) pair.
//!   This is the backstop behind the ledger's per-pair serialisation, the
//!   equivalent of a partial unique index in a relational store.
//! - **Compare-and-set transitions**: [`AccessRequestStore::transition`]
//!   applies a status change only when the stored status still equals the
//!   expected one, failing with [`StoreError::StatusMismatch`] otherwise, so
//!   two racing resolutions cannot both win.

pub mod fs;
pub mod memory;

use chrono::{DateTime, Utc};
use medipass_ids::{DoctorRef, PatientRef, RequestId};

use crate::entry::MedicalRecordEntry;
use crate::request::{AccessRequest, AccessStatus};

/// Errors surfaced by storage collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("an active request already exists for this pair")]
    ActiveRequestExists,
    #[error("request status changed concurrently (now '{actual}')")]
    StatusMismatch { actual: AccessStatus },
    #[error("storage I/O failure: {0}")]
    Io(String),
    #[error("stored data is unreadable: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable home of [`AccessRequest`] rows.
pub trait AccessRequestStore: Send + Sync {
    /// Persists a fresh request.
    ///
    /// Enforces the one-active-request-per-pair constraint as of
    /// `request.requested_at`.
    fn insert(&self, request: AccessRequest) -> StoreResult<AccessRequest>;

    /// Fetches a request by id.
    fn get(&self, id: &RequestId) -> StoreResult<AccessRequest>;

    /// Returns the request currently occupying the pair's active slot, if
    /// any: a `pending` request, or an `approved` one that has not expired
    /// at `now`.
    fn find_active_for_pair(
        &self,
        patient_ref: &PatientRef,
        doctor_ref: &DoctorRef,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AccessRequest>>;

    /// Atomically moves a request from `expected` to `next`.
    ///
    /// When provided, `responded_at` and `expires_at` are stamped on the
    /// stored row in the same step. Fails with
    /// [`StoreError::StatusMismatch`] if the stored status is no longer
    /// `expected`.
    fn transition(
        &self,
        id: &RequestId,
        expected: AccessStatus,
        next: AccessStatus,
        responded_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<AccessRequest>;

    /// All requests addressed to the given doctor, in storage order.
    fn list_for_doctor(&self, doctor_ref: &DoctorRef) -> StoreResult<Vec<AccessRequest>>;

    /// All requests concerning the given patient, in storage order.
    fn list_for_patient(&self, patient_ref: &PatientRef) -> StoreResult<Vec<AccessRequest>>;
}

/// Durable, append-only home of [`MedicalRecordEntry`] rows.
pub trait RecordEntryStore: Send + Sync {
    /// Appends one entry. Entries are never updated or deleted.
    fn append(&self, entry: MedicalRecordEntry) -> StoreResult<MedicalRecordEntry>;

    /// All entries belonging to the given patient, in storage order.
    fn list_for_patient(&self, patient_ref: &PatientRef)
        -> StoreResult<Vec<MedicalRecordEntry>>;
}
