//! # MediPass Core
//!
//! Core business logic for the MediPass access-grant system.
//!
//! This crate contains the access-control pipeline and its collaborators:
//! - Identity code encoding/decoding ([`codec`])
//! - The access-request state machine and invariants ([`ledger`])
//! - The authorization gate in front of clinical entries ([`gate`])
//! - Best-effort notification fan-out ([`relay`])
//! - Storage and directory seams ([`store`], [`directory`])
//!
//! **No API concerns**: session resolution, HTTP serving, and role dispatch
//! belong in `medipass-api-shared` and the server binary.

pub mod codec;
pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod profile;
pub mod relay;
pub mod request;
pub mod store;

pub use codec::{decode, encode, DecodeError};
pub use config::{CoreConfig, DEFAULT_RELAY_SESSION_BUFFER};
pub use directory::{
    DoctorUser, InMemoryDirectory, PatientUser, UserDirectory, UserRecord, UserRole,
};
pub use entry::{EntryDraft, MedicalRecordEntry, Medication, RecordCategory};
pub use error::{AccessError, AccessResult, ResourceKind};
pub use gate::RecordGate;
pub use ledger::{AccessLedger, RequestDisposition, RequestOutcome};
pub use profile::{DoctorProfile, DoctorProfilePatch, PatientProfile, PatientProfilePatch};
pub use relay::{LedgerEvent, Notification, NotificationRelay, SessionId};
pub use request::{AccessDecision, AccessRequest, AccessStatus};

#[cfg(test)]
pub(crate) mod test_support;
