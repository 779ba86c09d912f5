//! Access request records and their state machine.
//!
//! One [`AccessRequest`] represents one doctor's claim of interest in one
//! patient's record. The status lifecycle is strict:
//!
//! ```text
//! Pending --approve--> Approved --revoke--> Revoked
//! Pending --reject---> Rejected
//! ```
//!
//! `Rejected` and `Revoked` are terminal; nothing re-enters `Pending`.
//! `Approved` is the only status that grants read access, and a grant can be
//! bounded in time via `expires_at`.

use chrono::{DateTime, Utc};
use medipass_ids::{DoctorRef, PatientRef, RequestId};
use serde::{Deserialize, Serialize};

/// Status of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Pending,
    Approved,
    Rejected,
    Revoked,
}

impl AccessStatus {
    /// True for statuses that occupy the one-active-request-per-pair slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AccessStatus::Pending | AccessStatus::Approved)
    }

    /// True for statuses no transition may leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AccessStatus::Rejected | AccessStatus::Revoked)
    }
}

impl std::fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AccessStatus::Pending => "pending",
            AccessStatus::Approved => "approved",
            AccessStatus::Rejected => "rejected",
            AccessStatus::Revoked => "revoked",
        };
        write!(f, "{name}")
    }
}

/// A patient's decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Approved,
    Rejected,
}

impl AccessDecision {
    /// The status a pending request transitions to under this decision.
    pub fn target_status(&self) -> AccessStatus {
        match self {
            AccessDecision::Approved => AccessStatus::Approved,
            AccessDecision::Rejected => AccessStatus::Rejected,
        }
    }
}

/// One doctor's time-stamped claim for access to one patient's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: RequestId,
    pub patient_ref: PatientRef,
    pub doctor_ref: DoctorRef,
    pub status: AccessStatus,
    /// Free-text reason supplied by the doctor at scan time.
    pub reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    /// Set when the patient resolves the request; `None` while pending.
    pub responded_at: Option<DateTime<Utc>>,
    /// Optional end of the grant, set by the patient at approval time.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    /// Creates a fresh pending request for the given pair.
    pub fn new(
        patient_ref: PatientRef,
        doctor_ref: DoctorRef,
        reason: Option<String>,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            patient_ref,
            doctor_ref,
            status: AccessStatus::Pending,
            reason,
            requested_at,
            responded_at: None,
            expires_at: None,
        }
    }

    /// True if this request occupies the pair's active slot at `now`.
    ///
    /// An `Approved` request whose grant has expired no longer blocks a new
    /// request for the pair; it stays `Approved` as a historical record but
    /// is treated as inactive.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AccessStatus::Pending => true,
            AccessStatus::Approved => !self.is_expired_at(now),
            AccessStatus::Rejected | AccessStatus::Revoked => false,
        }
    }

    /// True if this request grants record access at `now`.
    pub fn grants_access_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AccessStatus::Approved && !self.is_expired_at(now)
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }
}
