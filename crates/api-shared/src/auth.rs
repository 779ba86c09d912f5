//! Verified-session resolution.
//!
//! Authentication itself is out of scope: the hosting environment is
//! responsible for verifying the caller and forwarding their reference in
//! the [`USER_HEADER`] header. This module resolves that reference against
//! the user directory **once per call** and hands the rest of the system a
//! typed [`DoctorSession`] or [`PatientSession`]. Handlers state which role
//! they need in their signature-level call to [`Session::require_doctor`] /
//! [`Session::require_patient`]; no handler re-checks roles ad hoc.

use std::sync::Arc;

use medipass_core::directory::{DoctorUser, PatientUser, UserDirectory, UserRecord};
use medipass_ids::{DoctorRef, PatientRef, RefId};

/// Header carrying the verified caller reference.
pub const USER_HEADER: &str = "x-medipass-user";

/// Why a session could not be established or used.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("missing identity header")]
    MissingIdentity,
    #[error("malformed identity header")]
    MalformedIdentity,
    #[error("unknown user")]
    UnknownUser,
    #[error("this action requires the {0} role")]
    RoleMismatch(&'static str),
    #[error("directory unavailable: {0}")]
    Directory(String),
}

/// A verified doctor identity for the duration of one call.
#[derive(Debug, Clone)]
pub struct DoctorSession {
    pub doctor: DoctorUser,
}

impl DoctorSession {
    pub fn doctor_ref(&self) -> &DoctorRef {
        &self.doctor.doctor_ref
    }
}

/// A verified patient identity for the duration of one call.
#[derive(Debug, Clone)]
pub struct PatientSession {
    pub patient: PatientUser,
}

impl PatientSession {
    pub fn patient_ref(&self) -> &PatientRef {
        &self.patient.patient_ref
    }
}

/// A verified identity of either role.
#[derive(Debug, Clone)]
pub enum Session {
    Doctor(DoctorSession),
    Patient(PatientSession),
}

impl Session {
    /// The untyped reference of whoever is calling.
    pub fn ref_id(&self) -> &RefId {
        match self {
            Session::Doctor(session) => session.doctor.doctor_ref.as_ref_id(),
            Session::Patient(session) => session.patient.patient_ref.as_ref_id(),
        }
    }

    /// Narrows to a doctor session.
    pub fn require_doctor(self) -> Result<DoctorSession, SessionError> {
        match self {
            Session::Doctor(session) => Ok(session),
            Session::Patient(_) => Err(SessionError::RoleMismatch("doctor")),
        }
    }

    /// Narrows to a patient session.
    pub fn require_patient(self) -> Result<PatientSession, SessionError> {
        match self {
            Session::Patient(session) => Ok(session),
            Session::Doctor(_) => Err(SessionError::RoleMismatch("patient")),
        }
    }
}

/// Resolves the verified caller reference into a typed session.
///
/// `header_value` is the raw value of [`USER_HEADER`], if present.
///
/// # Errors
///
/// - [`SessionError::MissingIdentity`] / [`SessionError::MalformedIdentity`]
///   when the header is absent or not a canonical reference.
/// - [`SessionError::UnknownUser`] when the directory has no such user.
/// - [`SessionError::Directory`] when the directory itself fails.
pub fn resolve_session(
    directory: &Arc<dyn UserDirectory>,
    header_value: Option<&str>,
) -> Result<Session, SessionError> {
    let raw = header_value.ok_or(SessionError::MissingIdentity)?;
    let ref_id = RefId::parse(raw.trim()).map_err(|_| SessionError::MalformedIdentity)?;

    let record = directory
        .find_by_ref(&ref_id)
        .map_err(|e| SessionError::Directory(e.to_string()))?
        .ok_or(SessionError::UnknownUser)?;

    Ok(match record {
        UserRecord::Doctor(doctor) => Session::Doctor(DoctorSession { doctor }),
        UserRecord::Patient(patient) => Session::Patient(PatientSession { patient }),
    })
}
