//! User directory collaborator.
//!
//! The directory owns identities: it is the authority on which references
//! exist and which role each belongs to. Authentication happens outside the
//! core; by the time a reference reaches these APIs it is assumed to have
//! been produced by a verified login. The core only ever *reads* identity
//! data and patches profile metadata.

use std::collections::HashMap;
use std::sync::RwLock;

use medipass_ids::{DoctorRef, PatientRef, RefId};
use serde::{Deserialize, Serialize};

use crate::profile::{DoctorProfile, DoctorProfilePatch, PatientProfile, PatientProfilePatch};
use crate::store::{StoreError, StoreResult};

/// The two roles the access-control core distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Patient,
    Doctor,
}

/// A patient identity with profile metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientUser {
    pub patient_ref: PatientRef,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile: PatientProfile,
}

/// A doctor identity with practice metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorUser {
    pub doctor_ref: DoctorRef,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile: DoctorProfile,
}

/// One directory row, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum UserRecord {
    Patient(PatientUser),
    Doctor(DoctorUser),
}

impl UserRecord {
    /// The untyped reference identifying this user.
    pub fn ref_id(&self) -> &RefId {
        match self {
            UserRecord::Patient(user) => user.patient_ref.as_ref_id(),
            UserRecord::Doctor(user) => user.doctor_ref.as_ref_id(),
        }
    }

    pub fn role(&self) -> UserRole {
        match self {
            UserRecord::Patient(_) => UserRole::Patient,
            UserRecord::Doctor(_) => UserRole::Doctor,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            UserRecord::Patient(user) => &user.email,
            UserRecord::Doctor(user) => &user.email,
        }
    }

    /// "First Last", for notification payloads and listings.
    pub fn display_name(&self) -> String {
        match self {
            UserRecord::Patient(user) => format!("{} {}", user.first_name, user.last_name),
            UserRecord::Doctor(user) => format!("{} {}", user.first_name, user.last_name),
        }
    }
}

/// Read and patch access to the user directory.
pub trait UserDirectory: Send + Sync {
    /// Looks a user up by untyped reference, whatever their role.
    fn find_by_ref(&self, ref_id: &RefId) -> StoreResult<Option<UserRecord>>;

    /// Looks a patient up; `None` when the reference is unknown **or**
    /// belongs to a non-patient.
    fn find_patient(&self, patient_ref: &PatientRef) -> StoreResult<Option<PatientUser>>;

    /// Looks a doctor up; `None` when the reference is unknown **or**
    /// belongs to a non-doctor.
    fn find_doctor(&self, doctor_ref: &DoctorRef) -> StoreResult<Option<DoctorUser>>;

    /// Looks a user up by email address.
    fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    /// Applies a partial update to a patient's profile.
    fn patch_patient_profile(
        &self,
        patient_ref: &PatientRef,
        patch: PatientProfilePatch,
    ) -> StoreResult<PatientUser>;

    /// Applies a partial update to a doctor's profile.
    fn patch_doctor_profile(
        &self,
        doctor_ref: &DoctorRef,
        patch: DoctorProfilePatch,
    ) -> StoreResult<DoctorUser>;
}

/// Map-backed directory, seeded once at startup.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<RefId, UserRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from pre-verified records (for example, a users
    /// file loaded at startup).
    pub fn seeded(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let users = records
            .into_iter()
            .map(|record| (record.ref_id().clone(), record))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Adds or replaces one record.
    pub fn upsert(&self, record: UserRecord) -> StoreResult<()> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        users.insert(record.ref_id().clone(), record);
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Io("directory lock poisoned".into())
}

impl UserDirectory for InMemoryDirectory {
    fn find_by_ref(&self, ref_id: &RefId) -> StoreResult<Option<UserRecord>> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.get(ref_id).cloned())
    }

    fn find_patient(&self, patient_ref: &PatientRef) -> StoreResult<Option<PatientUser>> {
        Ok(match self.find_by_ref(patient_ref.as_ref_id())? {
            Some(UserRecord::Patient(user)) => Some(user),
            _ => None,
        })
    }

    fn find_doctor(&self, doctor_ref: &DoctorRef) -> StoreResult<Option<DoctorUser>> {
        Ok(match self.find_by_ref(doctor_ref.as_ref_id())? {
            Some(UserRecord::Doctor(user)) => Some(user),
            _ => None,
        })
    }

    fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users
            .values()
            .find(|record| record.email().eq_ignore_ascii_case(email))
            .cloned())
    }

    fn patch_patient_profile(
        &self,
        patient_ref: &PatientRef,
        patch: PatientProfilePatch,
    ) -> StoreResult<PatientUser> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        match users.get_mut(patient_ref.as_ref_id()) {
            Some(UserRecord::Patient(user)) => {
                patch.apply(&mut user.profile);
                Ok(user.clone())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    fn patch_doctor_profile(
        &self,
        doctor_ref: &DoctorRef,
        patch: DoctorProfilePatch,
    ) -> StoreResult<DoctorUser> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        match users.get_mut(doctor_ref.as_ref_id()) {
            Some(UserRecord::Doctor(user)) => {
                patch.apply(&mut user.profile);
                Ok(user.clone())
            }
            _ => Err(StoreError::NotFound),
        }
    }
}
