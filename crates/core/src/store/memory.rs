//! In-process store backed by maps.
//!
//! Suitable for tests and single-process deployments where durability is
//! delegated elsewhere. All invariants of the store traits are enforced
//! under a single writer lock per map, so concurrent inserts for the same
//! pair resolve to exactly one winner.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use medipass_ids::{DoctorRef, PatientRef, RequestId};

use crate::entry::MedicalRecordEntry;
use crate::request::{AccessRequest, AccessStatus};
use crate::store::{AccessRequestStore, RecordEntryStore, StoreError, StoreResult};

/// Map-backed implementation of both store traits.
#[derive(Default)]
pub struct MemoryStore {
    requests: RwLock<HashMap<RequestId, AccessRequest>>,
    entries: RwLock<HashMap<PatientRef, Vec<MedicalRecordEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// A poisoned lock means a writer panicked mid-update; refuse to serve
// possibly inconsistent data rather than unwrapping.
fn poisoned() -> StoreError {
    StoreError::Io("store lock poisoned".into())
}

impl AccessRequestStore for MemoryStore {
    fn insert(&self, request: AccessRequest) -> StoreResult<AccessRequest> {
        let mut requests = self.requests.write().map_err(|_| poisoned())?;

        let has_active = requests.values().any(|existing| {
            existing.patient_ref == request.patient_ref
                && existing.doctor_ref == request.doctor_ref
                && existing.is_active_at(request.requested_at)
        });
        if has_active {
            return Err(StoreError::ActiveRequestExists);
        }

        requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn get(&self, id: &RequestId) -> StoreResult<AccessRequest> {
        let requests = self.requests.read().map_err(|_| poisoned())?;
        requests.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn find_active_for_pair(
        &self,
        patient_ref: &PatientRef,
        doctor_ref: &DoctorRef,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AccessRequest>> {
        let requests = self.requests.read().map_err(|_| poisoned())?;
        Ok(requests
            .values()
            .find(|req| {
                req.patient_ref == *patient_ref
                    && req.doctor_ref == *doctor_ref
                    && req.is_active_at(now)
            })
            .cloned())
    }

    fn transition(
        &self,
        id: &RequestId,
        expected: AccessStatus,
        next: AccessStatus,
        responded_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<AccessRequest> {
        let mut requests = self.requests.write().map_err(|_| poisoned())?;
        let request = requests.get_mut(id).ok_or(StoreError::NotFound)?;

        if request.status != expected {
            return Err(StoreError::StatusMismatch {
                actual: request.status,
            });
        }

        request.status = next;
        if responded_at.is_some() {
            request.responded_at = responded_at;
        }
        if expires_at.is_some() {
            request.expires_at = expires_at;
        }

        Ok(request.clone())
    }

    fn list_for_doctor(&self, doctor_ref: &DoctorRef) -> StoreResult<Vec<AccessRequest>> {
        let requests = self.requests.read().map_err(|_| poisoned())?;
        Ok(requests
            .values()
            .filter(|req| req.doctor_ref == *doctor_ref)
            .cloned()
            .collect())
    }

    fn list_for_patient(&self, patient_ref: &PatientRef) -> StoreResult<Vec<AccessRequest>> {
        let requests = self.requests.read().map_err(|_| poisoned())?;
        Ok(requests
            .values()
            .filter(|req| req.patient_ref == *patient_ref)
            .cloned()
            .collect())
    }
}

impl RecordEntryStore for MemoryStore {
    fn append(&self, entry: MedicalRecordEntry) -> StoreResult<MedicalRecordEntry> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries
            .entry(entry.patient_ref.clone())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    fn list_for_patient(
        &self,
        patient_ref: &PatientRef,
    ) -> StoreResult<Vec<MedicalRecordEntry>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(patient_ref).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(patient: &PatientRef, doctor: &DoctorRef) -> AccessRequest {
        AccessRequest::new(patient.clone(), doctor.clone(), None, Utc::now())
    }

    #[test]
    fn test_insert_rejects_second_active_for_pair() {
        let store = MemoryStore::new();
        let patient = PatientRef::generate();
        let doctor = DoctorRef::generate();

        store.insert(pending(&patient, &doctor)).unwrap();
        let second = store.insert(pending(&patient, &doctor));
        assert!(matches!(second, Err(StoreError::ActiveRequestExists)));
    }

    #[test]
    fn test_insert_allows_new_request_after_terminal() {
        let store = MemoryStore::new();
        let patient = PatientRef::generate();
        let doctor = DoctorRef::generate();

        let first = store.insert(pending(&patient, &doctor)).unwrap();
        store
            .transition(
                &first.id,
                AccessStatus::Pending,
                AccessStatus::Rejected,
                Some(Utc::now()),
                None,
            )
            .unwrap();

        assert!(store.insert(pending(&patient, &doctor)).is_ok());
    }

    #[test]
    fn test_transition_cas_detects_concurrent_change() {
        let store = MemoryStore::new();
        let patient = PatientRef::generate();
        let doctor = DoctorRef::generate();
        let req = store.insert(pending(&patient, &doctor)).unwrap();

        store
            .transition(
                &req.id,
                AccessStatus::Pending,
                AccessStatus::Approved,
                Some(Utc::now()),
                None,
            )
            .unwrap();

        let stale = store.transition(
            &req.id,
            AccessStatus::Pending,
            AccessStatus::Rejected,
            Some(Utc::now()),
            None,
        );
        match stale {
            Err(StoreError::StatusMismatch { actual }) => {
                assert_eq!(actual, AccessStatus::Approved);
            }
            other => panic!("Expected StatusMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_get_missing_request_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get(&RequestId::generate()),
            Err(StoreError::NotFound)
        ));
    }
}
