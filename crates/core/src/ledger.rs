//! The access-request ledger.
//!
//! All access-control decisions flow through this service: it owns the
//! request state machine, enforces the one-active-request-per-pair
//! invariant, and emits notification events on every transition. The record
//! gate asks it, and only it, whether a doctor may touch a record.
//!
//! ## Concurrency discipline
//!
//! `request_access` serialises per (patient, doctor) pair behind an
//! in-process mutex, so two near-simultaneous scans cannot both observe "no
//! active request" and insert twice. The store's uniqueness constraint is
//! the backstop for anything that slips past (or for multi-writer stores).
//! `respond` and `revoke` rely on the store's compare-and-set transition,
//! so a request can be resolved exactly once.
//!
//! Event publication is fire-and-forget: a relay failure is the relay's
//! problem and never fails the ledger operation that triggered it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use medipass_ids::{DoctorRef, PatientRef, RequestId};
use medipass_types::NonEmptyText;
use serde::Serialize;
use serde_json::json;

use crate::directory::UserDirectory;
use crate::error::{AccessError, AccessResult, ResourceKind};
use crate::relay::{LedgerEvent, NotificationRelay};
use crate::request::{AccessDecision, AccessRequest, AccessStatus};
use crate::store::{AccessRequestStore, StoreError};

/// Maximum length of the free-text reason on a request.
const MAX_REASON_LEN: usize = 500;

/// How a `request_access` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestDisposition {
    /// A fresh pending request was created.
    Created,
    /// An identical pending request already existed; it was returned
    /// unchanged and the patient was re-notified.
    Resent,
    /// The doctor already holds an active grant for this patient.
    AlreadyGranted,
}

/// Result of a `request_access` call.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub request: AccessRequest,
    pub disposition: RequestDisposition,
}

/// State machine and invariant enforcement for access requests.
pub struct AccessLedger {
    store: Arc<dyn AccessRequestStore>,
    directory: Arc<dyn UserDirectory>,
    relay: Arc<NotificationRelay>,
    pair_locks: Mutex<HashMap<(PatientRef, DoctorRef), Arc<Mutex<()>>>>,
}

impl AccessLedger {
    /// Wires the ledger to its collaborators. The relay is injected here,
    /// once, and never looked up through shared process state.
    pub fn new(
        store: Arc<dyn AccessRequestStore>,
        directory: Arc<dyn UserDirectory>,
        relay: Arc<NotificationRelay>,
    ) -> Self {
        Self {
            store,
            directory,
            relay,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a doctor's claim of interest in a patient's record.
    ///
    /// Idempotent per pair: an existing pending request is returned
    /// unchanged (and the patient re-notified); an active grant
    /// short-circuits as [`RequestDisposition::AlreadyGranted`]. Only when
    /// the pair has no active request is a fresh pending one created.
    ///
    /// The caller is responsible for having verified that `doctor_ref`
    /// belongs to an authenticated doctor; the ledger does not re-derive
    /// roles.
    ///
    /// # Errors
    ///
    /// - [`AccessError::NotFound`] if the patient is unknown.
    /// - [`AccessError::Validation`] if the reason is blank or oversized.
    /// - [`AccessError::Transient`] on storage failure.
    pub fn request_access(
        &self,
        doctor_ref: &DoctorRef,
        patient_ref: &PatientRef,
        reason: Option<String>,
    ) -> AccessResult<RequestOutcome> {
        let reason = normalize_reason(reason)?;

        if self.directory.find_patient(patient_ref)?.is_none() {
            return Err(AccessError::not_found(ResourceKind::Patient));
        }

        let pair_lock = self.pair_lock(patient_ref, doctor_ref)?;
        let _guard = pair_lock
            .lock()
            .map_err(|_| AccessError::Transient("pair lock poisoned".into()))?;

        let now = Utc::now();
        if let Some(existing) = self
            .store
            .find_active_for_pair(patient_ref, doctor_ref, now)?
        {
            return Ok(self.merge_existing(existing));
        }

        let request = AccessRequest::new(
            patient_ref.clone(),
            doctor_ref.clone(),
            reason,
            now,
        );
        match self.store.insert(request) {
            Ok(request) => {
                self.publish_to_patient(LedgerEvent::RequestCreated, &request);
                Ok(RequestOutcome {
                    request,
                    disposition: RequestDisposition::Created,
                })
            }
            // Lost an insert race (possible with a shared store and another
            // writer process); fall back to the row that won.
            Err(StoreError::ActiveRequestExists) => {
                match self
                    .store
                    .find_active_for_pair(patient_ref, doctor_ref, now)?
                {
                    Some(existing) => Ok(self.merge_existing(existing)),
                    None => Err(AccessError::Conflict),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolves a pending request as the owning patient.
    ///
    /// Approving may bound the grant with `expires_at`; rejecting must not.
    ///
    /// # Errors
    ///
    /// - [`AccessError::NotFound`] if the request is unknown.
    /// - [`AccessError::Unauthorized`] if the request belongs to another
    ///   patient or is not pending.
    /// - [`AccessError::Validation`] for an expiry in the past or an expiry
    ///   on a rejection.
    pub fn respond(
        &self,
        patient_ref: &PatientRef,
        request_id: &RequestId,
        decision: AccessDecision,
        expires_at: Option<DateTime<Utc>>,
    ) -> AccessResult<AccessRequest> {
        let now = Utc::now();

        if let Some(expiry) = expires_at {
            if decision != AccessDecision::Approved {
                return Err(AccessError::Validation(
                    "an expiry can only be set when approving".into(),
                ));
            }
            if expiry <= now {
                return Err(AccessError::Validation(
                    "expiry must be in the future".into(),
                ));
            }
        }

        let request = self.store.get(request_id)?;
        if request.patient_ref != *patient_ref {
            return Err(AccessError::unauthorized(
                "request does not belong to this patient",
            ));
        }

        let resolved = self.store.transition(
            request_id,
            AccessStatus::Pending,
            decision.target_status(),
            Some(now),
            expires_at,
        )?;

        self.publish_to_doctor(LedgerEvent::RequestResolved, &resolved);
        Ok(resolved)
    }

    /// Withdraws an approved grant as the owning patient.
    ///
    /// Revoking an already-revoked request is a no-op success, so client
    /// retries are harmless.
    ///
    /// # Errors
    ///
    /// - [`AccessError::NotFound`] if the request is unknown.
    /// - [`AccessError::Unauthorized`] if the request belongs to another
    ///   patient, or is pending/rejected (neither holds a grant to revoke).
    pub fn revoke(
        &self,
        patient_ref: &PatientRef,
        request_id: &RequestId,
    ) -> AccessResult<AccessRequest> {
        let request = self.store.get(request_id)?;
        if request.patient_ref != *patient_ref {
            return Err(AccessError::unauthorized(
                "request does not belong to this patient",
            ));
        }

        match request.status {
            AccessStatus::Revoked => Ok(request),
            AccessStatus::Approved => {
                match self.store.transition(
                    request_id,
                    AccessStatus::Approved,
                    AccessStatus::Revoked,
                    None,
                    None,
                ) {
                    Ok(revoked) => {
                        self.publish_to_doctor(LedgerEvent::RequestRevoked, &revoked);
                        Ok(revoked)
                    }
                    // A concurrent revoke beat us to it; still a success.
                    Err(StoreError::StatusMismatch {
                        actual: AccessStatus::Revoked,
                    }) => Ok(self.store.get(request_id)?),
                    Err(err) => Err(err.into()),
                }
            }
            AccessStatus::Pending | AccessStatus::Rejected => Err(AccessError::unauthorized(
                "only an approved request can be revoked",
            )),
        }
    }

    /// True iff the doctor currently holds an unexpired grant for the
    /// patient.
    pub fn is_granted(
        &self,
        doctor_ref: &DoctorRef,
        patient_ref: &PatientRef,
    ) -> AccessResult<bool> {
        let now = Utc::now();
        Ok(self
            .store
            .find_active_for_pair(patient_ref, doctor_ref, now)?
            .is_some_and(|request| request.grants_access_at(now)))
    }

    /// All requests sent by the doctor, most recent first.
    pub fn list_for_doctor(&self, doctor_ref: &DoctorRef) -> AccessResult<Vec<AccessRequest>> {
        let mut requests = self.store.list_for_doctor(doctor_ref)?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    /// All requests concerning the patient, most recent first.
    pub fn list_for_patient(
        &self,
        patient_ref: &PatientRef,
    ) -> AccessResult<Vec<AccessRequest>> {
        let mut requests = self.store.list_for_patient(patient_ref)?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    /// The patients the doctor currently holds a grant for.
    pub fn granted_patients(&self, doctor_ref: &DoctorRef) -> AccessResult<Vec<PatientRef>> {
        let now = Utc::now();
        let mut patients: Vec<PatientRef> = self
            .store
            .list_for_doctor(doctor_ref)?
            .into_iter()
            .filter(|request| request.grants_access_at(now))
            .map(|request| request.patient_ref)
            .collect();
        patients.sort();
        patients.dedup();
        Ok(patients)
    }

    fn merge_existing(&self, existing: AccessRequest) -> RequestOutcome {
        match existing.status {
            AccessStatus::Approved => RequestOutcome {
                request: existing,
                disposition: RequestDisposition::AlreadyGranted,
            },
            _ => {
                self.publish_to_patient(LedgerEvent::RequestResent, &existing);
                RequestOutcome {
                    request: existing,
                    disposition: RequestDisposition::Resent,
                }
            }
        }
    }

    fn pair_lock(
        &self,
        patient_ref: &PatientRef,
        doctor_ref: &DoctorRef,
    ) -> AccessResult<Arc<Mutex<()>>> {
        let mut locks = self
            .pair_locks
            .lock()
            .map_err(|_| AccessError::Transient("pair lock table poisoned".into()))?;
        Ok(locks
            .entry((patient_ref.clone(), doctor_ref.clone()))
            .or_default()
            .clone())
    }

    fn publish_to_patient(&self, event: LedgerEvent, request: &AccessRequest) {
        // The patient-side payload names the doctor so the approval prompt
        // can be rendered without a second lookup.
        let doctor_name = self
            .directory
            .find_doctor(&request.doctor_ref)
            .ok()
            .flatten()
            .map(|doctor| format!("{} {}", doctor.first_name, doctor.last_name));

        let payload = json!({
            "request": request_value(request),
            "doctor_name": doctor_name,
        });
        self.relay
            .publish(request.patient_ref.as_ref_id(), event, payload);
    }

    fn publish_to_doctor(&self, event: LedgerEvent, request: &AccessRequest) {
        let payload = json!({ "request": request_value(request) });
        self.relay
            .publish(request.doctor_ref.as_ref_id(), event, payload);
    }
}

fn request_value(request: &AccessRequest) -> serde_json::Value {
    serde_json::to_value(request).unwrap_or(serde_json::Value::Null)
}

fn normalize_reason(reason: Option<String>) -> AccessResult<Option<String>> {
    match reason {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => {
            let text = NonEmptyText::bounded(&raw, MAX_REASON_LEN)
                .map_err(|e| AccessError::Validation(format!("reason: {e}")))?;
            Ok(Some(text.into_inner()))
        }
    }
}

fn sort_newest_first(requests: &mut [AccessRequest]) {
    requests.sort_by(|a, b| {
        b.requested_at
            .cmp(&a.requested_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
