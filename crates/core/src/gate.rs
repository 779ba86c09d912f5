//! Authorization gate in front of clinical record entries.
//!
//! Every doctor-side read or append goes through this gate, and the gate
//! asks the access ledger before touching the entry store. It fails closed:
//! no active grant, no data. An unauthorized doctor learns nothing
//! about whether the patient even exists, since an unknown patient and an
//! ungranted one produce the same denial.
//!
//! Patients read their own record without a gate; ownership is the grant.

use std::sync::Arc;

use chrono::Utc;
use medipass_ids::{DoctorRef, PatientRef};

use crate::entry::{EntryDraft, MedicalRecordEntry};
use crate::error::{AccessError, AccessResult};
use crate::ledger::AccessLedger;
use crate::store::RecordEntryStore;

/// Authorization checkpoint for record reads and appends.
pub struct RecordGate {
    ledger: Arc<AccessLedger>,
    entries: Arc<dyn RecordEntryStore>,
}

impl RecordGate {
    pub fn new(ledger: Arc<AccessLedger>, entries: Arc<dyn RecordEntryStore>) -> Self {
        Self { ledger, entries }
    }

    /// True iff the doctor currently holds a grant for the patient.
    pub fn can_read(
        &self,
        doctor_ref: &DoctorRef,
        patient_ref: &PatientRef,
    ) -> AccessResult<bool> {
        self.ledger.is_granted(doctor_ref, patient_ref)
    }

    /// Returns the patient's entries to a granted doctor, newest visit
    /// first.
    ///
    /// A revoke that commits between the grant check and the store read can
    /// still let this read finish; the window is bounded by the call itself
    /// and is accepted.
    ///
    /// # Errors
    ///
    /// [`AccessError::Unauthorized`] without an active grant, identical for
    /// unknown and ungranted patients, so the gate cannot be used to probe
    /// which references exist.
    pub fn read_records(
        &self,
        doctor_ref: &DoctorRef,
        patient_ref: &PatientRef,
    ) -> AccessResult<Vec<MedicalRecordEntry>> {
        self.require_grant(doctor_ref, patient_ref)?;
        let mut entries = self.entries.list_for_patient(patient_ref)?;
        sort_newest_visit_first(&mut entries);
        Ok(entries)
    }

    /// Appends one entry authored by a granted doctor.
    ///
    /// The grant check precedes validation and persistence, so a denied
    /// append leaves the store untouched. `visit_date` defaults to now.
    ///
    /// # Errors
    ///
    /// - [`AccessError::Unauthorized`] without an active grant.
    /// - [`AccessError::Validation`] for malformed entry data.
    pub fn append_record(
        &self,
        doctor_ref: &DoctorRef,
        patient_ref: &PatientRef,
        draft: EntryDraft,
    ) -> AccessResult<MedicalRecordEntry> {
        self.require_grant(doctor_ref, patient_ref)?;

        let entry = draft.into_entry(
            patient_ref.clone(),
            Some(doctor_ref.clone()),
            Utc::now(),
        )?;
        Ok(self.entries.append(entry)?)
    }

    /// Returns the patient's own entries, newest visit first. No gate.
    pub fn read_own(&self, patient_ref: &PatientRef) -> AccessResult<Vec<MedicalRecordEntry>> {
        let mut entries = self.entries.list_for_patient(patient_ref)?;
        sort_newest_visit_first(&mut entries);
        Ok(entries)
    }

    fn require_grant(
        &self,
        doctor_ref: &DoctorRef,
        patient_ref: &PatientRef,
    ) -> AccessResult<()> {
        if self.ledger.is_granted(doctor_ref, patient_ref)? {
            Ok(())
        } else {
            Err(AccessError::unauthorized(
                "no active grant for this record",
            ))
        }
    }
}

fn sort_newest_visit_first(entries: &mut [MedicalRecordEntry]) {
    entries.sort_by(|a, b| {
        b.visit_date
            .cmp(&a.visit_date)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::RecordCategory;
    use crate::ledger::RequestDisposition;
    use crate::relay::NotificationRelay;
    use crate::request::AccessDecision;
    use crate::store::memory::MemoryStore;
    use crate::test_support::{directory_with, doctor_record, patient_record};

    struct Fixture {
        ledger: Arc<AccessLedger>,
        gate: RecordGate,
        store: Arc<MemoryStore>,
        patient: PatientRef,
        doctor: DoctorRef,
    }

    fn fixture() -> Fixture {
        let patient = PatientRef::generate();
        let doctor = DoctorRef::generate();
        let store = Arc::new(MemoryStore::new());
        let relay = Arc::new(NotificationRelay::new(8));
        let directory = directory_with([patient_record(&patient), doctor_record(&doctor)]);
        let ledger = Arc::new(AccessLedger::new(store.clone(), directory, relay));
        let gate = RecordGate::new(ledger.clone(), store.clone());
        Fixture {
            ledger,
            gate,
            store,
            patient,
            doctor,
        }
    }

    fn draft(title: &str) -> EntryDraft {
        EntryDraft {
            category: RecordCategory::Consultation,
            title: title.into(),
            description: None,
            diagnosis: None,
            treatment: None,
            medications: vec![],
            lab_results: None,
            notes: None,
            visit_date: None,
        }
    }

    fn approve(fx: &Fixture) {
        let outcome = fx
            .ledger
            .request_access(&fx.doctor, &fx.patient, None)
            .unwrap();
        fx.ledger
            .respond(
                &fx.patient,
                &outcome.request.id,
                AccessDecision::Approved,
                None,
            )
            .unwrap();
    }

    #[test]
    fn test_scan_approve_read_succeeds() {
        // Scenario: doctor scans, patient approves, doctor reads.
        let fx = fixture();
        let outcome = fx
            .ledger
            .request_access(&fx.doctor, &fx.patient, Some("ER admission".into()))
            .unwrap();
        assert_eq!(outcome.disposition, RequestDisposition::Created);

        fx.ledger
            .respond(
                &fx.patient,
                &outcome.request.id,
                AccessDecision::Approved,
                None,
            )
            .unwrap();

        fx.gate
            .append_record(&fx.doctor, &fx.patient, draft("Admission note"))
            .unwrap();
        let records = fx.gate.read_records(&fx.doctor, &fx.patient).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Admission note");
        assert_eq!(records[0].authoring_doctor_ref, Some(fx.doctor.clone()));
    }

    #[test]
    fn test_rejection_blocks_read_and_rescan_creates_new_request() {
        // Scenario: patient rejects; read denied; rescan starts over.
        let fx = fixture();
        let first = fx
            .ledger
            .request_access(&fx.doctor, &fx.patient, None)
            .unwrap();
        fx.ledger
            .respond(
                &fx.patient,
                &first.request.id,
                AccessDecision::Rejected,
                None,
            )
            .unwrap();

        let denied = fx.gate.read_records(&fx.doctor, &fx.patient);
        assert!(matches!(denied, Err(AccessError::Unauthorized(_))));

        let second = fx
            .ledger
            .request_access(&fx.doctor, &fx.patient, None)
            .unwrap();
        assert_eq!(second.disposition, RequestDisposition::Created);
        assert_ne!(second.request.id, first.request.id);
    }

    #[test]
    fn test_revocation_blocks_subsequent_reads() {
        // Scenario: approve, read, revoke, read again.
        let fx = fixture();
        let outcome = fx
            .ledger
            .request_access(&fx.doctor, &fx.patient, None)
            .unwrap();
        fx.ledger
            .respond(
                &fx.patient,
                &outcome.request.id,
                AccessDecision::Approved,
                None,
            )
            .unwrap();
        assert!(fx.gate.read_records(&fx.doctor, &fx.patient).is_ok());

        fx.ledger.revoke(&fx.patient, &outcome.request.id).unwrap();
        let denied = fx.gate.read_records(&fx.doctor, &fx.patient);
        assert!(matches!(denied, Err(AccessError::Unauthorized(_))));
    }

    #[test]
    fn test_ungranted_append_does_not_mutate_store() {
        let fx = fixture();
        let denied = fx
            .gate
            .append_record(&fx.doctor, &fx.patient, draft("Sneaky note"));
        assert!(matches!(denied, Err(AccessError::Unauthorized(_))));
        assert!(fx.store.list_for_patient(&fx.patient).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_draft_does_not_mutate_store() {
        let fx = fixture();
        approve(&fx);

        let denied = fx.gate.append_record(&fx.doctor, &fx.patient, draft("  "));
        assert!(matches!(denied, Err(AccessError::Validation(_))));
        assert!(fx.store.list_for_patient(&fx.patient).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_and_ungranted_patients_are_indistinguishable() {
        let fx = fixture();
        let unknown = PatientRef::generate();

        let denied_known = fx.gate.read_records(&fx.doctor, &fx.patient);
        let denied_unknown = fx.gate.read_records(&fx.doctor, &unknown);

        match (denied_known, denied_unknown) {
            (Err(AccessError::Unauthorized(a)), Err(AccessError::Unauthorized(b))) => {
                assert_eq!(a, b);
            }
            other => panic!("Expected two identical denials, got {other:?}"),
        }
    }

    #[test]
    fn test_patient_reads_own_records_without_grant() {
        let fx = fixture();
        approve(&fx);
        fx.gate
            .append_record(&fx.doctor, &fx.patient, draft("Visit"))
            .unwrap();

        // Revoke; the patient can still read their own record.
        let request = &fx.ledger.list_for_patient(&fx.patient).unwrap()[0];
        fx.ledger.revoke(&fx.patient, &request.id).unwrap();

        let own = fx.gate.read_own(&fx.patient).unwrap();
        assert_eq!(own.len(), 1);
    }

    #[test]
    fn test_read_orders_by_visit_date_descending() {
        let fx = fixture();
        approve(&fx);

        let now = Utc::now();
        let mut old = draft("Old visit");
        old.visit_date = Some(now - chrono::Duration::days(10));
        let mut recent = draft("Recent visit");
        recent.visit_date = Some(now - chrono::Duration::days(1));

        fx.gate.append_record(&fx.doctor, &fx.patient, old).unwrap();
        fx.gate
            .append_record(&fx.doctor, &fx.patient, recent)
            .unwrap();

        let records = fx.gate.read_records(&fx.doctor, &fx.patient).unwrap();
        assert_eq!(records[0].title, "Recent visit");
        assert_eq!(records[1].title, "Old visit");
    }
}
