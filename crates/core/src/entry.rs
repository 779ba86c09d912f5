//! Medical record entries.
//!
//! A [`MedicalRecordEntry`] is one clinical note, owned by the patient. The
//! authoring doctor holds a non-owning back-reference. Entries are
//! **append-only** from the doctor's perspective: created once through the
//! record gate and never updated or deleted afterwards.

use chrono::{DateTime, Utc};
use medipass_ids::{DoctorRef, EntryId, PatientRef};
use medipass_types::NonEmptyText;
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult};

/// Maximum length of an entry title.
const MAX_TITLE_LEN: usize = 200;

/// Closed enumeration of clinical entry categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    Consultation,
    Prescription,
    LabResult,
    Imaging,
    Vaccination,
    Allergy,
    ChronicCondition,
    Surgery,
    Other,
}

/// One prescribed medication inside an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
}

/// One clinical note in a patient's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecordEntry {
    pub id: EntryId,
    pub patient_ref: PatientRef,
    /// `None` for entries not authored by a doctor (imports, self-reported).
    pub authoring_doctor_ref: Option<DoctorRef>,
    pub category: RecordCategory,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medications: Vec<Medication>,
    /// Structured lab payload; shape is owned by the producing lab system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_results: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub visit_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Input data for appending a new entry.
///
/// The gate validates the draft, stamps identity and timestamps, and turns
/// it into a persisted [`MedicalRecordEntry`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntryDraft {
    pub category: RecordCategory,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub lab_results: Option<serde_json::Value>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Defaults to the append time when absent.
    #[serde(default)]
    pub visit_date: Option<DateTime<Utc>>,
}

impl EntryDraft {
    /// Validates the draft and builds the entry to persist.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Validation`] for an empty or oversized title,
    /// or a medication without a name.
    pub fn into_entry(
        self,
        patient_ref: PatientRef,
        authoring_doctor_ref: Option<DoctorRef>,
        now: DateTime<Utc>,
    ) -> AccessResult<MedicalRecordEntry> {
        let title = NonEmptyText::bounded(&self.title, MAX_TITLE_LEN)
            .map_err(|e| AccessError::Validation(format!("title: {e}")))?;

        for medication in &self.medications {
            if medication.name.trim().is_empty() {
                return Err(AccessError::Validation(
                    "medication name cannot be empty".into(),
                ));
            }
        }

        Ok(MedicalRecordEntry {
            id: EntryId::generate(),
            patient_ref,
            authoring_doctor_ref,
            category: self.category,
            title: title.into_inner(),
            description: self.description,
            diagnosis: self.diagnosis,
            treatment: self.treatment,
            medications: self.medications,
            lab_results: self.lab_results,
            notes: self.notes,
            visit_date: self.visit_date.unwrap_or(now),
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> EntryDraft {
        EntryDraft {
            category: RecordCategory::Consultation,
            title: "Annual check-up".into(),
            description: Some("Routine visit".into()),
            diagnosis: None,
            treatment: None,
            medications: vec![],
            lab_results: None,
            notes: None,
            visit_date: None,
        }
    }

    #[test]
    fn test_into_entry_stamps_author_and_times() {
        let now = Utc::now();
        let patient = PatientRef::generate();
        let doctor = DoctorRef::generate();

        let entry = draft()
            .into_entry(patient.clone(), Some(doctor.clone()), now)
            .unwrap();

        assert_eq!(entry.patient_ref, patient);
        assert_eq!(entry.authoring_doctor_ref, Some(doctor));
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.visit_date, now);
    }

    #[test]
    fn test_explicit_visit_date_is_preserved() {
        let now = Utc::now();
        let visit = now - chrono::Duration::days(3);
        let mut d = draft();
        d.visit_date = Some(visit);

        let entry = d.into_entry(PatientRef::generate(), None, now).unwrap();
        assert_eq!(entry.visit_date, visit);
        assert_eq!(entry.created_at, now);
    }

    #[test]
    fn test_empty_title_is_rejected() {
        let mut d = draft();
        d.title = "   ".into();
        let result = d.into_entry(PatientRef::generate(), None, Utc::now());
        assert!(matches!(result, Err(AccessError::Validation(_))));
    }

    #[test]
    fn test_oversized_title_is_rejected() {
        let mut d = draft();
        d.title = "x".repeat(MAX_TITLE_LEN + 1);
        let result = d.into_entry(PatientRef::generate(), None, Utc::now());
        assert!(matches!(result, Err(AccessError::Validation(_))));
    }

    #[test]
    fn test_unnamed_medication_is_rejected() {
        let mut d = draft();
        d.medications = vec![Medication {
            name: "  ".into(),
            dosage: Some("5mg".into()),
            frequency: None,
        }];
        let result = d.into_entry(PatientRef::generate(), None, Utc::now());
        assert!(matches!(result, Err(AccessError::Validation(_))));
    }

    #[test]
    fn test_category_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RecordCategory::LabResult).unwrap(),
            "\"lab_result\""
        );
        assert_eq!(
            serde_json::to_string(&RecordCategory::ChronicCondition).unwrap(),
            "\"chronic_condition\""
        );
    }
}
