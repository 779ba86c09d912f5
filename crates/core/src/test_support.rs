//! Shared fixtures for core tests.

use std::sync::Arc;

use medipass_ids::{DoctorRef, PatientRef};

use crate::directory::{DoctorUser, InMemoryDirectory, PatientUser, UserRecord};
use crate::profile::{DoctorProfile, PatientProfile};

pub(crate) fn patient_record(patient_ref: &PatientRef) -> UserRecord {
    UserRecord::Patient(PatientUser {
        patient_ref: patient_ref.clone(),
        email: format!("{patient_ref}@example.org"),
        first_name: "Paule".into(),
        last_name: "Rivet".into(),
        phone: None,
        profile: PatientProfile::default(),
    })
}

pub(crate) fn doctor_record(doctor_ref: &DoctorRef) -> UserRecord {
    UserRecord::Doctor(DoctorUser {
        doctor_ref: doctor_ref.clone(),
        email: format!("{doctor_ref}@example.org"),
        first_name: "Nadia".into(),
        last_name: "Benali".into(),
        phone: None,
        profile: DoctorProfile::default(),
    })
}

pub(crate) fn directory_with(
    records: impl IntoIterator<Item = UserRecord>,
) -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory::seeded(records))
}
