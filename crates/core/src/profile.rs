//! Patient and doctor profile data with explicit partial updates.
//!
//! Profile updates use [`Patch`] fields rather than merge-on-falsy: an
//! absent field leaves the stored value unchanged, an explicit `null`
//! clears it, and a value replaces it. This makes "clear my emergency
//! contact" expressible, which a falsy-merge cannot do.

use chrono::NaiveDate;
use medipass_types::Patch;
use serde::{Deserialize, Serialize};

/// Medical and contact metadata attached to a patient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
}

/// Partial update for [`PatientProfile`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PatientProfilePatch {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub birth_date: Patch<NaiveDate>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub gender: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub blood_type: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub height_cm: Patch<f32>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub weight_kg: Patch<f32>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub address: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub city: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub emergency_contact: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub emergency_contact_phone: Patch<String>,
}

impl PatientProfilePatch {
    /// Applies this patch to `profile`, field by field.
    pub fn apply(self, profile: &mut PatientProfile) {
        profile.birth_date = self.birth_date.apply(profile.birth_date);
        profile.gender = self.gender.apply(profile.gender.take());
        profile.blood_type = self.blood_type.apply(profile.blood_type.take());
        profile.height_cm = self.height_cm.apply(profile.height_cm);
        profile.weight_kg = self.weight_kg.apply(profile.weight_kg);
        profile.address = self.address.apply(profile.address.take());
        profile.city = self.city.apply(profile.city.take());
        profile.emergency_contact = self
            .emergency_contact
            .apply(profile.emergency_contact.take());
        profile.emergency_contact_phone = self
            .emergency_contact_phone
            .apply(profile.emergency_contact_phone.take());
    }
}

/// Practice metadata attached to a doctor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoctorProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Partial update for [`DoctorProfile`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DoctorProfilePatch {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub specialization: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub hospital: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub address: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub city: Patch<String>,
}

impl DoctorProfilePatch {
    /// Applies this patch to `profile`, field by field.
    pub fn apply(self, profile: &mut DoctorProfile) {
        profile.specialization = self.specialization.apply(profile.specialization.take());
        profile.hospital = self.hospital.apply(profile.hospital.take());
        profile.address = self.address.apply(profile.address.take());
        profile.city = self.city.apply(profile.city.take());
    }
}
