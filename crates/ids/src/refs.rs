//! Canonical identifier implementation and role-specific newtypes.

use crate::{RefError, RefResult};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// MediPass's canonical identifier representation (32 lowercase hex
/// characters, no hyphens).
///
/// Once constructed, the contained identifier is guaranteed to be in
/// canonical form, so path derivation and equality checks are consistent
/// across the system.
///
/// # Construction
/// - [`RefId::generate`] mints a fresh identifier (for new records).
/// - [`RefId::parse`] validates an externally supplied identifier.
///
/// # Errors
/// [`RefId::parse`] returns [`RefError::InvalidInput`] if the input is not
/// already canonical. Other common UUID forms (hyphenated, uppercase) are
/// **not** normalised; callers must provide the canonical representation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefId(String);

impl RefId {
    /// Mints a new identifier in canonical form.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validates and wraps an identifier string that must already be in
    /// canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`RefError::InvalidInput`] if `input` is not 32 lowercase hex
    /// characters.
    pub fn parse(input: &str) -> RefResult<Self> {
        if Self::is_canonical(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(RefError::InvalidInput(format!(
            "identifier must be 32 lowercase hex characters without hyphens, got: '{input}'"
        )))
    }

    /// Returns true if `input` is in canonical form.
    ///
    /// Purely syntactic: exactly 32 bytes, lowercase hex only.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `parent_dir/<s1>/<s2>/<id>/` where `s1`/`s2` are derived from
    /// this identifier.
    ///
    /// `s1` is the first two hex characters and `s2` the next two; the full
    /// identifier forms the leaf directory. This keeps directory fan-out
    /// bounded for file-backed stores.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let s1 = &self.0[0..2];
        let s2 = &self.0[2..4];
        parent_dir.join(s1).join(s2).join(&self.0)
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RefId {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RefId::parse(s)
    }
}

impl serde::Serialize for RefId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RefId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RefId::parse(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! typed_ref {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(RefId);

        impl $name {
            /// Mints a fresh identifier.
            pub fn generate() -> Self {
                Self(RefId::generate())
            }

            /// Validates and wraps a canonical identifier string.
            pub fn parse(input: &str) -> RefResult<Self> {
                RefId::parse(input).map(Self)
            }

            /// Returns the canonical string form.
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Returns the untyped identifier.
            pub fn as_ref_id(&self) -> &RefId {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = RefError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

typed_ref!(
    /// Opaque stable identifier for a patient, owned by the user directory.
    /// Immutable once issued; this is the value carried by a scannable code.
    PatientRef
);

typed_ref!(
    /// Opaque stable identifier for a doctor, owned by the user directory.
    DoctorRef
);

typed_ref!(
    /// Unique identifier of one access request.
    RequestId
);

typed_ref!(
    /// Unique identifier of one medical record entry.
    EntryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_canonical() {
        let id = RefId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(RefId::is_canonical(id.as_str()));
    }

    #[test]
    fn test_parse_valid_canonical() {
        let canonical = "550e8400e29b41d4a716446655440000";
        let id = RefId::parse(canonical).unwrap();
        assert_eq!(id.to_string(), canonical);
    }

    #[test]
    fn test_parse_rejects_hyphenated() {
        let result = RefId::parse("550e8400-e29b-41d4-a716-446655440000");
        match result {
            Err(RefError::InvalidInput(msg)) => {
                assert!(msg.contains("32 lowercase hex characters"));
            }
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[test]
    fn test_parse_rejects_uppercase() {
        assert!(RefId::parse("550E8400E29B41D4A716446655440000").is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(RefId::parse("550e8400e29b41d4a71644665544000").is_err());
        assert!(RefId::parse("550e8400e29b41d4a7164466554400000").is_err());
        assert!(RefId::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!(RefId::parse("550e8400e29b41d4a716446655440zzz").is_err());
    }

    #[test]
    fn test_sharded_dir_structure() {
        let id = RefId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let sharded = id.sharded_dir(Path::new("/data/access"));
        assert_eq!(
            sharded,
            PathBuf::from("/data/access/55/0e/550e8400e29b41d4a716446655440000")
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let id = PatientRef::generate();
        let json = serde_json::to_string(&id).unwrap();
        let back: PatientRef = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_serde_rejects_non_canonical() {
        let result: Result<PatientRef, _> =
            serde_json::from_str("\"550E8400E29B41D4A716446655440000\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_typed_refs_are_distinct_types() {
        // Same canonical string, different types; equality only within a type.
        let as_patient = PatientRef::parse("550e8400e29b41d4a716446655440000").unwrap();
        let as_doctor = DoctorRef::parse("550e8400e29b41d4a716446655440000").unwrap();
        assert_eq!(as_patient.as_str(), as_doctor.as_str());
    }
}
