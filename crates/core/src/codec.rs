//! Identity code encoding and decoding.
//!
//! A patient's scannable artifact carries a short textual code that decodes
//! back to their [`PatientRef`]. The encoding is **plain-prefixed and
//! deterministic**: `MP1-<canonical patient reference>`. The code carries no
//! secret: possession of a code grants nothing by itself, because every
//! record access still requires an active, patient-approved grant in the
//! access ledger. The `MP1` marker identifies the system and doubles as the
//! format version, so a future format can be introduced without ambiguity.
//!
//! Decoding is a pure function with no side effects. All rejection paths are
//! cheap syntactic checks of comparable cost, so a failed decode does not
//! reveal much about *why* it failed through timing.
//!
//! The codec enforces no expiry; time-boxing of access lives on the access
//! request itself (`expires_at`), never in the code.

use medipass_ids::PatientRef;

/// Marker prefix carried by every code this system issues.
const CODE_PREFIX: &str = "MP1-";

/// Classified reasons a code can fail to decode.
///
/// All variants are recoverable from the caller's perspective: the right
/// response is to re-scan or re-issue the code.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("code is empty")]
    Empty,
    #[error("code does not carry a recognised marker")]
    UnknownFormat,
    #[error("code payload is not a valid patient reference")]
    MalformedRef,
}

/// Encodes a patient reference into its scannable code.
///
/// Deterministic: the same patient always yields the same code, so
/// re-requesting a code is a read, not a regeneration.
pub fn encode(patient_ref: &PatientRef) -> String {
    format!("{CODE_PREFIX}{patient_ref}")
}

/// Decodes a scanned code back into a patient reference.
///
/// # Errors
///
/// Returns a [`DecodeError`] for empty input, an unrecognised marker, or a
/// payload that is not a canonical patient reference. Never panics.
pub fn decode(code: &str) -> Result<PatientRef, DecodeError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    let payload = trimmed
        .strip_prefix(CODE_PREFIX)
        .ok_or(DecodeError::UnknownFormat)?;

    PatientRef::parse(payload).map_err(|_| DecodeError::MalformedRef)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let patient = PatientRef::generate();
        let code = encode(&patient);
        assert_eq!(decode(&code).unwrap(), patient);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let patient = PatientRef::parse("550e8400e29b41d4a716446655440000").unwrap();
        assert_eq!(encode(&patient), encode(&patient));
        assert_eq!(
            encode(&patient),
            "MP1-550e8400e29b41d4a716446655440000"
        );
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert_eq!(decode(""), Err(DecodeError::Empty));
        assert_eq!(decode("   "), Err(DecodeError::Empty));
    }

    #[test]
    fn test_decode_rejects_foreign_marker() {
        assert_eq!(
            decode("XX9-550e8400e29b41d4a716446655440000"),
            Err(DecodeError::UnknownFormat)
        );
        assert_eq!(decode("just some text"), Err(DecodeError::UnknownFormat));
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        assert_eq!(decode("MP1-"), Err(DecodeError::MalformedRef));
        assert_eq!(decode("MP1-not-hex"), Err(DecodeError::MalformedRef));
        assert_eq!(
            // Uppercase payloads are not canonical.
            decode("MP1-550E8400E29B41D4A716446655440000"),
            Err(DecodeError::MalformedRef)
        );
    }

    #[test]
    fn test_decode_tolerates_surrounding_whitespace() {
        let patient = PatientRef::generate();
        let code = format!("  {}  ", encode(&patient));
        assert_eq!(decode(&code).unwrap(), patient);
    }
}
