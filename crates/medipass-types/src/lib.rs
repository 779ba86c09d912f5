//! Small validated value types shared across MediPass crates.
//!
//! This crate deliberately has no knowledge of the access-control domain;
//! it only provides building blocks:
//!
//! - [`NonEmptyText`]: a string guaranteed to hold at least one
//!   non-whitespace character, trimmed on construction.
//! - [`Patch`]: a three-state partial-update field that distinguishes
//!   "leave unchanged" from "clear" from "set to a new value".

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("text cannot be empty")]
    Empty,
    /// The input text exceeded the permitted length
    #[error("text exceeds maximum length of {0} characters")]
    TooLong(usize),
}

/// A string type that guarantees non-empty content.
///
/// Wraps a `String` and ensures it contains at least one non-whitespace
/// character. Input is trimmed of leading and trailing whitespace during
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the
    /// trimmed result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates a new `NonEmptyText`, additionally bounding the trimmed
    /// length to `max_len` characters.
    ///
    /// Use this for free-text fields that end up persisted or pushed over
    /// notification channels, where unbounded input is a liability.
    pub fn bounded(input: impl AsRef<str>, max_len: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        if text.0.chars().count() > max_len {
            return Err(TextError::TooLong(max_len));
        }
        Ok(text)
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A three-state partial-update field.
///
/// In a partial-update payload, each optional field can be in one of three
/// states, and collapsing any two of them makes some updates inexpressible:
///
/// - `Keep`: the field was absent; leave the stored value unchanged.
/// - `Clear`: the field was explicitly `null`; clear the stored value.
/// - `Set(v)`: the field carried a value; replace the stored value.
///
/// Use together with serde as:
///
/// ```ignore
/// #[serde(default, skip_serializing_if = "Patch::is_keep")]
/// pub blood_type: Patch<String>,
/// ```
///
/// With `default`, an absent field deserializes to `Keep`; an explicit
/// `null` deserializes to `Clear`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// Leave the stored value unchanged.
    Keep,
    /// Clear the stored value.
    Clear,
    /// Replace the stored value.
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    /// Returns `true` if this patch leaves the stored value unchanged.
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// Applies this patch to the currently stored value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(value) => Some(value),
        }
    }

    /// Maps the `Set` value with `f`, preserving `Keep`/`Clear`.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Keep => Patch::Keep,
            Patch::Clear => Patch::Clear,
            Patch::Set(value) => Patch::Set(f(value)),
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // A present-but-null field is a deliberate clear; a present value is
        // a set. Absence never reaches this impl (handled by serde default).
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => Patch::Clear,
            Some(value) => Patch::Set(value),
        })
    }
}

impl<T> Serialize for Patch<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            // Keep is normally skipped via `skip_serializing_if`; if it is
            // serialized anyway it degrades to null.
            Patch::Keep | Patch::Clear => serializer.serialize_none(),
            Patch::Set(value) => serializer.serialize_some(value),
        }
    }
}
