//! # API Shared
//!
//! Shared utilities and definitions for the MediPass API surface.
//!
//! Contains:
//! - Verified-session resolution (`auth`): turns the hosting environment's
//!   verified identity into a typed doctor or patient session, exactly once
//!   per call.
//! - Shared services like `HealthService`.
//!
//! Used by the server binary; transport types stay out of this crate so the
//! same session logic could sit behind a different wire format.

pub mod auth;
pub mod health;

pub use auth::{
    resolve_session, DoctorSession, PatientSession, Session, SessionError, USER_HEADER,
};
pub use health::{HealthRes, HealthService};
