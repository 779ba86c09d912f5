//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into
//! core services by `Arc`. Request paths never read process-wide
//! environment variables, which keeps behaviour consistent across
//! multi-threaded runtimes and test harnesses.

use std::path::{Path, PathBuf};

use crate::error::{AccessError, AccessResult};

/// Default per-session notification buffer.
pub const DEFAULT_RELAY_SESSION_BUFFER: usize = 64;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    relay_session_buffer: usize,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(data_dir: PathBuf, relay_session_buffer: usize) -> AccessResult<Self> {
        if relay_session_buffer == 0 {
            return Err(AccessError::Validation(
                "relay session buffer must be at least 1".into(),
            ));
        }

        Ok(Self {
            data_dir,
            relay_session_buffer,
        })
    }

    /// Root directory for file-backed stores.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Capacity of each session's notification channel.
    pub fn relay_session_buffer(&self) -> usize {
        self.relay_session_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_buffer_is_rejected() {
        let result = CoreConfig::new(PathBuf::from("/tmp/medipass"), 0);
        assert!(matches!(result, Err(AccessError::Validation(_))));
    }

    #[test]
    fn test_accessors() {
        let cfg = CoreConfig::new(PathBuf::from("/data"), 16).unwrap();
        assert_eq!(cfg.data_dir(), Path::new("/data"));
        assert_eq!(cfg.relay_session_buffer(), 16);
    }
}
