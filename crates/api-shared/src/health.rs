//! Health check service shared by API surfaces.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health check response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Simple health service usable from any API surface.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "MediPass is alive".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_is_ok() {
        let res = HealthService::check_health();
        assert!(res.ok);
    }
}
