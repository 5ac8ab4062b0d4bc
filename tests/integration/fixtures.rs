//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Building the standard unit tree on a simulated control plane
//! - Constructing reassignment requests
//! - A reassigner wired with production poll settings

use std::sync::Arc;
use std::time::Duration;

use converge::sim::SimulatedControlPlane;
use converge::{Config, EnvironmentKey, PollSettings, ReassignRequest, Reassigner};

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "us-west-2";
pub const ENV_ID: &str = "env-e";

pub fn env_key() -> EnvironmentKey {
    EnvironmentKey::new(ACCOUNT, REGION)
}

/// Unit tree `Global -> {OU1 -> {OU1A}, OU2}` with environment E in OU1.
pub fn standard_plane() -> Arc<SimulatedControlPlane> {
    let plane = SimulatedControlPlane::new();
    plane.add_unit("Global", None);
    plane.add_unit("OU1", Some("Global"));
    plane.add_unit("OU2", Some("Global"));
    plane.add_unit("OU1A", Some("OU1"));
    plane.add_environment(ENV_ID, ACCOUNT, REGION, "OU1");
    Arc::new(plane)
}

pub fn request(current: &str, requested: &str) -> ReassignRequest {
    ReassignRequest {
        environment: env_key(),
        connection_status: "connected".to_string(),
        current_unit: current.into(),
        requested_unit: requested.into(),
    }
}

/// Reassigner with the default 5 s / 3600 s settings.
pub fn production_reassigner(
    plane: &Arc<SimulatedControlPlane>,
) -> Reassigner<SimulatedControlPlane> {
    Reassigner::new(Arc::clone(plane), &Config::default()).expect("default config is valid")
}

pub fn short_settings() -> PollSettings {
    PollSettings::new(Duration::from_secs(1), Duration::from_secs(30)).expect("valid settings")
}
