//! `EngineConfig`: ambient configuration loaded from the environment via
//! `dotenvy`, modeled on a `config::init()` + `get_env::<T>()` pattern.
//! The engine itself never reads an
//! environment variable directly; every caller that needs a connection
//! string, a host directory root, or a Docker override goes through this
//! struct instead.

use std::env;
use std::path::PathBuf;

/// Connection and filesystem settings a driver needs to wire up a
/// [`crate::store::DocumentStore`] and a container runtime. Nothing in
/// `engine-core` constructs one of these itself; it is assembled by the
/// binary that owns `main()`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub root_output_dir: PathBuf,
    pub shared_dir: PathBuf,
    pub docker_host: Option<String>,
}

impl EngineConfig {
    /// Load `.env` (if present) and read the engine's environment
    /// variables, falling back to the same defaults a fresh checkout would
    /// want for local development.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            mongo_uri: get_env("SKELET0WN_MONGO_URI", "mongodb://localhost:27017"),
            mongo_database: get_env("SKELET0WN_MONGO_DATABASE", "skelet0wn"),
            root_output_dir: PathBuf::from(get_env("SKELET0WN_OUTPUT_DIR", "./output")),
            shared_dir: PathBuf::from(get_env("SKELET0WN_SHARED_DIR", "./shared")),
            docker_host: env::var("SKELET0WN_DOCKER_HOST").ok(),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_defaults_when_unset() {
        for key in [
            "SKELET0WN_MONGO_URI",
            "SKELET0WN_MONGO_DATABASE",
            "SKELET0WN_OUTPUT_DIR",
            "SKELET0WN_SHARED_DIR",
            "SKELET0WN_DOCKER_HOST",
        ] {
            unsafe { env::remove_var(key) };
        }
        let config = EngineConfig::from_env();
        assert_eq!(config.mongo_uri, "mongodb://localhost:27017");
        assert_eq!(config.mongo_database, "skelet0wn");
        assert!(config.docker_host.is_none());
    }

    #[test]
    fn reads_overrides_from_the_environment() {
        unsafe {
            env::set_var("SKELET0WN_MONGO_DATABASE", "test_db");
            env::set_var("SKELET0WN_DOCKER_HOST", "unix:///custom.sock");
        }
        let config = EngineConfig::from_env();
        assert_eq!(config.mongo_database, "test_db");
        assert_eq!(config.docker_host.as_deref(), Some("unix:///custom.sock"));
        unsafe {
            env::remove_var("SKELET0WN_MONGO_DATABASE");
            env::remove_var("SKELET0WN_DOCKER_HOST");
        }
    }
}
