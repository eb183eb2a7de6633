// Configuration Management
//
// Loads the voice gateway's configuration from environment variables. No
// YAML, no file watch: every recognized option is a single env var, read
// once at startup.

use thiserror::Error;

pub mod types;

pub use types::GatewayConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration from environment: {0}")]
    EnvError(String),
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file from the current directory first
    /// (missing file is not an error), then reads the full set of
    /// recognized variables from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        envy::from_env::<GatewayConfig>().map_err(|e| ConfigError::EnvError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_gateway_env() {
        for (key, _) in env::vars() {
            let upper = key.to_uppercase();
            if upper.starts_with("RIVA_")
                || upper.starts_with("LLM_")
                || upper.starts_with("GRPC_")
                || upper.starts_with("REDIS_")
                || upper == "SHUTDOWN_GRACE_PERIOD"
                || upper == "LOG_LEVEL"
                || upper.ends_with("_POOL_SIZE")
                || upper.ends_with("_SAMPLE_RATE")
                || upper == "SESSION_TIMEOUT_SECONDS"
                || upper == "DEFAULT_LANGUAGE"
                || upper == "SUPPORTED_LANGUAGES"
            {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn load_fails_without_required_vars() {
        clear_gateway_env();
        assert!(GatewayConfig::load().is_err());
    }

    #[test]
    #[serial]
    fn load_succeeds_with_required_vars_and_applies_defaults() {
        clear_gateway_env();
        env::set_var("RIVA_URI", "riva-server:50051");
        env::set_var("LLM_SERVICE_URL", "http://localhost:8000/v1");
        env::set_var("LLM_MODEL", "meta/llama-3.1-8b-instruct");

        let cfg = GatewayConfig::load().expect("config should load with required vars set");
        assert_eq!(cfg.riva_uri, "riva-server:50051");
        assert_eq!(cfg.grpc_port, 50060);
        assert_eq!(cfg.default_language, "hi-IN");
        assert_eq!(cfg.supported_language_codes(), vec!["hi-IN", "en-US"]);

        env::remove_var("RIVA_URI");
        env::remove_var("LLM_SERVICE_URL");
        env::remove_var("LLM_MODEL");
    }
}
