//! Runtime configuration, resolved from environment variables.

use std::path::PathBuf;

use crate::errors::ConfigError;

/// Model call budget. A run's generate step is failed once this elapses.
pub const MODEL_TIMEOUT_SECS: u64 = 120;

/// Timeout for individual sandbox vendor requests.
pub const SANDBOX_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Port the generated project is expected to serve on inside the sandbox.
pub const SERVICE_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Completion endpoint of the code-generation model.
    pub model_api_url: String,
    pub model_api_key: String,
    /// Sandbox vendor endpoint. Absent means sandbox steps are skipped.
    pub sandbox_api_url: Option<String>,
    /// Root under which generated projects are materialized.
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl Config {
    /// Resolve configuration from the environment. `MODEL_API_KEY` is
    /// required; everything else has a default or is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let model_api_key = std::env::var("MODEL_API_KEY")
            .map_err(|_| ConfigError::MissingEnv {
                var: "MODEL_API_KEY",
            })?;
        let model_api_url = std::env::var("MODEL_API_URL")
            .unwrap_or_else(|_| "https://api.model.example/v1/complete".to_string());
        let sandbox_api_url = std::env::var("SANDBOX_API_URL").ok();
        let data_dir = std::env::var("CODEFAB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("generated"));
        let db_path = std::env::var("CODEFAB_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("codefab.db"));

        Ok(Self {
            model_api_url,
            model_api_key,
            sandbox_api_url,
            data_dir,
            db_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_fatal() {
        unsafe { std::env::remove_var("MODEL_API_KEY") };
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("MODEL_API_KEY"));
    }
}
