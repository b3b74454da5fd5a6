//! Ephemeral execution sandboxes for generated projects.
//!
//! The vendor API is a black box reached over HTTP: create an environment,
//! write files into it, expose a port. Sandboxes are addressed purely by the
//! opaque handle returned at creation; every call reconnects through that
//! handle, because the steps of a run may execute far apart in time and must
//! never assume a live in-memory connection.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::SANDBOX_REQUEST_TIMEOUT_SECS;

/// Seam for the sandbox vendor. The orchestrator only ever talks to this
/// trait, so tests inject a scripted fake.
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Provision a fresh sandbox and return its opaque handle.
    async fn create(&self) -> Result<String>;

    /// Create a directory (and parents) inside the sandbox.
    async fn make_dir(&self, handle: &str, path: &str) -> Result<()>;

    /// Write one file inside the sandbox.
    async fn write_file(&self, handle: &str, path: &str, content: &str) -> Result<()>;

    /// Return the public URL at which the sandbox exposes a port.
    async fn exposed_host(&self, handle: &str, port: u16) -> Result<String>;
}

/// Template and lifetime settings for provisioned sandboxes.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub template: Option<String>,
    /// Seconds before the vendor reclaims an idle sandbox.
    pub timeout: u64,
    pub env: HashMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            template: None,
            timeout: 1800,
            env: HashMap::new(),
        }
    }
}

/// Raw TOML structure for `sandbox.toml`
#[derive(Debug, Deserialize)]
struct SandboxToml {
    sandbox: Option<SandboxSection>,
}

#[derive(Debug, Deserialize)]
struct SandboxSection {
    template: Option<String>,
    timeout: Option<u64>,
    env: Option<HashMap<String, String>>,
}

impl SandboxConfig {
    /// Load sandbox config from `sandbox.toml` in the given directory.
    /// Returns defaults if the file doesn't exist.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("sandbox.toml");
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let toml: SandboxToml = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let mut config = Self::default();
        if let Some(section) = toml.sandbox {
            if let Some(template) = section.template {
                config.template = Some(template);
            }
            if let Some(timeout) = section.timeout {
                config.timeout = timeout;
            }
            if let Some(env) = section.env {
                config.env = env;
            }
        }

        Ok(config)
    }
}

/// HTTP client against the sandbox vendor API.
pub struct HttpSandboxClient {
    http: reqwest::Client,
    api_url: String,
    config: SandboxConfig,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    sandbox_id: String,
}

#[derive(Debug, Deserialize)]
struct HostResponse {
    url: String,
}

impl HttpSandboxClient {
    pub fn new(api_url: String, config: SandboxConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(SANDBOX_REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client for sandbox API")?;
        Ok(Self {
            http,
            api_url,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl SandboxClient for HttpSandboxClient {
    async fn create(&self) -> Result<String> {
        let response: CreateResponse = self
            .http
            .post(self.endpoint("sandboxes"))
            .json(&json!({
                "template": self.config.template,
                "timeout": self.config.timeout,
                "env": self.config.env,
            }))
            .send()
            .await
            .context("Sandbox create request failed")?
            .error_for_status()
            .context("Sandbox create returned an error status")?
            .json()
            .await
            .context("Failed to decode sandbox create response")?;
        Ok(response.sandbox_id)
    }

    async fn make_dir(&self, handle: &str, path: &str) -> Result<()> {
        self.http
            .post(self.endpoint(&format!("sandboxes/{}/dirs", handle)))
            .json(&json!({ "path": path }))
            .send()
            .await
            .context("Sandbox mkdir request failed")?
            .error_for_status()
            .context("Sandbox mkdir returned an error status")?;
        Ok(())
    }

    async fn write_file(&self, handle: &str, path: &str, content: &str) -> Result<()> {
        self.http
            .post(self.endpoint(&format!("sandboxes/{}/files", handle)))
            .json(&json!({ "path": path, "content": content }))
            .send()
            .await
            .context("Sandbox write request failed")?
            .error_for_status()
            .context("Sandbox write returned an error status")?;
        Ok(())
    }

    async fn exposed_host(&self, handle: &str, port: u16) -> Result<String> {
        let response: HostResponse = self
            .http
            .get(self.endpoint(&format!("sandboxes/{}/host/{}", handle, port)))
            .send()
            .await
            .context("Sandbox host request failed")?
            .error_for_status()
            .context("Sandbox host returned an error status")?
            .json()
            .await
            .context("Failed to decode sandbox host response")?;
        Ok(response.url)
    }
}
