//! Hub configuration.
//!
//! Layering (later wins): defaults, YAML file, `UCP_*` environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

/// Hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    /// Profile sent in the `UCP-Agent` header.
    #[serde(default = "default_agent_profile")]
    pub agent_profile: String,

    /// Merchant to use when a command does not name one.
    #[serde(default)]
    pub server_url: Option<String>,

    /// Well-known manifest path appended to the merchant base URL.
    #[serde(default = "default_discovery_path")]
    pub discovery_path: String,

    /// Per-attempt request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt on 5xx or transport failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Largest manifest body accepted, in bytes.
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,

    /// Largest number of capabilities accepted from one manifest.
    #[serde(default = "default_max_capabilities")]
    pub max_capabilities: usize,

    /// Lifetime of issued payment mandates in seconds.
    #[serde(default = "default_mandate_ttl_secs")]
    pub mandate_ttl_secs: u64,

    /// Require https for non-local merchants.
    #[serde(default = "default_require_tls")]
    pub require_tls: bool,

    /// Hosts allowed over plain http in addition to local ones.
    #[serde(default)]
    pub insecure_hosts: Vec<String>,

    /// Capability name to resource path overrides.
    #[serde(default)]
    pub endpoint_map: HashMap<String, String>,

    /// PKCS#8 PEM file holding the Ed25519 signing key.
    #[serde(default)]
    pub signing_key_path: Option<PathBuf>,
}

fn default_agent_profile() -> String {
    "default-hub-profile".to_string()
}

fn default_discovery_path() -> String {
    "/.well-known/ucp".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_max_manifest_bytes() -> usize {
    256 * 1024
}

fn default_max_capabilities() -> usize {
    256
}

fn default_mandate_ttl_secs() -> u64 {
    300
}

fn default_require_tls() -> bool {
    true
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            agent_profile: default_agent_profile(),
            server_url: None,
            discovery_path: default_discovery_path(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_manifest_bytes: default_max_manifest_bytes(),
            max_capabilities: default_max_capabilities(),
            mandate_ttl_secs: default_mandate_ttl_secs(),
            require_tls: default_require_tls(),
            insecure_hosts: Vec::new(),
            endpoint_map: HashMap::new(),
            signing_key_path: None,
        }
    }
}

impl HubConfig {
    /// Load configuration: defaults, then the YAML file (if any), then env.
    ///
    /// Without an explicit path, `UCP_CONFIG_PATH` is consulted and then
    /// `config.yaml` in the working directory; a missing implicit file is not
    /// an error.
    pub fn load(path: Option<&Path>) -> HubResult<Self> {
        let base = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => {
                let implicit = std::env::var("UCP_CONFIG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("config.yaml"));
                if implicit.exists() {
                    Self::from_yaml_file(&implicit)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(base.apply_env())
    }

    /// Parse a YAML config file.
    pub fn from_yaml_file(path: &Path) -> HubResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HubError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml_str(&content).map_err(|e| HubError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn from_yaml_str(content: &str) -> HubResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| HubError::Config {
            message: format!("invalid config: {}", e),
        })
    }

    /// Create config from environment variables over the defaults.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Override fields from environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `UCP_AGENT_PROFILE` | `agent_profile` |
    /// | `UCP_SERVER_URL` | `server_url` |
    /// | `UCP_DISCOVERY_PATH` | `discovery_path` |
    /// | `UCP_HTTP_TIMEOUT_MS` | `timeout_ms` |
    /// | `UCP_MAX_RETRIES` | `max_retries` |
    /// | `UCP_RETRY_BACKOFF_MS` | `retry_backoff_ms` |
    /// | `UCP_MAX_MANIFEST_BYTES` | `max_manifest_bytes` |
    /// | `UCP_MAX_CAPABILITIES` | `max_capabilities` |
    /// | `UCP_MANDATE_TTL_SECS` | `mandate_ttl_secs` |
    /// | `UCP_REQUIRE_TLS` | `require_tls` |
    /// | `UCP_INSECURE_HOSTS` | `insecure_hosts` (comma separated) |
    /// | `UCP_SIGNING_KEY_PATH` | `signing_key_path` |
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("UCP_AGENT_PROFILE") {
            self.agent_profile = v;
        }
        if let Ok(v) = std::env::var("UCP_SERVER_URL") {
            self.server_url = Some(v);
        }
        if let Ok(v) = std::env::var("UCP_DISCOVERY_PATH") {
            self.discovery_path = v;
        }
        if let Some(v) = env_parse("UCP_HTTP_TIMEOUT_MS") {
            self.timeout_ms = v;
        }
        if let Some(v) = env_parse("UCP_MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = env_parse("UCP_RETRY_BACKOFF_MS") {
            self.retry_backoff_ms = v;
        }
        if let Some(v) = env_parse("UCP_MAX_MANIFEST_BYTES") {
            self.max_manifest_bytes = v;
        }
        if let Some(v) = env_parse("UCP_MAX_CAPABILITIES") {
            self.max_capabilities = v;
        }
        if let Some(v) = env_parse("UCP_MANDATE_TTL_SECS") {
            self.mandate_ttl_secs = v;
        }
        if let Ok(v) = std::env::var("UCP_REQUIRE_TLS") {
            self.require_tls = !(v == "0" || v.eq_ignore_ascii_case("false"));
        }
        if let Ok(v) = std::env::var("UCP_INSECURE_HOSTS") {
            self.insecure_hosts = v
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_ascii_lowercase)
                .collect();
        }
        if let Ok(v) = std::env::var("UCP_SIGNING_KEY_PATH") {
            self.signing_key_path = Some(PathBuf::from(v));
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn mandate_ttl(&self) -> Duration {
        Duration::from_secs(self.mandate_ttl_secs)
    }

    pub fn with_agent_profile(mut self, profile: impl Into<String>) -> Self {
        self.agent_profile = profile.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn with_max_manifest_bytes(mut self, max: usize) -> Self {
        self.max_manifest_bytes = max;
        self
    }

    pub fn with_max_capabilities(mut self, max: usize) -> Self {
        self.max_capabilities = max;
        self
    }

    pub fn with_require_tls(mut self, require: bool) -> Self {
        self.require_tls = require;
        self
    }

    pub fn with_insecure_host(mut self, host: impl Into<String>) -> Self {
        self.insecure_hosts.push(host.into().to_ascii_lowercase());
        self
    }

    pub fn with_endpoint(mut self, capability: impl Into<String>, path: impl Into<String>) -> Self {
        self.endpoint_map.insert(capability.into(), path.into());
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
