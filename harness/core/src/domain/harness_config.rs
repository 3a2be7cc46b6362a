// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Harness Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing the
// network under test:
// - Service base URLs
// - Trusted-app name of the resource application
// - Ledger chain id
// - Per-call-kind timeouts and receipt polling budget
// - Clock skew tolerance for token validation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "didflow.dev/v1";
pub const KIND: &str = "HarnessConfig";

/// Top-level harness configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// API version (must be "didflow.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "HarnessConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: HarnessSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Name of the network profile (e.g. "conformance", "pilot")
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSpec {
    #[serde(default)]
    pub services: ServiceUrls,

    /// Trusted-app name under which the authorisation API advertises its keys
    #[serde(default = "default_resource_app")]
    pub resource_app: String,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    /// Tolerance for `iat` / `nbf` in the future
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: i64,
}

/// Base URL per remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUrls {
    pub authorisation: String,
    pub registry: String,
    pub timestamp: String,
    pub ledger: String,
    pub notifications: String,
    pub datahub: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Used when the service omits or garbles `chainId`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

/// Remote call categories with distinct latency expectations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    ChallengeIssuance,
    JsonRpcSubmission,
    ReceiptPolling,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_challenge_timeout")]
    pub challenge_issuance_ms: u64,

    #[serde(default = "default_jsonrpc_timeout")]
    pub jsonrpc_submission_ms: u64,

    #[serde(default = "default_polling_timeout")]
    pub receipt_polling_ms: u64,

    #[serde(default = "default_timeout")]
    pub default_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

fn default_resource_app() -> String {
    "authorisation-api".to_string()
}

fn default_clock_skew() -> i64 {
    100
}

fn default_challenge_timeout() -> u64 {
    10_000
}

fn default_jsonrpc_timeout() -> u64 {
    30_000
}

fn default_polling_timeout() -> u64 {
    5_000
}

fn default_timeout() -> u64 {
    15_000
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_poll_attempts() -> u32 {
    30
}

impl ServiceUrls {
    /// Every service under one host, at its conventional path.
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            authorisation: format!("{}/authorisation/v1", base),
            registry: format!("{}/trusted-apps-registry/v1", base),
            timestamp: format!("{}/timestamp/v1", base),
            ledger: format!("{}/ledger/v1", base),
            notifications: format!("{}/notifications/v1", base),
            datahub: format!("{}/proxy-data-hub/v1", base),
        }
    }

    fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("authorisation", &self.authorisation),
            ("registry", &self.registry),
            ("timestamp", &self.timestamp),
            ("ledger", &self.ledger),
            ("notifications", &self.notifications),
            ("datahub", &self.datahub),
        ]
    }
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self::from_base("http://localhost:8080")
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            challenge_issuance_ms: default_challenge_timeout(),
            jsonrpc_submission_ms: default_jsonrpc_timeout(),
            receipt_polling_ms: default_polling_timeout(),
            default_ms: default_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn for_call(&self, kind: CallKind) -> Duration {
        Duration::from_millis(match kind {
            CallKind::ChallengeIssuance => self.challenge_issuance_ms,
            CallKind::JsonRpcSubmission => self.jsonrpc_submission_ms,
            CallKind::ReceiptPolling => self.receipt_polling_ms,
            CallKind::Default => self.default_ms,
        })
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_poll_attempts(),
        }
    }
}

impl Default for HarnessSpec {
    fn default() -> Self {
        Self {
            services: ServiceUrls::default(),
            resource_app: default_resource_app(),
            ledger: LedgerConfig::default(),
            timeouts: TimeoutConfig::default(),
            polling: PollingConfig::default(),
            clock_skew_secs: default_clock_skew(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "local".to_string(),
                labels: None,
            },
            spec: HarnessSpec::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. DIDFLOW_CONFIG_PATH environment variable
    /// 2. ./didflow-config.yaml (working directory)
    /// 3. ~/.didflow/config.yaml (user home)
    /// 4. /etc/didflow/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("DIDFLOW_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./didflow-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".didflow").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/didflow/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::debug!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply DIDFLOW_BASE_URL and DIDFLOW_CHAIN_ID
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var("DIDFLOW_BASE_URL").ok(),
            std::env::var("DIDFLOW_CHAIN_ID").ok(),
        );
    }

    pub fn apply_overrides(&mut self, base_url: Option<String>, chain_id: Option<String>) {
        if let Some(base) = base_url {
            tracing::info!("Environment override: DIDFLOW_BASE_URL={}", base);
            self.spec.services = ServiceUrls::from_base(&base);
        }

        if let Some(val) = chain_id {
            match val.parse::<u64>() {
                Ok(id) => {
                    tracing::info!("Environment override: DIDFLOW_CHAIN_ID={}", id);
                    self.spec.ledger.chain_id = Some(id);
                }
                Err(_) => {
                    tracing::warn!("Invalid value for DIDFLOW_CHAIN_ID: '{}'. Expected an integer. Ignoring.", val);
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.resource_app.is_empty() {
            anyhow::bail!("spec.resource_app cannot be empty");
        }

        for (service, base) in self.spec.services.entries() {
            let url = url::Url::parse(base)
                .map_err(|e| anyhow::anyhow!("spec.services.{} is not a valid URL '{}': {}", service, base, e))?;
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("spec.services.{} must use http or https, got '{}'", service, url.scheme());
            }
        }

        let timeouts = &self.spec.timeouts;
        for (name, value) in [
            ("challenge_issuance_ms", timeouts.challenge_issuance_ms),
            ("jsonrpc_submission_ms", timeouts.jsonrpc_submission_ms),
            ("receipt_polling_ms", timeouts.receipt_polling_ms),
            ("default_ms", timeouts.default_ms),
        ] {
            if value == 0 {
                anyhow::bail!("spec.timeouts.{} must be greater than zero", name);
            }
        }

        if self.spec.polling.max_attempts == 0 {
            anyhow::bail!("spec.polling.max_attempts must be greater than zero");
        }

        if self.spec.clock_skew_secs < 0 {
            anyhow::bail!("spec.clock_skew_secs cannot be negative");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_manifest() {
        let config = HarnessConfig::default();
        assert_eq!(config.api_version, "didflow.dev/v1");
        assert_eq!(config.kind, "HarnessConfig");
        assert_eq!(config.spec.clock_skew_secs, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = HarnessConfig::from_yaml_str(
            r#"
apiVersion: didflow.dev/v1
kind: HarnessConfig
metadata:
  name: conformance
spec:
  ledger:
    chain_id: 6175
  polling:
    max_attempts: 3
"#,
        )
        .unwrap();

        assert_eq!(config.metadata.name, "conformance");
        assert_eq!(config.spec.ledger.chain_id, Some(6175));
        assert_eq!(config.spec.polling.max_attempts, 3);
        assert_eq!(config.spec.polling.interval_ms, 1_000);
        assert_eq!(config.spec.resource_app, "authorisation-api");
        assert_eq!(
            config.spec.timeouts.for_call(CallKind::JsonRpcSubmission),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let mut config = HarnessConfig::default();
        config.metadata.name = "pilot".to_string();
        config.spec.ledger.chain_id = Some(1234);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_yaml::to_string(&config).unwrap().as_bytes()).unwrap();

        let loaded = HarnessConfig::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(loaded.metadata.name, "pilot");
        assert_eq!(loaded.spec.services, config.spec.services);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HarnessConfig::load_or_default(Some(dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = HarnessConfig::default();
        config.apply_overrides(Some("https://conformance.example/".into()), Some("nope".into()));
        assert_eq!(config.spec.services.ledger, "https://conformance.example/ledger/v1");
        assert_eq!(config.spec.ledger.chain_id, None);

        config.apply_overrides(None, Some("6175".into()));
        assert_eq!(config.spec.ledger.chain_id, Some(6175));
    }

    #[test]
    fn test_validation() {
        let mut config = HarnessConfig::default();

        config.api_version = "wrong/v1".to_string();
        assert!(config.validate().is_err());
        config.api_version = API_VERSION.to_string();

        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.spec.services.timestamp = "ftp://host/timestamp".to_string();
        assert!(config.validate().is_err());
        config.spec.services.timestamp = "not a url".to_string();
        assert!(config.validate().is_err());
        config.spec.services = ServiceUrls::default();

        config.spec.timeouts.receipt_polling_ms = 0;
        assert!(config.validate().is_err());
        config.spec.timeouts = TimeoutConfig::default();

        assert!(config.validate().is_ok());
    }
}
