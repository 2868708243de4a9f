//! Configuration file support.
//!
//! Settings are read from TOML. Every section and field has a default, so an
//! empty file (or no file) is a valid configuration.

use crate::context::VerificationContext;
use crate::types::EnvelopeLimits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TREE_DEPTH: u32 = 20;
const DEFAULT_GROUP_ID: u64 = 1;
const DEFAULT_APP_ID: &str = "app_1234";
const DEFAULT_ACTION: &str = "wid_test_1234";
const DEFAULT_MAX_PROOF_FILE_SIZE: u64 = 1024 * 1024;
const DEFAULT_MAX_ZK_PROOF_SIZE: usize = 512 * 1024;
const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_TIMESTAMP_TOLERANCE_SECS: u64 = 300;
const DEFAULT_TIMESTAMP_MAX_AGE_SECS: u64 = 86400;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub proof: ProofConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default = "default_group_id")]
    pub id: u64,
    #[serde(default = "default_tree_depth")]
    pub depth: u32,
    /// Hex encoding of the empty-leaf value; zero when absent.
    #[serde(default)]
    pub zero_value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Explicit circuit size. Derived from the depth when absent.
    #[serde(default)]
    pub k: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default = "default_action")]
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    #[serde(default = "default_max_proof_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_zk_proof_size")]
    pub max_zk_proof_size: usize,
    #[serde(default = "default_proof_output_file")]
    pub output_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_nullifier_file")]
    pub nullifier_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_timestamp_tolerance_secs")]
    pub timestamp_tolerance_secs: u64,
    #[serde(default = "default_timestamp_max_age_secs")]
    pub timestamp_max_age_secs: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_GROUP_ID,
            depth: DEFAULT_TREE_DEPTH,
            zero_value: None,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            action: default_action(),
        }
    }
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_PROOF_FILE_SIZE,
            max_zk_proof_size: DEFAULT_MAX_ZK_PROOF_SIZE,
            output_file: default_proof_output_file(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            nullifier_file: default_nullifier_file(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ORACLE_TIMEOUT_MS,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: DEFAULT_TIMESTAMP_TOLERANCE_SECS,
            timestamp_max_age_secs: DEFAULT_TIMESTAMP_MAX_AGE_SECS,
        }
    }
}

fn default_group_id() -> u64 {
    DEFAULT_GROUP_ID
}

fn default_tree_depth() -> u32 {
    DEFAULT_TREE_DEPTH
}

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

fn default_max_proof_file_size() -> u64 {
    DEFAULT_MAX_PROOF_FILE_SIZE
}

fn default_max_zk_proof_size() -> usize {
    DEFAULT_MAX_ZK_PROOF_SIZE
}

fn default_proof_output_file() -> PathBuf {
    PathBuf::from("proof.json")
}

fn default_nullifier_file() -> PathBuf {
    PathBuf::from("nullifiers.txt")
}

fn default_oracle_timeout_ms() -> u64 {
    DEFAULT_ORACLE_TIMEOUT_MS
}

fn default_timestamp_tolerance_secs() -> u64 {
    DEFAULT_TIMESTAMP_TOLERANCE_SECS
}

fn default_timestamp_max_age_secs() -> u64 {
    DEFAULT_TIMESTAMP_MAX_AGE_SECS
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn load_from_file_or_default(path: &PathBuf) -> Self {
        Self::load_from_file(path).unwrap_or_default()
    }

    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Applies `ZKP_MAX_PROOF_FILE_SIZE` and `ZKP_MAX_ZK_PROOF_SIZE` if set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(size) = env_override("ZKP_MAX_PROOF_FILE_SIZE") {
            self.proof.max_file_size = size;
        }
        if let Some(size) = env_override("ZKP_MAX_ZK_PROOF_SIZE") {
            self.proof.max_zk_proof_size = size;
        }
        self
    }

    pub fn verification_context(&self) -> VerificationContext {
        VerificationContext::new(&self.context.app_id, &self.context.action)
    }

    /// The configured context, with either identifier replaced by a raw
    /// override. Overrides must be UTF-8.
    pub fn verification_context_with(
        &self,
        app_id: Option<&[u8]>,
        action: Option<&[u8]>,
    ) -> Result<VerificationContext> {
        let context = VerificationContext::from_bytes(
            app_id.unwrap_or(self.context.app_id.as_bytes()),
            action.unwrap_or(self.context.action.as_bytes()),
        )?;
        Ok(context)
    }

    pub fn envelope_limits(&self) -> EnvelopeLimits {
        EnvelopeLimits {
            max_proof_size: self.proof.max_zk_proof_size,
            timestamp_tolerance_secs: self.security.timestamp_tolerance_secs,
            timestamp_max_age_secs: self.security.timestamp_max_age_secs,
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle.timeout_ms)
    }

    pub fn circuit_k(&self) -> u32 {
        self.circuit
            .k
            .unwrap_or_else(|| crate::circuit::min_k(self.group.depth))
    }

    pub fn zero_value(&self) -> Result<crate::utils::FieldElement> {
        match &self.group.zero_value {
            Some(hex) => crate::utils::field_from_hex(hex).context("Invalid group zero_value"),
            None => Ok(crate::utils::FieldElement::zero()),
        }
    }
}
