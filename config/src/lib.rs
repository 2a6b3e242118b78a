//! Shroud Configuration
//!
//! Shared configuration crate for the wallet core and its operator CLI.
//!
//! Handles loading configuration from:
//! 1. SHROUD_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.shroud/config.toml (user home)
//!
//! Environment variables take precedence over TOML config. The loaded
//! value is handed to constructors explicitly; there is no global instance.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".shroud";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DB_PATH: &str = "./shroud-notes";
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_DEPOSIT_SUBMIT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PROOF_TIMEOUT_SECS: u64 = 120;
const DEFAULT_WITHDRAW_SUBMIT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ORPHAN_AFTER_SECS: u64 = 3600;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShroudConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub deposit: DepositTomlConfig,
    #[serde(default)]
    pub withdrawal: WithdrawalTomlConfig,
    #[serde(default)]
    pub sync: SyncTomlConfig,
    #[serde(default)]
    pub ledger: LedgerTomlConfig,
}

/// Note store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

/// Deposit timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositTomlConfig {
    /// Upper bound on `submitDeposit` before the note is left pending
    #[serde(default = "default_deposit_submit_timeout")]
    pub submit_timeout_secs: u64,
    /// How long the confirmation watcher waits before leaving the note to sync
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

impl Default for DepositTomlConfig {
    fn default() -> Self {
        Self {
            submit_timeout_secs: default_deposit_submit_timeout(),
            confirmation_timeout_secs: default_confirmation_timeout(),
        }
    }
}

fn default_deposit_submit_timeout() -> u64 {
    DEFAULT_DEPOSIT_SUBMIT_TIMEOUT_SECS
}

fn default_confirmation_timeout() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

/// Withdrawal timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalTomlConfig {
    #[serde(default = "default_proof_timeout")]
    pub proof_timeout_secs: u64,
    #[serde(default = "default_withdraw_submit_timeout")]
    pub submit_timeout_secs: u64,
}

impl Default for WithdrawalTomlConfig {
    fn default() -> Self {
        Self {
            proof_timeout_secs: default_proof_timeout(),
            submit_timeout_secs: default_withdraw_submit_timeout(),
        }
    }
}

fn default_proof_timeout() -> u64 {
    DEFAULT_PROOF_TIMEOUT_SECS
}

fn default_withdraw_submit_timeout() -> u64 {
    DEFAULT_WITHDRAW_SUBMIT_TIMEOUT_SECS
}

/// Reconciliation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTomlConfig {
    /// Pending notes not found on the ledger after this long become orphaned
    #[serde(default = "default_orphan_after")]
    pub orphan_after_secs: u64,
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
}

impl Default for SyncTomlConfig {
    fn default() -> Self {
        Self {
            orphan_after_secs: default_orphan_after(),
            interval_secs: default_sync_interval(),
        }
    }
}

fn default_orphan_after() -> u64 {
    DEFAULT_ORPHAN_AFTER_SECS
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

/// Ledger endpoint used by the application's ledger client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTomlConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default)]
    pub pool_address: Option<String>,
}

impl Default for LedgerTomlConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            pool_address: None,
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl ShroudConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHROUD_CONFIG env var
        if let Ok(path) = env::var("SHROUD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("SHROUD_CONFIG points at missing file: {}", path.display());
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shroud/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        env_string("SHROUD_DB_PATH", &mut self.database.path);

        env_parse(
            "SHROUD_DEPOSIT_SUBMIT_TIMEOUT_SECS",
            &mut self.deposit.submit_timeout_secs,
        );
        env_parse(
            "SHROUD_CONFIRMATION_TIMEOUT_SECS",
            &mut self.deposit.confirmation_timeout_secs,
        );

        env_parse(
            "SHROUD_PROOF_TIMEOUT_SECS",
            &mut self.withdrawal.proof_timeout_secs,
        );
        env_parse(
            "SHROUD_WITHDRAW_SUBMIT_TIMEOUT_SECS",
            &mut self.withdrawal.submit_timeout_secs,
        );

        env_parse("SHROUD_ORPHAN_AFTER_SECS", &mut self.sync.orphan_after_secs);
        env_parse("SHROUD_SYNC_INTERVAL_SECS", &mut self.sync.interval_secs);

        env_string("SHROUD_RPC_URL", &mut self.ledger.rpc_url);
        env_option_string("SHROUD_POOL_ADDRESS", &mut self.ledger.pool_address);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.ledger.pool_address = Some("0x0000000000000000000000000000000000000000".into());
        let body = toml::to_string_pretty(&sample).unwrap_or_default();
        format!(
            "# Shroud wallet configuration\n\
             # Every value can be overridden with the matching SHROUD_* environment variable.\n\n{body}"
        )
    }

    pub fn deposit_submit_timeout(&self) -> Duration {
        Duration::from_secs(self.deposit.submit_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.deposit.confirmation_timeout_secs)
    }

    pub fn proof_timeout(&self) -> Duration {
        Duration::from_secs(self.withdrawal.proof_timeout_secs)
    }

    pub fn withdraw_submit_timeout(&self) -> Duration {
        Duration::from_secs(self.withdrawal.submit_timeout_secs)
    }

    pub fn orphan_after(&self) -> Duration {
        Duration::from_secs(self.sync.orphan_after_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShroudConfig::default();
        assert_eq!(config.database.path, DEFAULT_DB_PATH);
        assert_eq!(config.ledger.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.sync.orphan_after_secs, DEFAULT_ORPHAN_AFTER_SECS);
        assert!(config.ledger.pool_address.is_none());
    }

    #[test]
    fn test_generate_sample() {
        let sample = ShroudConfig::generate_sample();
        assert!(sample.contains("[database]"));
        assert!(sample.contains("[deposit]"));
        assert!(sample.contains("[withdrawal]"));
        assert!(sample.contains("[sync]"));
        assert!(sample.contains("[ledger]"));
    }

    #[test]
    fn test_parse_sample() {
        let sample = ShroudConfig::generate_sample();
        let parsed: ShroudConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.database.path, DEFAULT_DB_PATH);
        assert!(parsed.ledger.pool_address.is_some());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[withdrawal]\nproof_timeout_secs = 5\n").unwrap();

        let config = ShroudConfig::parse_file(&path).unwrap();
        assert_eq!(config.withdrawal.proof_timeout_secs, 5);
        assert_eq!(
            config.withdrawal.submit_timeout_secs,
            DEFAULT_WITHDRAW_SUBMIT_TIMEOUT_SECS
        );
        assert_eq!(config.proof_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sync\norphan_after_secs = ").unwrap();

        assert!(ShroudConfig::parse_file(&path).is_err());
    }
}
