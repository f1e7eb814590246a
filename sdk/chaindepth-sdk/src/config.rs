use crate::core::constants::{
    session_instruction_bits, DEFAULT_PROGRAM_ID, DEFAULT_RPC_URL,
    DEFAULT_SESSION_MAX_TOKEN_SPEND, DEFAULT_SESSION_MINUTES, DEFAULT_SKR_MINT, SLOTS_PER_MINUTE,
};
use crate::error::{ChainDepthSdkError, Result};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

/// Client configuration. Every field has a default, so an empty TOML
/// document is a valid devnet configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base58 program id
    pub program_id: String,
    /// Base58 SKR mint
    pub skr_mint: String,
    pub primary_rpc_url: String,
    pub fallback_rpc_url: Option<String>,
    pub transport: TransportSettings,
    pub session: SessionSettings,
    pub reconcile: ReconcileSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID.to_string(),
            skr_mint: DEFAULT_SKR_MINT.to_string(),
            primary_rpc_url: DEFAULT_RPC_URL.to_string(),
            fallback_rpc_url: None,
            transport: TransportSettings::default(),
            session: SessionSettings::default(),
            reconcile: ReconcileSettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ChainDepthSdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.program_id()?;
        self.skr_mint()?;
        if self.primary_rpc_url.trim().is_empty() {
            return Err(ChainDepthSdkError::Config(
                "primary_rpc_url must not be empty".to_string(),
            ));
        }
        if self.transport.max_attempts_per_endpoint == 0 {
            return Err(ChainDepthSdkError::Config(
                "transport.max_attempts_per_endpoint must be at least 1".to_string(),
            ));
        }
        if self.session.allowlist == 0 {
            return Err(ChainDepthSdkError::Config(
                "session.allowlist must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn program_id(&self) -> Result<Pubkey> {
        parse_pubkey("program_id", &self.program_id)
    }

    pub fn skr_mint(&self) -> Result<Pubkey> {
        parse_pubkey("skr_mint", &self.skr_mint)
    }
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value)
        .map_err(|e| ChainDepthSdkError::Config(format!("{}: {} ({})", field, e, value)))
}

/// Submission retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    pub max_attempts_per_endpoint: u32,
    /// Delay before retry `n` is `base_retry_delay_ms * n`
    pub base_retry_delay_ms: u64,
    pub raw_probe_timeout_secs: u64,
    /// Raw probe bodies longer than this are truncated in logs
    pub raw_body_log_limit: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_attempts_per_endpoint: 2,
            base_retry_delay_ms: 300,
            raw_probe_timeout_secs: 20,
            raw_body_log_limit: 2000,
        }
    }
}

impl TransportSettings {
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms.saturating_mul(attempt as u64))
    }

    pub fn raw_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.raw_probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub duration_minutes: u64,
    pub max_token_spend: u64,
    /// Instruction allowlist bitmask requested when beginning a session
    pub allowlist: u64,
    /// A lease this close to expiry is treated as expired
    pub expiry_margin_secs: i64,
    pub slots_per_minute: u64,
    /// Begin a session on demand when an action prefers session signing
    pub auto_begin: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration_minutes: DEFAULT_SESSION_MINUTES,
            max_token_spend: DEFAULT_SESSION_MAX_TOKEN_SPEND,
            allowlist: session_instruction_bits::ALL_GAMEPLAY,
            expiry_margin_secs: 15,
            slots_per_minute: SLOTS_PER_MINUTE,
            auto_begin: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileSettings {
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
    pub loot_refresh_attempts: u32,
    pub loot_refresh_interval_ms: u64,
    pub exit_retry_delay_ms: u64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            poll_interval_ms: 250,
            loot_refresh_attempts: 6,
            loot_refresh_interval_ms: 180,
            exit_retry_delay_ms: 220,
        }
    }
}

impl ReconcileSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn loot_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.loot_refresh_interval_ms)
    }

    pub fn exit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.exit_retry_delay_ms)
    }
}
