//! Configuration for the chain, relay engine and security modules
//!
//! Every section carries serde defaults, so a partial JSON document only
//! needs to name the values it overrides.
//!
//! ## Example
//!
//! ```rust,ignore
//! use module_wallet_core::config::Config;
//!
//! let config = Config::from_json(r#"{ "relay": { "block_bound": 500 } }"#)?
//!     .with_lock_period(3_600);
//! config.validate()?;
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One day in seconds
pub const DAY: u64 = 24 * 60 * 60;

/// Gas charged by the execution substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    /// Base cost of every top-level transaction
    pub intrinsic: u64,
    /// Cost of entering a call frame
    pub call: u64,
    /// Cost per byte of call data
    pub calldata_byte: u64,
    /// Cost of a storage write
    pub storage_write: u64,
    /// Cost of emitting an event
    pub log: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            intrinsic: 21_000,
            call: 700,
            calldata_byte: 16,
            storage_write: 5_000,
            log: 375,
        }
    }
}

/// Execution substrate settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Gas schedule
    pub gas: GasSchedule,
    /// Upper bound on a single transaction's gas limit
    pub tx_gas_limit: u64,
    /// Maximum nested call depth
    pub max_call_depth: usize,
    /// Seconds added per block by `advance_blocks`
    pub block_time: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            gas: GasSchedule::default(),
            tx_gas_limit: 8_000_000,
            max_call_depth: 64,
            block_time: 12,
        }
    }
}

/// Relay engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Look-ahead window (in blocks) for the block component of a nonce
    pub block_bound: u64,
    /// Fixed gas overhead added to the measured gas of a refunded execution
    pub refund_overhead_gas: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            block_bound: 10_000,
            refund_overhead_gas: 29_292,
        }
    }
}

/// Lock and recovery timing used by the security modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Duration of a guardian lock, in seconds
    pub lock_period: u64,
    /// Delay before a recovery can be finalized, in seconds
    pub recovery_period: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            lock_period: 5 * DAY,
            recovery_period: 36 * 60 * 60,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution substrate
    pub chain: ChainConfig,
    /// Relay engine
    pub relay: RelayConfig,
    /// Security modules
    pub security: SecurityConfig,
}

impl Config {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_json(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the system unusable
    pub fn validate(&self) -> Result<()> {
        if self.chain.max_call_depth == 0 {
            return Err(Error::InvalidConfig("max_call_depth must be positive".into()));
        }
        if self.chain.tx_gas_limit < self.chain.gas.intrinsic {
            return Err(Error::InvalidConfig(
                "tx_gas_limit is below the intrinsic gas".into(),
            ));
        }
        if self.relay.block_bound == 0 {
            return Err(Error::InvalidConfig("block_bound must be positive".into()));
        }
        if self.security.lock_period == 0 {
            return Err(Error::InvalidConfig("lock_period must be positive".into()));
        }
        if self.security.recovery_period == 0 {
            return Err(Error::InvalidConfig("recovery_period must be positive".into()));
        }
        Ok(())
    }

    /// Set the nonce look-ahead window
    pub fn with_block_bound(mut self, blocks: u64) -> Self {
        self.relay.block_bound = blocks;
        self
    }

    /// Set the refund overhead
    pub fn with_refund_overhead(mut self, gas: u64) -> Self {
        self.relay.refund_overhead_gas = gas;
        self
    }

    /// Set the lock period in seconds
    pub fn with_lock_period(mut self, seconds: u64) -> Self {
        self.security.lock_period = seconds;
        self
    }

    /// Set the recovery period in seconds
    pub fn with_recovery_period(mut self, seconds: u64) -> Self {
        self.security.recovery_period = seconds;
        self
    }

    /// Set the per-transaction gas cap
    pub fn with_tx_gas_limit(mut self, gas: u64) -> Self {
        self.chain.tx_gas_limit = gas;
        self
    }
}
