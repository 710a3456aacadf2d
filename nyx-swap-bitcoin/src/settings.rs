//! Swap-side settings.
//!
//! Settings are negotiated before a swap starts and treated as immutable for
//! its whole lifetime; the provider trait only hands out snapshots.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use nyx_swap::SubTxId;

use crate::{DEFAULT_LOCK_TIME_IN_BLOCKS, DEFAULT_TX_MIN_CONFIRMATIONS};

/// Bitcoin network selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Network {
    /// Bitcoin mainnet.
    #[default]
    Mainnet,
    /// Bitcoin testnet.
    Testnet,
    /// Bitcoin regtest (local development).
    Regtest,
}

impl Network {
    /// Get the network name.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }

    /// Convert to the bitcoin crate network type.
    pub fn to_bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

/// Per-swap Bitcoin-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSettings {
    /// Network the swap runs on.
    pub network: Network,

    /// Global fee rate in satoshi per 1000 vbytes.
    pub fee_rate: u64,

    /// Fee-rate overrides for individual sub-transactions.
    pub fee_overrides: BTreeMap<SubTxId, u64>,

    /// Confirmations required before the lock output counts as final.
    pub min_confirmations: u16,

    /// Safety margin, in Bitcoin blocks, for the proposed lock height.
    pub lock_time_in_blocks: u32,
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            fee_rate: 1000,
            fee_overrides: BTreeMap::new(),
            min_confirmations: DEFAULT_TX_MIN_CONFIRMATIONS,
            lock_time_in_blocks: DEFAULT_LOCK_TIME_IN_BLOCKS,
        }
    }
}

impl SwapSettings {
    /// Create settings for a network with the default policy.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Set the global fee rate (satoshi per kvB).
    pub fn with_fee_rate(mut self, fee_rate: u64) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    /// Override the fee rate for one sub-transaction.
    pub fn with_fee_override(mut self, sub_tx: SubTxId, fee_rate: u64) -> Self {
        self.fee_overrides.insert(sub_tx, fee_rate);
        self
    }

    /// Set the confirmation threshold.
    pub fn with_min_confirmations(mut self, confirmations: u16) -> Self {
        self.min_confirmations = confirmations;
        self
    }

    /// Set the lock-height safety margin.
    pub fn with_lock_time_in_blocks(mut self, blocks: u32) -> Self {
        self.lock_time_in_blocks = blocks;
        self
    }

    /// Effective fee rate for a sub-transaction.
    pub fn fee_for(&self, sub_tx: SubTxId) -> u64 {
        self.fee_overrides
            .get(&sub_tx)
            .copied()
            .unwrap_or(self.fee_rate)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.fee_rate == 0 {
            return Err("fee rate must be positive".into());
        }
        if self.min_confirmations == 0 {
            return Err("minimum confirmations must be at least 1".into());
        }
        if self.lock_time_in_blocks == 0 {
            return Err("lock time margin must be at least 1 block".into());
        }
        Ok(())
    }
}

/// Read-only source of swap settings.
pub trait SettingsProvider: Send + Sync {
    /// Snapshot of the current settings.
    fn settings(&self) -> SwapSettings;
}

/// Settings provider backed by a fixed in-memory value.
pub struct StaticSettings {
    inner: Mutex<SwapSettings>,
}

impl StaticSettings {
    /// Wrap a settings value.
    pub fn new(settings: SwapSettings) -> Self {
        Self {
            inner: Mutex::new(settings),
        }
    }
}

impl SettingsProvider for StaticSettings {
    fn settings(&self) -> SwapSettings {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_builder() {
        let settings = SwapSettings::new(Network::Regtest)
            .with_fee_rate(2000)
            .with_fee_override(SubTxId::Refund, 5000)
            .with_min_confirmations(3)
            .with_lock_time_in_blocks(24);

        assert_eq!(settings.network, Network::Regtest);
        assert_eq!(settings.fee_rate, 2000);
        assert_eq!(settings.min_confirmations, 3);
        assert_eq!(settings.lock_time_in_blocks, 24);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_fee_lookup_prefers_override() {
        let settings = SwapSettings::default().with_fee_override(SubTxId::Redeem, 4000);

        assert_eq!(settings.fee_for(SubTxId::Redeem), 4000);
        assert_eq!(settings.fee_for(SubTxId::Lock), settings.fee_rate);
    }

    #[test]
    fn test_validate_rejects_zero_fee() {
        let settings = SwapSettings::default().with_fee_rate(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_network_mapping() {
        assert_eq!(
            Network::Regtest.to_bitcoin_network(),
            bitcoin::Network::Regtest
        );
        assert_eq!(Network::Mainnet.name(), "mainnet");
    }

    #[test]
    fn test_settings_serde() {
        let settings = SwapSettings::default().with_fee_override(SubTxId::Lock, 1500);
        let json = serde_json::to_string(&settings).unwrap();
        let back: SwapSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_static_provider_snapshots() {
        let provider = StaticSettings::new(SwapSettings::default().with_fee_rate(777));
        assert_eq!(provider.settings().fee_rate, 777);
    }
}
