//! Configuration for the multiwallet core.

use crate::error::{Result, WalletError};
use crate::types::Network;

/// Configuration shared by the registry, the size estimator and the relay.
#[derive(Debug, Clone)]
pub struct Config {
    /// Network the loaded wallets run on.
    pub network: Network,

    /// Confirmations a UTXO needs to count as spendable.
    pub required_confirmations: u32,

    /// Treat unconfirmed outputs as spendable (forces zero required confirmations).
    pub spend_unconfirmed: bool,

    /// Buffered events per event bus before slow receivers lag.
    pub event_capacity: usize,

    /// Outputs assumed by the BTC transaction size estimator.
    pub btc_fee_outputs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            required_confirmations: 1,
            spend_unconfirmed: false,
            event_capacity: 1024,
            btc_fee_outputs: 2,
        }
    }
}

impl Config {
    /// Create a new configuration for the given network.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn mainnet() -> Self {
        Self::new(Network::Mainnet)
    }

    pub fn testnet() -> Self {
        Self::new(Network::Testnet)
    }

    pub fn with_required_confirmations(mut self, confirmations: u32) -> Self {
        self.required_confirmations = confirmations;
        self
    }

    pub fn with_spend_unconfirmed(mut self, enabled: bool) -> Self {
        self.spend_unconfirmed = enabled;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_btc_fee_outputs(mut self, outputs: usize) -> Self {
        self.btc_fee_outputs = outputs;
        self
    }

    /// Confirmation threshold balances are priced with.
    pub fn effective_confirmations(&self) -> u32 {
        if self.spend_unconfirmed {
            0
        } else {
            self.required_confirmations
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(WalletError::Config("event_capacity must be > 0".to_string()));
        }

        if self.btc_fee_outputs == 0 {
            return Err(WalletError::Config("btc_fee_outputs must be > 0".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.effective_confirmations(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_spend_unconfirmed_overrides_threshold() {
        let config = Config::testnet().with_required_confirmations(6).with_spend_unconfirmed(true);
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.effective_confirmations(), 0);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let err = Config::mainnet().with_event_capacity(0).validate().unwrap_err();
        assert!(err.to_string().contains("event_capacity"));

        let err = Config::mainnet().with_btc_fee_outputs(0).validate().unwrap_err();
        assert!(err.to_string().contains("btc_fee_outputs"));
    }
}
