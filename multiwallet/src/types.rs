//! Common type definitions shared by every component.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Opaque wallet identifier, unique within the running process.
pub type WalletId = u32;

/// Number of smallest units in one whole coin (satoshis per BTC, atoms per DCR).
pub const UNITS_PER_COIN: u64 = 100_000_000;

/// The chain a wallet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetType {
    /// Plain UTXO coin with a transaction size estimator.
    Btc,
    /// UTXO coin with staking and an account mixer.
    Dcr,
}

impl AssetType {
    /// Ticker used when formatting amounts.
    pub fn ticker(&self) -> &'static str {
        match self {
            AssetType::Btc => "BTC",
            AssetType::Dcr => "DCR",
        }
    }

    /// Whether wallets of this asset have designated mixed/unmixed accounts.
    pub fn supports_mixing(&self) -> bool {
        matches!(self, AssetType::Dcr)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

/// Network the loaded wallets operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

/// An amount in the smallest integer unit of an asset.
///
/// Floating point never enters this type; [`Amount::to_coin_string`] is for
/// display only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_sat(units: u64) -> Self {
        Amount(units)
    }

    pub const fn to_sat(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Format as whole coins with eight decimals, e.g. `0.00250000`.
    pub fn to_coin_string(self) -> String {
        format!("{}.{:08}", self.0 / UNITS_PER_COIN, self.0 % UNITS_PER_COIN)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Amount(units)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
