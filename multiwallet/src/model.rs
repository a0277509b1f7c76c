//! Asset-agnostic account, balance and UTXO model.
//!
//! Every asset adapter produces these types; the registry, aggregator and
//! selection engine never see backend-native representations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Amount, WalletId};

/// Lookahead addresses added on top of the backend's external/internal key counts.
pub const ADDRESS_GAP_LIMIT: u32 = 20;

/// Account number of the imported-keys pseudo-account.
pub const IMPORTED_ACCOUNT_NUMBER: u32 = 2_147_483_647;

/// Balance of a single account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub total: Amount,
    /// Confirmed funds meeting the required-confirmations threshold.
    pub spendable: Amount,
    /// Coinbase and stake rewards that are not spendable yet.
    pub immature_reward: Amount,
}

/// Account metadata as surfaced by an asset adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProperties {
    pub account_number: u32,
    pub account_name: String,
    pub external_key_count: u32,
    pub internal_key_count: u32,
    pub imported_key_count: u32,
}

/// An account together with its wallet and priced balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub wallet_id: WalletId,
    #[serde(flatten)]
    pub properties: AccountProperties,
    pub balance: Balance,
}

impl Account {
    pub fn number(&self) -> u32 {
        self.properties.account_number
    }

    pub fn name(&self) -> &str {
        &self.properties.account_name
    }

    pub fn is_imported(&self) -> bool {
        self.properties.account_number == IMPORTED_ACCOUNT_NUMBER
    }
}

/// A complete accounts snapshot for one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accounts {
    pub accounts: Vec<Account>,
    #[serde(with = "hex::serde")]
    pub current_block_hash: [u8; 32],
    pub current_block_height: i32,
}

impl Accounts {
    /// Find an account by number.
    pub fn get(&self, account_number: u32) -> Option<&Account> {
        self.accounts.iter().find(|a| a.number() == account_number)
    }

    /// Textual form used when handing the snapshot across a process or FFI boundary.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Identity of an unspent output across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPointRef {
    pub txid: String,
    pub vout: u32,
}

impl OutPointRef {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

/// An unspent transaction output belonging to one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    pub script_pub_key: String,
    pub redeem_script: Option<String>,
    pub amount: Amount,
    pub confirmations: i64,
    pub receive_time: DateTime<Utc>,
    pub spendable: bool,
    pub account_number: u32,
}

impl UnspentOutput {
    pub fn outpoint(&self) -> OutPointRef {
        OutPointRef::new(self.txid.clone(), self.vout)
    }

    pub fn is_outpoint(&self, outpoint: &OutPointRef) -> bool {
        self.vout == outpoint.vout && self.txid == outpoint.txid
    }
}

/// Mixed and unmixed account numbers of a mixer-capable wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerAccounts {
    pub mixed: u32,
    pub unmixed: u32,
}

/// Total balances of the mixed and unmixed accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MixingBalances {
    pub mixed: Amount,
    pub unmixed: Amount,
}

/// Estimated serialized size of a transaction spending a set of inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeEstimate {
    Bytes(usize),
    /// The asset's backend cannot estimate sizes.
    Unavailable,
}

impl SizeEstimate {
    pub fn bytes(&self) -> Option<usize> {
        match self {
            SizeEstimate::Bytes(n) => Some(*n),
            SizeEstimate::Unavailable => None,
        }
    }
}
