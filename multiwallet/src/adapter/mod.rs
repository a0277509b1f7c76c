//! Asset adapters.
//!
//! One adapter per supported asset translates its wallet engine's accounts,
//! balances and unspent outputs into the shared model. Callers hold an
//! `Arc<dyn AssetAdapter>` and only pick the concrete type when a wallet is
//! loaded.

pub mod btc;
pub mod dcr;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    ADDRESS_GAP_LIMIT, AccountProperties, Balance, MixerAccounts, SizeEstimate, UnspentOutput,
};
use crate::types::{Amount, AssetType};

pub use btc::{BtcAdapter, BtcWalletBackend};
pub use dcr::{DcrAdapter, DcrWalletBackend};

/// Accounts listed by an adapter, before balances are priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountListing {
    /// Backend order, stable between calls.
    pub accounts: Vec<AccountProperties>,
    pub current_block_hash: [u8; 32],
    pub current_block_height: i32,
}

/// Capability set every asset backend is reached through.
#[async_trait]
pub trait AssetAdapter: Send + Sync {
    /// The asset served by this adapter.
    fn asset(&self) -> AssetType;

    /// List accounts in backend order. Key counts include the gap limit.
    async fn list_accounts(&self) -> Result<AccountListing>;

    /// Balance of one account using the given confirmation threshold.
    async fn account_balance(
        &self,
        account_number: u32,
        required_confirmations: u32,
    ) -> Result<Balance>;

    /// Spendable funds of one account.
    async fn spendable_for_account(
        &self,
        account_number: u32,
        required_confirmations: u32,
    ) -> Result<Amount> {
        Ok(self.account_balance(account_number, required_confirmations).await?.spendable)
    }

    /// Every unspent output of an account, regardless of confirmations.
    ///
    /// The backend lists outputs by the account's current name; the outputs
    /// are tagged with `account_number`.
    async fn list_unspent(
        &self,
        account_number: u32,
        account_name: &str,
    ) -> Result<Vec<UnspentOutput>>;

    /// Create the next account. Fails with `WalletLocked` without touching the
    /// backend if the wallet is not unlocked.
    async fn next_account(&self, account_name: &str) -> Result<u32>;

    async fn rename_account(&self, account_number: u32, new_name: &str) -> Result<()>;

    async fn account_name(&self, account_number: u32) -> Result<String>;

    /// Exact, case-sensitive lookup of an account number by name.
    async fn account_number(&self, account_name: &str) -> Result<u32>;

    fn is_locked(&self) -> bool;

    async fn unlock_wallet(&self, passphrase: &str) -> Result<()>;

    fn lock_wallet(&self);

    /// Size a signed input spending `output` adds to a transaction, if the
    /// asset estimates sizes at all.
    fn input_size(&self, output: &UnspentOutput) -> Option<usize>;

    /// Estimated size of a transaction with `input_count` inputs whose sizes
    /// add up to `inputs_size`.
    fn estimate_size(&self, input_count: usize, inputs_size: usize) -> SizeEstimate;

    /// Estimated size of a transaction spending `inputs`.
    fn estimate_tx_size(&self, inputs: &[UnspentOutput]) -> SizeEstimate {
        let mut inputs_size = 0;
        for input in inputs {
            match self.input_size(input) {
                Some(size) => inputs_size += size,
                None => return SizeEstimate::Unavailable,
            }
        }
        self.estimate_size(inputs.len(), inputs_size)
    }

    /// Designated mixer accounts, if the asset supports mixing.
    fn mixer_accounts(&self) -> Option<MixerAccounts> {
        None
    }

    async fn is_mixer_active(&self) -> Result<bool> {
        Ok(false)
    }

    async fn start_mixer(&self, _passphrase: &str) -> Result<()> {
        Err(crate::error::WalletError::Unavailable(format!(
            "{} wallets have no account mixer",
            self.asset()
        )))
    }

    async fn stop_mixer(&self) -> Result<()> {
        Err(crate::error::WalletError::Unavailable(format!(
            "{} wallets have no account mixer",
            self.asset()
        )))
    }

    /// HD derivation path of an account, e.g. `m/84'/0'/3'`.
    fn hd_path_for_account(&self, account_number: u32) -> String;
}

/// Surface backend key counts with the lookahead buffer added.
///
/// Both adapters build their `AccountProperties` through this function so the
/// gap limit is added exactly once.
pub fn apply_gap_limit(
    account_number: u32,
    account_name: String,
    external_key_count: u32,
    internal_key_count: u32,
    imported_key_count: u32,
) -> AccountProperties {
    AccountProperties {
        account_number,
        account_name,
        external_key_count: external_key_count.saturating_add(ADDRESS_GAP_LIMIT),
        internal_key_count: internal_key_count.saturating_add(ADDRESS_GAP_LIMIT),
        imported_key_count,
    }
}

/// Keeps a wallet unlocked while alive and locks it again when dropped.
///
/// The lock is released on every exit path of the scope holding the guard,
/// including early returns through `?` and unwinding.
pub struct UnlockGuard {
    adapter: Arc<dyn AssetAdapter>,
}

impl UnlockGuard {
    pub async fn acquire(adapter: Arc<dyn AssetAdapter>, passphrase: &str) -> Result<Self> {
        adapter.unlock_wallet(passphrase).await?;
        Ok(Self {
            adapter,
        })
    }

    pub fn adapter(&self) -> &dyn AssetAdapter {
        self.adapter.as_ref()
    }
}

impl Drop for UnlockGuard {
    fn drop(&mut self) {
        self.adapter.lock_wallet();
        tracing::trace!("{} wallet locked after scoped unlock", self.adapter.asset());
    }
}
