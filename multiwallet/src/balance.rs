//! Balance aggregation over registry snapshots.
//!
//! All sums are taken in the smallest unit as `u128`, wide enough that adding
//! up any number of `u64` account balances cannot overflow in practice.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::model::{Account, MixerAccounts, MixingBalances};
use crate::registry::AccountRegistry;
use crate::types::{AssetType, WalletId};

/// Folded balance of every account in a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletBalance {
    pub total: u128,
    pub spendable: u128,
    pub immature_reward: u128,
}

impl WalletBalance {
    pub fn add_account(&mut self, account: &Account) {
        self.total += u128::from(account.balance.total.to_sat());
        self.spendable += u128::from(account.balance.spendable.to_sat());
        self.immature_reward += u128::from(account.balance.immature_reward.to_sat());
    }
}

/// Computes per-wallet and cross-wallet totals from the account registry.
#[derive(Clone)]
pub struct BalanceAggregator {
    registry: Arc<AccountRegistry>,
}

impl BalanceAggregator {
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        Self {
            registry,
        }
    }

    pub async fn wallet_balance(&self, wallet_id: WalletId) -> Result<WalletBalance> {
        let snapshot = self.registry.accounts_or_refresh(wallet_id).await?;
        let mut balance = WalletBalance::default();
        for account in &snapshot.accounts {
            balance.add_account(account);
        }
        Ok(balance)
    }

    pub async fn total_for_wallet(&self, wallet_id: WalletId) -> Result<u128> {
        Ok(self.wallet_balance(wallet_id).await?.total)
    }

    pub async fn spendable_for_wallet(&self, wallet_id: WalletId) -> Result<u128> {
        Ok(self.wallet_balance(wallet_id).await?.spendable)
    }

    pub async fn immature_for_wallet(&self, wallet_id: WalletId) -> Result<u128> {
        Ok(self.wallet_balance(wallet_id).await?.immature_reward)
    }

    /// Sum of the wallets' totals. Callers pass wallets of a single asset.
    pub async fn total_across_wallets(&self, wallet_ids: &[WalletId]) -> Result<u128> {
        let mut total = 0u128;
        for wallet_id in wallet_ids {
            total += self.total_for_wallet(*wallet_id).await?;
        }
        Ok(total)
    }

    /// Totals of every registered wallet, grouped by asset.
    pub async fn totals_by_asset(&self) -> Result<BTreeMap<AssetType, u128>> {
        let mut totals = BTreeMap::new();
        for wallet_id in self.registry.wallet_ids().await {
            let asset = self.registry.wallet_asset(wallet_id).await?;
            let total = self.total_for_wallet(wallet_id).await?;
            *totals.entry(asset).or_insert(0u128) += total;
        }
        Ok(totals)
    }

    /// Balances of the wallet's mixed and unmixed accounts.
    pub async fn mixing_balances(&self, wallet_id: WalletId) -> Result<MixingBalances> {
        let adapter = self.registry.adapter(wallet_id).await?;
        let mixer_accounts = adapter.mixer_accounts().ok_or_else(|| {
            WalletError::Unavailable(format!(
                "wallet {} ({}) has no mixer accounts",
                wallet_id,
                adapter.asset()
            ))
        })?;

        let snapshot = self.registry.accounts_or_refresh(wallet_id).await?;
        Ok(split_mixing(&snapshot.accounts, mixer_accounts))
    }
}

/// Split account totals into the mixed and unmixed buckets.
///
/// Accounts that are neither the mixed nor the unmixed account are ignored.
pub fn split_mixing(accounts: &[Account], mixer_accounts: MixerAccounts) -> MixingBalances {
    let mut balances = MixingBalances::default();
    for account in accounts {
        if account.number() == mixer_accounts.mixed {
            balances.mixed = account.balance.total;
        } else if account.number() == mixer_accounts.unmixed {
            balances.unmixed = account.balance.total;
        }
    }
    balances
}
