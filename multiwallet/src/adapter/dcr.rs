//! DCR asset adapter.
//!
//! The DCR engine reports amounts as signed atoms and splits immature funds
//! into coinbase and stake-generation rewards. It also owns the account mixer
//! and the wallet's designated mixed/unmixed accounts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use thiserror::Error;

use super::{AccountListing, AssetAdapter, apply_gap_limit};
use crate::error::{Result, WalletError};
use crate::model::{Balance, MixerAccounts, SizeEstimate, UnspentOutput};
use crate::types::{Amount, AssetType, Network};

const MAINNET_HD_PATH: &str = "m/44'/42'/";
const TESTNET_HD_PATH: &str = "m/44'/1'/";

/// Errors reported by the DCR wallet engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DcrBackendError {
    #[error("item does not exist: {0}")]
    NotExist(String),

    #[error("wallet locked")]
    Locked,

    #[error("{0}")]
    Backend(String),
}

impl From<DcrBackendError> for WalletError {
    fn from(err: DcrBackendError) -> Self {
        match err {
            DcrBackendError::NotExist(what) => WalletError::NotFound(what),
            DcrBackendError::Locked => WalletError::WalletLocked,
            DcrBackendError::Backend(msg) => WalletError::BackendFailure(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcrAccount {
    pub account_number: u32,
    pub account_name: String,
    pub external_key_count: u32,
    pub internal_key_count: u32,
    pub imported_key_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcrAccountsResult {
    pub accounts: Vec<DcrAccount>,
    pub current_block_hash: [u8; 32],
    pub current_block_height: i32,
}

/// Account balance in atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DcrBalance {
    pub total: i64,
    pub spendable: i64,
    pub immature_coinbase_rewards: i64,
    pub immature_stake_generation: i64,
    pub locked_by_tickets: i64,
    pub voting_authority: i64,
    pub unconfirmed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcrUnspent {
    pub tx_hash: String,
    pub output_index: u32,
    pub address: String,
    pub pk_script: String,
    /// Amount in atoms.
    pub amount: i64,
    pub confirmations: i32,
    /// Unix timestamp in seconds.
    pub received_time: i64,
}

/// The DCR wallet engine.
#[async_trait]
pub trait DcrWalletBackend: Send + Sync {
    async fn accounts(&self) -> std::result::Result<DcrAccountsResult, DcrBackendError>;

    async fn account_balance(
        &self,
        account_number: u32,
        required_confirmations: u32,
    ) -> std::result::Result<DcrBalance, DcrBackendError>;

    async fn unspent_outputs(
        &self,
        account_name: &str,
    ) -> std::result::Result<Vec<DcrUnspent>, DcrBackendError>;

    async fn next_account(&self, account_name: &str) -> std::result::Result<u32, DcrBackendError>;

    async fn rename_account(
        &self,
        account_number: u32,
        new_name: &str,
    ) -> std::result::Result<(), DcrBackendError>;

    async fn account_name(&self, account_number: u32)
    -> std::result::Result<String, DcrBackendError>;

    async fn account_number(&self, account_name: &str)
    -> std::result::Result<u32, DcrBackendError>;

    fn is_locked(&self) -> bool;

    async fn unlock(&self, passphrase: &str) -> std::result::Result<(), DcrBackendError>;

    fn lock(&self);

    /// Account receiving mixed outputs, if the mixer has been configured.
    fn mixed_account_number(&self) -> Option<u32>;

    /// Account the mixer takes unmixed funds from, if configured.
    fn unmixed_account_number(&self) -> Option<u32>;

    async fn is_account_mixer_active(&self) -> std::result::Result<bool, DcrBackendError>;

    async fn start_account_mixer(&self, passphrase: &str)
    -> std::result::Result<(), DcrBackendError>;

    async fn stop_account_mixer(&self) -> std::result::Result<(), DcrBackendError>;
}

/// Adapter exposing a [`DcrWalletBackend`] through [`AssetAdapter`].
pub struct DcrAdapter {
    backend: Arc<dyn DcrWalletBackend>,
    network: Network,
}

impl DcrAdapter {
    pub fn new(backend: Arc<dyn DcrWalletBackend>, network: Network) -> Self {
        Self {
            backend,
            network,
        }
    }
}

/// Convert signed atoms to an [`Amount`]; negative values are a backend fault.
fn atoms(value: i64, field: &str) -> Result<Amount> {
    u64::try_from(value).map(Amount::from_sat).map_err(|_| {
        WalletError::BackendFailure(format!("negative {} reported: {} atoms", field, value))
    })
}

#[async_trait]
impl AssetAdapter for DcrAdapter {
    fn asset(&self) -> AssetType {
        AssetType::Dcr
    }

    async fn list_accounts(&self) -> Result<AccountListing> {
        let resp = self.backend.accounts().await?;
        let accounts = resp
            .accounts
            .into_iter()
            .map(|a| {
                apply_gap_limit(
                    a.account_number,
                    a.account_name,
                    a.external_key_count,
                    a.internal_key_count,
                    a.imported_key_count,
                )
            })
            .collect();

        Ok(AccountListing {
            accounts,
            current_block_hash: resp.current_block_hash,
            current_block_height: resp.current_block_height,
        })
    }

    async fn account_balance(
        &self,
        account_number: u32,
        required_confirmations: u32,
    ) -> Result<Balance> {
        let bal = self.backend.account_balance(account_number, required_confirmations).await?;

        let immature = bal
            .immature_coinbase_rewards
            .checked_add(bal.immature_stake_generation)
            .ok_or_else(|| WalletError::BackendFailure("immature reward overflow".to_string()))?;

        Ok(Balance {
            total: atoms(bal.total, "total balance")?,
            spendable: atoms(bal.spendable, "spendable balance")?,
            immature_reward: atoms(immature, "immature reward")?,
        })
    }

    async fn list_unspent(
        &self,
        account_number: u32,
        account_name: &str,
    ) -> Result<Vec<UnspentOutput>> {
        let unspents = self.backend.unspent_outputs(account_name).await?;

        unspents
            .into_iter()
            .map(|utxo| {
                let receive_time =
                    DateTime::from_timestamp(utxo.received_time, 0).ok_or_else(|| {
                        WalletError::BackendFailure(format!(
                            "invalid receive time {} for {}:{}",
                            utxo.received_time, utxo.tx_hash, utxo.output_index
                        ))
                    })?;

                Ok(UnspentOutput {
                    amount: atoms(utxo.amount, "output amount")?,
                    txid: utxo.tx_hash,
                    vout: utxo.output_index,
                    address: utxo.address,
                    script_pub_key: utxo.pk_script,
                    redeem_script: None,
                    confirmations: i64::from(utxo.confirmations),
                    receive_time,
                    // the DCR engine only lists outputs it is able to spend
                    spendable: true,
                    account_number,
                })
            })
            .collect()
    }

    async fn next_account(&self, account_name: &str) -> Result<u32> {
        if self.backend.is_locked() {
            return Err(WalletError::WalletLocked);
        }

        Ok(self.backend.next_account(account_name).await?)
    }

    async fn rename_account(&self, account_number: u32, new_name: &str) -> Result<()> {
        Ok(self.backend.rename_account(account_number, new_name).await?)
    }

    async fn account_name(&self, account_number: u32) -> Result<String> {
        Ok(self.backend.account_name(account_number).await?)
    }

    async fn account_number(&self, account_name: &str) -> Result<u32> {
        Ok(self.backend.account_number(account_name).await?)
    }

    fn is_locked(&self) -> bool {
        self.backend.is_locked()
    }

    async fn unlock_wallet(&self, passphrase: &str) -> Result<()> {
        Ok(self.backend.unlock(passphrase).await?)
    }

    fn lock_wallet(&self) {
        self.backend.lock();
    }

    fn input_size(&self, _output: &UnspentOutput) -> Option<usize> {
        None
    }

    fn estimate_size(&self, _input_count: usize, _inputs_size: usize) -> SizeEstimate {
        SizeEstimate::Unavailable
    }

    fn mixer_accounts(&self) -> Option<MixerAccounts> {
        Some(MixerAccounts {
            mixed: self.backend.mixed_account_number()?,
            unmixed: self.backend.unmixed_account_number()?,
        })
    }

    async fn is_mixer_active(&self) -> Result<bool> {
        Ok(self.backend.is_account_mixer_active().await?)
    }

    async fn start_mixer(&self, passphrase: &str) -> Result<()> {
        if self.mixer_accounts().is_none() {
            return Err(WalletError::Unavailable(
                "mixed and unmixed accounts are not configured".to_string(),
            ));
        }
        Ok(self.backend.start_account_mixer(passphrase).await?)
    }

    async fn stop_mixer(&self) -> Result<()> {
        Ok(self.backend.stop_account_mixer().await?)
    }

    fn hd_path_for_account(&self, account_number: u32) -> String {
        let prefix = match self.network {
            Network::Mainnet => MAINNET_HD_PATH,
            Network::Testnet | Network::Regtest => TESTNET_HD_PATH,
        };
        format!("{}{}'", prefix, account_number)
    }
}
