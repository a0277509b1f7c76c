//! BTC asset adapter.
//!
//! The BTC wallet engine reports balances in satoshis but unspent output
//! amounts as floating point BTC; this adapter converts them once into
//! integer [`Amount`]s and estimates transaction sizes from input script types.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use thiserror::Error;

use super::{AccountListing, AssetAdapter, apply_gap_limit};
use crate::error::{Result, WalletError};
use crate::model::{Balance, SizeEstimate, UnspentOutput};
use crate::types::{Amount, AssetType, Network, UNITS_PER_COIN};

/// Version, locktime and in/out counts.
const TX_OVERHEAD_SIZE: usize = 10;
/// Size of a P2PKH output.
const OUTPUT_SIZE: usize = 34;
/// Size of a signed P2PKH input.
const P2PKH_INPUT_SIZE: usize = 148;
/// Virtual size of a signed P2WPKH input.
const P2WPKH_INPUT_VSIZE: usize = 68;

const MAINNET_HD_PATH: &str = "m/84'/0'/";
const TESTNET_HD_PATH: &str = "m/84'/1'/";

/// BIP44-style key scope the BTC engine derives accounts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyScope {
    pub purpose: u32,
    pub coin: u32,
}

impl KeyScope {
    /// Native segwit (BIP84) scope for the given network.
    pub fn bip84(network: Network) -> Self {
        Self {
            purpose: 84,
            coin: match network {
                Network::Mainnet => 0,
                Network::Testnet | Network::Regtest => 1,
            },
        }
    }
}

/// Errors reported by the BTC wallet engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BtcBackendError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("wallet locked")]
    Locked,

    #[error("{0}")]
    Engine(String),
}

impl From<BtcBackendError> for WalletError {
    fn from(err: BtcBackendError) -> Self {
        match err {
            BtcBackendError::AccountNotFound(what) => WalletError::NotFound(what),
            BtcBackendError::Locked => WalletError::WalletLocked,
            BtcBackendError::Engine(msg) => WalletError::BackendFailure(msg),
        }
    }
}

/// Account row as reported by the BTC engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcAccountResult {
    pub account_number: u32,
    pub account_name: String,
    pub external_key_count: u32,
    pub internal_key_count: u32,
    pub imported_key_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcAccountsResult {
    pub accounts: Vec<BtcAccountResult>,
    pub current_block_hash: [u8; 32],
    pub current_block_height: i32,
}

/// Account balances in satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BtcBalances {
    pub total: u64,
    pub spendable: u64,
    pub immature_reward: u64,
}

/// Unspent output as reported by the BTC engine's `listunspent`.
#[derive(Debug, Clone, PartialEq)]
pub struct BtcUnspent {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    pub script_pub_key: String,
    pub redeem_script: Option<String>,
    /// Amount in whole BTC.
    pub amount: f64,
    pub confirmations: i64,
    /// Unix timestamp in seconds.
    pub received: i64,
    pub spendable: bool,
}

/// The BTC wallet engine (chain sync, key storage and signing live behind it).
#[async_trait]
pub trait BtcWalletBackend: Send + Sync {
    async fn accounts(
        &self,
        scope: KeyScope,
    ) -> std::result::Result<BtcAccountsResult, BtcBackendError>;

    async fn calculate_account_balances(
        &self,
        account_number: u32,
        required_confirmations: u32,
    ) -> std::result::Result<BtcBalances, BtcBackendError>;

    async fn list_unspent(
        &self,
        min_conf: i32,
        max_conf: i32,
        account_name: &str,
    ) -> std::result::Result<Vec<BtcUnspent>, BtcBackendError>;

    async fn next_account(
        &self,
        scope: KeyScope,
        account_name: &str,
    ) -> std::result::Result<u32, BtcBackendError>;

    async fn rename_account(
        &self,
        scope: KeyScope,
        account_number: u32,
        new_name: &str,
    ) -> std::result::Result<(), BtcBackendError>;

    async fn account_name(
        &self,
        scope: KeyScope,
        account_number: u32,
    ) -> std::result::Result<String, BtcBackendError>;

    async fn account_number(
        &self,
        scope: KeyScope,
        account_name: &str,
    ) -> std::result::Result<u32, BtcBackendError>;

    fn is_locked(&self) -> bool;

    async fn unlock(&self, passphrase: &str) -> std::result::Result<(), BtcBackendError>;

    fn lock(&self);
}

/// Adapter exposing a [`BtcWalletBackend`] through [`AssetAdapter`].
pub struct BtcAdapter {
    backend: Arc<dyn BtcWalletBackend>,
    scope: KeyScope,
    network: Network,
    fee_outputs: usize,
}

impl BtcAdapter {
    pub fn new(backend: Arc<dyn BtcWalletBackend>, network: Network) -> Self {
        Self {
            backend,
            scope: KeyScope::bip84(network),
            network,
            fee_outputs: 2,
        }
    }

    /// Number of outputs assumed by the size estimator (recipient and change by default).
    pub fn with_fee_outputs(mut self, outputs: usize) -> Self {
        self.fee_outputs = outputs;
        self
    }

    pub fn scope(&self) -> KeyScope {
        self.scope
    }
}

/// Convert a floating point BTC amount to satoshis, rounding to the nearest unit.
pub fn btc_to_amount(value: f64) -> Result<Amount> {
    if !value.is_finite() || value < 0.0 {
        return Err(WalletError::BackendFailure(format!("invalid BTC amount {}", value)));
    }
    let sats = (value * UNITS_PER_COIN as f64).round();
    if sats >= u64::MAX as f64 {
        return Err(WalletError::BackendFailure(format!("BTC amount {} out of range", value)));
    }
    Ok(Amount::from_sat(sats as u64))
}

/// Size of a signed input spending the given script pubkey (hex encoded).
fn script_input_size(script_pub_key: &str) -> usize {
    // OP_0 <20-byte push>
    if script_pub_key.len() == 44 && script_pub_key.starts_with("0014") {
        P2WPKH_INPUT_VSIZE
    } else {
        P2PKH_INPUT_SIZE
    }
}

#[async_trait]
impl AssetAdapter for BtcAdapter {
    fn asset(&self) -> AssetType {
        AssetType::Btc
    }

    async fn list_accounts(&self) -> Result<AccountListing> {
        let resp = self.backend.accounts(self.scope).await?;
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
        let balance = self
            .backend
            .calculate_account_balances(account_number, required_confirmations)
            .await?;

        Ok(Balance {
            total: Amount::from_sat(balance.total),
            spendable: Amount::from_sat(balance.spendable),
            immature_reward: Amount::from_sat(balance.immature_reward),
        })
    }

    async fn list_unspent(
        &self,
        account_number: u32,
        account_name: &str,
    ) -> Result<Vec<UnspentOutput>> {
        let unspents = self.backend.list_unspent(0, i32::MAX, account_name).await?;

        let mut resp = Vec::with_capacity(unspents.len());
        for utxo in unspents {
            let receive_time = DateTime::from_timestamp(utxo.received, 0).ok_or_else(|| {
                WalletError::BackendFailure(format!(
                    "invalid receive time {} for {}:{}",
                    utxo.received, utxo.txid, utxo.vout
                ))
            })?;

            resp.push(UnspentOutput {
                amount: btc_to_amount(utxo.amount)?,
                txid: utxo.txid,
                vout: utxo.vout,
                address: utxo.address,
                script_pub_key: utxo.script_pub_key,
                redeem_script: utxo.redeem_script,
                confirmations: utxo.confirmations,
                receive_time,
                spendable: utxo.spendable,
                account_number,
            });
        }

        Ok(resp)
    }

    async fn next_account(&self, account_name: &str) -> Result<u32> {
        if self.backend.is_locked() {
            return Err(WalletError::WalletLocked);
        }

        Ok(self.backend.next_account(self.scope, account_name).await?)
    }

    async fn rename_account(&self, account_number: u32, new_name: &str) -> Result<()> {
        Ok(self.backend.rename_account(self.scope, account_number, new_name).await?)
    }

    async fn account_name(&self, account_number: u32) -> Result<String> {
        Ok(self.backend.account_name(self.scope, account_number).await?)
    }

    async fn account_number(&self, account_name: &str) -> Result<u32> {
        Ok(self.backend.account_number(self.scope, account_name).await?)
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

    fn input_size(&self, output: &UnspentOutput) -> Option<usize> {
        Some(script_input_size(&output.script_pub_key))
    }

    fn estimate_size(&self, input_count: usize, inputs_size: usize) -> SizeEstimate {
        if input_count == 0 {
            return SizeEstimate::Bytes(0);
        }
        SizeEstimate::Bytes(TX_OVERHEAD_SIZE + OUTPUT_SIZE * self.fee_outputs + inputs_size)
    }

    fn hd_path_for_account(&self, account_number: u32) -> String {
        let prefix = match self.network {
            Network::Mainnet => MAINNET_HD_PATH,
            Network::Testnet | Network::Regtest => TESTNET_HD_PATH,
        };
        format!("{}{}'", prefix, account_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn output(script_pub_key: &str) -> UnspentOutput {
        UnspentOutput {
            txid: "aa".repeat(32),
            vout: 0,
            address: "bc1qexample".to_string(),
            script_pub_key: script_pub_key.to_string(),
            redeem_script: None,
            amount: Amount::from_sat(1_000),
            confirmations: 6,
            receive_time: Utc::now(),
            spendable: true,
            account_number: 0,
        }
    }

    #[test]
    fn test_btc_to_amount_rounds_to_nearest_satoshi() {
        assert_eq!(btc_to_amount(0.1).unwrap(), Amount::from_sat(10_000_000));
        assert_eq!(btc_to_amount(0.00000001).unwrap(), Amount::from_sat(1));
        // 0.29 has no exact binary representation
        assert_eq!(btc_to_amount(0.29).unwrap(), Amount::from_sat(29_000_000));
        assert_eq!(btc_to_amount(0.0).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_btc_to_amount_rejects_invalid_values() {
        assert_matches!(btc_to_amount(f64::NAN), Err(WalletError::BackendFailure(_)));
        assert_matches!(btc_to_amount(f64::INFINITY), Err(WalletError::BackendFailure(_)));
        assert_matches!(btc_to_amount(-0.5), Err(WalletError::BackendFailure(_)));
    }

    #[test]
    fn test_input_size_by_script_type() {
        let p2wpkh = format!("0014{}", "11".repeat(20));
        let p2pkh = format!("76a914{}88ac", "11".repeat(20));
        assert_eq!(script_input_size(&p2wpkh), P2WPKH_INPUT_VSIZE);
        assert_eq!(script_input_size(&p2pkh), P2PKH_INPUT_SIZE);
        assert_eq!(output(&p2wpkh).script_pub_key.len(), 44);
    }

    #[test]
    fn test_backend_error_normalization() {
        let err: WalletError = BtcBackendError::AccountNotFound("savings".to_string()).into();
        assert_matches!(err, WalletError::NotFound(ref s) if s == "savings");
        let err: WalletError = BtcBackendError::Locked.into();
        assert_matches!(err, WalletError::WalletLocked);
        let err: WalletError = BtcBackendError::Engine("db closed".to_string()).into();
        assert_matches!(err, WalletError::BackendFailure(ref s) if s == "db closed");
    }

    #[test]
    fn test_key_scope_per_network() {
        assert_eq!(KeyScope::bip84(Network::Mainnet).coin, 0);
        assert_eq!(KeyScope::bip84(Network::Testnet).coin, 1);
        assert_eq!(KeyScope::bip84(Network::Regtest).purpose, 84);
    }
}
