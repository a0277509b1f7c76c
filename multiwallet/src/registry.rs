//! Account registry.
//!
//! Holds the current accounts snapshot of every loaded wallet. A refresh
//! lists accounts through the wallet's adapter, prices each one and only then
//! swaps the new snapshot in, so readers never observe a partial refresh and
//! a failed refresh keeps the last good snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::adapter::{
    AssetAdapter, BtcAdapter, BtcWalletBackend, DcrAdapter, DcrWalletBackend, UnlockGuard,
};
use crate::config::Config;
use crate::error::{Result, WalletError};
use crate::model::{Account, Accounts, UnspentOutput};
use crate::types::{Amount, AssetType, WalletId};

struct WalletEntry {
    adapter: Arc<dyn AssetAdapter>,
    snapshot: RwLock<Option<Arc<Accounts>>>,
    /// Serializes refreshes of this wallet.
    refresh_lock: Mutex<()>,
}

/// Per-wallet cache of accounts and balances.
pub struct AccountRegistry {
    config: Config,
    wallets: RwLock<BTreeMap<WalletId, Arc<WalletEntry>>>,
}

impl AccountRegistry {
    /// Create an empty registry. Fails if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            wallets: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a wallet served by the given adapter.
    pub async fn register_wallet(
        &self,
        wallet_id: WalletId,
        adapter: Arc<dyn AssetAdapter>,
    ) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        if wallets.contains_key(&wallet_id) {
            return Err(WalletError::WalletExists(wallet_id));
        }

        tracing::debug!("Registered {} wallet {}", adapter.asset(), wallet_id);
        wallets.insert(
            wallet_id,
            Arc::new(WalletEntry {
                adapter,
                snapshot: RwLock::new(None),
                refresh_lock: Mutex::new(()),
            }),
        );
        Ok(())
    }

    /// Register a BTC wallet, building its adapter from the configuration.
    pub async fn load_btc_wallet(
        &self,
        wallet_id: WalletId,
        backend: Arc<dyn BtcWalletBackend>,
    ) -> Result<()> {
        let adapter = BtcAdapter::new(backend, self.config.network)
            .with_fee_outputs(self.config.btc_fee_outputs);
        self.register_wallet(wallet_id, Arc::new(adapter)).await
    }

    /// Register a DCR wallet, building its adapter from the configuration.
    pub async fn load_dcr_wallet(
        &self,
        wallet_id: WalletId,
        backend: Arc<dyn DcrWalletBackend>,
    ) -> Result<()> {
        let adapter = DcrAdapter::new(backend, self.config.network);
        self.register_wallet(wallet_id, Arc::new(adapter)).await
    }

    /// Forget a deleted wallet and its snapshot.
    pub async fn remove_wallet(&self, wallet_id: WalletId) -> Result<()> {
        self.wallets
            .write()
            .await
            .remove(&wallet_id)
            .map(|_| ())
            .ok_or_else(|| WalletError::NotFound(format!("wallet {}", wallet_id)))
    }

    /// Registered wallet ids in ascending order.
    pub async fn wallet_ids(&self) -> Vec<WalletId> {
        self.wallets.read().await.keys().copied().collect()
    }

    pub async fn wallet_asset(&self, wallet_id: WalletId) -> Result<AssetType> {
        Ok(self.entry(wallet_id).await?.adapter.asset())
    }

    pub async fn adapter(&self, wallet_id: WalletId) -> Result<Arc<dyn AssetAdapter>> {
        Ok(self.entry(wallet_id).await?.adapter.clone())
    }

    async fn entry(&self, wallet_id: WalletId) -> Result<Arc<WalletEntry>> {
        self.wallets
            .read()
            .await
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| WalletError::NotFound(format!("wallet {}", wallet_id)))
    }

    /// Rebuild the wallet's snapshot from its adapter.
    ///
    /// At most one refresh per wallet runs at a time. On any failure the
    /// previous snapshot stays in place and the error is returned.
    pub async fn refresh(&self, wallet_id: WalletId) -> Result<Arc<Accounts>> {
        let entry = self.entry(wallet_id).await?;
        let _in_flight = entry.refresh_lock.lock().await;

        let listing = entry.adapter.list_accounts().await.inspect_err(|e| {
            tracing::warn!("Listing accounts of wallet {} failed: {}", wallet_id, e);
        })?;

        let confirmations = self.config.effective_confirmations();
        let mut accounts = Vec::with_capacity(listing.accounts.len());
        for properties in listing.accounts {
            let balance = entry
                .adapter
                .account_balance(properties.account_number, confirmations)
                .await
                .inspect_err(|e| {
                    tracing::warn!(
                        "Balance of account {} in wallet {} failed, keeping previous snapshot: {}",
                        properties.account_number,
                        wallet_id,
                        e
                    );
                })?;

            accounts.push(Account {
                wallet_id,
                properties,
                balance,
            });
        }

        let snapshot = Arc::new(Accounts {
            accounts,
            current_block_hash: listing.current_block_hash,
            current_block_height: listing.current_block_height,
        });
        *entry.snapshot.write().await = Some(snapshot.clone());

        tracing::debug!(
            "Refreshed wallet {}: {} accounts at height {}",
            wallet_id,
            snapshot.accounts.len(),
            snapshot.current_block_height
        );
        Ok(snapshot)
    }

    /// Current snapshot, without touching the adapter.
    pub async fn accounts(&self, wallet_id: WalletId) -> Result<Arc<Accounts>> {
        let entry = self.entry(wallet_id).await?;
        let snapshot = entry.snapshot.read().await.clone();
        snapshot.ok_or_else(|| {
            WalletError::NotFound(format!("accounts of wallet {} not loaded yet", wallet_id))
        })
    }

    /// Current snapshot, refreshing first if the wallet was never loaded.
    pub async fn accounts_or_refresh(&self, wallet_id: WalletId) -> Result<Arc<Accounts>> {
        match self.accounts(wallet_id).await {
            Ok(snapshot) => Ok(snapshot),
            Err(WalletError::NotFound(_)) => self.refresh(wallet_id).await,
            Err(e) => Err(e),
        }
    }

    /// Snapshot serialized for transport across a boundary.
    pub async fn accounts_json(&self, wallet_id: WalletId) -> Result<String> {
        self.accounts_or_refresh(wallet_id).await?.to_json()
    }

    /// Account from the current snapshot. Never calls the adapter.
    pub async fn lookup(&self, wallet_id: WalletId, account_number: u32) -> Result<Account> {
        let snapshot = self.accounts(wallet_id).await?;
        snapshot.get(account_number).cloned().ok_or_else(|| {
            WalletError::NotFound(format!("account {} in wallet {}", account_number, wallet_id))
        })
    }

    /// Account number for an exact, case-sensitive name, as known to the backend.
    pub async fn number_for_name(&self, wallet_id: WalletId, account_name: &str) -> Result<u32> {
        self.entry(wallet_id).await?.adapter.account_number(account_name).await
    }

    pub async fn lookup_by_name(&self, wallet_id: WalletId, account_name: &str) -> Result<Account> {
        let number = self.number_for_name(wallet_id, account_name).await?;
        self.lookup(wallet_id, number).await
    }

    /// Whether the backend knows an account with this exact name. Never fails.
    pub async fn has_account(&self, wallet_id: WalletId, account_name: &str) -> bool {
        self.number_for_name(wallet_id, account_name).await.is_ok()
    }

    pub async fn account_name(&self, wallet_id: WalletId, account_number: u32) -> Result<String> {
        self.entry(wallet_id).await?.adapter.account_name(account_number).await
    }

    pub async fn rename_account(
        &self,
        wallet_id: WalletId,
        account_number: u32,
        new_name: &str,
    ) -> Result<()> {
        self.entry(wallet_id).await?.adapter.rename_account(account_number, new_name).await
    }

    /// Create the next account of an already unlocked wallet.
    pub async fn next_account(&self, wallet_id: WalletId, account_name: &str) -> Result<u32> {
        self.entry(wallet_id).await?.adapter.next_account(account_name).await
    }

    /// Unlock the wallet for exactly the duration of the account creation.
    pub async fn create_account(
        &self,
        wallet_id: WalletId,
        account_name: &str,
        passphrase: &str,
    ) -> Result<u32> {
        let adapter = self.adapter(wallet_id).await?;
        let guard = UnlockGuard::acquire(adapter, passphrase).await?;
        let number = guard.adapter().next_account(account_name).await?;
        drop(guard);

        tracing::info!("Created account {} ({}) in wallet {}", number, account_name, wallet_id);
        Ok(number)
    }

    /// Unspent outputs of one account, fetched fresh from the backend.
    ///
    /// The account's current name is resolved from its number first, so a
    /// rename since the last refresh does not matter.
    pub async fn unspent_outputs(
        &self,
        wallet_id: WalletId,
        account_number: u32,
    ) -> Result<Vec<UnspentOutput>> {
        let entry = self.entry(wallet_id).await?;
        let account_name = entry.adapter.account_name(account_number).await?;
        entry.adapter.list_unspent(account_number, &account_name).await
    }

    pub async fn spendable_for_account(
        &self,
        wallet_id: WalletId,
        account_number: u32,
    ) -> Result<Amount> {
        let entry = self.entry(wallet_id).await?;
        entry
            .adapter
            .spendable_for_account(account_number, self.config.effective_confirmations())
            .await
    }

    /// Hand a mixer start request to the wallet's backend.
    pub async fn start_mixer(&self, wallet_id: WalletId, passphrase: &str) -> Result<()> {
        self.entry(wallet_id).await?.adapter.start_mixer(passphrase).await
    }

    pub async fn stop_mixer(&self, wallet_id: WalletId) -> Result<()> {
        self.entry(wallet_id).await?.adapter.stop_mixer().await
    }

    pub async fn is_mixer_active(&self, wallet_id: WalletId) -> Result<bool> {
        self.entry(wallet_id).await?.adapter.is_mixer_active().await
    }

    pub async fn hd_path_for_account(
        &self,
        wallet_id: WalletId,
        account_number: u32,
    ) -> Result<String> {
        Ok(self.entry(wallet_id).await?.adapter.hd_path_for_account(account_number))
    }
}
