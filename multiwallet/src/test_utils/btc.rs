use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::adapter::btc::{
    BtcAccountResult, BtcAccountsResult, BtcBackendError, BtcBalances, BtcUnspent,
    BtcWalletBackend, KeyScope,
};
use crate::model::IMPORTED_ACCOUNT_NUMBER;

struct MockBtcAccount {
    info: BtcAccountResult,
    balances: BtcBalances,
    unspent: Vec<BtcUnspent>,
}

#[derive(Default)]
struct BtcState {
    accounts: Vec<MockBtcAccount>,
    failing_balance: Option<u32>,
    block_height: i32,
}

/// In-memory BTC wallet engine. Starts locked.
pub struct MockBtcBackend {
    state: Mutex<BtcState>,
    passphrase: String,
    locked: AtomicBool,
    fail_unspent: AtomicBool,
    calls: AtomicUsize,
    account_list_calls: AtomicUsize,
    listings_in_flight: AtomicUsize,
    max_listings_in_flight: AtomicUsize,
    next_account_calls: AtomicUsize,
    lock_calls: AtomicUsize,
}

impl Default for MockBtcBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBtcBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BtcState {
                block_height: 100,
                ..BtcState::default()
            }),
            passphrase: "passphrase".to_string(),
            locked: AtomicBool::new(true),
            fail_unspent: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            account_list_calls: AtomicUsize::new(0),
            listings_in_flight: AtomicUsize::new(0),
            max_listings_in_flight: AtomicUsize::new(0),
            next_account_calls: AtomicUsize::new(0),
            lock_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = passphrase.to_string();
        self
    }

    /// Add an account whose total, spendable and immature balances are given in satoshis.
    pub fn with_account(mut self, number: u32, name: &str, balances: BtcBalances) -> Self {
        self.state.get_mut().accounts.push(MockBtcAccount {
            info: BtcAccountResult {
                account_number: number,
                account_name: name.to_string(),
                external_key_count: 0,
                internal_key_count: 0,
                imported_key_count: 0,
            },
            balances,
            unspent: Vec::new(),
        });
        self
    }

    pub fn with_key_counts(mut self, number: u32, external: u32, internal: u32) -> Self {
        if let Some(account) =
            self.state.get_mut().accounts.iter_mut().find(|a| a.info.account_number == number)
        {
            account.info.external_key_count = external;
            account.info.internal_key_count = internal;
        }
        self
    }

    pub fn with_unspent(mut self, number: u32, unspent: BtcUnspent) -> Self {
        if let Some(account) =
            self.state.get_mut().accounts.iter_mut().find(|a| a.info.account_number == number)
        {
            account.unspent.push(unspent);
        }
        self
    }

    pub fn unlocked(self) -> Self {
        self.locked.store(false, Ordering::SeqCst);
        self
    }

    /// Make balance queries of `number` fail until cleared with `None`.
    pub async fn fail_balance_of(&self, number: Option<u32>) {
        self.state.lock().await.failing_balance = number;
    }

    pub fn set_fail_unspent(&self, fail: bool) {
        self.fail_unspent.store(fail, Ordering::SeqCst);
    }

    pub async fn set_balances(&self, number: u32, balances: BtcBalances) {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.iter_mut().find(|a| a.info.account_number == number)
        {
            account.balances = balances;
        }
    }

    pub async fn set_block_height(&self, height: i32) {
        self.state.lock().await.block_height = height;
    }

    /// Async engine calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn account_list_calls(&self) -> usize {
        self.account_list_calls.load(Ordering::SeqCst)
    }

    /// Most `accounts` calls ever observed running at the same time.
    pub fn max_concurrent_account_lists(&self) -> usize {
        self.max_listings_in_flight.load(Ordering::SeqCst)
    }

    pub fn next_account_calls(&self) -> usize {
        self.next_account_calls.load(Ordering::SeqCst)
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    fn called(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BtcWalletBackend for MockBtcBackend {
    async fn accounts(&self, _scope: KeyScope) -> Result<BtcAccountsResult, BtcBackendError> {
        self.called();
        self.account_list_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.listings_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_listings_in_flight.fetch_max(running, Ordering::SeqCst);
        // let a concurrent caller run while this listing is in flight
        tokio::task::yield_now().await;

        let state = self.state.lock().await;
        let result = BtcAccountsResult {
            accounts: state.accounts.iter().map(|a| a.info.clone()).collect(),
            current_block_hash: [0x11; 32],
            current_block_height: state.block_height,
        };
        self.listings_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }

    async fn calculate_account_balances(
        &self,
        account_number: u32,
        _required_confirmations: u32,
    ) -> Result<BtcBalances, BtcBackendError> {
        self.called();
        let state = self.state.lock().await;
        if state.failing_balance == Some(account_number) {
            return Err(BtcBackendError::Engine(format!(
                "balance of account {} unavailable",
                account_number
            )));
        }
        state
            .accounts
            .iter()
            .find(|a| a.info.account_number == account_number)
            .map(|a| a.balances)
            .ok_or_else(|| BtcBackendError::AccountNotFound(format!("account {}", account_number)))
    }

    async fn list_unspent(
        &self,
        _min_conf: i32,
        _max_conf: i32,
        account_name: &str,
    ) -> Result<Vec<BtcUnspent>, BtcBackendError> {
        self.called();
        if self.fail_unspent.load(Ordering::SeqCst) {
            return Err(BtcBackendError::Engine("listunspent failed".to_string()));
        }
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .iter()
            .find(|a| a.info.account_name == account_name)
            .map(|a| a.unspent.clone())
            .unwrap_or_default())
    }

    async fn next_account(
        &self,
        _scope: KeyScope,
        account_name: &str,
    ) -> Result<u32, BtcBackendError> {
        self.called();
        self.next_account_calls.fetch_add(1, Ordering::SeqCst);
        if self.locked.load(Ordering::SeqCst) {
            return Err(BtcBackendError::Locked);
        }

        let mut state = self.state.lock().await;
        if state.accounts.iter().any(|a| a.info.account_name == account_name) {
            return Err(BtcBackendError::Engine(format!("account {} exists", account_name)));
        }
        let number = state
            .accounts
            .iter()
            .map(|a| a.info.account_number)
            .filter(|n| *n != IMPORTED_ACCOUNT_NUMBER)
            .max()
            .map_or(0, |n| n + 1);
        state.accounts.push(MockBtcAccount {
            info: BtcAccountResult {
                account_number: number,
                account_name: account_name.to_string(),
                external_key_count: 0,
                internal_key_count: 0,
                imported_key_count: 0,
            },
            balances: BtcBalances::default(),
            unspent: Vec::new(),
        });
        Ok(number)
    }

    async fn rename_account(
        &self,
        _scope: KeyScope,
        account_number: u32,
        new_name: &str,
    ) -> Result<(), BtcBackendError> {
        self.called();
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.info.account_number == account_number)
            .ok_or_else(|| BtcBackendError::AccountNotFound(format!("account {}", account_number)))?;
        account.info.account_name = new_name.to_string();
        Ok(())
    }

    async fn account_name(
        &self,
        _scope: KeyScope,
        account_number: u32,
    ) -> Result<String, BtcBackendError> {
        self.called();
        let state = self.state.lock().await;
        state
            .accounts
            .iter()
            .find(|a| a.info.account_number == account_number)
            .map(|a| a.info.account_name.clone())
            .ok_or_else(|| BtcBackendError::AccountNotFound(format!("account {}", account_number)))
    }

    async fn account_number(
        &self,
        _scope: KeyScope,
        account_name: &str,
    ) -> Result<u32, BtcBackendError> {
        self.called();
        let state = self.state.lock().await;
        state
            .accounts
            .iter()
            .find(|a| a.info.account_name == account_name)
            .map(|a| a.info.account_number)
            .ok_or_else(|| BtcBackendError::AccountNotFound(account_name.to_string()))
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    async fn unlock(&self, passphrase: &str) -> Result<(), BtcBackendError> {
        self.called();
        if passphrase != self.passphrase {
            return Err(BtcBackendError::Engine("invalid passphrase".to_string()));
        }
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn lock(&self) {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.locked.store(true, Ordering::SeqCst);
    }
}

/// A `listunspent` row paying `amount_btc` to a P2WPKH script.
pub fn btc_unspent(txid: &str, vout: u32, amount_btc: f64, confirmations: i64) -> BtcUnspent {
    BtcUnspent {
        txid: txid.to_string(),
        vout,
        address: format!("tb1q{}{}", txid, vout),
        script_pub_key: format!("0014{}", "ab".repeat(20)),
        redeem_script: None,
        amount: amount_btc,
        confirmations,
        received: 1_700_000_000 + confirmations,
        spendable: true,
    }
}

/// Balances with everything spendable.
pub fn btc_balances(total: u64) -> BtcBalances {
    BtcBalances {
        total,
        spendable: total,
        immature_reward: 0,
    }
}
