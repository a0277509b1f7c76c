use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::adapter::dcr::{
    DcrAccount, DcrAccountsResult, DcrBackendError, DcrBalance, DcrUnspent, DcrWalletBackend,
};

struct MockDcrAccount {
    info: DcrAccount,
    balance: DcrBalance,
    unspent: Vec<DcrUnspent>,
}

#[derive(Default)]
struct DcrState {
    accounts: Vec<MockDcrAccount>,
    failing_balance: Option<u32>,
}

/// In-memory DCR wallet engine with an account mixer. Starts locked.
pub struct MockDcrBackend {
    state: Mutex<DcrState>,
    passphrase: String,
    mixed_account: Option<u32>,
    unmixed_account: Option<u32>,
    locked: AtomicBool,
    mixer_active: AtomicBool,
    fail_unspent: AtomicBool,
    calls: AtomicUsize,
    lock_calls: AtomicUsize,
}

impl Default for MockDcrBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDcrBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DcrState::default()),
            passphrase: "passphrase".to_string(),
            mixed_account: None,
            unmixed_account: None,
            locked: AtomicBool::new(true),
            mixer_active: AtomicBool::new(false),
            fail_unspent: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            lock_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_account(mut self, number: u32, name: &str, balance: DcrBalance) -> Self {
        self.state.get_mut().accounts.push(MockDcrAccount {
            info: DcrAccount {
                account_number: number,
                account_name: name.to_string(),
                external_key_count: 0,
                internal_key_count: 0,
                imported_key_count: 0,
            },
            balance,
            unspent: Vec::new(),
        });
        self
    }

    pub fn with_unspent(mut self, number: u32, unspent: DcrUnspent) -> Self {
        if let Some(account) =
            self.state.get_mut().accounts.iter_mut().find(|a| a.info.account_number == number)
        {
            account.unspent.push(unspent);
        }
        self
    }

    pub fn with_mixer(mut self, mixed: u32, unmixed: u32) -> Self {
        self.mixed_account = Some(mixed);
        self.unmixed_account = Some(unmixed);
        self
    }

    pub async fn fail_balance_of(&self, number: Option<u32>) {
        self.state.lock().await.failing_balance = number;
    }

    pub fn set_fail_unspent(&self, fail: bool) {
        self.fail_unspent.store(fail, Ordering::SeqCst);
    }

    pub fn set_mixer_active(&self, active: bool) {
        self.mixer_active.store(active, Ordering::SeqCst);
    }

    pub fn is_mixer_running(&self) -> bool {
        self.mixer_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    fn called(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DcrWalletBackend for MockDcrBackend {
    async fn accounts(&self) -> Result<DcrAccountsResult, DcrBackendError> {
        self.called();
        let state = self.state.lock().await;
        Ok(DcrAccountsResult {
            accounts: state.accounts.iter().map(|a| a.info.clone()).collect(),
            current_block_hash: [0x22; 32],
            current_block_height: 800_000,
        })
    }

    async fn account_balance(
        &self,
        account_number: u32,
        _required_confirmations: u32,
    ) -> Result<DcrBalance, DcrBackendError> {
        self.called();
        let state = self.state.lock().await;
        if state.failing_balance == Some(account_number) {
            return Err(DcrBackendError::Backend("rpc timeout".to_string()));
        }
        state
            .accounts
            .iter()
            .find(|a| a.info.account_number == account_number)
            .map(|a| a.balance)
            .ok_or_else(|| DcrBackendError::NotExist(format!("account {}", account_number)))
    }

    async fn unspent_outputs(&self, account_name: &str) -> Result<Vec<DcrUnspent>, DcrBackendError> {
        self.called();
        if self.fail_unspent.load(Ordering::SeqCst) {
            return Err(DcrBackendError::Backend("unspent outputs unavailable".to_string()));
        }
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .iter()
            .find(|a| a.info.account_name == account_name)
            .map(|a| a.unspent.clone())
            .unwrap_or_default())
    }

    async fn next_account(&self, account_name: &str) -> Result<u32, DcrBackendError> {
        self.called();
        if self.locked.load(Ordering::SeqCst) {
            return Err(DcrBackendError::Locked);
        }
        let mut state = self.state.lock().await;
        let number = state.accounts.iter().map(|a| a.info.account_number + 1).max().unwrap_or(0);
        state.accounts.push(MockDcrAccount {
            info: DcrAccount {
                account_number: number,
                account_name: account_name.to_string(),
                external_key_count: 0,
                internal_key_count: 0,
                imported_key_count: 0,
            },
            balance: DcrBalance::default(),
            unspent: Vec::new(),
        });
        Ok(number)
    }

    async fn rename_account(
        &self,
        account_number: u32,
        new_name: &str,
    ) -> Result<(), DcrBackendError> {
        self.called();
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.info.account_number == account_number)
            .ok_or_else(|| DcrBackendError::NotExist(format!("account {}", account_number)))?;
        account.info.account_name = new_name.to_string();
        Ok(())
    }

    async fn account_name(&self, account_number: u32) -> Result<String, DcrBackendError> {
        self.called();
        let state = self.state.lock().await;
        state
            .accounts
            .iter()
            .find(|a| a.info.account_number == account_number)
            .map(|a| a.info.account_name.clone())
            .ok_or_else(|| DcrBackendError::NotExist(format!("account {}", account_number)))
    }

    async fn account_number(&self, account_name: &str) -> Result<u32, DcrBackendError> {
        self.called();
        let state = self.state.lock().await;
        state
            .accounts
            .iter()
            .find(|a| a.info.account_name == account_name)
            .map(|a| a.info.account_number)
            .ok_or_else(|| DcrBackendError::NotExist(account_name.to_string()))
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    async fn unlock(&self, passphrase: &str) -> Result<(), DcrBackendError> {
        self.called();
        if passphrase != self.passphrase {
            return Err(DcrBackendError::Backend("invalid passphrase".to_string()));
        }
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn lock(&self) {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.locked.store(true, Ordering::SeqCst);
    }

    fn mixed_account_number(&self) -> Option<u32> {
        self.mixed_account
    }

    fn unmixed_account_number(&self) -> Option<u32> {
        self.unmixed_account
    }

    async fn is_account_mixer_active(&self) -> Result<bool, DcrBackendError> {
        self.called();
        Ok(self.mixer_active.load(Ordering::SeqCst))
    }

    async fn start_account_mixer(&self, passphrase: &str) -> Result<(), DcrBackendError> {
        self.called();
        if passphrase != self.passphrase {
            return Err(DcrBackendError::Backend("invalid passphrase".to_string()));
        }
        self.mixer_active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_account_mixer(&self) -> Result<(), DcrBackendError> {
        self.called();
        self.mixer_active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Balance in atoms with everything spendable.
pub fn dcr_balance(total: i64) -> DcrBalance {
    DcrBalance {
        total,
        spendable: total,
        ..DcrBalance::default()
    }
}

pub fn dcr_unspent(tx_hash: &str, output_index: u32, atoms: i64, confirmations: i32) -> DcrUnspent {
    DcrUnspent {
        tx_hash: tx_hash.to_string(),
        output_index,
        address: format!("Ds{}{}", tx_hash, output_index),
        pk_script: format!("76a914{}88ac", "cd".repeat(20)),
        amount: atoms,
        confirmations,
        received_time: 1_700_000_000 + i64::from(confirmations),
    }
}
