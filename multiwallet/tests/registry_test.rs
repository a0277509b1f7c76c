//! Account registry tests against the in-memory BTC and DCR engines.

use std::sync::Arc;

use assert_matches::assert_matches;

use multiwallet::adapter::btc::BtcBalances;
use multiwallet::model::{ADDRESS_GAP_LIMIT, Accounts, IMPORTED_ACCOUNT_NUMBER};
use multiwallet::test_utils::{
    MockBtcBackend, MockDcrBackend, btc_balances, btc_unspent, dcr_balance,
};
use multiwallet::{AccountRegistry, Amount, AssetType, Config, WalletError};

const BTC_WALLET: u32 = 1;
const DCR_WALLET: u32 = 2;

fn btc_backend() -> MockBtcBackend {
    MockBtcBackend::new()
        .with_account(0, "default", btc_balances(500_000))
        .with_account(1, "savings", btc_balances(250_000))
        .with_account(IMPORTED_ACCOUNT_NUMBER, "imported", btc_balances(0))
}

async fn registry_with(backend: Arc<MockBtcBackend>) -> AccountRegistry {
    let registry = AccountRegistry::new(Config::testnet()).unwrap();
    registry.load_btc_wallet(BTC_WALLET, backend).await.unwrap();
    registry
}

#[tokio::test]
async fn test_refresh_adds_gap_limit_to_key_counts() {
    let backend = Arc::new(btc_backend().with_key_counts(1, 5, 2));
    let registry = registry_with(backend).await;

    let snapshot = registry.refresh(BTC_WALLET).await.unwrap();
    let savings = snapshot.get(1).unwrap();
    assert_eq!(savings.properties.external_key_count, 5 + ADDRESS_GAP_LIMIT);
    assert_eq!(savings.properties.internal_key_count, 2 + ADDRESS_GAP_LIMIT);
    assert_eq!(snapshot.current_block_height, 100);
    assert_eq!(snapshot.accounts.len(), 3);
    assert!(snapshot.get(IMPORTED_ACCOUNT_NUMBER).unwrap().is_imported());
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let backend = Arc::new(btc_backend());
    let registry = registry_with(backend.clone()).await;
    let before = registry.refresh(BTC_WALLET).await.unwrap();

    backend
        .set_balances(
            0,
            BtcBalances {
                total: 1,
                spendable: 1,
                immature_reward: 0,
            },
        )
        .await;
    backend.set_block_height(101).await;
    backend.fail_balance_of(Some(1)).await;

    let err = registry.refresh(BTC_WALLET).await.unwrap_err();
    assert_matches!(err, WalletError::BackendFailure(_));

    let after = registry.accounts(BTC_WALLET).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.get(0).unwrap().balance.total, Amount::from_sat(500_000));
    assert_eq!(after.current_block_height, 100);

    backend.fail_balance_of(None).await;
    let refreshed = registry.refresh(BTC_WALLET).await.unwrap();
    assert_eq!(refreshed.get(0).unwrap().balance.total, Amount::from_sat(1));
    assert_eq!(refreshed.current_block_height, 101);
}

#[tokio::test]
async fn test_lookup_reads_snapshot_only() {
    let backend = Arc::new(btc_backend());
    let registry = registry_with(backend.clone()).await;

    assert!(registry.lookup(BTC_WALLET, 0).await.unwrap_err().is_not_found());

    registry.refresh(BTC_WALLET).await.unwrap();
    let calls = backend.calls();

    let account = registry.lookup(BTC_WALLET, 1).await.unwrap();
    assert_eq!(account.name(), "savings");
    assert_eq!(account.wallet_id, BTC_WALLET);
    assert!(registry.lookup(BTC_WALLET, 42).await.unwrap_err().is_not_found());
    assert_eq!(backend.calls(), calls);
}

#[tokio::test]
async fn test_accounts_or_refresh_loads_once() {
    let backend = Arc::new(btc_backend());
    let registry = registry_with(backend.clone()).await;

    assert!(registry.accounts(BTC_WALLET).await.unwrap_err().is_not_found());
    registry.accounts_or_refresh(BTC_WALLET).await.unwrap();
    registry.accounts_or_refresh(BTC_WALLET).await.unwrap();
    assert_eq!(backend.account_list_calls(), 1);

    let json = registry.accounts_json(BTC_WALLET).await.unwrap();
    let decoded = Accounts::from_json(&json).unwrap();
    assert_eq!(decoded, *registry.accounts(BTC_WALLET).await.unwrap());
}

#[tokio::test]
async fn test_name_lookups_are_case_sensitive() {
    let registry = registry_with(Arc::new(btc_backend())).await;
    registry.refresh(BTC_WALLET).await.unwrap();

    assert!(registry.has_account(BTC_WALLET, "savings").await);
    assert!(!registry.has_account(BTC_WALLET, "Savings").await);
    assert!(!registry.has_account(99, "savings").await);

    assert_eq!(registry.number_for_name(BTC_WALLET, "savings").await.unwrap(), 1);
    let account = registry.lookup_by_name(BTC_WALLET, "default").await.unwrap();
    assert_eq!(account.number(), 0);
    assert!(registry.lookup_by_name(BTC_WALLET, "DEFAULT").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_rename_account() {
    let registry = registry_with(Arc::new(btc_backend())).await;

    registry.rename_account(BTC_WALLET, 1, "cold storage").await.unwrap();
    assert_eq!(registry.account_name(BTC_WALLET, 1).await.unwrap(), "cold storage");
    assert!(registry.rename_account(BTC_WALLET, 9, "x").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_next_account_on_locked_wallet_never_reaches_backend() {
    let backend = Arc::new(btc_backend());
    let registry = registry_with(backend.clone()).await;

    let err = registry.next_account(BTC_WALLET, "spending").await.unwrap_err();
    assert_matches!(err, WalletError::WalletLocked);
    assert_eq!(backend.calls(), 0);
    assert_eq!(backend.next_account_calls(), 0);
}

#[tokio::test]
async fn test_create_account_relocks_wallet() {
    let backend = Arc::new(btc_backend());
    let registry = registry_with(backend.clone()).await;

    let number = registry.create_account(BTC_WALLET, "spending", "passphrase").await.unwrap();
    assert_eq!(number, 2);
    assert!(registry.adapter(BTC_WALLET).await.unwrap().is_locked());
    assert_eq!(backend.lock_calls(), 1);

    let snapshot = registry.refresh(BTC_WALLET).await.unwrap();
    assert_eq!(snapshot.get(2).unwrap().name(), "spending");
}

#[tokio::test]
async fn test_create_account_relocks_after_backend_failure() {
    let backend = Arc::new(btc_backend());
    let registry = registry_with(backend.clone()).await;

    let err = registry.create_account(BTC_WALLET, "savings", "passphrase").await.unwrap_err();
    assert_matches!(err, WalletError::BackendFailure(_));
    assert_eq!(backend.next_account_calls(), 1);
    assert_eq!(backend.lock_calls(), 1);
    assert!(registry.adapter(BTC_WALLET).await.unwrap().is_locked());
}

#[tokio::test]
async fn test_create_account_with_wrong_passphrase() {
    let backend = Arc::new(btc_backend());
    let registry = registry_with(backend.clone()).await;

    let err = registry.create_account(BTC_WALLET, "spending", "wrong").await.unwrap_err();
    assert_matches!(err, WalletError::BackendFailure(_));
    assert_eq!(backend.next_account_calls(), 0);
    assert_eq!(backend.lock_calls(), 0);
    assert!(registry.adapter(BTC_WALLET).await.unwrap().is_locked());
}

#[tokio::test]
async fn test_unspent_outputs_are_converted_to_integer_amounts() {
    let backend = Arc::new(
        btc_backend()
            .with_unspent(1, btc_unspent("aa", 0, 0.001, 3))
            .with_unspent(1, btc_unspent("bb", 1, 0.29, 12)),
    );
    let registry = registry_with(backend.clone()).await;

    let calls = backend.calls();
    let outputs = registry.unspent_outputs(BTC_WALLET, 1).await.unwrap();
    // one name lookup and one listing
    assert_eq!(backend.calls(), calls + 2);
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].amount, Amount::from_sat(100_000));
    assert_eq!(outputs[1].amount, Amount::from_sat(29_000_000));
    assert!(outputs.iter().all(|o| o.account_number == 1));

    assert!(registry.unspent_outputs(BTC_WALLET, 0).await.unwrap().is_empty());
    assert!(registry.unspent_outputs(BTC_WALLET, 7).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_wallet_registration() {
    let registry = AccountRegistry::new(Config::testnet()).unwrap();
    let dcr = MockDcrBackend::new().with_account(0, "default", dcr_balance(1));
    registry.load_dcr_wallet(DCR_WALLET, Arc::new(dcr)).await.unwrap();
    registry.load_btc_wallet(BTC_WALLET, Arc::new(btc_backend())).await.unwrap();

    let err = registry.load_btc_wallet(BTC_WALLET, Arc::new(btc_backend())).await.unwrap_err();
    assert_matches!(err, WalletError::WalletExists(BTC_WALLET));

    assert_eq!(registry.wallet_ids().await, vec![BTC_WALLET, DCR_WALLET]);
    assert_eq!(registry.wallet_asset(DCR_WALLET).await.unwrap(), AssetType::Dcr);
    assert_eq!(registry.hd_path_for_account(BTC_WALLET, 3).await.unwrap(), "m/84'/1'/3'");

    registry.remove_wallet(DCR_WALLET).await.unwrap();
    assert!(registry.remove_wallet(DCR_WALLET).await.unwrap_err().is_not_found());
    assert!(registry.refresh(DCR_WALLET).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_spendable_for_account() {
    let backend = Arc::new(MockBtcBackend::new().with_account(
        0,
        "default",
        BtcBalances {
            total: 900,
            spendable: 600,
            immature_reward: 300,
        },
    ));
    let registry = registry_with(backend).await;
    assert_eq!(registry.spendable_for_account(BTC_WALLET, 0).await.unwrap(), Amount::from_sat(600));
}

#[tokio::test]
async fn test_unspent_outputs_follow_renamed_account() {
    let backend = Arc::new(btc_backend().with_unspent(1, btc_unspent("aa", 0, 0.001, 3)));
    let registry = registry_with(backend).await;
    registry.refresh(BTC_WALLET).await.unwrap();

    registry.rename_account(BTC_WALLET, 1, "cold storage").await.unwrap();

    let outputs = registry.unspent_outputs(BTC_WALLET, 1).await.unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].account_number, 1);
}

#[tokio::test]
async fn test_concurrent_refreshes_of_one_wallet_never_overlap() {
    let backend = Arc::new(btc_backend());
    let registry = registry_with(backend.clone()).await;

    let (first, second) =
        tokio::join!(registry.refresh(BTC_WALLET), registry.refresh(BTC_WALLET));
    first.unwrap();
    second.unwrap();

    assert_eq!(backend.account_list_calls(), 2);
    assert_eq!(backend.max_concurrent_account_lists(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let Err(err) = AccountRegistry::new(Config::testnet().with_event_capacity(0)) else {
        panic!("zero event capacity accepted");
    };
    assert_matches!(err, WalletError::Config(_));

    let Err(err) = AccountRegistry::new(Config::testnet().with_btc_fee_outputs(0)) else {
        panic!("zero fee outputs accepted");
    };
    assert_matches!(err, WalletError::Config(_));

    assert!(AccountRegistry::new(Config::mainnet()).is_ok());
}
