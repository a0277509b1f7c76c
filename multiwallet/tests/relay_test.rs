//! Notification relay: listener lifecycle and refresh propagation.

use std::sync::Arc;
use std::time::Duration;

use multiwallet::event_bus::EventReceiver;
use multiwallet::test_utils::{
    MockBtcBackend, MockDcrBackend, MockNotificationSource, btc_balances, dcr_balance,
};
use multiwallet::{AccountRegistry, Config, NotificationRelay, ViewEvent, WalletNotification};
use tokio::time::{sleep, timeout};

const BTC_WALLET: u32 = 1;
const DCR_WALLET: u32 = 2;

struct Fixture {
    btc: Arc<MockBtcBackend>,
    dcr: Arc<MockDcrBackend>,
    relay: NotificationRelay,
    source: MockNotificationSource,
}

async fn fixture() -> Fixture {
    let registry = Arc::new(AccountRegistry::new(Config::testnet()).unwrap());
    let btc = Arc::new(MockBtcBackend::new().with_account(0, "default", btc_balances(1_000)));
    let dcr = Arc::new(
        MockDcrBackend::new()
            .with_account(0, "default", dcr_balance(10))
            .with_account(1, "mixed", dcr_balance(20))
            .with_account(2, "unmixed", dcr_balance(30))
            .with_mixer(1, 2),
    );
    registry.load_btc_wallet(BTC_WALLET, btc.clone()).await.unwrap();
    registry.load_dcr_wallet(DCR_WALLET, dcr.clone()).await.unwrap();

    Fixture {
        btc,
        dcr,
        relay: NotificationRelay::new(registry),
        source: MockNotificationSource::default(),
    }
}

async fn next_event(views: &mut EventReceiver<ViewEvent>) -> ViewEvent {
    timeout(Duration::from_secs(5), views.recv())
        .await
        .expect("timed out waiting for view event")
        .expect("view bus closed")
}

async fn wait_for_listeners(source: &MockNotificationSource, count: usize) {
    timeout(Duration::from_secs(5), async {
        while source.listener_count() != count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener count never settled");
}

#[tokio::test]
async fn test_new_transaction_refreshes_once() {
    let f = fixture().await;
    let mut views = f.relay.subscribe_views();
    let _sub = f.relay.register("overview", BTC_WALLET, &f.source).await.unwrap();

    f.source.emit(WalletNotification::NewTransaction {
        wallet_id: BTC_WALLET,
        txid: "ff".repeat(32),
    });

    assert_eq!(
        next_event(&mut views).await,
        ViewEvent::AccountsRefreshed {
            wallet_id: BTC_WALLET
        }
    );
    assert_eq!(
        next_event(&mut views).await,
        ViewEvent::TransactionsChanged {
            wallet_id: BTC_WALLET
        }
    );

    sleep(Duration::from_millis(50)).await;
    assert_eq!(views.try_recv(), None);
    assert_eq!(f.btc.account_list_calls(), 1);
}

#[tokio::test]
async fn test_notifications_for_other_wallets_are_ignored() {
    let f = fixture().await;
    let mut views = f.relay.subscribe_views();
    let _sub = f.relay.register("overview", BTC_WALLET, &f.source).await.unwrap();

    f.source.emit(WalletNotification::NewTransaction {
        wallet_id: DCR_WALLET,
        txid: "01".to_string(),
    });
    f.source.emit(WalletNotification::BlockAttached {
        wallet_id: BTC_WALLET,
        height: 101,
    });
    f.source.emit(WalletNotification::NewTransaction {
        wallet_id: BTC_WALLET,
        txid: "02".to_string(),
    });

    assert_eq!(
        next_event(&mut views).await,
        ViewEvent::AccountsRefreshed {
            wallet_id: BTC_WALLET
        }
    );
    next_event(&mut views).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(views.try_recv(), None);
    assert_eq!(f.dcr.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_registration_is_a_no_op() {
    let f = fixture().await;

    let first = f.relay.register("mixer", DCR_WALLET, &f.source).await;
    assert!(first.is_some());
    assert!(f.relay.register("mixer", DCR_WALLET, &f.source).await.is_none());
    assert_eq!(f.source.subscriptions(), 1);
    assert_eq!(f.source.listener_count(), 1);

    let other = f.relay.register("send", DCR_WALLET, &f.source).await;
    assert!(other.is_some());
    assert_eq!(f.source.listener_count(), 2);
}

#[tokio::test]
async fn test_close_deregisters_listener() {
    let f = fixture().await;
    let sub = f.relay.register("overview", BTC_WALLET, &f.source).await.unwrap();
    assert_eq!(sub.page_id(), "overview");
    assert!(f.relay.is_registered("overview").await);

    sub.close().await;

    assert!(!f.relay.is_registered("overview").await);
    assert_eq!(f.source.listener_count(), 0);
    assert!(f.relay.register("overview", BTC_WALLET, &f.source).await.is_some());
}

#[tokio::test]
async fn test_dropping_subscription_stops_listener() {
    let f = fixture().await;
    let sub = f.relay.register("overview", BTC_WALLET, &f.source).await.unwrap();

    drop(sub);
    wait_for_listeners(&f.source, 0).await;

    f.source.emit(WalletNotification::NewTransaction {
        wallet_id: BTC_WALLET,
        txid: "03".to_string(),
    });
    sleep(Duration::from_millis(50)).await;
    assert_eq!(f.btc.calls(), 0);
}

#[tokio::test]
async fn test_dropped_page_id_can_register_again_right_away() {
    let f = fixture().await;
    let sub = f.relay.register("overview", BTC_WALLET, &f.source).await.unwrap();

    drop(sub);
    assert!(!f.relay.is_registered("overview").await);
    let _again = f.relay.register("overview", BTC_WALLET, &f.source).await.unwrap();

    // the old listener stopping must not free the new registration
    wait_for_listeners(&f.source, 1).await;
    sleep(Duration::from_millis(20)).await;
    assert!(f.relay.is_registered("overview").await);
}

#[tokio::test]
async fn test_deregister_by_page_id() {
    let f = fixture().await;
    let _sub = f.relay.register("overview", BTC_WALLET, &f.source).await.unwrap();

    assert!(f.relay.deregister("overview").await);
    assert!(!f.relay.deregister("overview").await);
    wait_for_listeners(&f.source, 0).await;
}

#[tokio::test]
async fn test_mixer_ended_marks_workflow_completed() {
    let f = fixture().await;
    let mut views = f.relay.subscribe_views();
    let sub = f.relay.register("mixer", DCR_WALLET, &f.source).await.unwrap();
    assert!(!sub.take_mixer_completed());

    f.dcr.set_mixer_active(true);
    f.source.emit(WalletNotification::MixerStarted {
        wallet_id: DCR_WALLET,
    });
    next_event(&mut views).await;
    assert_eq!(
        next_event(&mut views).await,
        ViewEvent::MixerStateChanged {
            wallet_id: DCR_WALLET,
            running: true
        }
    );
    assert!(!sub.take_mixer_completed());

    f.dcr.set_mixer_active(false);
    f.source.emit(WalletNotification::MixerEnded {
        wallet_id: DCR_WALLET,
    });
    next_event(&mut views).await;
    assert_eq!(
        next_event(&mut views).await,
        ViewEvent::MixerStateChanged {
            wallet_id: DCR_WALLET,
            running: false
        }
    );
    assert!(sub.take_mixer_completed());
    assert!(!sub.take_mixer_completed());
}

#[tokio::test]
async fn test_failed_refresh_is_reported() {
    let f = fixture().await;
    let mut views = f.relay.subscribe_views();
    let _sub = f.relay.register("overview", BTC_WALLET, &f.source).await.unwrap();

    f.btc.fail_balance_of(Some(0)).await;
    f.source.emit(WalletNotification::NewTransaction {
        wallet_id: BTC_WALLET,
        txid: "04".to_string(),
    });

    match next_event(&mut views).await {
        ViewEvent::RefreshFailed {
            wallet_id,
            reason,
        } => {
            assert_eq!(wallet_id, BTC_WALLET);
            assert!(reason.contains("balance of account 0"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_subscription_registers_nothing() {
    let f = fixture().await;
    f.source.set_refuse(true);

    assert!(f.relay.register("overview", BTC_WALLET, &f.source).await.is_none());
    assert!(!f.relay.is_registered("overview").await);

    f.source.set_refuse(false);
    assert!(f.relay.register("overview", BTC_WALLET, &f.source).await.is_some());
}
