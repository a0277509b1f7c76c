//! Multi-asset account, balance and coin-selection core for UTXO wallets.
//!
//! This library sits between per-asset wallet engines and a wallet user
//! interface. It can:
//!
//! - Enumerate the accounts of every loaded wallet through one adapter per asset
//! - Keep an atomic per-wallet snapshot of account balances
//! - Aggregate balances per wallet, per asset and for the account mixer
//! - Drive manual coin selection with running totals and size estimates
//! - Turn backend notifications into refreshes and view change events
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use multiwallet::{AccountRegistry, BalanceAggregator, Config};
//! use multiwallet::adapter::BtcWalletBackend;
//!
//! async fn show(backend: Arc<dyn BtcWalletBackend>) -> multiwallet::Result<()> {
//!     let registry = Arc::new(AccountRegistry::new(Config::testnet())?);
//!     registry.load_btc_wallet(1, backend).await?;
//!     registry.refresh(1).await?;
//!
//!     let balances = BalanceAggregator::new(registry.clone());
//!     println!("total: {}", balances.total_for_wallet(1).await?);
//!     Ok(())
//! }
//! ```

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub mod adapter;
pub mod balance;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod logging;
pub mod model;
pub mod registry;
pub mod relay;
pub mod selection;
pub mod types;

// Re-export main types for convenience
pub use adapter::{AssetAdapter, UnlockGuard};
pub use balance::{BalanceAggregator, WalletBalance};
pub use config::Config;
pub use error::{LoggingError, LoggingResult, Result, WalletError};
pub use logging::{
    LogFileConfig, LogRotation, LoggingConfig, LoggingGuard, init_console_logging, init_logging,
};
pub use model::{Account, Accounts, Balance, OutPointRef, SizeEstimate, UnspentOutput};
pub use registry::AccountRegistry;
pub use relay::{NotificationRelay, NotificationSource, Subscription, ViewEvent, WalletNotification};
pub use selection::{SelectionSession, SelectionState, SelectionSummary, SubmittedSelection};
pub use types::{Amount, AssetType, Network, WalletId};

// Re-export for logging configuration
pub use tracing::level_filters::LevelFilter;
