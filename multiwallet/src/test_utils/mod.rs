//! In-memory wallet engines and notification sources for tests.

mod btc;
mod dcr;
mod source;

pub use btc::{MockBtcBackend, btc_balances, btc_unspent};
pub use dcr::{MockDcrBackend, dcr_balance, dcr_unspent};
pub use source::MockNotificationSource;
