//! The node-local token wallet and its signed ledger (§4.6).
//!
//! Every node holds exactly one [`Wallet`], funded by deposits and job
//! payouts, drawn down by stakes posted against bids. The wallet never talks
//! to the network directly: `mesh-auction` calls `stake`/`unstake` around a
//! claim's lifecycle, and settlement calls `deposit`/`draw_reward_pool` once
//! a job's outcome is known.

pub mod error;
pub mod ledger;
pub mod payment;
pub mod wallet;

pub use error::{Result, WalletError};
pub use ledger::{Ledger, LedgerEntry, TxType};
pub use payment::{calculate_payment, PaymentOutcome};
pub use wallet::{Wallet, WalletStats};
