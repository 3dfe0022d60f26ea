//! Sui Spammer - counter loop for the SPAM protocol on Sui
//!
//! SPAM rewards users for the transactions they send: every epoch each user
//! increments a counter object, registers it in the following epoch and
//! claims a share of that epoch's SPAM supply after that. This crate drives
//! one user's counters through that lifecycle and reports on the protocol.
//!
//! # Architecture
//!
//! - **[`SpamController`]**: the spam loop, with cooperative start/stop and
//!   recovery from epoch races
//! - **[`LedgerClient`]**: everything the loop needs from the chain, plus the
//!   Move abort classification in [`classify`]
//! - **[`SimLedger`]**: in-process ledger with the protocol's counter rules,
//!   used for dry runs and tests
//! - **[`StatsReport`]**: protocol-wide stats with per-epoch rewards and
//!   projected epoch times
//!
//! # Quick Start
//!
//! ```bash
//! # Spam until Ctrl+C
//! cargo run -p sui-spammer -- spam
//!
//! # Show the user's counters, or the protocol stats
//! cargo run -p sui-spammer -- status
//! cargo run -p sui-spammer -- stats --json
//! ```

pub mod config;
pub mod controller;
pub mod epochs;
pub mod ledger;
pub mod sim;
pub mod stats;

pub use config::{SimulationConfig, SuiSpammerConfig};
pub use controller::{ControllerStatus, RunExit, RunReport, SpamController};
pub use epochs::{get_epoch_times, EpochData, EpochTimes};
pub use ledger::{
    classify, parse_spam_error, LedgerClient, LedgerError, SpamErrorCode, UserCounter, UserData,
};
pub use sim::{SimConfig, SimLedger, SimOp};
pub use stats::{fetch_report, Network, StatsReport};
