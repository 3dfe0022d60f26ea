//! Ledger contract - what the spam loop needs from a Sui client
//!
//! The controller never talks to the chain directly. Everything goes through
//! [`LedgerClient`], whose calls either succeed with a [`Receipt`] or fail
//! with a [`LedgerError`]. Failures are mapped onto the abort codes of the
//! spam Move package by [`classify`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use thiserror::Error;

use crate::epochs::EpochData;

/// A per-epoch counter object owned by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounter {
    pub id: String,
    pub epoch: u64,
    pub tx_count: u64,
    pub registered: bool,
}

/// The user's counters as seen at `epoch`, bucketed by what the loop must do
/// with them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub epoch: u64,
    /// Counter for the current epoch, incremented by the loop
    pub current: Option<UserCounter>,
    /// Counter from the previous epoch, to be registered
    pub register: Option<UserCounter>,
    /// Registered counters whose rewards can be claimed
    pub claim: Vec<UserCounter>,
    /// Counters that can no longer earn anything
    pub delete: Vec<UserCounter>,
}

impl UserData {
    /// Plain-text listing of every bucket, empty ones shown as `None`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Epoch: {}", self.epoch);
        render_counters(&mut out, "Current counter", self.current.as_slice());
        render_counters(&mut out, "Registered counters", self.register.as_slice());
        render_counters(&mut out, "Claimable counters", &self.claim);
        render_counters(&mut out, "Deletable counters", &self.delete);
        out
    }
}

fn render_counters(out: &mut String, title: &str, counters: &[UserCounter]) {
    let _ = writeln!(out, "\n{}:", title);
    if counters.is_empty() {
        let _ = writeln!(out, "  None");
    }
    for counter in counters {
        let _ = writeln!(
            out,
            "  id: {}\n  epoch: {}\n  tx_count: {}\n  registered: {}",
            counter.id, counter.epoch, counter.tx_count, counter.registered
        );
    }
}

/// Outcome of a state-changing ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: u64,
    pub tx_count: u64,
}

/// Protocol-wide statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub epoch: u64,
    pub tx_count: u64,
    /// Claimed SPAM supply in base units
    pub supply: u128,
    pub paused: bool,
    /// Most recent epochs first
    pub epochs: Vec<EpochStats>,
}

/// Failure of a ledger call.
///
/// `Display` is exactly the message reported by the client, so it can be
/// shown to the user verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct LedgerError {
    code: Option<u64>,
    message: String,
}

impl LedgerError {
    /// Error with no structured abort code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Move abort raised by `function` of the spam package, in the text form
    /// returned by Sui full nodes.
    pub fn move_abort(code: SpamErrorCode, function: &str) -> Self {
        let code = code.as_code();
        Self::with_code(
            code,
            format!(
                "MoveAbort(MoveLocation {{ module: ModuleId {{ name: Identifier(\"spam\") }}, function_name: Some(\"{}\") }}, {}) in command 0",
                function, code
            ),
        )
    }

    pub fn code(&self) -> Option<u64> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Abort codes of the spam Move package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpamErrorCode {
    /// The epoch changed between reading state and submitting the call
    WrongEpoch,
    DirectorIsPaused,
    CounterIsRegistered,
    CounterIsNotRegistered,
    CounterAlreadyExists,
    /// Not an abort, or an abort code this client does not know about
    Unknown,
}

impl SpamErrorCode {
    pub fn from_code(code: u64) -> Self {
        match code {
            100 => Self::WrongEpoch,
            101 => Self::DirectorIsPaused,
            102 => Self::CounterIsRegistered,
            103 => Self::CounterIsNotRegistered,
            104 => Self::CounterAlreadyExists,
            _ => Self::Unknown,
        }
    }

    /// Numeric abort code. `Unknown` maps to 0, which the package never uses.
    pub fn as_code(self) -> u64 {
        match self {
            Self::WrongEpoch => 100,
            Self::DirectorIsPaused => 101,
            Self::CounterIsRegistered => 102,
            Self::CounterIsNotRegistered => 103,
            Self::CounterAlreadyExists => 104,
            Self::Unknown => 0,
        }
    }

    pub fn is_retryable(self) -> bool {
        self == Self::WrongEpoch
    }
}

static MOVE_ABORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"MoveAbort\(.*,\s*(\d+)\)\s+in command").expect("static regex is valid")
});

/// Extracts the abort code from the text of a failed transaction.
pub fn parse_spam_error(text: &str) -> SpamErrorCode {
    MOVE_ABORT_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(SpamErrorCode::from_code)
        .unwrap_or(SpamErrorCode::Unknown)
}

/// Structured code when the client provides one, otherwise whatever can be
/// recovered from the message text.
pub fn classify(err: &LedgerError) -> SpamErrorCode {
    match err.code {
        Some(code) => SpamErrorCode::from_code(code),
        None => parse_spam_error(&err.message),
    }
}

/// `0x1234…cdef` form of an object id.
pub fn short_id(id: &str) -> String {
    let hex = id.strip_prefix("0x").unwrap_or(id);
    if hex.len() <= 8 || !hex.is_ascii() {
        return id.to_string();
    }
    format!("0x{}…{}", &hex[..4], &hex[hex.len() - 4..])
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_user_data(&self) -> Result<UserData, LedgerError>;

    async fn register_counter(&self, id: &str) -> Result<Receipt, LedgerError>;

    async fn claim_counters(&self, ids: &[String]) -> Result<Receipt, LedgerError>;

    async fn destroy_counters(&self, ids: &[String]) -> Result<Receipt, LedgerError>;

    async fn create_counter(&self) -> Result<Receipt, LedgerError>;

    async fn increment_counter(&self, id: &str) -> Result<Receipt, LedgerError>;

    /// Protocol stats covering up to `recent_epochs` past epochs.
    async fn fetch_stats(&self, recent_epochs: usize) -> Result<Stats, LedgerError>;

    async fn fetch_epoch_data(&self) -> Result<EpochData, LedgerError>;
}
