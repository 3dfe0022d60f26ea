//! Protocol statistics report
//!
//! Turns the raw [`Stats`] of the spam package into per-epoch figures: gas
//! spent, SPAM earned per transaction and the implied SUI price of one SPAM.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use tracing::warn;

use crate::epochs::{format_local_period, get_epoch_times, EpochData, EpochTimes};
use crate::ledger::{LedgerClient, LedgerError, Stats};

/// SPAM minted for each completed epoch.
pub const NEW_SUPPLY_PER_EPOCH: u64 = 1_000_000_000;
/// Average SUI gas cost of one increment transaction.
pub const GAS_PER_TX: f64 = 0.000774244;
pub const SPAM_DECIMALS: u32 = 0;
/// Epochs shown by default.
pub const RECENT_EPOCHS: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
    Localnet,
}

impl Network {
    /// Epoch in which the spam package went live.
    pub fn first_epoch(self) -> u64 {
        match self {
            Network::Mainnet => 386,
            Network::Testnet => 357,
            Network::Devnet | Network::Localnet => 0,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
            Network::Localnet => "localnet",
        };
        f.write_str(name)
    }
}

/// Role of an epoch relative to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochKind {
    /// Counters are being incremented
    Current,
    /// Counters are being registered
    Register,
    /// Counters can be claimed
    Claim,
}

impl EpochKind {
    pub fn classify(epoch: u64, current_epoch: u64) -> Self {
        if epoch == current_epoch {
            EpochKind::Current
        } else if epoch + 1 == current_epoch {
            EpochKind::Register
        } else {
            EpochKind::Claim
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: u64,
    /// Unknown when the chain's epoch data could not be read
    pub kind: Option<EpochKind>,
    pub times: Option<EpochTimes>,
    pub tx_count: u64,
    pub gas_paid: f64,
    pub spam_per_tx: Option<f64>,
    pub sui_per_spam: Option<f64>,
}

impl EpochSummary {
    fn new(epoch: u64, tx_count: u64, epoch_data: Option<&EpochData>) -> Self {
        let gas_paid = tx_count as f64 * GAS_PER_TX;
        let spam_per_tx = NEW_SUPPLY_PER_EPOCH as f64 / tx_count as f64;
        let sui_per_spam = gas_paid / NEW_SUPPLY_PER_EPOCH as f64;

        Self {
            epoch,
            kind: epoch_data.map(|d| EpochKind::classify(epoch, d.epoch_number)),
            times: epoch_data.map(|d| get_epoch_times(epoch, d)),
            tx_count,
            gas_paid,
            spam_per_tx: spam_per_tx.is_finite().then_some(spam_per_tx),
            sui_per_spam: (sui_per_spam > 0.0).then_some(sui_per_spam),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub network: Network,
    pub current_epoch: u64,
    pub paused: bool,
    pub total_txs: u64,
    pub total_gas: f64,
    pub circulating_supply: f64,
    pub available_supply: u64,
    pub epochs_completed: u64,
    /// Newest first, starting with the ongoing epoch
    pub epochs: Vec<EpochSummary>,
}

impl StatsReport {
    pub fn build(network: Network, stats: &Stats, epoch_data: Option<&EpochData>) -> Self {
        let epochs_completed = stats
            .epoch
            .saturating_sub(1)
            .saturating_sub(network.first_epoch());

        // the ongoing epoch has no stats entry yet
        let mut epochs = vec![EpochSummary::new(stats.epoch, 0, epoch_data)];
        epochs.extend(
            stats
                .epochs
                .iter()
                .map(|e| EpochSummary::new(e.epoch, e.tx_count, epoch_data)),
        );

        Self {
            network,
            current_epoch: stats.epoch,
            paused: stats.paused,
            total_txs: stats.tx_count,
            total_gas: stats.tx_count as f64 * GAS_PER_TX,
            circulating_supply: stats.supply as f64 / 10f64.powi(SPAM_DECIMALS as i32),
            available_supply: epochs_completed * NEW_SUPPLY_PER_EPOCH,
            epochs_completed,
            epochs,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Stats ({})", self.network);
        let _ = writeln!(
            out,
            "Total transactions: {}",
            format_number(self.total_txs as f64, NumberStyle::Standard)
        );
        let _ = writeln!(
            out,
            "Total gas paid: {} SUI",
            format_number(self.total_gas, NumberStyle::Compact)
        );
        let _ = writeln!(
            out,
            "Circulating supply: {}",
            format_number(self.circulating_supply, NumberStyle::Compact)
        );
        let _ = writeln!(
            out,
            "Available supply: {}",
            format_number(self.available_supply as f64, NumberStyle::Compact)
        );
        let _ = writeln!(out, "Epochs completed: {}", self.epochs_completed);
        let _ = writeln!(out, "Current epoch: {}", self.current_epoch);
        if self.paused {
            let _ = writeln!(out, "System status: paused");
        }

        if !self.epochs.is_empty() {
            let _ = writeln!(out, "\nEpochs:");
        }
        for epoch in &self.epochs {
            out.push('\n');
            render_epoch(&mut out, epoch);
        }
        out
    }
}

fn render_epoch(out: &mut String, epoch: &EpochSummary) {
    let _ = match epoch.kind {
        Some(EpochKind::Current) => writeln!(out, "Epoch {} (spamming now)", epoch.epoch),
        Some(EpochKind::Register) => writeln!(out, "Epoch {} (registering now)", epoch.epoch),
        _ => writeln!(out, "Epoch {}", epoch.epoch),
    };
    if let Some(times) = &epoch.times {
        let _ = writeln!(out, "  {}", format_local_period(times));
    }

    let txs = format_number(epoch.tx_count as f64, NumberStyle::Standard);
    let _ = match epoch.kind {
        Some(EpochKind::Current) => writeln!(out, "  Transactions: ongoing"),
        Some(EpochKind::Register) => {
            writeln!(out, "  Transactions: {} registered so far", txs)
        }
        _ => writeln!(out, "  Transactions: {}", txs),
    };
    if epoch.gas_paid > 0.0 {
        let _ = writeln!(
            out,
            "  Gas paid: {} SUI",
            format_number(epoch.gas_paid, NumberStyle::Standard)
        );
    }
    if let Some(spam_per_tx) = epoch.spam_per_tx {
        let _ = writeln!(
            out,
            "  SPAM per tx: {}",
            format_number(spam_per_tx, NumberStyle::Standard)
        );
    }
    if let Some(sui_per_spam) = epoch.sui_per_spam {
        let _ = writeln!(out, "  SUI per SPAM: {:.8}", sui_per_spam);
    }
}

/// Reads the stats and the current epoch. A failed epoch read only drops the
/// epoch times and roles from the report.
pub async fn fetch_report<L>(
    ledger: &L,
    network: Network,
    recent_epochs: usize,
) -> Result<StatsReport, LedgerError>
where
    L: LedgerClient + ?Sized,
{
    let stats = ledger.fetch_stats(recent_epochs).await?;
    let epoch_data = match ledger.fetch_epoch_data().await {
        Ok(data) => Some(data),
        Err(err) => {
            warn!("epoch update failed: {}", err);
            None
        }
    };
    Ok(StatsReport::build(network, &stats, epoch_data.as_ref()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberStyle {
    /// `1,234,567.89`
    Standard,
    /// `1.23M`
    Compact,
}

pub fn format_number(n: f64, style: NumberStyle) -> String {
    if !n.is_finite() {
        return n.to_string();
    }
    match style {
        NumberStyle::Standard => format_standard(n),
        NumberStyle::Compact => {
            const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];
            // unit is picked after rounding, so 999_999 reads 1M and not 1,000K
            UNITS
                .iter()
                .find(|(size, _)| round_cents(n.abs() / size) >= 1.0)
                .map(|(size, suffix)| format!("{}{}", format_standard(n / size), suffix))
                .unwrap_or_else(|| format_standard(n))
        }
    }
}

fn round_cents(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

fn format_standard(n: f64) -> String {
    let rounded = round_cents(n);
    let fixed = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let frac = frac_part.trim_end_matches('0');
    let sign = if rounded < 0.0 { "-" } else { "" };
    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EpochStats;

    fn stats() -> Stats {
        Stats {
            epoch: 400,
            tx_count: 3_000_000,
            supply: 12_500_000_000,
            paused: false,
            epochs: vec![
                EpochStats {
                    epoch: 399,
                    tx_count: 1_000_000,
                },
                EpochStats {
                    epoch: 398,
                    tx_count: 2_000_000,
                },
            ],
        }
    }

    fn epoch_data() -> EpochData {
        EpochData {
            epoch_number: 400,
            duration_ms: 86_400_000,
            start_time_ms: 1_714_672_800_000,
        }
    }

    #[test]
    fn test_report_totals() {
        let report = StatsReport::build(Network::Mainnet, &stats(), Some(&epoch_data()));

        assert_eq!(report.epochs_completed, 400 - 1 - 386);
        assert_eq!(report.available_supply, 13 * NEW_SUPPLY_PER_EPOCH);
        assert_eq!(report.circulating_supply, 12_500_000_000.0);
        assert!((report.total_gas - 3_000_000.0 * GAS_PER_TX).abs() < 1e-6);
    }

    #[test]
    fn test_current_epoch_is_prepended_and_classified() {
        let report = StatsReport::build(Network::Mainnet, &stats(), Some(&epoch_data()));

        let kinds: Vec<_> = report.epochs.iter().map(|e| (e.epoch, e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (400, Some(EpochKind::Current)),
                (399, Some(EpochKind::Register)),
                (398, Some(EpochKind::Claim)),
            ]
        );
        let current = &report.epochs[0];
        assert_eq!(current.tx_count, 0);
        assert_eq!(current.spam_per_tx, None);
        assert_eq!(current.sui_per_spam, None);
    }

    #[test]
    fn test_per_epoch_economics() {
        let report = StatsReport::build(Network::Mainnet, &stats(), None);
        let epoch = &report.epochs[2];

        assert_eq!(epoch.kind, None);
        assert_eq!(epoch.times, None);
        assert_eq!(epoch.spam_per_tx, Some(500.0));
        let expected = 2_000_000.0 * GAS_PER_TX / NEW_SUPPLY_PER_EPOCH as f64;
        assert!((epoch.sui_per_spam.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_epochs_completed_saturates_before_launch() {
        let mut early = stats();
        early.epoch = 300;
        let report = StatsReport::build(Network::Testnet, &early, None);
        assert_eq!(report.epochs_completed, 0);
        assert_eq!(report.available_supply, 0);
    }

    #[test]
    fn test_render_mentions_roles() {
        let report = StatsReport::build(Network::Mainnet, &stats(), Some(&epoch_data()));
        let text = report.render();

        assert!(text.contains("Total transactions: 3,000,000"));
        assert!(text.contains("Epoch 400 (spamming now)"));
        assert!(text.contains("Transactions: ongoing"));
        assert!(text.contains("Transactions: 1,000,000 registered so far"));
        assert!(text.contains("SPAM per tx: 500"));
    }

    #[test]
    fn test_format_number_standard() {
        assert_eq!(format_number(0.0, NumberStyle::Standard), "0");
        assert_eq!(format_number(1234567.891, NumberStyle::Standard), "1,234,567.89");
        assert_eq!(format_number(999.5, NumberStyle::Standard), "999.5");
        assert_eq!(format_number(-1200.0, NumberStyle::Standard), "-1,200");
    }

    #[test]
    fn test_format_number_compact() {
        assert_eq!(format_number(950.0, NumberStyle::Compact), "950");
        assert_eq!(format_number(1_500.0, NumberStyle::Compact), "1.5K");
        assert_eq!(format_number(12_500_000_000.0, NumberStyle::Compact), "12.5B");
        assert_eq!(format_number(2_322.732, NumberStyle::Compact), "2.32K");
    }

    #[test]
    fn test_format_number_compact_rolls_over_to_next_unit() {
        assert_eq!(format_number(999_999.0, NumberStyle::Compact), "1M");
        assert_eq!(format_number(999_999_999.0, NumberStyle::Compact), "1B");
        assert_eq!(format_number(999.999, NumberStyle::Compact), "1K");
        assert_eq!(format_number(-999_999.0, NumberStyle::Compact), "-1M");
        assert_eq!(format_number(994_000.0, NumberStyle::Compact), "994K");
    }

    #[test]
    fn test_network_first_epochs() {
        assert_eq!(Network::Mainnet.first_epoch(), 386);
        assert_eq!(Network::Testnet.first_epoch(), 357);
        assert_eq!(Network::Localnet.first_epoch(), 0);
        assert_eq!(Network::Devnet.to_string(), "devnet");
    }
}
