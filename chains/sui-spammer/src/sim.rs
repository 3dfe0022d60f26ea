//! In-memory ledger with the spam protocol's counter rules.
//!
//! Used by the CLI for dry runs and by the tests. One user, one counter per
//! epoch:
//!
//! - epoch `e`: the counter is incremented
//! - epoch `e + 1`: it must be registered, which adds its tx count to the
//!   epoch total
//! - epoch `e + 2` and later: registered counters are claimed for a share of
//!   that epoch's SPAM supply, unregistered ones can only be destroyed
//!
//! Writes that break these rules abort with the package's codes, in the same
//! text form a Sui node returns.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::epochs::EpochData;
use crate::ledger::{
    EpochStats, LedgerClient, LedgerError, Receipt, SpamErrorCode, Stats, UserCounter, UserData,
};
use crate::stats::NEW_SUPPLY_PER_EPOCH;

/// Sui mainnet epochs last 24h.
const DEFAULT_EPOCH_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Fetch,
    Register,
    Claim,
    Destroy,
    Create,
    Increment,
    Stats,
    EpochData,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub start_epoch: u64,
    /// Epochs advance on their own after this long; `None` means only
    /// [`SimLedger::advance_epoch`] moves them
    pub epoch_duration: Option<Duration>,
    /// Simulated round trip of every call
    pub latency: Duration,
    pub supply_per_epoch: u64,
    /// JSON file the ledger is loaded from and saved to after every write
    pub state_file: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_epoch: 1,
            epoch_duration: None,
            latency: Duration::ZERO,
            supply_per_epoch: NEW_SUPPLY_PER_EPOCH,
            state_file: None,
        }
    }
}

/// On-disk form of [`SimState`].
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    epoch: u64,
    epoch_started_ms: i64,
    counters: Vec<UserCounter>,
    epoch_totals: BTreeMap<u64, u64>,
    total_tx: u64,
    supply: u128,
    paused: bool,
}

#[derive(Debug)]
struct SimState {
    manual_epochs: u64,
    /// When the current automatic schedule started
    base_instant: Instant,
    base_wall_ms: i64,
    counters: BTreeMap<String, UserCounter>,
    /// Registered tx count per epoch
    epoch_totals: BTreeMap<u64, u64>,
    total_tx: u64,
    supply: u128,
    paused: bool,
    failures: HashMap<SimOp, VecDeque<LedgerError>>,
    /// Bumped on every committed write
    generation: u64,
}

pub struct SimLedger {
    config: SimConfig,
    state: Mutex<SimState>,
    /// Newest state generation on disk
    saved_generation: Mutex<u64>,
}

fn random_hex() -> String {
    hex::encode(rand::thread_rng().gen::<[u8; 32]>())
}

fn receipt() -> Receipt {
    Receipt {
        digest: random_hex(),
    }
}

impl SimLedger {
    /// Fresh ledger, or the one saved in `config.state_file` if it exists.
    pub fn new(config: SimConfig) -> Self {
        let restored = config
            .state_file
            .as_deref()
            .filter(|path| path.exists())
            .and_then(|path| match load_state(path) {
                Ok(persisted) => Some(persisted),
                Err(err) => {
                    warn!("Ignoring unreadable ledger state: {:?}", err);
                    None
                }
            });

        let state = match restored {
            Some(persisted) => Self::restore(&config, persisted),
            None => Self::fresh_state(),
        };
        Self {
            config,
            state: Mutex::new(state),
            saved_generation: Mutex::new(0),
        }
    }

    fn fresh_state() -> SimState {
        SimState {
            manual_epochs: 0,
            base_instant: Instant::now(),
            base_wall_ms: Utc::now().timestamp_millis(),
            counters: BTreeMap::new(),
            epoch_totals: BTreeMap::new(),
            total_tx: 0,
            supply: 0,
            paused: false,
            failures: HashMap::new(),
            generation: 0,
        }
    }

    fn restore(config: &SimConfig, persisted: PersistedState) -> SimState {
        // resume the automatic schedule where the saved epoch started
        let elapsed_ms = (Utc::now().timestamp_millis() - persisted.epoch_started_ms).max(0);
        let now = Instant::now();
        let base_instant = now
            .checked_sub(Duration::from_millis(elapsed_ms as u64))
            .unwrap_or(now);

        SimState {
            manual_epochs: persisted.epoch.saturating_sub(config.start_epoch),
            base_instant,
            base_wall_ms: persisted.epoch_started_ms,
            counters: persisted
                .counters
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            epoch_totals: persisted.epoch_totals,
            total_tx: persisted.total_tx,
            supply: persisted.supply,
            paused: persisted.paused,
            failures: HashMap::new(),
            generation: 0,
        }
    }

    /// Releases `state` and writes it to `state_file`. Failures are logged,
    /// never fatal.
    fn commit(&self, mut state: MutexGuard<'_, SimState>) {
        let Some(path) = self.config.state_file.as_deref() else {
            return;
        };
        state.generation += 1;
        let generation = state.generation;
        let persisted = PersistedState {
            epoch: self.epoch_of(&state),
            epoch_started_ms: self.epoch_started_ms(&state),
            counters: state.counters.values().cloned().collect(),
            epoch_totals: state.epoch_totals.clone(),
            total_tx: state.total_tx,
            supply: state.supply,
            paused: state.paused,
        };
        drop(state);

        let mut saved = self
            .saved_generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // a later write already landed
        if generation <= *saved {
            return;
        }
        match save_state(path, &persisted) {
            Ok(()) => *saved = generation,
            Err(err) => warn!("Failed to save ledger state: {:?}", err),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn auto_epochs(&self, state: &SimState) -> u64 {
        match self.config.epoch_duration {
            Some(duration) if !duration.is_zero() => {
                (state.base_instant.elapsed().as_millis() / duration.as_millis()) as u64
            }
            _ => 0,
        }
    }

    fn epoch_of(&self, state: &SimState) -> u64 {
        self.config.start_epoch + state.manual_epochs + self.auto_epochs(state)
    }

    fn epoch_duration_ms(&self) -> u64 {
        self.config
            .epoch_duration
            .filter(|d| !d.is_zero())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(DEFAULT_EPOCH_MS)
    }

    fn epoch_started_ms(&self, state: &SimState) -> i64 {
        let auto = self.auto_epochs(state);
        state.base_wall_ms + (auto * self.epoch_duration_ms()) as i64
    }

    pub fn current_epoch(&self) -> u64 {
        let state = self.lock();
        self.epoch_of(&state)
    }

    /// Ends the current epoch now. Restarts the automatic schedule, if any.
    pub fn advance_epoch(&self) -> u64 {
        let mut state = self.lock();
        let epoch = self.epoch_of(&state) + 1;
        state.manual_epochs = epoch - self.config.start_epoch;
        state.base_instant = Instant::now();
        state.base_wall_ms = Utc::now().timestamp_millis();
        self.commit(state);
        debug!("sim: advanced to epoch {}", epoch);
        epoch
    }

    pub fn set_paused(&self, paused: bool) {
        let mut state = self.lock();
        state.paused = paused;
        self.commit(state);
    }

    /// Makes the next call of `op` fail with `err`. Queued errors are used
    /// in order.
    pub fn fail_next(&self, op: SimOp, err: LedgerError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Adds a counter directly, as if it had been created in `epoch`.
    pub fn insert_counter(&self, epoch: u64, tx_count: u64, registered: bool) -> String {
        let id = format!("0x{}", random_hex());
        let mut state = self.lock();
        if registered {
            *state.epoch_totals.entry(epoch).or_default() += tx_count;
            state.total_tx += tx_count;
        }
        state.counters.insert(
            id.clone(),
            UserCounter {
                id: id.clone(),
                epoch,
                tx_count,
                registered,
            },
        );
        self.commit(state);
        id
    }

    pub fn counter(&self, id: &str) -> Option<UserCounter> {
        self.lock().counters.get(id).cloned()
    }

    pub fn counter_count(&self) -> usize {
        self.lock().counters.len()
    }

    pub fn supply(&self) -> u128 {
        self.lock().supply
    }

    /// Simulated latency, then any injected failure for `op`.
    async fn enter(&self, op: SimOp) -> Result<(), LedgerError> {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        let mut state = self.lock();
        if let Some(err) = state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            debug!("sim: injected failure for {:?}", op);
            return Err(err);
        }
        Ok(())
    }

    fn check_writable(state: &SimState, function: &str) -> Result<(), LedgerError> {
        if state.paused {
            return Err(LedgerError::move_abort(
                SpamErrorCode::DirectorIsPaused,
                function,
            ));
        }
        Ok(())
    }
}

fn load_state(path: &Path) -> Result<PersistedState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Writes next to `path` first, so a crash never leaves a torn file behind.
fn save_state(path: &Path, state: &PersistedState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))
}

fn not_found(id: &str) -> LedgerError {
    LedgerError::new(format!("Object {} does not exist or is not owned by sender", id))
}

#[async_trait]
impl LedgerClient for SimLedger {
    async fn fetch_user_data(&self) -> Result<UserData, LedgerError> {
        self.enter(SimOp::Fetch).await?;
        let state = self.lock();
        let epoch = self.epoch_of(&state);

        let mut data = UserData {
            epoch,
            ..UserData::default()
        };
        for counter in state.counters.values() {
            if counter.epoch == epoch {
                data.current = Some(counter.clone());
            } else if counter.epoch + 1 == epoch {
                data.register = Some(counter.clone());
            } else if counter.registered {
                data.claim.push(counter.clone());
            } else {
                data.delete.push(counter.clone());
            }
        }
        Ok(data)
    }

    async fn register_counter(&self, id: &str) -> Result<Receipt, LedgerError> {
        const FUNCTION: &str = "register_user_counter";
        self.enter(SimOp::Register).await?;
        let mut state = self.lock();
        Self::check_writable(&state, FUNCTION)?;
        let epoch = self.epoch_of(&state);

        let counter = state.counters.get_mut(id).ok_or_else(|| not_found(id))?;
        if counter.epoch + 1 != epoch {
            return Err(LedgerError::move_abort(SpamErrorCode::WrongEpoch, FUNCTION));
        }
        if counter.registered {
            return Err(LedgerError::move_abort(
                SpamErrorCode::CounterIsRegistered,
                FUNCTION,
            ));
        }
        counter.registered = true;
        let (counter_epoch, tx_count) = (counter.epoch, counter.tx_count);

        *state.epoch_totals.entry(counter_epoch).or_default() += tx_count;
        state.total_tx += tx_count;
        self.commit(state);
        Ok(receipt())
    }

    async fn claim_counters(&self, ids: &[String]) -> Result<Receipt, LedgerError> {
        const FUNCTION: &str = "claim_user_counter";
        self.enter(SimOp::Claim).await?;
        let mut state = self.lock();
        Self::check_writable(&state, FUNCTION)?;
        let epoch = self.epoch_of(&state);

        // all-or-nothing, like a single programmable transaction
        for id in ids {
            let counter = state.counters.get(id).ok_or_else(|| not_found(id))?;
            if counter.epoch + 2 > epoch {
                return Err(LedgerError::move_abort(SpamErrorCode::WrongEpoch, FUNCTION));
            }
            if !counter.registered {
                return Err(LedgerError::move_abort(
                    SpamErrorCode::CounterIsNotRegistered,
                    FUNCTION,
                ));
            }
        }

        for id in ids {
            let Some(counter) = state.counters.remove(id) else {
                continue;
            };
            let epoch_total = state.epoch_totals.get(&counter.epoch).copied().unwrap_or(0);
            if epoch_total > 0 {
                let reward = self.config.supply_per_epoch as u128 * counter.tx_count as u128
                    / epoch_total as u128;
                state.supply += reward;
            }
        }
        self.commit(state);
        Ok(receipt())
    }

    async fn destroy_counters(&self, ids: &[String]) -> Result<Receipt, LedgerError> {
        const FUNCTION: &str = "destroy_user_counter";
        self.enter(SimOp::Destroy).await?;
        let mut state = self.lock();
        Self::check_writable(&state, FUNCTION)?;

        if let Some(missing) = ids.iter().find(|id| !state.counters.contains_key(*id)) {
            return Err(not_found(missing));
        }
        for id in ids {
            state.counters.remove(id);
        }
        self.commit(state);
        Ok(receipt())
    }

    async fn create_counter(&self) -> Result<Receipt, LedgerError> {
        const FUNCTION: &str = "new_user_counter";
        self.enter(SimOp::Create).await?;
        let mut state = self.lock();
        Self::check_writable(&state, FUNCTION)?;
        let epoch = self.epoch_of(&state);

        if state.counters.values().any(|c| c.epoch == epoch) {
            return Err(LedgerError::move_abort(
                SpamErrorCode::CounterAlreadyExists,
                FUNCTION,
            ));
        }
        let id = format!("0x{}", random_hex());
        state.counters.insert(
            id.clone(),
            UserCounter {
                id,
                epoch,
                tx_count: 0,
                registered: false,
            },
        );
        self.commit(state);
        Ok(receipt())
    }

    async fn increment_counter(&self, id: &str) -> Result<Receipt, LedgerError> {
        const FUNCTION: &str = "increment_user_counter";
        self.enter(SimOp::Increment).await?;
        let mut state = self.lock();
        Self::check_writable(&state, FUNCTION)?;
        let epoch = self.epoch_of(&state);

        let counter = state.counters.get_mut(id).ok_or_else(|| not_found(id))?;
        if counter.epoch != epoch {
            return Err(LedgerError::move_abort(SpamErrorCode::WrongEpoch, FUNCTION));
        }
        counter.tx_count += 1;
        self.commit(state);
        Ok(receipt())
    }

    async fn fetch_stats(&self, recent_epochs: usize) -> Result<Stats, LedgerError> {
        self.enter(SimOp::Stats).await?;
        let state = self.lock();
        let epoch = self.epoch_of(&state);

        let epochs = (self.config.start_epoch..epoch)
            .rev()
            .take(recent_epochs)
            .map(|e| EpochStats {
                epoch: e,
                tx_count: state.epoch_totals.get(&e).copied().unwrap_or(0),
            })
            .collect();

        Ok(Stats {
            epoch,
            tx_count: state.total_tx,
            supply: state.supply,
            paused: state.paused,
            epochs,
        })
    }

    async fn fetch_epoch_data(&self) -> Result<EpochData, LedgerError> {
        self.enter(SimOp::EpochData).await?;
        let state = self.lock();

        Ok(EpochData {
            epoch_number: self.epoch_of(&state),
            duration_ms: self.epoch_duration_ms(),
            start_time_ms: self.epoch_started_ms(&state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::classify;

    fn ledger() -> SimLedger {
        SimLedger::new(SimConfig {
            start_epoch: 10,
            ..SimConfig::default()
        })
    }

    #[tokio::test]
    async fn test_counter_lifecycle_buckets() {
        let sim = ledger();
        sim.create_counter().await.unwrap();

        let data = sim.fetch_user_data().await.unwrap();
        let id = data.current.clone().unwrap().id;
        sim.increment_counter(&id).await.unwrap();
        sim.increment_counter(&id).await.unwrap();

        sim.advance_epoch();
        let data = sim.fetch_user_data().await.unwrap();
        assert_eq!(data.epoch, 11);
        assert!(data.current.is_none());
        assert_eq!(data.register.as_ref().unwrap().tx_count, 2);

        sim.register_counter(&id).await.unwrap();
        sim.advance_epoch();
        let data = sim.fetch_user_data().await.unwrap();
        assert_eq!(data.claim.len(), 1);
        assert!(data.delete.is_empty());
    }

    #[tokio::test]
    async fn test_increment_in_wrong_epoch_aborts() {
        let sim = ledger();
        sim.create_counter().await.unwrap();
        let id = sim.fetch_user_data().await.unwrap().current.unwrap().id;

        sim.advance_epoch();
        let err = sim.increment_counter(&id).await.unwrap_err();

        assert_eq!(classify(&err), SpamErrorCode::WrongEpoch);
        assert!(err.to_string().contains("increment_user_counter"));
    }

    #[tokio::test]
    async fn test_second_counter_in_epoch_is_rejected() {
        let sim = ledger();
        sim.create_counter().await.unwrap();

        let err = sim.create_counter().await.unwrap_err();
        assert_eq!(classify(&err), SpamErrorCode::CounterAlreadyExists);
    }

    #[tokio::test]
    async fn test_claim_mints_share_of_epoch_supply() {
        let sim = ledger();
        let first = sim.insert_counter(8, 30, true);
        let second = sim.insert_counter(8, 70, true);
        assert_eq!(sim.fetch_user_data().await.unwrap().claim.len(), 2);

        sim.claim_counters(&[first.clone()]).await.unwrap();

        assert_eq!(sim.supply(), NEW_SUPPLY_PER_EPOCH as u128 * 30 / 100);
        assert!(sim.counter(&first).is_none());
        assert!(sim.counter(&second).is_some());
    }

    #[tokio::test]
    async fn test_claim_is_all_or_nothing() {
        let sim = ledger();
        let ok = sim.insert_counter(7, 5, true);
        let unregistered = sim.insert_counter(7, 5, false);

        let err = sim
            .claim_counters(&[ok.clone(), unregistered])
            .await
            .unwrap_err();

        assert_eq!(classify(&err), SpamErrorCode::CounterIsNotRegistered);
        assert!(sim.counter(&ok).is_some());
        assert_eq!(sim.supply(), 0);
    }

    #[tokio::test]
    async fn test_paused_director_rejects_writes() {
        let sim = ledger();
        sim.set_paused(true);

        let err = sim.create_counter().await.unwrap_err();
        assert_eq!(classify(&err), SpamErrorCode::DirectorIsPaused);
        assert!(sim.fetch_user_data().await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let sim = ledger();
        sim.fail_next(SimOp::Fetch, LedgerError::new("first"));
        sim.fail_next(SimOp::Fetch, LedgerError::new("second"));

        assert_eq!(sim.fetch_user_data().await.unwrap_err().to_string(), "first");
        assert_eq!(sim.fetch_user_data().await.unwrap_err().to_string(), "second");
        assert!(sim.fetch_user_data().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_epochs_advance_with_time() {
        let sim = SimLedger::new(SimConfig {
            start_epoch: 3,
            epoch_duration: Some(Duration::from_secs(60)),
            ..SimConfig::default()
        });

        assert_eq!(sim.current_epoch(), 3);
        tokio::time::advance(Duration::from_secs(125)).await;
        assert_eq!(sim.current_epoch(), 5);

        let epoch = sim.fetch_epoch_data().await.unwrap();
        assert_eq!(epoch.epoch_number, 5);
        assert_eq!(epoch.duration_ms, 60_000);
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimConfig {
            start_epoch: 10,
            state_file: Some(dir.path().join("ledger.json")),
            ..SimConfig::default()
        };

        let sim = SimLedger::new(config.clone());
        sim.create_counter().await.unwrap();
        let id = sim.fetch_user_data().await.unwrap().current.unwrap().id;
        sim.increment_counter(&id).await.unwrap();
        sim.advance_epoch();
        drop(sim);

        let reopened = SimLedger::new(config);
        assert_eq!(reopened.current_epoch(), 11);
        let data = reopened.fetch_user_data().await.unwrap();
        assert_eq!(data.register.unwrap().tx_count, 1);
    }

    #[tokio::test]
    async fn test_state_file_is_replaced_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        // leftover of an interrupted save
        std::fs::write(dir.path().join("ledger.tmp"), "{\"epoch\": 1,").unwrap();

        let sim = SimLedger::new(SimConfig {
            state_file: Some(path.clone()),
            ..SimConfig::default()
        });
        sim.create_counter().await.unwrap();
        let id = sim.fetch_user_data().await.unwrap().current.unwrap().id;
        for _ in 0..5 {
            sim.increment_counter(&id).await.unwrap();
        }

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ledger.json".to_string()]);

        let saved = load_state(&path).unwrap();
        assert_eq!(saved.counters.len(), 1);
        assert_eq!(saved.counters[0].tx_count, 5);
    }

    #[tokio::test]
    async fn test_corrupt_state_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "not json").unwrap();

        let sim = SimLedger::new(SimConfig {
            start_epoch: 4,
            state_file: Some(path),
            ..SimConfig::default()
        });

        assert_eq!(sim.current_epoch(), 4);
        assert_eq!(sim.counter_count(), 0);
    }

    #[tokio::test]
    async fn test_stats_cover_recent_epochs() {
        let sim = ledger();
        sim.insert_counter(10, 4, true);
        sim.advance_epoch();
        sim.advance_epoch();

        let stats = sim.fetch_stats(14).await.unwrap();
        assert_eq!(stats.epoch, 12);
        assert_eq!(stats.tx_count, 4);
        assert_eq!(
            stats.epochs,
            vec![
                EpochStats {
                    epoch: 11,
                    tx_count: 0
                },
                EpochStats {
                    epoch: 10,
                    tx_count: 4
                },
            ]
        );
    }
}
