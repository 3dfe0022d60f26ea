//! Spam Loop Controller
//!
//! Drives one user's counters through their lifecycle, one pass at a time:
//!
//! 1. stop if a stop was requested
//! 2. reload [`UserData`] from the ledger
//! 3. register last epoch's counter
//! 4. claim matured counters (one batched call)
//! 5. destroy dead counters (one batched call)
//! 6. create this epoch's counter if there is none, then start a new pass
//! 7. otherwise increment it and wait `increment_delay_ms`
//!
//! Calls are strictly sequential and a failed step is never replayed. A
//! wrong-epoch abort means the snapshot went stale while a call was in
//! flight, so the loop reloads and carries on; any other failure stops it and
//! is kept as the user-visible error.
//!
//! The status flag has a single writer per transition: `start` owns
//! `Stopped -> Running`, `request_stop` owns `Running -> StopRequested`, and
//! only the running loop moves back to `Stopped`.

use async_trait::async_trait;
use core_logic::{
    MetricsCollector, RetryConfig, SpamConfig, Spammer, SpammerStats, STATUS_TARGET,
};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::ledger::{classify, short_id, LedgerClient, LedgerError, UserData};

const STATE_STOPPED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOP_REQUESTED: u8 = 2;

pub const INFO_BOOTING: &str = "booting up";
pub const INFO_READY: &str = "ready to spam";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerStatus {
    Stopped,
    Running,
    StopRequested,
}

impl ControllerStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_RUNNING => Self::Running,
            STATE_STOP_REQUESTED => Self::StopRequested,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::StopRequested => write!(f, "stop requested"),
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    StopRequested,
    /// Terminal failure; the text is also available from [`SpamController::error`]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub exit: RunExit,
    pub increments: u64,
    pub restarts: u64,
}

enum PassOutcome {
    /// A counter was created; its id is only known after a reload
    Created,
    Incremented,
}

pub struct SpamController<L> {
    ledger: L,
    config: SpamConfig,
    backoff: RetryConfig,
    status: AtomicU8,
    info: Mutex<String>,
    error: Mutex<Option<String>>,
    user_data: Mutex<Option<UserData>>,
    metrics: Arc<MetricsCollector>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<L: LedgerClient> SpamController<L> {
    pub fn new(ledger: L, config: SpamConfig) -> Self {
        let backoff = RetryConfig::new(config.max_consecutive_restarts, config.restart_backoff_ms)
            .with_max_delay(config.restart_backoff_ms.saturating_mul(16));
        Self {
            ledger,
            config,
            backoff,
            status: AtomicU8::new(STATE_STOPPED),
            info: Mutex::new(INFO_BOOTING.to_string()),
            error: Mutex::new(None),
            user_data: Mutex::new(None),
            metrics: Arc::new(MetricsCollector::default()),
        }
    }

    pub fn with_backoff(mut self, backoff: RetryConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus::from_raw(self.status.load(Ordering::SeqCst))
    }

    /// Latest progress message.
    pub fn info(&self) -> String {
        lock(&self.info).clone()
    }

    /// Text of the error that stopped the last run, if any.
    pub fn error(&self) -> Option<String> {
        lock(&self.error).clone()
    }

    /// Most recent snapshot read from the ledger.
    pub fn user_data(&self) -> Option<UserData> {
        lock(&self.user_data).clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Loads the first snapshot so it can be displayed before spamming.
    /// Does nothing while a run owns the snapshot.
    pub async fn boot(&self) -> Option<UserData> {
        if self.status() != ControllerStatus::Stopped {
            debug!("Can't boot now. Status: {}", self.status());
            return self.user_data();
        }
        self.show_info(INFO_BOOTING);
        match self.reload().await {
            Ok(data) => {
                self.show_info(INFO_READY);
                Some(data)
            }
            Err(err) => {
                error!("Failed to load user data: {}", err);
                *lock(&self.error) = Some(err.to_string());
                None
            }
        }
    }

    /// Asks the running loop to stop before its next pass. The call in
    /// flight, and the delay after an increment, are not interrupted.
    ///
    /// Returns `false`, and changes nothing, unless the loop is running.
    pub fn request_stop(&self) -> bool {
        match self.status.compare_exchange(
            STATE_RUNNING,
            STATE_STOP_REQUESTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                info!("Stop requested");
                true
            }
            Err(actual) => {
                debug!(
                    "Ignoring stop request. Status: {}",
                    ControllerStatus::from_raw(actual)
                );
                false
            }
        }
    }

    /// Runs the loop until it is stopped or fails.
    ///
    /// Returns `None` without doing anything if the controller is not
    /// `Stopped`; concurrent starts cannot both win.
    pub async fn start(&self) -> Option<RunReport> {
        if let Err(actual) = self.status.compare_exchange(
            STATE_STOPPED,
            STATE_RUNNING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            debug!("Can't spam now. Status: {}", ControllerStatus::from_raw(actual));
            return None;
        }
        *lock(&self.error) = None;
        Some(self.run().await)
    }

    async fn run(&self) -> RunReport {
        let mut increments = 0u64;
        let mut restarts = 0u64;
        // creations and epoch races since the last successful increment
        let mut restarts_in_row = 0u32;

        loop {
            if self.status.load(Ordering::SeqCst) == STATE_STOP_REQUESTED {
                self.status.store(STATE_STOPPED, Ordering::SeqCst);
                self.show_info(INFO_READY);
                return RunReport {
                    exit: RunExit::StopRequested,
                    increments,
                    restarts,
                };
            }

            match self.pass().await {
                Ok(PassOutcome::Incremented) => {
                    increments += 1;
                    restarts_in_row = 0;
                    continue;
                }
                Ok(PassOutcome::Created) => {
                    debug!("Counter created, reloading");
                }
                Err(err) => match classify(&err) {
                    code if code.is_retryable() => {
                        let delay = self.backoff.delay_for_attempt(restarts_in_row);
                        warn!(
                            target: STATUS_TARGET,
                            "epoch changed mid-operation, reloading in {:?}", delay
                        );
                        sleep(delay).await;
                    }
                    code => {
                        debug!("Terminal ledger error ({:?})", code);
                        let exit = self.fail(err.to_string());
                        return RunReport {
                            exit,
                            increments,
                            restarts,
                        };
                    }
                },
            }

            restarts += 1;
            restarts_in_row += 1;
            self.metrics.record_restart();

            if restarts_in_row > self.config.max_consecutive_restarts {
                let exit = self.fail(format!(
                    "gave up after {} consecutive restarts",
                    restarts_in_row
                ));
                return RunReport {
                    exit,
                    increments,
                    restarts,
                };
            }
        }
    }

    async fn pass(&self) -> Result<PassOutcome, LedgerError> {
        let mut data = self.reload().await?;

        if let Some(counter) = data.register.as_mut() {
            if !counter.registered {
                self.show_info(&format!("registering counter: {}", short_id(&counter.id)));
                self.call("register", self.ledger.register_counter(&counter.id))
                    .await?;
                counter.registered = true;
            }
        }

        if !data.claim.is_empty() {
            let ids: Vec<String> = data.claim.iter().map(|c| c.id.clone()).collect();
            self.show_info(&format!("claiming counters: {}", short_ids(&ids)));
            self.call("claim", self.ledger.claim_counters(&ids)).await?;
            data.claim.clear();
        }

        if !data.delete.is_empty() {
            let ids: Vec<String> = data.delete.iter().map(|c| c.id.clone()).collect();
            self.show_info(&format!("deleting counters: {}", short_ids(&ids)));
            self.call("destroy", self.ledger.destroy_counters(&ids)).await?;
            data.delete.clear();
        }

        *lock(&self.user_data) = Some(data.clone());

        let Some(current) = data.current.as_ref() else {
            self.show_info("creating counter");
            self.call("create", self.ledger.create_counter()).await?;
            return Ok(PassOutcome::Created);
        };

        self.show_info("spamming");
        debug!("counters.current.id: {}", current.id);
        self.call("increment", self.ledger.increment_counter(&current.id))
            .await?;
        sleep(self.config.increment_delay()).await;
        Ok(PassOutcome::Incremented)
    }

    async fn reload(&self) -> Result<UserData, LedgerError> {
        let data = self.call("fetch", self.ledger.fetch_user_data()).await?;
        *lock(&self.user_data) = Some(data.clone());
        Ok(data)
    }

    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, LedgerError>
    where
        T: fmt::Debug,
        F: Future<Output = Result<T, LedgerError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        self.metrics
            .record_operation(operation, started.elapsed(), result.is_ok());
        match &result {
            Ok(resp) => debug!("{} resp: {:?}", operation, resp),
            Err(err) => debug!("{} failed: {}", operation, err),
        }
        result
    }

    fn fail(&self, message: String) -> RunExit {
        error!("Spamming stopped: {}", message);
        *lock(&self.error) = Some(message.clone());
        self.status.store(STATE_STOPPED, Ordering::SeqCst);
        self.show_info(INFO_READY);
        RunExit::Failed(message)
    }

    fn show_info(&self, msg: &str) {
        *lock(&self.info) = msg.to_string();
        info!(target: STATUS_TARGET, "{}", msg);
    }
}

fn short_ids(ids: &[String]) -> String {
    ids.iter()
        .map(|id| short_id(id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl<L: LedgerClient + 'static> Spammer for SpamController<L> {
    fn name(&self) -> &str {
        "sui-spam"
    }

    async fn start(&self) -> anyhow::Result<Option<SpammerStats>> {
        let Some(report) = SpamController::start(self).await else {
            return Ok(None);
        };
        info!(
            "Run finished: {} increments, {} restarts",
            report.increments, report.restarts
        );
        match report.exit {
            RunExit::StopRequested => Ok(Some(SpammerStats {
                success: self.metrics.ops_success(),
                failed: self.metrics.ops_failed(),
            })),
            RunExit::Failed(message) => Err(anyhow::anyhow!(message)),
        }
    }

    fn request_stop(&self) {
        SpamController::request_stop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_matches_ui_labels() {
        assert_eq!(ControllerStatus::Stopped.to_string(), "stopped");
        assert_eq!(ControllerStatus::Running.to_string(), "running");
        assert_eq!(ControllerStatus::StopRequested.to_string(), "stop requested");
    }

    #[test]
    fn test_unknown_raw_status_reads_as_stopped() {
        assert_eq!(ControllerStatus::from_raw(7), ControllerStatus::Stopped);
    }

    #[test]
    fn test_short_ids_joined() {
        let ids = vec![
            "0x1111aaaaaaaaaaaaaaaa2222".to_string(),
            "0x3333bbbbbbbbbbbbbbbb4444".to_string(),
        ];
        assert_eq!(short_ids(&ids), "0x1111…2222, 0x3333…4444");
    }
}
