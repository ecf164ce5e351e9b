//! Scheduler background loop.
//!
//! Spawns a tokio task that ticks immediately and then every
//! `reminder_interval`. Each tick reads the status record and either sends
//! the initial prompt, sends a reminder, or claims and broadcasts the
//! closing message and ends the loop.

use crate::config::MessagesConfig;
use crate::error::{PingbackError, Result};
use crate::gateway::{DispatchReport, NotificationGateway, dispatch, spawn_dispatch};
use crate::survey::{Reconciler, StatusStore};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default interval between ticks (seconds).
const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Default time `stop()` waits for the loop to exit.
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle phase, observable through [`ReminderScheduler::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    /// Never started.
    Idle,
    /// Started; the initial prompt has not been dispatched yet.
    AwaitingFirstSend,
    /// Initial prompt done; sending reminders on each tick.
    Polling,
    /// Loop exited (answered, or stop signal).
    Stopped,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Initial prompt dispatched and `firstSent` persisted.
    InitialPromptSent(DispatchReport),
    /// Reminder dispatched to the outstanding recipients.
    ReminderSent(DispatchReport),
    /// Survey answered. `broadcast` is `None` when another path had already
    /// claimed the closing message.
    Closed { broadcast: Option<DispatchReport> },
}

impl TickOutcome {
    /// Whether the loop should exit after this tick.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// State shared between the scheduler handle and its loop task.
struct TickContext {
    store: Arc<StatusStore>,
    reconciler: Arc<Reconciler>,
    gateway: Arc<dyn NotificationGateway>,
    messages: MessagesConfig,
    phase_tx: watch::Sender<SchedulerPhase>,
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the reminder loop: its cancellation token, task handle and phase.
pub struct ReminderScheduler {
    ctx: Arc<TickContext>,
    interval: Duration,
    stop_grace: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<StatusStore>,
        reconciler: Arc<Reconciler>,
        gateway: Arc<dyn NotificationGateway>,
        messages: MessagesConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SchedulerPhase::Idle);
        Self {
            ctx: Arc::new(TickContext {
                store,
                reconciler,
                gateway,
                messages,
                phase_tx,
            }),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            stop_grace: DEFAULT_STOP_GRACE,
            running: Mutex::new(None),
        }
    }

    /// Override the tick interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override how long [`stop`](Self::stop) waits for the loop.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SchedulerPhase {
        *self.ctx.phase_tx.borrow()
    }

    /// Receiver notified on every phase change.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerPhase> {
        self.ctx.phase_tx.subscribe()
    }

    /// Whether a loop task is alive.
    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Spawn the loop unless a live one exists. Returns `true` when spawned.
    ///
    /// Liveness is taken from the task handle, so a loop that exited or
    /// panicked is replaced.
    ///
    /// # Errors
    ///
    /// Returns a scheduler error when called outside a tokio runtime.
    pub fn start(&self) -> Result<bool> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PingbackError::Scheduler(format!("cannot start reminder loop: {e}")))?;
        let mut running = self.lock_running();
        if let Some(run) = running.as_ref()
            && !run.handle.is_finished()
        {
            debug!("reminder scheduler already running");
            return Ok(false);
        }

        let cancel = CancellationToken::new();
        self.ctx.set_phase(SchedulerPhase::AwaitingFirstSend);
        let handle = runtime.spawn(run_loop(
            Arc::clone(&self.ctx),
            self.interval,
            self.stop_grace,
            cancel.clone(),
        ));
        *running = Some(RunningLoop { cancel, handle });
        info!(
            interval_secs = self.interval.as_secs(),
            "reminder scheduler launched"
        );
        Ok(true)
    }

    /// Ask the loop to exit without waiting for it.
    pub fn signal_stop(&self) {
        if let Some(run) = self.lock_running().as_ref() {
            run.cancel.cancel();
        }
    }

    /// Cancel the loop and wait up to the stop grace for it to exit.
    ///
    /// The phase ends at `Stopped` even when no loop was running. Overrunning
    /// the grace is logged, not returned as an error.
    pub async fn stop(&self) {
        let Some(run) = self.lock_running().take() else {
            self.ctx.set_phase(SchedulerPhase::Stopped);
            return;
        };
        run.cancel.cancel();

        match tokio::time::timeout(self.stop_grace, run.handle).await {
            Ok(Ok(())) => debug!("reminder scheduler joined"),
            Ok(Err(e)) => warn!("reminder scheduler task ended abnormally: {e}"),
            Err(_) => warn!(
                grace_ms = self.stop_grace.as_millis() as u64,
                "reminder scheduler did not stop within grace period"
            ),
        }
    }

    /// Stop any running loop and start a fresh one from `AwaitingFirstSend`.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub async fn rearm(&self) -> Result<()> {
        self.stop().await;
        self.start()?;
        Ok(())
    }

    /// Run one tick on the caller's task.
    ///
    /// # Errors
    ///
    /// Returns a store error when `firstSent` or the closing claim cannot be
    /// persisted.
    pub async fn run_tick(&self) -> Result<TickOutcome> {
        self.ctx.tick().await
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

impl TickContext {
    fn set_phase(&self, phase: SchedulerPhase) {
        let previous = self.phase_tx.send_replace(phase);
        if previous != phase {
            debug!(from = ?previous, to = ?phase, "scheduler phase changed");
        }
    }

    async fn tick(&self) -> Result<TickOutcome> {
        let state = self.reconciler.refresh(self.store.load());
        let outstanding = self.reconciler.outstanding(&state);

        if state.answered || outstanding.is_empty() {
            return self.close().await;
        }

        if !state.first_sent {
            self.set_phase(SchedulerPhase::AwaitingFirstSend);
            info!(
                recipients = outstanding.len(),
                "sending initial prompt"
            );
            let report = dispatch(
                self.gateway.as_ref(),
                &outstanding,
                &self.messages.initial_prompt,
            )
            .await;
            if !report.is_complete() {
                warn!(
                    failed = report.failed.len(),
                    "initial prompt not delivered to every recipient; they stay outstanding"
                );
            }
            // Marked even on partial failure so retries follow the regular cadence.
            self.store.update(|s| s.first_sent = true)?;
            self.set_phase(SchedulerPhase::Polling);
            return Ok(TickOutcome::InitialPromptSent(report));
        }

        self.set_phase(SchedulerPhase::Polling);
        info!(
            outstanding = outstanding.len(),
            "survey not answered yet, sending reminder"
        );
        let report = dispatch(self.gateway.as_ref(), &outstanding, &self.messages.reminder).await;
        Ok(TickOutcome::ReminderSent(report))
    }

    async fn close(&self) -> Result<TickOutcome> {
        let reconciler = &self.reconciler;
        let claimed = self.store.update(|s| {
            *s = reconciler.refresh(std::mem::take(s));
            let done = s.answered || reconciler.outstanding(s).is_empty();
            if done && !s.closing_sent {
                s.closing_sent = true;
                true
            } else {
                false
            }
        })?;
        self.set_phase(SchedulerPhase::Stopped);

        if !claimed {
            debug!("survey answered; closing message already sent");
            return Ok(TickOutcome::Closed { broadcast: None });
        }

        info!("survey answered, sending closing message");
        let report = spawn_dispatch(
            Arc::clone(&self.gateway),
            reconciler.recipients().to_vec(),
            self.messages.closing.clone(),
        )
        .await
        .map_err(|e| PingbackError::Scheduler(format!("closing broadcast task failed: {e}")))?;
        Ok(TickOutcome::Closed {
            broadcast: Some(report),
        })
    }
}

async fn run_loop(
    ctx: Arc<TickContext>,
    interval: Duration,
    grace: Duration,
    cancel: CancellationToken,
) {
    info!("reminder scheduler started");

    loop {
        // Each tick runs on its own task so a panic ends that tick, not the loop.
        let tick_ctx = Arc::clone(&ctx);
        let mut tick = tokio::spawn(async move { tick_ctx.tick().await });

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                // An in-flight tick may be persisting a claim; let it finish.
                if tokio::time::timeout(grace, &mut tick).await.is_err() {
                    tick.abort();
                    warn!("in-flight tick aborted after stop grace");
                } else {
                    debug!("in-flight tick finished after stop signal");
                }
                break;
            }
            result = &mut tick => result,
        };

        match result {
            Ok(Ok(outcome)) if outcome.is_terminal() => break,
            Ok(Ok(outcome)) => debug!(?outcome, "tick complete"),
            Ok(Err(e)) => error!("reminder tick failed: {e}"),
            Err(e) => error!("reminder tick aborted: {e}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reminder wait interrupted by stop signal");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    ctx.set_phase(SchedulerPhase::Stopped);
    info!("reminder scheduler stopped");
}
