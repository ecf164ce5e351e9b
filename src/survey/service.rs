//! Survey coordinator.
//!
//! Owns the shared handles (store, reconciler, gateway, scheduler) and
//! implements the operations the HTTP layer exposes. The closing message is
//! claimed inside the same store update that records the acknowledgement, so
//! the webhook path and the scheduler tick can never both send it.

use crate::config::{MessagesConfig, PingbackConfig};
use crate::error::{PingbackError, Result};
use crate::gateway::{self, DispatchReport, NotificationGateway, dispatch, spawn_dispatch};
use crate::scheduler::{ReminderScheduler, SchedulerPhase};
use crate::survey::{Reconciler, StatusStore, SurveyState};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one inbound acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Nothing recorded (no sender).
    Ignored,
    /// Response recorded; `answered` is the record's state afterwards.
    Recorded { answered: bool },
    /// This acknowledgement closed the survey and sent the closing broadcast.
    Closed { broadcast: DispatchReport },
}

/// Result of a manual reminder request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualSend {
    AlreadyAnswered,
    Sent(DispatchReport),
}

/// Coordinator shared by the HTTP handlers.
pub struct SurveyService {
    store: Arc<StatusStore>,
    reconciler: Arc<Reconciler>,
    gateway: Arc<dyn NotificationGateway>,
    scheduler: Arc<ReminderScheduler>,
    messages: MessagesConfig,
}

impl SurveyService {
    pub fn new(
        store: Arc<StatusStore>,
        reconciler: Arc<Reconciler>,
        gateway: Arc<dyn NotificationGateway>,
        messages: MessagesConfig,
        scheduler: Arc<ReminderScheduler>,
    ) -> Self {
        Self {
            store,
            reconciler,
            gateway,
            scheduler,
            messages,
        }
    }

    /// Build every component from configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error when the configuration fails validation.
    pub fn from_config(config: &PingbackConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(StatusStore::json_file(&config.store.path));
        let reconciler = Arc::new(Reconciler::from_config(&config.survey));
        let gateway = gateway::from_config(&config.gateway);
        Ok(Self::with_components(
            store,
            reconciler,
            gateway,
            config,
        ))
    }

    /// Build from explicit store, reconciler and gateway; cadence and texts
    /// come from `config`.
    pub fn with_components(
        store: Arc<StatusStore>,
        reconciler: Arc<Reconciler>,
        gateway: Arc<dyn NotificationGateway>,
        config: &PingbackConfig,
    ) -> Self {
        let scheduler = Arc::new(
            ReminderScheduler::new(
                Arc::clone(&store),
                Arc::clone(&reconciler),
                Arc::clone(&gateway),
                config.messages.clone(),
            )
            .with_interval(config.survey.reminder_interval())
            .with_stop_grace(config.survey.stop_grace()),
        );
        Self::new(
            store,
            reconciler,
            gateway,
            config.messages.clone(),
            scheduler,
        )
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// Start the reminder loop (no-op while one is alive).
    ///
    /// # Errors
    ///
    /// Returns a scheduler error when called outside a tokio runtime.
    pub fn start(&self) -> Result<bool> {
        self.scheduler.start()
    }

    /// Record an inbound message and close the survey if it answered it.
    ///
    /// # Errors
    ///
    /// Returns a store error when the updated record cannot be persisted; no
    /// closing message is sent in that case. Once the closing is claimed its
    /// broadcast runs on a separate task and finishes even if this future is
    /// dropped.
    pub async fn acknowledge(&self, from: &str, body: &str) -> Result<AckOutcome> {
        let sender = from.trim();
        if sender.is_empty() {
            warn!("inbound message without sender ignored");
            return Ok(AckOutcome::Ignored);
        }
        info!(sender = %sender, body = %body.trim(), "inbound message");

        let reconciler = &self.reconciler;
        let (answered, claimed) = self.store.update(|state| {
            let reconciled = reconciler.apply(state, sender, body);
            *state = reconciled.state;
            if reconciled.newly_answered {
                info!(sender = %sender, policy = reconciler.policy().name(), "survey answered");
            }
            (state.answered, state.claim_closing())
        })?;

        if !claimed {
            return Ok(AckOutcome::Recorded { answered });
        }

        // The claim is persisted; the broadcast must outlive this request.
        info!("sending closing message");
        let closing = spawn_dispatch(
            Arc::clone(&self.gateway),
            reconciler.recipients().to_vec(),
            self.messages.closing.clone(),
        );
        self.scheduler.stop().await;
        let broadcast = closing.await.map_err(|e| {
            PingbackError::Scheduler(format!("closing broadcast task failed: {e}"))
        })?;
        Ok(AckOutcome::Closed { broadcast })
    }

    /// Current record with the answered cache re-derived.
    pub fn status(&self) -> SurveyState {
        self.reconciler.refresh(self.store.load())
    }

    /// Clear the record and restart the reminder loop from the initial prompt.
    ///
    /// # Errors
    ///
    /// Returns a store error when the empty record cannot be persisted; the
    /// scheduler is left untouched in that case.
    pub async fn reset(&self) -> Result<()> {
        self.store.reset()?;
        self.scheduler.rearm().await?;
        info!("survey reset");
        Ok(())
    }

    /// Send the manual reminder to every outstanding recipient.
    pub async fn send_manual(&self) -> ManualSend {
        let state = self.status();
        if state.answered {
            return ManualSend::AlreadyAnswered;
        }
        let outstanding = self.reconciler.outstanding(&state);
        info!(outstanding = outstanding.len(), "manual reminder requested");
        ManualSend::Sent(
            dispatch(
                self.gateway.as_ref(),
                &outstanding,
                &self.messages.manual_reminder,
            )
            .await,
        )
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.scheduler.phase()
    }

    /// Stop the reminder loop, waiting up to its grace period.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
    }
}
