//! Pingback: acknowledgement tracking with scheduled reminders.
//!
//! A fixed set of recipients is asked whether a task is done. Replies arrive
//! through a webhook and are reconciled into one persisted status record; a
//! background scheduler re-sends the question to whoever has not confirmed
//! until the survey is answered, then broadcasts a single closing message.
//!
//! # Architecture
//!
//! - **Store**: [`survey::StatusStore`] serializes every read-modify-write of
//!   the [`SurveyState`] record
//! - **Reconciler**: [`survey::Reconciler`] applies replies and derives the
//!   answered flag under a configurable policy
//! - **Scheduler**: [`ReminderScheduler`] owns the reminder loop task
//! - **Gateway**: [`gateway::NotificationGateway`] sends outbound messages
//! - **HTTP**: [`server::router`] exposes the webhook and admin routes

pub mod config;
pub mod error;
pub mod gateway;
pub mod scheduler;
pub mod server;
pub mod survey;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::PingbackConfig;
pub use error::{PingbackError, Result};
pub use scheduler::ReminderScheduler;
pub use survey::{SurveyService, SurveyState};
