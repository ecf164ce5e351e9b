//! Reminder scheduler.
//!
//! Wakes on a fixed cadence, sends the initial prompt or a reminder to every
//! outstanding recipient, and shuts itself down once the survey is answered.

pub mod runner;

pub use runner::{ReminderScheduler, SchedulerPhase, TickOutcome};
