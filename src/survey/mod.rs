//! Survey status: the persisted record, acknowledgement reconciliation and
//! the coordinator that ties them to the gateway and the scheduler.

pub mod reconcile;
pub mod service;
pub mod state;
pub mod store;

pub use reconcile::{
    AffirmativeSet, AllAffirm, AnsweredPolicy, AnyAffirms, Reconciled, Reconciler, normalize,
    policy_for,
};
pub use service::{AckOutcome, ManualSend, SurveyService};
pub use state::SurveyState;
pub use store::{JsonFileBackend, MemoryBackend, StateBackend, StatusStore};
