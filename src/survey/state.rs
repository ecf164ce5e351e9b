//! The persisted survey record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Single persisted status record.
///
/// `answered` is a cache over `responses`; [`crate::survey::Reconciler`]
/// is the only writer and re-derives it on every read by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredState", into = "StoredState")]
pub struct SurveyState {
    /// Latest normalized response per recipient.
    pub responses: BTreeMap<String, String>,
    /// Whether the initial prompt round has been dispatched.
    pub first_sent: bool,
    /// Whether the survey counts as answered under the active policy.
    pub answered: bool,
    /// Whether the closing broadcast has been claimed for this round.
    pub closing_sent: bool,
}

/// On-disk shape. Records written before `closingSent` existed carry no such
/// key; an answered one of those was closed long ago and reads as claimed.
#[derive(Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoredState {
    responses: BTreeMap<String, String>,
    first_sent: bool,
    answered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    closing_sent: Option<bool>,
}

impl From<StoredState> for SurveyState {
    fn from(stored: StoredState) -> Self {
        Self {
            closing_sent: stored.closing_sent.unwrap_or(stored.answered),
            responses: stored.responses,
            first_sent: stored.first_sent,
            answered: stored.answered,
        }
    }
}

impl From<SurveyState> for StoredState {
    fn from(state: SurveyState) -> Self {
        // Always written for answered records so the key's absence keeps
        // meaning "legacy".
        let closing_sent = (state.answered || state.closing_sent).then_some(state.closing_sent);
        Self {
            responses: state.responses,
            first_sent: state.first_sent,
            answered: state.answered,
            closing_sent,
        }
    }
}

impl SurveyState {
    /// Latest normalized response from `recipient`, if any.
    #[must_use]
    pub fn response_of(&self, recipient: &str) -> Option<&str> {
        self.responses.get(recipient).map(String::as_str)
    }

    /// Claim the closing broadcast.
    ///
    /// Returns `true` exactly once per answered round: the caller that flips
    /// `closing_sent` owns the broadcast.
    pub fn claim_closing(&mut self) -> bool {
        if !self.answered || self.closing_sent {
            return false;
        }
        self.closing_sent = true;
        true
    }
}
