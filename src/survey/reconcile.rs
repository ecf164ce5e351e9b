//! Merging inbound acknowledgements into the survey record.
//!
//! [`Reconciler::apply`] is pure: it returns the next record and leaves
//! persistence to the caller, which runs it inside
//! [`crate::survey::StatusStore::update`].

use crate::config::{PolicyKind, SurveyConfig};
use crate::survey::state::SurveyState;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Characters removed from inbound text before classification.
const STRIPPED_PUNCTUATION: [char; 3] = ['!', '.', '?'];

/// Normalize raw inbound text: trim, case-fold, drop `! . ?`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();
    folded.trim().to_owned()
}

/// Synonyms counted as an affirmative acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffirmativeSet {
    tokens: BTreeSet<String>,
}

impl AffirmativeSet {
    /// Build from configured tokens; each token is normalized and blanks are dropped.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| normalize(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        Self { tokens }
    }

    /// Whether already-normalized text is affirmative.
    #[must_use]
    pub fn contains(&self, normalized: &str) -> bool {
        self.tokens.contains(normalized)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for AffirmativeSet {
    fn default() -> Self {
        Self::new(SurveyConfig::default().affirmative_tokens)
    }
}

/// Decides whether the current responses answer the survey.
///
/// Implementations see only the response map and the configured recipients,
/// so a different rule can be swapped in without touching [`Reconciler`].
pub trait AnsweredPolicy: Send + Sync + fmt::Debug {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Evaluate the rule from scratch.
    fn is_answered(
        &self,
        responses: &BTreeMap<String, String>,
        recipients: &[String],
        affirmative: &AffirmativeSet,
    ) -> bool;

    /// Whether an answered record stays answered until reset.
    fn latches(&self) -> bool {
        false
    }
}

/// At least one current response is affirmative. Latching.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyAffirms;

impl AnsweredPolicy for AnyAffirms {
    fn name(&self) -> &'static str {
        "any"
    }

    fn is_answered(
        &self,
        responses: &BTreeMap<String, String>,
        _recipients: &[String],
        affirmative: &AffirmativeSet,
    ) -> bool {
        responses.values().any(|r| affirmative.contains(r))
    }

    fn latches(&self) -> bool {
        true
    }
}

/// Every configured recipient currently holds an affirmative response.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllAffirm;

impl AnsweredPolicy for AllAffirm {
    fn name(&self) -> &'static str {
        "all"
    }

    fn is_answered(
        &self,
        responses: &BTreeMap<String, String>,
        recipients: &[String],
        affirmative: &AffirmativeSet,
    ) -> bool {
        !recipients.is_empty()
            && recipients.iter().all(|recipient| {
                responses
                    .get(recipient)
                    .is_some_and(|r| affirmative.contains(r))
            })
    }
}

/// Policy implementation for a configured [`PolicyKind`].
#[must_use]
pub fn policy_for(kind: PolicyKind) -> Arc<dyn AnsweredPolicy> {
    match kind {
        PolicyKind::Any => Arc::new(AnyAffirms),
        PolicyKind::All => Arc::new(AllAffirm),
    }
}

/// Result of applying one acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub state: SurveyState,
    /// `true` when this acknowledgement moved the record to answered.
    pub newly_answered: bool,
}

/// Applies acknowledgements and owns the answered rule.
#[derive(Debug, Clone)]
pub struct Reconciler {
    recipients: Vec<String>,
    affirmative: AffirmativeSet,
    policy: Arc<dyn AnsweredPolicy>,
}

impl Reconciler {
    /// Reconciler with the default synonym set and the any-affirms policy.
    pub fn new(recipients: Vec<String>) -> Self {
        Self {
            recipients,
            affirmative: AffirmativeSet::default(),
            policy: Arc::new(AnyAffirms),
        }
    }

    /// Build from the survey section of the configuration.
    pub fn from_config(config: &SurveyConfig) -> Self {
        Self {
            recipients: config.recipient_set(),
            affirmative: AffirmativeSet::new(&config.affirmative_tokens),
            policy: policy_for(config.policy),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AnsweredPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_affirmative(mut self, affirmative: AffirmativeSet) -> Self {
        self.affirmative = affirmative;
        self
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn policy(&self) -> &dyn AnsweredPolicy {
        self.policy.as_ref()
    }

    /// Whether raw inbound text classifies as affirmative.
    #[must_use]
    pub fn is_affirmative(&self, raw: &str) -> bool {
        self.affirmative.contains(&normalize(raw))
    }

    /// Record `raw_text` as the latest response of `recipient`.
    #[must_use]
    pub fn apply(&self, state: &SurveyState, recipient: &str, raw_text: &str) -> Reconciled {
        let mut next = state.clone();
        next.responses
            .insert(recipient.to_owned(), normalize(raw_text));
        next.answered = self.recompute(&next);
        if !next.answered {
            // A reopened round gets its own closing broadcast.
            next.closing_sent = false;
        }
        Reconciled {
            newly_answered: next.answered && !state.answered,
            state: next,
        }
    }

    /// The value the `answered` cache must hold for `state`.
    #[must_use]
    pub fn recompute(&self, state: &SurveyState) -> bool {
        let evaluated =
            self.policy
                .is_answered(&state.responses, &self.recipients, &self.affirmative);
        evaluated || (self.policy.latches() && state.answered)
    }

    /// Re-derive the cached flag on a freshly loaded record.
    #[must_use]
    pub fn refresh(&self, mut state: SurveyState) -> SurveyState {
        state.answered = self.recompute(&state);
        if !state.answered {
            state.closing_sent = false;
        }
        state
    }

    /// Recipients with no affirmative response recorded, in configuration order.
    #[must_use]
    pub fn outstanding(&self, state: &SurveyState) -> Vec<String> {
        self.recipients
            .iter()
            .filter(|recipient| {
                !state
                    .responses
                    .get(recipient.as_str())
                    .is_some_and(|r| self.affirmative.contains(r))
            })
            .cloned()
            .collect()
    }
}
