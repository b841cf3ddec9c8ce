//! Contracts for pluggable operators, actions and transformations.
//!
//! The rule-language frontend resolves every name to an instance through the
//! [`Registry`](crate::Registry) at parse time, so the engine only ever calls
//! these traits on already-bound objects.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::engine::state::TransactionState;
use crate::engine::verdict::Interruption;
use crate::error::{OperatorError, PluginError};
use crate::ir::rule::RuleMetadata;

/// Outcome of a single operator evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorMatch {
    /// Whether the value satisfied the predicate.
    pub matched: bool,
    /// Captured data: the whole match first, then any groups.
    pub captures: Vec<String>,
}

impl OperatorMatch {
    /// A non-match.
    pub fn miss() -> Self {
        Self::default()
    }

    /// Build from a boolean.
    pub fn from_bool(matched: bool) -> Self {
        Self {
            matched,
            captures: Vec::new(),
        }
    }
}

/// A named predicate evaluated against one variable value.
pub trait Operator: Send + Sync + fmt::Debug {
    /// Evaluate the predicate. An error means the value could not be
    /// evaluated; the engine treats it as "no match" for the whole rule.
    fn evaluate(&self, value: &str) -> Result<OperatorMatch, OperatorError>;
}

/// What an operator constructor receives.
#[derive(Debug, Clone, Copy)]
pub struct OperatorOptions<'a> {
    /// Everything after the operator name, trimmed.
    pub argument: &'a str,
    /// Datasets declared so far (`SecDataset`), for dataset-backed operators.
    pub datasets: &'a HashMap<String, Vec<String>>,
}

/// Classification of an action; drives when the engine runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Only contributes rule metadata at parse time (`id`, `phase`, `tag`).
    Metadata,
    /// Carries rule-level data consumed by other actions (`status`, `capture`).
    Data,
    /// Alters the control flow of rule evaluation (`chain`).
    Flow,
    /// Runs on match and may mutate transaction state (`setvar`).
    NonDisruptive,
    /// Runs on match and may interrupt the transaction (`deny`, `block`).
    Disruptive,
}

/// A named behavior attached to a rule.
pub trait Action: Send + Sync + fmt::Debug {
    /// The action classification.
    fn kind(&self) -> ActionKind;

    /// Apply parse-time effects to the owning rule's metadata.
    fn init(&self, _rule: &mut RuleMetadata) -> Result<(), PluginError> {
        Ok(())
    }

    /// Run the action for a matched rule.
    fn evaluate(&self, _rule: &RuleMetadata, _tx: &mut TransactionState) -> Option<Interruption> {
        None
    }
}

/// A value transformation applied before the operator sees a value.
pub trait Transformation: Send + Sync + fmt::Debug {
    /// Transform `input`, borrowing it unchanged when nothing needs to change.
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str>;
}
