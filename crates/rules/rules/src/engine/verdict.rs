use serde::{Deserialize, Serialize};

use crate::ir::phase::Phase;
use crate::ir::rule::Severity;

/// The terminal signal produced when a disruptive action fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interruption {
    /// Id of the chain head whose disruptive action fired.
    pub rule_id: u64,
    /// Disruptive action name (`deny`, `block`, `drop`, `redirect`).
    pub action: String,
    /// HTTP status the embedder should answer with.
    pub status: u16,
    /// Extra disposition data, e.g. the redirect target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Interruption {
    /// Create an interruption without extra data.
    pub fn new(rule_id: u64, action: impl Into<String>, status: u16) -> Self {
        Self {
            rule_id,
            action: action.into(),
            status,
            data: None,
        }
    }

    /// Attach disposition data.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// The value that satisfied one link of a matched rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchData {
    /// Variable name as written in rules, e.g. `ARGS`.
    pub variable: String,
    /// Collection key, empty for single-valued variables.
    pub key: String,
    /// The value after transformations.
    pub value: String,
    /// What the operator captured (whole match), if anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured: Option<String>,
}

impl MatchData {
    /// `ARGS:id` style reference of the matched location.
    pub fn target(&self) -> String {
        if self.key.is_empty() {
            self.variable.clone()
        } else {
            format!("{}:{}", self.variable, self.key)
        }
    }
}

/// One entry of a transaction's matched-rules log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Id of the chain head.
    pub rule_id: u64,
    /// Phase the rule ran in.
    pub phase: Phase,
    /// Expanded `msg`, if the rule has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Tags of the chain head.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Severity of the chain head.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Name of the chain's disruptive action, whether or not it was executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disruptive: Option<String>,
    /// Whether the rule asked for the match to be logged.
    #[serde(default)]
    pub log: bool,
    /// What matched, one entry per chain link, head first.
    pub data: Vec<MatchData>,
}
