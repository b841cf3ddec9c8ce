use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::phase::Phase;
use super::variable::Variable;
use crate::error::{PluginError, PluginKind};
use crate::plugin::{Action, Operator, Transformation};

/// Severity levels accepted by the `severity` action, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    const NAMES: [(Self, &'static str); 8] = [
        (Self::Emergency, "EMERGENCY"),
        (Self::Alert, "ALERT"),
        (Self::Critical, "CRITICAL"),
        (Self::Error, "ERROR"),
        (Self::Warning, "WARNING"),
        (Self::Notice, "NOTICE"),
        (Self::Info, "INFO"),
        (Self::Debug, "DEBUG"),
    ];

    /// Upper-case name as written in rules.
    pub fn as_str(self) -> &'static str {
        Self::NAMES[self as usize].1
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = PluginError;

    /// Accepts the level name (any case) or its number `0`..`7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            if let Some((level, _)) = Self::NAMES.get(n) {
                return Ok(*level);
            }
        }
        Self::NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(level, _)| *level)
            .ok_or_else(|| {
                PluginError::invalid_argument(
                    PluginKind::Action,
                    "severity",
                    format!("unknown severity '{s}'"),
                )
            })
    }
}

/// Where a rule was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSource {
    /// Loaded from a configuration file.
    File {
        /// The file path as resolved by the loader.
        path: String,
        /// 1-based line of the directive.
        line: usize,
    },
    /// Loaded from an in-memory string.
    Inline {
        /// 1-based line of the directive.
        line: usize,
    },
}

impl Default for RuleSource {
    fn default() -> Self {
        Self::Inline { line: 0 }
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path, line } => write!(f, "{path}:{line}"),
            Self::Inline { line } => write!(f, "<string>:{line}"),
        }
    }
}

/// Descriptive data of a rule, filled in by metadata and data actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMetadata {
    /// Externally visible id. Only chain heads carry one; 0 means unset.
    pub id: u64,
    /// Evaluation phase. Chain links always share the head's phase.
    pub phase: Phase,
    /// Whether `phase` was declared explicitly by the rule.
    #[serde(default)]
    pub phase_declared: bool,
    /// Classification tags in declaration order, without duplicates.
    #[serde(default)]
    pub tags: Vec<String>,
    /// `msg` text (macros expanded at match time).
    pub msg: Option<String>,
    /// `severity` level.
    pub severity: Option<Severity>,
    /// `rev` value.
    pub rev: Option<String>,
    /// `ver` value.
    pub ver: Option<String>,
    /// `maturity` value (1-9).
    pub maturity: Option<u8>,
    /// `accuracy` value (1-9).
    pub accuracy: Option<u8>,
    /// HTTP status used by disruptive actions.
    pub status: Option<u16>,
    /// Copy operator captures into `TX:0`..`TX:9`.
    #[serde(default)]
    pub capture: bool,
    /// Emit a log event when the rule matches.
    #[serde(default)]
    pub log: bool,
    /// Mark the match as relevant for audit logging.
    #[serde(default)]
    pub audit_log: bool,
    /// The next rule-producing line continues this rule's chain.
    #[serde(default)]
    pub has_chain: bool,
    /// Where the rule was declared.
    #[serde(default)]
    pub source: RuleSource,
}

impl RuleMetadata {
    /// Add a tag unless it is already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }
}

/// An operator bound to its instance at parse time.
#[derive(Debug)]
pub struct RuleOperator {
    /// Registry name, e.g. `rx`.
    pub name: String,
    /// Argument as written in the rule.
    pub argument: String,
    /// `!@op`: a match is inverted.
    pub negated: bool,
    /// The resolved predicate.
    pub instance: Box<dyn Operator>,
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        write!(f, "@{}", self.name)?;
        if !self.argument.is_empty() {
            write!(f, " {}", self.argument)?;
        }
        Ok(())
    }
}

/// A transformation bound to its instance at parse time.
#[derive(Debug, Clone)]
pub struct RuleTransformation {
    /// Registry name, e.g. `lowercase`.
    pub name: String,
    /// The resolved transformation.
    pub instance: Arc<dyn Transformation>,
}

/// An action bound to its instance at parse time.
#[derive(Debug)]
pub struct RuleAction {
    /// Registry name, lower-cased.
    pub name: String,
    /// Argument after `name:`, unquoted.
    pub argument: Option<String>,
    /// The resolved behavior.
    pub instance: Box<dyn Action>,
}

/// A single rule, optionally owning the next link of its chain.
///
/// Chains are singly linked through exclusive ownership, so a chain can
/// never become cyclic.
#[derive(Debug)]
pub struct Rule {
    /// Id, phase, tags and the rest of the descriptive data.
    pub metadata: RuleMetadata,
    /// Locations to inspect, in declaration order.
    pub variables: Vec<Variable>,
    /// The predicate; `None` means the rule always matches (`SecAction`).
    pub operator: Option<RuleOperator>,
    /// Transformations applied to every value before the operator runs.
    pub transformations: Vec<RuleTransformation>,
    /// Actions in declaration order, excluding `t:` transformations.
    pub actions: Vec<RuleAction>,
    /// Next link of the chain, if this rule declared `chain`.
    pub chained_rule: Option<Box<Rule>>,
}

impl Rule {
    /// Create an unconditional rule with the given metadata.
    pub fn new(metadata: RuleMetadata) -> Self {
        Self {
            metadata,
            variables: Vec::new(),
            operator: None,
            transformations: Vec::new(),
            actions: Vec::new(),
            chained_rule: None,
        }
    }

    /// Set the variables to inspect.
    #[must_use]
    pub fn with_variables(mut self, variables: Vec<Variable>) -> Self {
        self.variables = variables;
        self
    }

    /// Set the operator.
    #[must_use]
    pub fn with_operator(mut self, operator: RuleOperator) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Append an action.
    #[must_use]
    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Append a transformation.
    #[must_use]
    pub fn with_transformation(mut self, transformation: RuleTransformation) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// The rule id (0 for chain links).
    pub fn id(&self) -> u64 {
        self.metadata.id
    }

    /// The evaluation phase.
    pub fn phase(&self) -> Phase {
        self.metadata.phase
    }

    /// Iterate this rule and every following chain link, head first.
    pub fn chain(&self) -> ChainIter<'_> {
        ChainIter { next: Some(self) }
    }

    /// Number of links in the chain starting at this rule (1 when unchained).
    pub fn chain_len(&self) -> usize {
        self.chain().count()
    }

    /// The rule's disruptive action, if it declares one.
    pub fn disruptive_action(&self) -> Option<&RuleAction> {
        self.actions.iter().find(|a| a.is_disruptive())
    }

    /// Link `links` into a single chain, first element as head.
    ///
    /// Every link is attached exactly once behind its predecessor and takes
    /// the head's phase. Returns `None` for an empty list.
    pub fn link_chain(links: Vec<Rule>) -> Option<Rule> {
        let phase = links.first()?.metadata.phase;
        let mut next: Option<Rule> = None;
        for mut rule in links.into_iter().rev() {
            rule.metadata.phase = phase;
            rule.chained_rule = next.map(Box::new);
            next = Some(rule);
        }
        next
    }
}

/// Iterator over the links of a chain, head first.
#[derive(Debug, Clone)]
pub struct ChainIter<'a> {
    next: Option<&'a Rule>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Rule;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.chained_rule.as_deref();
        Some(current)
    }
}
