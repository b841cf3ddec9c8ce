use std::collections::HashMap;

use crate::error::RuleError;
use crate::ir::phase::Phase;
use crate::ir::rule::Rule;

/// Ordered collection of chain heads, bucketed by phase.
///
/// Rules are evaluated in insertion order within their phase. Only chain
/// heads are stored here; links are reachable through
/// [`Rule::chained_rule`].
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    by_phase: [Vec<usize>; Phase::ALL.len()],
    /// Chain head id to its position in `rules`.
    ids: HashMap<u64, usize>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain head.
    ///
    /// The head must carry a positive id that is not already registered,
    /// and no link of its chain may carry an id of its own.
    pub fn add(&mut self, rule: Rule) -> Result<(), RuleError> {
        let id = rule.id();
        if id == 0 {
            return Err(RuleError::MissingId);
        }
        if self.ids.contains_key(&id) {
            return Err(RuleError::DuplicateId(id));
        }
        if rule.chain().skip(1).any(|link| link.id() != 0) {
            return Err(RuleError::InvalidRule(format!(
                "chain links of rule {id} may not declare an id"
            )));
        }
        if rule.chain().filter(|link| link.disruptive_action().is_some()).count() > 1 {
            return Err(RuleError::InvalidRule(format!(
                "chain of rule {id} declares more than one disruptive action"
            )));
        }
        let index = self.rules.len();
        self.ids.insert(id, index);
        self.by_phase[rule.phase().index()].push(index);
        self.rules.push(rule);
        Ok(())
    }

    /// Number of chain heads across all phases.
    pub fn count(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule has been registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All chain heads in insertion order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The chain head registered under `id`.
    pub fn get(&self, id: u64) -> Option<&Rule> {
        self.ids.get(&id).map(|&index| &self.rules[index])
    }

    /// Chain heads of `phase` in evaluation order.
    pub fn rules_for_phase(&self, phase: Phase) -> PhaseRules<'_> {
        PhaseRules {
            rules: &self.rules,
            indices: self.by_phase[phase.index()].iter(),
        }
    }
}

/// Iterator over the chain heads of one phase.
#[derive(Debug, Clone)]
pub struct PhaseRules<'a> {
    rules: &'a [Rule],
    indices: std::slice::Iter<'a, usize>,
}

impl<'a> Iterator for PhaseRules<'a> {
    type Item = &'a Rule;

    fn next(&mut self) -> Option<Self::Item> {
        self.indices.next().map(|&i| &self.rules[i])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl ExactSizeIterator for PhaseRules<'_> {}
