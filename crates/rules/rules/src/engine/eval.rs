//! Matching of a single rule and of whole chains against transaction state.

use std::borrow::Cow;

use tracing::{debug, warn};

use super::state::TransactionState;
use super::verdict::MatchData;
use crate::builtins::operators::MAX_CAPTURES;
use crate::ir::rule::{Rule, RuleTransformation};
use crate::ir::variable::VariableName;

/// Apply `transformations` in order, allocating only when one changes the value.
pub fn transform<'a>(transformations: &[RuleTransformation], value: &'a str) -> Cow<'a, str> {
    let mut current = Cow::Borrowed(value);
    for t in transformations {
        let owned = match t.instance.transform(&current) {
            Cow::Owned(s) => Some(s),
            Cow::Borrowed(b) if b.len() != current.len() => Some(b.to_owned()),
            Cow::Borrowed(_) => None,
        };
        if let Some(s) = owned {
            current = Cow::Owned(s);
        }
    }
    current
}

/// Evaluate one rule, ignoring its chain.
///
/// Variables are inspected in declaration order and evaluation stops at the
/// first value that satisfies the operator. An operator error makes the whole
/// rule a non-match. On a match `MATCHED_VAR`/`MATCHED_VAR_NAME` are updated
/// and, when the rule has `capture`, the captures land in `TX:0`..`TX:9`.
pub fn match_rule(rule: &Rule, state: &mut TransactionState) -> Option<MatchData> {
    let Some(operator) = &rule.operator else {
        return Some(MatchData {
            variable: String::new(),
            key: String::new(),
            value: String::new(),
            captured: None,
        });
    };

    let mut found: Option<(MatchData, Vec<String>)> = None;
    'variables: for variable in &rule.variables {
        for selected in state.select(variable) {
            let value = transform(&rule.transformations, &selected.value);
            let outcome = match operator.instance.evaluate(&value) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        rule_id = rule.id(),
                        operator = %operator,
                        error = %e,
                        "operator failed, treating rule as not matched"
                    );
                    return None;
                }
            };
            if outcome.matched != operator.negated {
                let data = MatchData {
                    variable: variable.name.as_str().to_owned(),
                    key: selected.key.to_owned(),
                    value: value.into_owned(),
                    captured: outcome.captures.first().cloned(),
                };
                found = Some((data, outcome.captures));
                break 'variables;
            }
        }
    }

    let (data, captures) = found?;
    state.set(VariableName::MatchedVar, data.value.clone());
    state.set(VariableName::MatchedVarName, data.target());
    if rule.metadata.capture {
        for (slot, captured) in captures.into_iter().take(MAX_CAPTURES).enumerate() {
            state.set_tx(&slot.to_string(), captured);
        }
    }
    Some(data)
}

/// Evaluate a chain head and its links as a logical AND.
///
/// Returns one [`MatchData`] per link when every link matched. Evaluation
/// stops at the first link that does not match. Links see the
/// `MATCHED_VAR` and captures written by earlier links, but a chain that
/// does not match as a whole leaves the transaction as it found it.
pub fn match_chain(head: &Rule, state: &mut TransactionState) -> Option<Vec<MatchData>> {
    let snapshot = (head.chain_len() > 1).then(|| Snapshot::take(head, state));
    let mut matched = Vec::with_capacity(head.chain_len());
    for (position, link) in head.chain().enumerate() {
        let Some(data) = match_rule(link, state) else {
            if position > 0 {
                debug!(rule_id = head.id(), link = position, "chain link did not match");
            }
            if let Some(snapshot) = snapshot {
                snapshot.rollback(state);
            }
            return None;
        };
        matched.push(data);
    }
    Some(matched)
}

/// Collections a chain link may write before the whole chain is known to match.
struct Snapshot {
    saved: Vec<(VariableName, Vec<(String, String)>)>,
}

impl Snapshot {
    fn take(head: &Rule, state: &TransactionState) -> Self {
        let mut names = vec![VariableName::MatchedVar, VariableName::MatchedVarName];
        if head.chain().any(|link| link.metadata.capture) {
            names.push(VariableName::Tx);
        }
        let saved = names
            .into_iter()
            .map(|name| (name, state.values(name).to_vec()))
            .collect();
        Self { saved }
    }

    fn rollback(self, state: &mut TransactionState) {
        for (name, entries) in self.saved {
            state.restore(name, entries);
        }
    }
}
