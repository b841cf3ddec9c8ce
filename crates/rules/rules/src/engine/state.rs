use std::borrow::Cow;
use std::collections::HashMap;

use crate::ir::phase::Phase;
use crate::ir::variable::{Variable, VariableName};

/// How far an `allow` action reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowScope {
    /// Every remaining phase except logging.
    Transaction,
    /// The remaining request phases.
    Request,
    /// Only the rest of the phase the action fired in.
    Phase,
}

/// A value selected from the transaction for a rule variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected<'a> {
    /// Collection key, empty for single-valued variables.
    pub key: &'a str,
    /// The raw value.
    pub value: Cow<'a, str>,
}

/// Per-request variable collections and flags mutated by actions.
///
/// Collections keep insertion order and allow repeated keys. Single-valued
/// variables (`REQUEST_URI`, ...) hold one entry with an empty key.
#[derive(Debug, Default)]
pub struct TransactionState {
    id: String,
    phase: Phase,
    collections: HashMap<VariableName, Vec<(String, String)>>,
    allowed: Option<(AllowScope, Phase)>,
}

impl TransactionState {
    /// Create an empty state for the transaction `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// The transaction id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The phase currently being evaluated.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Append a keyed value to a collection.
    pub fn add(&mut self, name: VariableName, key: impl Into<String>, value: impl Into<String>) {
        self.collections
            .entry(name)
            .or_default()
            .push((key.into(), value.into()));
    }

    /// Replace a single-valued variable.
    pub fn set(&mut self, name: VariableName, value: impl Into<String>) {
        self.collections
            .insert(name, vec![(String::new(), value.into())]);
    }

    /// Put back entries previously taken from [`values`](Self::values).
    pub(crate) fn restore(&mut self, name: VariableName, entries: Vec<(String, String)>) {
        if entries.is_empty() {
            self.collections.remove(&name);
        } else {
            self.collections.insert(name, entries);
        }
    }

    /// Raw entries stored for `name`.
    pub fn values(&self, name: VariableName) -> &[(String, String)] {
        self.collections
            .get(&name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First value stored for `name` under `key` (case-insensitive).
    pub fn get(&self, name: VariableName, key: &str) -> Option<&str> {
        self.values(name)
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Set `TX:key`, replacing any previous value.
    pub fn set_tx(&mut self, key: &str, value: String) {
        let key = key.to_ascii_lowercase();
        let entries = self.collections.entry(VariableName::Tx).or_default();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => entries.push((key, value)),
        }
    }

    /// `TX:key`, if set.
    pub fn tx_value(&self, key: &str) -> Option<&str> {
        self.get(VariableName::Tx, key)
    }

    /// Remove `TX:key`.
    pub fn remove_tx(&mut self, key: &str) {
        if let Some(entries) = self.collections.get_mut(&VariableName::Tx) {
            entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        }
    }

    /// Values selected by a rule variable, in storage order.
    ///
    /// `ARGS_NAMES` and `REQUEST_HEADERS_NAMES` are derived from the keys of
    /// `ARGS` and `REQUEST_HEADERS`. A counted variable yields one value.
    pub fn select<'a>(&'a self, variable: &Variable) -> Vec<Selected<'a>> {
        let (source, names_only) = match variable.name {
            VariableName::ArgsNames => (VariableName::Args, true),
            VariableName::RequestHeadersNames => (VariableName::RequestHeaders, true),
            other => (other, false),
        };
        let selected = self
            .values(source)
            .iter()
            .filter(|(k, _)| !variable.name.is_collection() || variable.selects(k));
        if variable.count {
            return vec![Selected {
                key: "",
                value: Cow::Owned(selected.count().to_string()),
            }];
        }
        selected
            .map(|(k, v)| Selected {
                key: k.as_str(),
                value: Cow::Borrowed(if names_only { k.as_str() } else { v.as_str() }),
            })
            .collect()
    }

    /// Record an `allow` for the current phase.
    pub fn allow(&mut self, scope: AllowScope) {
        self.allowed = Some((scope, self.phase));
    }

    /// The active `allow` scope, if any.
    pub fn allow_scope(&self) -> Option<AllowScope> {
        self.allowed.map(|(scope, _)| scope)
    }

    /// Whether an earlier `allow` excludes rules of `phase`. Logging is never
    /// skipped.
    pub fn skips_phase(&self, phase: Phase) -> bool {
        let Some((scope, set_in)) = self.allowed else {
            return false;
        };
        if phase == Phase::Logging {
            return false;
        }
        phase == set_in
            || match scope {
                AllowScope::Transaction => true,
                AllowScope::Request => phase <= Phase::RequestBody,
                AllowScope::Phase => false,
            }
    }

    /// Expand `%{COLLECTION.key}` and `%{VARIABLE}` references.
    ///
    /// Unknown variables are left untouched; missing keys expand to nothing.
    pub fn expand_macros(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let reference = &after[..end];
            match self.resolve_macro(reference) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[start..start + 2 + end + 1]),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }

    fn resolve_macro(&self, reference: &str) -> Option<&str> {
        let (name, key) = match reference.split_once(['.', ':']) {
            Some((name, key)) => (name, Some(key)),
            None => (reference, None),
        };
        let name: VariableName = name.trim().parse().ok()?;
        let value = match key {
            Some(key) => self.get(name, key.trim()),
            None => self.values(name).first().map(|(_, v)| v.as_str()),
        };
        Some(value.unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::variable::KeySelector;

    fn populated() -> TransactionState {
        let mut state = TransactionState::new("tx-1");
        state.add(VariableName::Args, "id", "1");
        state.add(VariableName::Args, "name", "bob");
        state.add(VariableName::Args, "Id", "2");
        state.set(VariableName::RequestUri, "/index.php?id=1");
        state
    }

    fn values<'a>(selected: &'a [Selected<'a>]) -> Vec<&'a str> {
        selected.iter().map(|s| s.value.as_ref()).collect()
    }

    #[test]
    fn select_whole_collection() {
        let state = populated();
        let selected = state.select(&Variable::new(VariableName::Args));
        assert_eq!(values(&selected), vec!["1", "bob", "2"]);
    }

    #[test]
    fn select_by_key_is_case_insensitive() {
        let state = populated();
        let var = Variable::new(VariableName::Args).with_key(KeySelector::parse("ID").unwrap());
        assert_eq!(values(&state.select(&var)), vec!["1", "2"]);
    }

    #[test]
    fn select_with_exception_and_regex() {
        let state = populated();
        let mut var = Variable::new(VariableName::Args)
            .with_key(KeySelector::parse("/^(id|name)$/").unwrap());
        var.exceptions.push(KeySelector::parse("name").unwrap());
        assert_eq!(values(&state.select(&var)), vec!["1", "2"]);
    }

    #[test]
    fn select_names_and_counts() {
        let state = populated();
        let names = state.select(&Variable::new(VariableName::ArgsNames));
        assert_eq!(values(&names), vec!["id", "name", "Id"]);

        let count = state.select(&Variable::new(VariableName::Args).counted());
        assert_eq!(values(&count), vec!["3"]);

        let missing = state.select(&Variable::new(VariableName::RequestBody).counted());
        assert_eq!(values(&missing), vec!["0"]);
    }

    #[test]
    fn single_valued_variables_ignore_keys() {
        let state = populated();
        let selected = state.select(&Variable::new(VariableName::RequestUri));
        assert_eq!(values(&selected), vec!["/index.php?id=1"]);
        assert!(state.select(&Variable::new(VariableName::RequestBody)).is_empty());
    }

    #[test]
    fn macro_expansion() {
        let mut state = populated();
        state.set_tx("score", "5".into());
        assert_eq!(state.expand_macros("score=%{tx.score}"), "score=5");
        assert_eq!(state.expand_macros("%{TX:SCORE}/%{REQUEST_URI}"), "5//index.php?id=1");
        assert_eq!(state.expand_macros("[%{tx.missing}]"), "[]");
        assert_eq!(state.expand_macros("%{nope.x} %{unclosed"), "%{nope.x} %{unclosed");
    }

    #[test]
    fn allow_scopes() {
        let mut state = TransactionState::new("t");
        state.set_phase(Phase::RequestHeaders);
        state.allow(AllowScope::Phase);
        assert!(state.skips_phase(Phase::RequestHeaders));
        assert!(!state.skips_phase(Phase::RequestBody));

        state.allow(AllowScope::Request);
        assert!(state.skips_phase(Phase::RequestBody));
        assert!(!state.skips_phase(Phase::ResponseHeaders));

        state.allow(AllowScope::Transaction);
        assert!(state.skips_phase(Phase::ResponseBody));
        assert!(!state.skips_phase(Phase::Logging));
    }

    #[test]
    fn restore_replaces_or_clears_a_collection() {
        let mut state = TransactionState::new("t");
        state.set_tx("0", "x".into());
        let saved = state.values(VariableName::Tx).to_vec();
        state.set_tx("0", "y".into());
        state.set_tx("1", "z".into());
        state.restore(VariableName::Tx, saved);
        assert_eq!(state.tx_value("0"), Some("x"));
        assert_eq!(state.tx_value("1"), None);

        state.restore(VariableName::Tx, Vec::new());
        assert!(state.values(VariableName::Tx).is_empty());
    }
}
