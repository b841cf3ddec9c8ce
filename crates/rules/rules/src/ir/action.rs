//! Convenience helpers for [`RuleAction`].

pub use super::rule::RuleAction;
use crate::plugin::ActionKind;

impl RuleAction {
    /// The classification reported by the bound instance.
    pub fn kind(&self) -> ActionKind {
        self.instance.kind()
    }

    /// Returns `true` if this action may interrupt the transaction.
    pub fn is_disruptive(&self) -> bool {
        self.kind() == ActionKind::Disruptive
    }

    /// Returns `true` if this action runs on match without interrupting.
    pub fn is_non_disruptive(&self) -> bool {
        self.kind() == ActionKind::NonDisruptive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;

    fn bind(name: &str, argument: Option<&str>) -> RuleAction {
        let registry = Registry::with_builtins();
        RuleAction {
            name: name.into(),
            argument: argument.map(Into::into),
            instance: registry.action(name, argument).unwrap(),
        }
    }

    #[test]
    fn action_predicates() {
        assert!(bind("deny", None).is_disruptive());
        assert!(bind("block", None).is_disruptive());
        assert!(bind("setvar", Some("tx.score=+1")).is_non_disruptive());
        assert!(!bind("chain", None).is_non_disruptive());
        assert!(!bind("log", None).is_disruptive());
        assert_eq!(bind("chain", None).kind(), ActionKind::Flow);
        assert_eq!(bind("status", Some("403")).kind(), ActionKind::Data);
        assert_eq!(bind("id", Some("1")).kind(), ActionKind::Metadata);
    }
}
