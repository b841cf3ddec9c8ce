//! Builtin actions.

use crate::engine::state::{AllowScope, TransactionState};
use crate::engine::verdict::Interruption;
use crate::error::{PluginError, PluginKind};
use crate::ir::phase::Phase;
use crate::ir::rule::{RuleMetadata, Severity};
use crate::plugin::{Action, ActionKind};
use crate::registry::Registry;

/// Status used by disruptive actions when the rule sets none.
pub const DEFAULT_DENY_STATUS: u16 = 403;

/// Status used by `redirect` when the rule sets no 3xx status.
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

/// Register every builtin action.
pub fn register(registry: &Registry) {
    registry.register_action("id", |arg| {
        let raw = required("id", arg)?;
        let id = raw
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid("id", format!("'{raw}' is not a valid id: {e}")))?;
        Ok(Box::new(Meta::Id(id)))
    });
    registry.register_action("phase", |arg| {
        let raw = required("phase", arg)?;
        let phase = raw
            .parse::<Phase>()
            .map_err(|e| invalid("phase", e.to_string()))?;
        Ok(Box::new(Meta::Phase(phase)))
    });
    registry.register_action("tag", |arg| {
        Ok(Box::new(Meta::Tags(split_list(required("tag", arg)?))))
    });
    registry.register_action("msg", |arg| {
        Ok(Box::new(Meta::Msg(required("msg", arg)?.to_owned())))
    });
    registry.register_action("severity", |arg| {
        Ok(Box::new(Meta::Severity(required("severity", arg)?.parse()?)))
    });
    registry.register_action("rev", |arg| {
        Ok(Box::new(Meta::Rev(required("rev", arg)?.to_owned())))
    });
    registry.register_action("ver", |arg| {
        Ok(Box::new(Meta::Ver(required("ver", arg)?.to_owned())))
    });
    registry.register_action("maturity", |arg| {
        Ok(Box::new(Meta::Maturity(level("maturity", arg)?)))
    });
    registry.register_action("accuracy", |arg| {
        Ok(Box::new(Meta::Accuracy(level("accuracy", arg)?)))
    });

    registry.register_action("chain", |arg| {
        no_argument("chain", arg)?;
        Ok(Box::new(Chain))
    });

    registry.register_action("status", |arg| {
        let raw = required("status", arg)?;
        let status = raw
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|s| (100..=599).contains(s))
            .ok_or_else(|| invalid("status", format!("'{raw}' is not an HTTP status")))?;
        Ok(Box::new(Flag::Status(status)))
    });
    registry.register_action("capture", |_| Ok(Box::new(Flag::Capture)));
    registry.register_action("log", |_| Ok(Box::new(Flag::Log(true))));
    registry.register_action("nolog", |_| Ok(Box::new(Flag::Log(false))));
    registry.register_action("auditlog", |_| Ok(Box::new(Flag::AuditLog(true))));
    registry.register_action("noauditlog", |_| Ok(Box::new(Flag::AuditLog(false))));

    registry.register_action("setvar", |arg| Ok(Box::new(SetVar::parse(required("setvar", arg)?)?)));

    registry.register_action("deny", |_| Ok(Box::new(Disrupt::Deny)));
    registry.register_action("block", |_| Ok(Box::new(Disrupt::Block)));
    registry.register_action("drop", |_| Ok(Box::new(Disrupt::Drop)));
    registry.register_action("pass", |_| Ok(Box::new(Disrupt::Pass)));
    registry.register_action("allow", |arg| {
        let scope = match arg.map(str::trim) {
            None | Some("") => AllowScope::Transaction,
            Some(s) if s.eq_ignore_ascii_case("phase") => AllowScope::Phase,
            Some(s) if s.eq_ignore_ascii_case("request") => AllowScope::Request,
            Some(other) => return Err(invalid("allow", format!("unknown scope '{other}'"))),
        };
        Ok(Box::new(Disrupt::Allow(scope)))
    });
    registry.register_action("redirect", |arg| {
        Ok(Box::new(Disrupt::Redirect(required("redirect", arg)?.to_owned())))
    });
}

fn invalid(name: &str, reason: impl Into<String>) -> PluginError {
    PluginError::invalid_argument(PluginKind::Action, name, reason)
}

fn required<'a>(name: &str, arg: Option<&'a str>) -> Result<&'a str, PluginError> {
    match arg {
        Some(a) if !a.trim().is_empty() => Ok(a),
        _ => Err(invalid(name, "an argument is required")),
    }
}

fn no_argument(name: &str, arg: Option<&str>) -> Result<(), PluginError> {
    match arg {
        Some(a) if !a.trim().is_empty() => Err(invalid(name, "takes no argument")),
        _ => Ok(()),
    }
}

fn level(name: &str, arg: Option<&str>) -> Result<u8, PluginError> {
    let raw = required(name, arg)?;
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|n| (1..=9).contains(n))
        .ok_or_else(|| invalid(name, format!("'{raw}' is not in 1-9")))
}

/// Split a comma-separated list, dropping blanks.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Metadata actions: only affect the rule at parse time.
#[derive(Debug)]
enum Meta {
    Id(u64),
    Phase(Phase),
    Tags(Vec<String>),
    Msg(String),
    Severity(Severity),
    Rev(String),
    Ver(String),
    Maturity(u8),
    Accuracy(u8),
}

impl Action for Meta {
    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&self, rule: &mut RuleMetadata) -> Result<(), PluginError> {
        match self {
            Self::Id(id) => rule.id = *id,
            Self::Phase(phase) => {
                rule.phase = *phase;
                rule.phase_declared = true;
            }
            Self::Tags(tags) => {
                for tag in tags {
                    rule.add_tag(tag.clone());
                }
            }
            Self::Msg(msg) => rule.msg = Some(msg.clone()),
            Self::Severity(severity) => rule.severity = Some(*severity),
            Self::Rev(rev) => rule.rev = Some(rev.clone()),
            Self::Ver(ver) => rule.ver = Some(ver.clone()),
            Self::Maturity(n) => rule.maturity = Some(*n),
            Self::Accuracy(n) => rule.accuracy = Some(*n),
        }
        Ok(())
    }
}

/// `chain`: the next rule continues this one.
#[derive(Debug)]
struct Chain;

impl Action for Chain {
    fn kind(&self) -> ActionKind {
        ActionKind::Flow
    }

    fn init(&self, rule: &mut RuleMetadata) -> Result<(), PluginError> {
        rule.has_chain = true;
        Ok(())
    }
}

/// Data actions consumed by the engine or by other actions.
#[derive(Debug)]
enum Flag {
    Status(u16),
    Capture,
    Log(bool),
    AuditLog(bool),
}

impl Action for Flag {
    fn kind(&self) -> ActionKind {
        ActionKind::Data
    }

    fn init(&self, rule: &mut RuleMetadata) -> Result<(), PluginError> {
        match self {
            Self::Status(status) => rule.status = Some(*status),
            Self::Capture => rule.capture = true,
            Self::Log(on) => rule.log = *on,
            Self::AuditLog(on) => rule.audit_log = *on,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SetVarOp {
    Set(String),
    Add(String),
    Sub(String),
    Delete,
}

/// `setvar:tx.key=value`, `=+n`, `=-n` and `!tx.key`.
#[derive(Debug)]
struct SetVar {
    key: String,
    op: SetVarOp,
}

impl SetVar {
    fn parse(raw: &str) -> Result<Self, PluginError> {
        let raw = raw.trim();
        let (target, op) = if let Some(target) = raw.strip_prefix('!') {
            (target, SetVarOp::Delete)
        } else if let Some((target, value)) = raw.split_once('=') {
            let op = if let Some(n) = value.strip_prefix('+') {
                SetVarOp::Add(n.to_owned())
            } else if let Some(n) = value.strip_prefix('-') {
                SetVarOp::Sub(n.to_owned())
            } else {
                SetVarOp::Set(value.to_owned())
            };
            (target, op)
        } else {
            (raw, SetVarOp::Set("1".to_owned()))
        };

        let (collection, key) = target
            .trim()
            .split_once('.')
            .ok_or_else(|| invalid("setvar", format!("'{target}' is not collection.key")))?;
        if !collection.eq_ignore_ascii_case("tx") {
            return Err(invalid(
                "setvar",
                format!("only the TX collection is writable, got '{collection}'"),
            ));
        }
        if key.is_empty() {
            return Err(invalid("setvar", "empty variable name"));
        }
        Ok(Self {
            key: key.to_ascii_lowercase(),
            op,
        })
    }
}

impl Action for SetVar {
    fn kind(&self) -> ActionKind {
        ActionKind::NonDisruptive
    }

    fn evaluate(&self, _rule: &RuleMetadata, tx: &mut TransactionState) -> Option<Interruption> {
        let key = tx.expand_macros(&self.key);
        match &self.op {
            SetVarOp::Delete => tx.remove_tx(&key),
            SetVarOp::Set(value) => {
                let value = tx.expand_macros(value);
                tx.set_tx(&key, value);
            }
            SetVarOp::Add(operand) | SetVarOp::Sub(operand) => {
                let current = tx
                    .tx_value(&key)
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .unwrap_or(0);
                let operand = tx.expand_macros(operand).trim().parse::<i64>().unwrap_or(0);
                let next = if matches!(self.op, SetVarOp::Add(_)) {
                    current.saturating_add(operand)
                } else {
                    current.saturating_sub(operand)
                };
                tx.set_tx(&key, next.to_string());
            }
        }
        None
    }
}

/// Disruptive actions.
#[derive(Debug)]
enum Disrupt {
    Deny,
    Block,
    Drop,
    Pass,
    Allow(AllowScope),
    Redirect(String),
}

impl Action for Disrupt {
    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn evaluate(&self, rule: &RuleMetadata, tx: &mut TransactionState) -> Option<Interruption> {
        let status = rule.status.unwrap_or(DEFAULT_DENY_STATUS);
        match self {
            Self::Deny => Some(Interruption::new(rule.id, "deny", status)),
            Self::Block => Some(Interruption::new(rule.id, "block", status)),
            Self::Drop => Some(Interruption::new(rule.id, "drop", status)),
            Self::Pass => None,
            Self::Allow(scope) => {
                tx.allow(*scope);
                None
            }
            Self::Redirect(url) => {
                let status = rule
                    .status
                    .filter(|s| (300..400).contains(s))
                    .unwrap_or(DEFAULT_REDIRECT_STATUS);
                Some(
                    Interruption::new(rule.id, "redirect", status)
                        .with_data(tx.expand_macros(url)),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::variable::VariableName;

    fn init(name: &str, arg: Option<&str>) -> Result<RuleMetadata, PluginError> {
        let registry = Registry::with_builtins();
        let mut meta = RuleMetadata::default();
        registry.action(name, arg)?.init(&mut meta)?;
        Ok(meta)
    }

    fn run(name: &str, arg: Option<&str>, meta: &RuleMetadata, tx: &mut TransactionState) -> Option<Interruption> {
        let registry = Registry::with_builtins();
        registry.action(name, arg).unwrap().evaluate(meta, tx)
    }

    #[test]
    fn metadata_actions_fill_rule() {
        assert_eq!(init("id", Some("942100")).unwrap().id, 942_100);
        let meta = init("phase", Some("1")).unwrap();
        assert_eq!(meta.phase, Phase::RequestHeaders);
        assert!(meta.phase_declared);
        assert_eq!(init("tag", Some("a,b")).unwrap().tags, vec!["a", "b"]);
        assert_eq!(
            init("severity", Some("CRITICAL")).unwrap().severity,
            Some(Severity::Critical)
        );
        assert_eq!(init("maturity", Some("9")).unwrap().maturity, Some(9));
        assert!(init("chain", None).unwrap().has_chain);
        assert_eq!(init("status", Some("406")).unwrap().status, Some(406));
        assert!(init("log", None).unwrap().log);
        assert!(init("capture", None).unwrap().capture);
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        assert!(init("id", Some("abc")).is_err());
        assert!(init("id", None).is_err());
        assert!(init("phase", Some("7")).is_err());
        assert!(init("status", Some("999")).is_err());
        assert!(init("maturity", Some("0")).is_err());
        assert!(init("chain", Some("x")).is_err());
        assert!(init("allow", Some("forever")).is_err());
        assert!(init("setvar", Some("ip.score=1")).is_err());
        assert!(init("setvar", Some("score")).is_err());
    }

    #[test]
    fn deny_uses_rule_status() {
        let mut tx = TransactionState::new("t1");
        let meta = RuleMetadata {
            id: 7,
            status: Some(406),
            ..RuleMetadata::default()
        };
        let it = run("deny", None, &meta, &mut tx).unwrap();
        assert_eq!(it.rule_id, 7);
        assert_eq!(it.action, "deny");
        assert_eq!(it.status, 406);

        let it = run("block", None, &RuleMetadata::default(), &mut tx).unwrap();
        assert_eq!(it.action, "block");
        assert_eq!(it.status, DEFAULT_DENY_STATUS);
    }

    #[test]
    fn pass_and_allow_do_not_interrupt() {
        let mut tx = TransactionState::new("t1");
        assert!(run("pass", None, &RuleMetadata::default(), &mut tx).is_none());
        assert!(run("allow", None, &RuleMetadata::default(), &mut tx).is_none());
        assert_eq!(tx.allow_scope(), Some(AllowScope::Transaction));
    }

    #[test]
    fn redirect_expands_macros() {
        let mut tx = TransactionState::new("t1");
        tx.set_tx("target", "https://example.com/blocked".into());
        let it = run("redirect", Some("%{tx.target}"), &RuleMetadata::default(), &mut tx).unwrap();
        assert_eq!(it.status, DEFAULT_REDIRECT_STATUS);
        assert_eq!(it.data.as_deref(), Some("https://example.com/blocked"));
    }

    #[test]
    fn setvar_arithmetic_and_delete() {
        let mut tx = TransactionState::new("t1");
        let meta = RuleMetadata::default();
        run("setvar", Some("tx.score=+5"), &meta, &mut tx);
        run("setvar", Some("tx.score=+3"), &meta, &mut tx);
        run("setvar", Some("tx.score=-1"), &meta, &mut tx);
        assert_eq!(tx.tx_value("score").as_deref(), Some("7"));

        run("setvar", Some("TX.Name=%{tx.score}"), &meta, &mut tx);
        assert_eq!(tx.tx_value("name").as_deref(), Some("7"));

        run("setvar", Some("!tx.score"), &meta, &mut tx);
        assert!(tx.tx_value("score").is_none());
        assert_eq!(tx.values(VariableName::Tx).len(), 1);
    }
}
