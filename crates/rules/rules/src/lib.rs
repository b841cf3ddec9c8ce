//! Rule model, plugin registries and transaction engine of the Warden WAF.
//!
//! Rules are produced by a frontend (see `warden-seclang`) into a
//! [`WafBuilder`], frozen into a [`Waf`], and evaluated per request by a
//! [`Transaction`].

pub mod builtins;
pub mod config;
pub mod engine;
pub mod error;
pub mod ir;
pub mod plugin;
pub mod registry;
pub mod ruleset;
pub mod waf;

pub use config::{RuleEngineMode, WafConfig};
pub use engine::{Interruption, MatchData, MatchRecord, Transaction, TransactionState};
pub use error::{OperatorError, PluginError, PluginKind, RuleError};
pub use ir::phase::Phase;
pub use ir::rule::{Rule, RuleAction, RuleMetadata, RuleOperator, RuleSource, RuleTransformation, Severity};
pub use ir::variable::{KeySelector, Variable, VariableName};
pub use plugin::{Action, ActionKind, Operator, OperatorMatch, OperatorOptions, Transformation};
pub use registry::Registry;
pub use ruleset::RuleSet;
pub use waf::{Waf, WafBuilder};
