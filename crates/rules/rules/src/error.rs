use thiserror::Error;

/// Errors raised while building rules or resolving plugins.
///
/// These are load-time errors: the rule-language frontend wraps them with a
/// source location before returning them to the caller.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A chain head was declared without an `id` (or with `id:0`).
    #[error("rule is missing a positive id")]
    MissingId,

    /// Two chain heads in the same rule set share an id.
    #[error("duplicate rule id {0}")]
    DuplicateId(u64),

    /// The rule is structurally invalid.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A variable reference could not be parsed or names an unknown collection.
    #[error("invalid variable: {0}")]
    InvalidVariable(String),

    /// A plugin lookup or construction failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// The kind of plugin a registry lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    /// A matching predicate (`@rx`, `@eq`, ...).
    Operator,
    /// A rule action (`deny`, `log`, `setvar`, ...).
    Action,
    /// A value transformation (`t:lowercase`, ...).
    Transformation,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Operator => "operator",
            Self::Action => "action",
            Self::Transformation => "transformation",
        })
    }
}

/// Errors produced by the plugin registries and plugin constructors.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin of the requested kind is registered under this name.
    #[error("unknown {kind} '{name}'")]
    NotFound {
        /// The kind of plugin that was requested.
        kind: PluginKind,
        /// The requested name.
        name: String,
    },

    /// The plugin exists but rejected its argument.
    #[error("invalid argument for {kind} '{name}': {reason}")]
    InvalidArgument {
        /// The kind of plugin that rejected the argument.
        kind: PluginKind,
        /// The plugin name.
        name: String,
        /// Why the argument was rejected.
        reason: String,
    },
}

impl PluginError {
    /// Shorthand for an [`InvalidArgument`](Self::InvalidArgument) error.
    pub fn invalid_argument(
        kind: PluginKind,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// An operator failed while evaluating a value.
///
/// The engine never propagates this: the rule is treated as not matched.
#[derive(Debug, Error)]
#[error("operator evaluation failed: {0}")]
pub struct OperatorError(pub String);
