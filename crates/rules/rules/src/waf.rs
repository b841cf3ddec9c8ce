use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::config::WafConfig;
use crate::engine::transaction::Transaction;
use crate::error::RuleError;
use crate::ir::rule::Rule;
use crate::registry::Registry;
use crate::ruleset::RuleSet;

static NEXT_TRANSACTION: AtomicU64 = AtomicU64::new(1);

/// Mutable WAF under construction.
///
/// Rule loaders write rules and configuration into the builder; once
/// loading is complete, [`build`](Self::build) freezes it into a [`Waf`]
/// that transactions can share.
#[derive(Debug)]
pub struct WafBuilder {
    rules: RuleSet,
    config: WafConfig,
    registry: Arc<Registry>,
}

impl Default for WafBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WafBuilder {
    /// Create a builder using the builtin registry and default configuration.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(Registry::with_builtins()))
    }

    /// Create a builder resolving plugins through `registry`.
    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self {
            rules: RuleSet::new(),
            config: WafConfig::default(),
            registry,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: WafConfig) -> Self {
        self.config = config;
        self
    }

    /// The plugin registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The configuration collected so far.
    pub fn config(&self) -> &WafConfig {
        &self.config
    }

    /// Mutable access to the configuration, for configuration directives.
    pub fn config_mut(&mut self) -> &mut WafConfig {
        &mut self.config
    }

    /// The rules registered so far.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Register a chain head.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), RuleError> {
        self.rules.add(rule)
    }

    /// Freeze the builder.
    pub fn build(self) -> Arc<Waf> {
        info!(
            rules = self.rules.count(),
            engine = %self.config.rule_engine,
            "waf ready"
        );
        Arc::new(Waf {
            rules: self.rules,
            config: self.config,
            registry: self.registry,
        })
    }
}

/// An immutable, shareable WAF: a rule set plus its configuration.
#[derive(Debug)]
pub struct Waf {
    rules: RuleSet,
    config: WafConfig,
    registry: Arc<Registry>,
}

impl Waf {
    /// The loaded rules.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The engine configuration.
    pub fn config(&self) -> &WafConfig {
        &self.config
    }

    /// The registry the rules were resolved against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Start a transaction with a generated id.
    pub fn new_transaction(self: &Arc<Self>) -> Transaction {
        let n = NEXT_TRANSACTION.fetch_add(1, Ordering::Relaxed);
        Transaction::new(Arc::clone(self), format!("{n:016x}"))
    }

    /// Start a transaction with a caller-supplied id.
    pub fn new_transaction_with_id(self: &Arc<Self>, id: impl Into<String>) -> Transaction {
        Transaction::new(Arc::clone(self), id.into())
    }
}
