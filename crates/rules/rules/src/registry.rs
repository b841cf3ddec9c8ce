use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::builtins;
use crate::error::{PluginError, PluginKind};
use crate::plugin::{Action, Operator, OperatorOptions, Transformation};

/// Constructor for operator instances.
pub type OperatorFactory =
    Arc<dyn Fn(OperatorOptions<'_>) -> Result<Box<dyn Operator>, PluginError> + Send + Sync>;

/// Constructor for action instances; receives the argument after `name:`.
pub type ActionFactory =
    Arc<dyn Fn(Option<&str>) -> Result<Box<dyn Action>, PluginError> + Send + Sync>;

/// Name -> constructor maps for operators, actions and transformations.
///
/// A registry is an explicit object handed to the rule loader rather than a
/// process-wide singleton. Lookups take a read lock and may run concurrently;
/// registration takes a write lock and is meant for an initialization window
/// before rules are loaded. Names are case-insensitive and re-registering a
/// name replaces the previous constructor.
pub struct Registry {
    operators: RwLock<HashMap<String, OperatorFactory>>,
    actions: RwLock<HashMap<String, ActionFactory>>,
    transformations: RwLock<HashMap<String, Arc<dyn Transformation>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("operator_count", &self.operators.read().len())
            .field("action_count", &self.actions.read().len())
            .field("transformation_count", &self.transformations.read().len())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            operators: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
            transformations: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry pre-populated with the builtin operators, actions
    /// and transformations.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtins::operators::register(&registry);
        builtins::actions::register(&registry);
        builtins::transformations::register(&registry);
        registry
    }

    /// Register an operator constructor under `name`.
    pub fn register_operator<F>(&self, name: &str, factory: F)
    where
        F: Fn(OperatorOptions<'_>) -> Result<Box<dyn Operator>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        if self
            .operators
            .write()
            .insert(key(name), Arc::new(factory))
            .is_some()
        {
            debug!(operator = %name, "replaced registered operator");
        }
    }

    /// Register an action constructor under `name`.
    pub fn register_action<F>(&self, name: &str, factory: F)
    where
        F: Fn(Option<&str>) -> Result<Box<dyn Action>, PluginError> + Send + Sync + 'static,
    {
        if self
            .actions
            .write()
            .insert(key(name), Arc::new(factory))
            .is_some()
        {
            debug!(action = %name, "replaced registered action");
        }
    }

    /// Register a transformation under `name`.
    pub fn register_transformation<T>(&self, name: &str, transformation: T)
    where
        T: Transformation + 'static,
    {
        if self
            .transformations
            .write()
            .insert(key(name), Arc::new(transformation))
            .is_some()
        {
            debug!(transformation = %name, "replaced registered transformation");
        }
    }

    /// Construct the operator registered under `name`.
    pub fn operator(
        &self,
        name: &str,
        options: OperatorOptions<'_>,
    ) -> Result<Box<dyn Operator>, PluginError> {
        let factory = self
            .operators
            .read()
            .get(&key(name))
            .cloned()
            .ok_or_else(|| not_found(PluginKind::Operator, name))?;
        factory(options)
    }

    /// Construct the action registered under `name`.
    pub fn action(&self, name: &str, argument: Option<&str>) -> Result<Box<dyn Action>, PluginError> {
        let factory = self
            .actions
            .read()
            .get(&key(name))
            .cloned()
            .ok_or_else(|| not_found(PluginKind::Action, name))?;
        factory(argument)
    }

    /// Look up the transformation registered under `name`.
    pub fn transformation(&self, name: &str) -> Result<Arc<dyn Transformation>, PluginError> {
        self.transformations
            .read()
            .get(&key(name))
            .cloned()
            .ok_or_else(|| not_found(PluginKind::Transformation, name))
    }

    /// Whether an operator is registered under `name`.
    pub fn has_operator(&self, name: &str) -> bool {
        self.operators.read().contains_key(&key(name))
    }

    /// Whether an action is registered under `name`.
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.read().contains_key(&key(name))
    }

    /// Registered operator names, sorted.
    pub fn operator_names(&self) -> Vec<String> {
        sorted_keys(&self.operators.read())
    }

    /// Registered action names, sorted.
    pub fn action_names(&self) -> Vec<String> {
        sorted_keys(&self.actions.read())
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort();
    names
}

fn not_found(kind: PluginKind, name: &str) -> PluginError {
    PluginError::NotFound {
        kind,
        name: name.to_owned(),
    }
}
