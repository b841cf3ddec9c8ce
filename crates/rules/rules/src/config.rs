use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Default request body limit: 128 KiB.
pub const DEFAULT_REQUEST_BODY_LIMIT: usize = 128 * 1024;

/// Default response body limit: 512 KiB.
pub const DEFAULT_RESPONSE_BODY_LIMIT: usize = 512 * 1024;

/// What the engine does with loaded rules (`SecRuleEngine`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleEngineMode {
    /// Evaluate rules and execute disruptive actions.
    #[default]
    On,
    /// Do not evaluate rules at all.
    Off,
    /// Evaluate and record matches, never interrupt.
    DetectionOnly,
}

impl fmt::Display for RuleEngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "On",
            Self::Off => "Off",
            Self::DetectionOnly => "DetectionOnly",
        })
    }
}

impl FromStr for RuleEngineMode {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "detectiononly" => Ok(Self::DetectionOnly),
            _ => Err(RuleError::InvalidRule(format!(
                "invalid rule engine mode '{s}', expected On, Off or DetectionOnly"
            ))),
        }
    }
}

/// Engine-wide settings collected from configuration directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WafConfig {
    /// `SecRuleEngine`.
    #[serde(default)]
    pub rule_engine: RuleEngineMode,
    /// `SecWebAppId`.
    #[serde(default)]
    pub web_app_id: Option<String>,
    /// `SecComponentSignature`, in declaration order.
    #[serde(default)]
    pub component_signatures: Vec<String>,
    /// `SecRequestBodyAccess`.
    #[serde(default)]
    pub request_body_access: bool,
    /// `SecResponseBodyAccess`.
    #[serde(default)]
    pub response_body_access: bool,
    /// `SecRequestBodyLimit`, in bytes.
    #[serde(default = "default_request_body_limit")]
    pub request_body_limit: usize,
    /// `SecResponseBodyLimit`, in bytes.
    #[serde(default = "default_response_body_limit")]
    pub response_body_limit: usize,
    /// `SecDataset` entries by dataset name.
    #[serde(default)]
    pub datasets: HashMap<String, Vec<String>>,
}

fn default_request_body_limit() -> usize {
    DEFAULT_REQUEST_BODY_LIMIT
}

fn default_response_body_limit() -> usize {
    DEFAULT_RESPONSE_BODY_LIMIT
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            rule_engine: RuleEngineMode::default(),
            web_app_id: None,
            component_signatures: Vec::new(),
            request_body_access: false,
            response_body_access: false,
            request_body_limit: DEFAULT_REQUEST_BODY_LIMIT,
            response_body_limit: DEFAULT_RESPONSE_BODY_LIMIT,
            datasets: HashMap::new(),
        }
    }
}

impl WafConfig {
    /// Set the rule engine mode.
    #[must_use]
    pub fn with_rule_engine(mut self, mode: RuleEngineMode) -> Self {
        self.rule_engine = mode;
        self
    }

    /// Set the web application id.
    #[must_use]
    pub fn with_web_app_id(mut self, id: impl Into<String>) -> Self {
        self.web_app_id = Some(id.into());
        self
    }

    /// Enable or disable request body inspection.
    #[must_use]
    pub fn with_request_body_access(mut self, enabled: bool) -> Self {
        self.request_body_access = enabled;
        self
    }

    /// Enable or disable response body inspection.
    #[must_use]
    pub fn with_response_body_access(mut self, enabled: bool) -> Self {
        self.response_body_access = enabled;
        self
    }

    /// Set the request body limit.
    #[must_use]
    pub fn with_request_body_limit(mut self, bytes: usize) -> Self {
        self.request_body_limit = bytes;
        self
    }

    /// Set the response body limit.
    #[must_use]
    pub fn with_response_body_limit(mut self, bytes: usize) -> Self {
        self.response_body_limit = bytes;
        self
    }

    /// Add or replace a dataset.
    #[must_use]
    pub fn with_dataset(mut self, name: impl Into<String>, entries: Vec<String>) -> Self {
        self.datasets.insert(name.into(), entries);
        self
    }
}
