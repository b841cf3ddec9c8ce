//! The directive table and the handlers of configuration-only directives.

use warden_rules::{RuleEngineMode, WafConfig};

/// Every directive the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    SecRule,
    SecAction,
    Include,
    SecRuleEngine,
    SecWebAppId,
    SecComponentSignature,
    SecRequestBodyAccess,
    SecResponseBodyAccess,
    SecRequestBodyLimit,
    SecResponseBodyLimit,
    SecDataset,
}

impl Directive {
    const ALL: [Self; 11] = [
        Self::SecRule,
        Self::SecAction,
        Self::Include,
        Self::SecRuleEngine,
        Self::SecWebAppId,
        Self::SecComponentSignature,
        Self::SecRequestBodyAccess,
        Self::SecResponseBodyAccess,
        Self::SecRequestBodyLimit,
        Self::SecResponseBodyLimit,
        Self::SecDataset,
    ];

    /// The keyword as conventionally written.
    pub fn name(self) -> &'static str {
        match self {
            Self::SecRule => "SecRule",
            Self::SecAction => "SecAction",
            Self::Include => "Include",
            Self::SecRuleEngine => "SecRuleEngine",
            Self::SecWebAppId => "SecWebAppId",
            Self::SecComponentSignature => "SecComponentSignature",
            Self::SecRequestBodyAccess => "SecRequestBodyAccess",
            Self::SecResponseBodyAccess => "SecResponseBodyAccess",
            Self::SecRequestBodyLimit => "SecRequestBodyLimit",
            Self::SecResponseBodyLimit => "SecResponseBodyLimit",
            Self::SecDataset => "SecDataset",
        }
    }

    /// Look a keyword up, ignoring case.
    pub fn lookup(keyword: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(keyword))
    }

    /// Accepted argument counts, inclusive.
    pub fn arity(self) -> (usize, usize) {
        match self {
            Self::SecRule => (2, 3),
            Self::SecDataset => (2, 2),
            _ => (1, 1),
        }
    }
}

fn on_off(value: &str) -> Result<bool, String> {
    if value.eq_ignore_ascii_case("on") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("off") {
        Ok(false)
    } else {
        Err(format!("expected On or Off, got '{value}'"))
    }
}

fn limit(value: &str) -> Result<usize, String> {
    value
        .trim()
        .parse()
        .map_err(|e| format!("invalid byte limit '{value}': {e}"))
}

/// Apply a configuration directive. Rule-producing directives and
/// `Include` are handled by the parser itself.
pub fn apply_config(
    directive: Directive,
    args: &[String],
    config: &mut WafConfig,
) -> Result<(), String> {
    let first = args.first().map(String::as_str).unwrap_or_default();
    match directive {
        Directive::SecRuleEngine => {
            config.rule_engine = first.parse::<RuleEngineMode>().map_err(|e| e.to_string())?;
        }
        Directive::SecWebAppId => config.web_app_id = Some(first.to_owned()),
        Directive::SecComponentSignature => config.component_signatures.push(first.to_owned()),
        Directive::SecRequestBodyAccess => config.request_body_access = on_off(first)?,
        Directive::SecResponseBodyAccess => config.response_body_access = on_off(first)?,
        Directive::SecRequestBodyLimit => config.request_body_limit = limit(first)?,
        Directive::SecResponseBodyLimit => config.response_body_limit = limit(first)?,
        Directive::SecDataset => {
            let entries = args
                .get(1)
                .map(|body| {
                    body.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();
            config.datasets.insert(first.to_owned(), entries);
        }
        Directive::SecRule | Directive::SecAction | Directive::Include => {
            return Err(format!("{} is not a configuration directive", directive.name()));
        }
    }
    Ok(())
}
