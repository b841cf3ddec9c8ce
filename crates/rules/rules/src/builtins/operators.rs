//! Builtin operators.

use regex::{Regex, RegexBuilder};

use crate::error::{OperatorError, PluginError, PluginKind};
use crate::plugin::{Operator, OperatorMatch, OperatorOptions};
use crate::registry::Registry;

/// Maximum number of capture groups copied out of a regex match (`TX:0`..`TX:9`).
pub(crate) const MAX_CAPTURES: usize = 10;

/// Register every builtin operator.
pub fn register(registry: &Registry) {
    registry.register_operator("rx", |opts| Ok(Box::new(Rx::new(opts.argument)?)));
    registry.register_operator("eq", |opts| numeric("eq", opts, NumericOp::Eq));
    registry.register_operator("ge", |opts| numeric("ge", opts, NumericOp::Ge));
    registry.register_operator("gt", |opts| numeric("gt", opts, NumericOp::Gt));
    registry.register_operator("le", |opts| numeric("le", opts, NumericOp::Le));
    registry.register_operator("lt", |opts| numeric("lt", opts, NumericOp::Lt));
    registry.register_operator("streq", |opts| text(opts, TextOp::Equals));
    registry.register_operator("contains", |opts| text(opts, TextOp::Contains));
    registry.register_operator("containsWord", |opts| text(opts, TextOp::ContainsWord));
    registry.register_operator("beginsWith", |opts| text(opts, TextOp::BeginsWith));
    registry.register_operator("endsWith", |opts| text(opts, TextOp::EndsWith));
    registry.register_operator("within", |opts| text(opts, TextOp::Within));
    registry.register_operator("pm", |opts| {
        Ok(Box::new(PhraseMatch::new(opts.argument.split_whitespace())))
    });
    registry.register_operator("pmFromDataset", |opts| {
        let name = opts.argument.trim();
        let entries = opts.datasets.get(name).ok_or_else(|| {
            PluginError::invalid_argument(
                PluginKind::Operator,
                "pmFromDataset",
                format!("dataset '{name}' is not declared"),
            )
        })?;
        Ok(Box::new(PhraseMatch::new(entries.iter().map(String::as_str))))
    });
    registry.register_operator("unconditionalMatch", |_| Ok(Box::new(Constant(true))));
    registry.register_operator("noMatch", |_| Ok(Box::new(Constant(false))));
}

/// `@rx`: regular expression search, with captures.
#[derive(Debug)]
pub struct Rx {
    re: Regex,
}

impl Rx {
    /// Compile the pattern with multi-line and dot-all semantics.
    pub fn new(pattern: &str) -> Result<Self, PluginError> {
        let re = RegexBuilder::new(pattern)
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| PluginError::invalid_argument(PluginKind::Operator, "rx", e.to_string()))?;
        Ok(Self { re })
    }
}

impl Operator for Rx {
    fn evaluate(&self, value: &str) -> Result<OperatorMatch, OperatorError> {
        let Some(caps) = self.re.captures(value) else {
            return Ok(OperatorMatch::miss());
        };
        let captures = caps
            .iter()
            .take(MAX_CAPTURES)
            .map(|m| m.map_or_else(String::new, |m| m.as_str().to_owned()))
            .collect();
        Ok(OperatorMatch {
            matched: true,
            captures,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum NumericOp {
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
}

/// `@eq`, `@ge`, `@gt`, `@le`, `@lt`: integer comparisons.
#[derive(Debug)]
pub struct Numeric {
    op: NumericOp,
    operand: i64,
}

fn numeric(
    name: &str,
    opts: OperatorOptions<'_>,
    op: NumericOp,
) -> Result<Box<dyn Operator>, PluginError> {
    let operand = opts.argument.trim().parse::<i64>().map_err(|e| {
        PluginError::invalid_argument(
            PluginKind::Operator,
            name,
            format!("'{}' is not an integer: {e}", opts.argument),
        )
    })?;
    Ok(Box::new(Numeric { op, operand }))
}

impl Operator for Numeric {
    fn evaluate(&self, value: &str) -> Result<OperatorMatch, OperatorError> {
        // Non-numeric input compares as 0 so it cannot switch the rule off.
        let value = value.trim().parse::<i64>().unwrap_or(0);
        let matched = match self.op {
            NumericOp::Eq => value == self.operand,
            NumericOp::Ge => value >= self.operand,
            NumericOp::Gt => value > self.operand,
            NumericOp::Le => value <= self.operand,
            NumericOp::Lt => value < self.operand,
        };
        Ok(OperatorMatch::from_bool(matched))
    }
}

#[derive(Debug, Clone, Copy)]
enum TextOp {
    Equals,
    Contains,
    ContainsWord,
    BeginsWith,
    EndsWith,
    Within,
}

/// Case-sensitive string comparisons.
#[derive(Debug)]
pub struct Text {
    op: TextOp,
    operand: String,
}

#[allow(clippy::unnecessary_wraps)]
fn text(opts: OperatorOptions<'_>, op: TextOp) -> Result<Box<dyn Operator>, PluginError> {
    Ok(Box::new(Text {
        op,
        operand: opts.argument.to_owned(),
    }))
}

fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return true;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

impl Operator for Text {
    fn evaluate(&self, value: &str) -> Result<OperatorMatch, OperatorError> {
        let operand = self.operand.as_str();
        let matched = match self.op {
            TextOp::Equals => value == operand,
            TextOp::Contains => value.contains(operand),
            TextOp::ContainsWord => contains_word(value, operand),
            TextOp::BeginsWith => value.starts_with(operand),
            TextOp::EndsWith => value.ends_with(operand),
            TextOp::Within => operand.contains(value),
        };
        if !matched {
            return Ok(OperatorMatch::miss());
        }
        Ok(OperatorMatch {
            matched: true,
            captures: vec![operand.to_owned()],
        })
    }
}

/// `@pm` / `@pmFromDataset`: case-insensitive match of any phrase.
#[derive(Debug)]
pub struct PhraseMatch {
    phrases: Vec<String>,
}

impl PhraseMatch {
    fn new<'a>(phrases: impl Iterator<Item = &'a str>) -> Self {
        Self {
            phrases: phrases
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_lowercase)
                .collect(),
        }
    }
}

impl Operator for PhraseMatch {
    fn evaluate(&self, value: &str) -> Result<OperatorMatch, OperatorError> {
        let lowered = value.to_lowercase();
        Ok(self
            .phrases
            .iter()
            .find(|p| lowered.contains(p.as_str()))
            .map_or_else(OperatorMatch::miss, |p| OperatorMatch {
                matched: true,
                captures: vec![p.clone()],
            }))
    }
}

/// `@unconditionalMatch` / `@noMatch`.
#[derive(Debug)]
pub struct Constant(bool);

impl Operator for Constant {
    fn evaluate(&self, _value: &str) -> Result<OperatorMatch, OperatorError> {
        Ok(OperatorMatch::from_bool(self.0))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn build(name: &str, argument: &str) -> Result<Box<dyn Operator>, PluginError> {
        let registry = Registry::with_builtins();
        let mut datasets = HashMap::new();
        datasets.insert(
            "bad_agents".to_owned(),
            vec!["sqlmap".to_owned(), "nikto".to_owned()],
        );
        registry.operator(
            name,
            OperatorOptions {
                argument,
                datasets: &datasets,
            },
        )
    }

    fn eval(name: &str, argument: &str, value: &str) -> bool {
        build(name, argument).unwrap().evaluate(value).unwrap().matched
    }

    #[test]
    fn rx_matches_and_captures() {
        let op = build("rx", r"id=(\d+)").unwrap();
        let m = op.evaluate("user?id=123").unwrap();
        assert!(m.matched);
        assert_eq!(m.captures, vec!["id=123", "123"]);
        assert!(!op.evaluate("user").unwrap().matched);
    }

    #[test]
    fn rx_rejects_invalid_pattern() {
        assert!(build("rx", "(unclosed").is_err());
    }

    #[test]
    fn numeric_comparisons() {
        assert!(eval("eq", "5", "5"));
        assert!(eval("ge", "5", "5"));
        assert!(eval("gt", "5", "6"));
        assert!(eval("le", "5", " 4 "));
        assert!(eval("lt", "5", "-1"));
        assert!(!eval("lt", "5", "5"));
        assert!(build("eq", "five").is_err());
    }

    #[test]
    fn non_numeric_input_compares_as_zero() {
        assert!(!eval("gt", "1", "abc"));
        assert!(eval("lt", "1", "abc"));
        assert!(eval("eq", "0", ""));
        assert!(!eval("le", "-1", "x"));
    }

    #[test]
    fn text_comparisons() {
        assert!(eval("streq", "GET", "GET"));
        assert!(!eval("streq", "GET", "get"));
        assert!(eval("contains", "admin", "/admin/panel"));
        assert!(eval("beginsWith", "/api", "/api/v1"));
        assert!(eval("endsWith", ".php", "index.php"));
        assert!(eval("within", "GET POST HEAD", "POST"));
        assert!(!eval("within", "GET POST HEAD", "DELETE"));
    }

    #[test]
    fn contains_word_respects_boundaries() {
        assert!(eval("containsWord", "select", "1 select * from t"));
        assert!(!eval("containsWord", "select", "preselected"));
        assert!(eval("containsWord", "select", "select"));
    }

    #[test]
    fn phrase_match_is_case_insensitive() {
        assert!(eval("pm", "union select", "1 UNION all"));
        assert!(!eval("pm", "union select", "nothing here"));
    }

    #[test]
    fn phrase_match_from_dataset() {
        assert!(eval("pmFromDataset", "bad_agents", "Mozilla sqlmap/1.0"));
        assert!(!eval("pmFromDataset", "bad_agents", "curl/8.0"));
        assert!(build("pmFromDataset", "missing").is_err());
    }

    #[test]
    fn constants() {
        assert!(eval("unconditionalMatch", "", "whatever"));
        assert!(!eval("noMatch", "", "whatever"));
    }
}
