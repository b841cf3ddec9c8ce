use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// A request/response location a rule can inspect.
///
/// Names are matched case-insensitively when parsed and are rendered in the
/// conventional upper-case form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableName {
    Args,
    ArgsGet,
    ArgsPost,
    ArgsNames,
    RequestHeaders,
    RequestHeadersNames,
    RequestCookies,
    RequestUri,
    RequestMethod,
    RequestProtocol,
    RequestFilename,
    QueryString,
    RequestBody,
    RemoteAddr,
    RemotePort,
    ServerAddr,
    ServerPort,
    ResponseHeaders,
    ResponseStatus,
    ResponseBody,
    Tx,
    MatchedVar,
    MatchedVarName,
}

impl VariableName {
    /// Every known variable, in declaration order.
    pub const ALL: [Self; 23] = [
        Self::Args,
        Self::ArgsGet,
        Self::ArgsPost,
        Self::ArgsNames,
        Self::RequestHeaders,
        Self::RequestHeadersNames,
        Self::RequestCookies,
        Self::RequestUri,
        Self::RequestMethod,
        Self::RequestProtocol,
        Self::RequestFilename,
        Self::QueryString,
        Self::RequestBody,
        Self::RemoteAddr,
        Self::RemotePort,
        Self::ServerAddr,
        Self::ServerPort,
        Self::ResponseHeaders,
        Self::ResponseStatus,
        Self::ResponseBody,
        Self::Tx,
        Self::MatchedVar,
        Self::MatchedVarName,
    ];

    /// The canonical rule-language spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Args => "ARGS",
            Self::ArgsGet => "ARGS_GET",
            Self::ArgsPost => "ARGS_POST",
            Self::ArgsNames => "ARGS_NAMES",
            Self::RequestHeaders => "REQUEST_HEADERS",
            Self::RequestHeadersNames => "REQUEST_HEADERS_NAMES",
            Self::RequestCookies => "REQUEST_COOKIES",
            Self::RequestUri => "REQUEST_URI",
            Self::RequestMethod => "REQUEST_METHOD",
            Self::RequestProtocol => "REQUEST_PROTOCOL",
            Self::RequestFilename => "REQUEST_FILENAME",
            Self::QueryString => "QUERY_STRING",
            Self::RequestBody => "REQUEST_BODY",
            Self::RemoteAddr => "REMOTE_ADDR",
            Self::RemotePort => "REMOTE_PORT",
            Self::ServerAddr => "SERVER_ADDR",
            Self::ServerPort => "SERVER_PORT",
            Self::ResponseHeaders => "RESPONSE_HEADERS",
            Self::ResponseStatus => "RESPONSE_STATUS",
            Self::ResponseBody => "RESPONSE_BODY",
            Self::Tx => "TX",
            Self::MatchedVar => "MATCHED_VAR",
            Self::MatchedVarName => "MATCHED_VAR_NAME",
        }
    }

    /// Whether the variable holds many keyed values rather than a single one.
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Self::Args
                | Self::ArgsGet
                | Self::ArgsPost
                | Self::ArgsNames
                | Self::RequestHeaders
                | Self::RequestHeadersNames
                | Self::RequestCookies
                | Self::ResponseHeaders
                | Self::Tx
        )
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableName {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RuleError::InvalidVariable(format!("unknown variable '{s}'")))
    }
}

/// Selects keys inside a collection, either literally or by pattern.
#[derive(Debug, Clone)]
pub enum KeySelector {
    /// Case-insensitive literal key.
    Literal(String),
    /// Case-insensitive regular expression over the key.
    Regex(Regex),
}

impl KeySelector {
    /// Parse a selector as written after `NAME:`. A key wrapped in slashes is
    /// a regular expression.
    pub fn parse(raw: &str) -> Result<Self, RuleError> {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            let pattern = &raw[1..raw.len() - 1];
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| RuleError::InvalidVariable(format!("bad key pattern {raw}: {e}")))?;
            return Ok(Self::Regex(re));
        }
        if raw.is_empty() {
            return Err(RuleError::InvalidVariable("empty key selector".into()));
        }
        Ok(Self::Literal(raw.to_ascii_lowercase()))
    }

    /// Whether `key` is selected.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Literal(k) => k.eq_ignore_ascii_case(key),
            Self::Regex(re) => re.is_match(key),
        }
    }
}

impl fmt::Display for KeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(k) => f.write_str(k),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// A single variable reference of a rule, e.g. `ARGS:id` or `&REQUEST_HEADERS`.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Which location to read.
    pub name: VariableName,
    /// Restrict a collection to matching keys.
    pub key: Option<KeySelector>,
    /// Yield the number of selected values instead of the values themselves.
    pub count: bool,
    /// Keys excluded via `!NAME:key`.
    pub exceptions: Vec<KeySelector>,
}

impl Variable {
    /// Reference a whole variable.
    pub fn new(name: VariableName) -> Self {
        Self {
            name,
            key: None,
            count: false,
            exceptions: Vec::new(),
        }
    }

    /// Restrict to keys matching `key`.
    #[must_use]
    pub fn with_key(mut self, key: KeySelector) -> Self {
        self.key = Some(key);
        self
    }

    /// Count selected values instead of returning them.
    #[must_use]
    pub fn counted(mut self) -> Self {
        self.count = true;
        self
    }

    /// Whether the given key passes both the key selector and the exceptions.
    pub fn selects(&self, key: &str) -> bool {
        let selected = self.key.as_ref().is_none_or(|k| k.matches(key));
        selected && !self.exceptions.iter().any(|e| e.matches(key))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count {
            f.write_str("&")?;
        }
        f.write_str(self.name.as_str())?;
        if let Some(key) = &self.key {
            write!(f, ":{key}")?;
        }
        Ok(())
    }
}
