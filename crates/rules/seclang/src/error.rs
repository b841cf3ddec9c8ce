use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use warden_rules::{RuleError, RuleSource};

/// Where in the configuration a directive came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// The file, or `None` for in-memory sources.
    pub file: Option<PathBuf>,
    /// 1-based line number of the directive (0 when unknown).
    pub line: usize,
}

impl SourceLocation {
    /// A location in `file`, or in an in-memory source when `file` is `None`.
    pub fn new(file: Option<&Path>, line: usize) -> Self {
        Self {
            file: file.map(Path::to_path_buf),
            line,
        }
    }

    /// The equivalent [`RuleSource`] recorded on rules.
    pub fn rule_source(&self) -> RuleSource {
        match &self.file {
            Some(path) => RuleSource::File {
                path: path.display().to_string(),
                line: self.line,
            },
            None => RuleSource::Inline { line: self.line },
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(path) => write!(f, "{}:{}", path.display(), self.line),
            None => write!(f, "<string>:{}", self.line),
        }
    }
}

/// Errors raised while loading rule-language configuration.
///
/// Every variant carries the location of the offending directive.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The directive or one of its arguments is malformed.
    #[error("{location}: syntax error: {message}")]
    Syntax {
        location: SourceLocation,
        message: String,
    },

    /// The leading keyword is not a known directive.
    #[error("{location}: unknown directive '{name}'")]
    UnknownDirective {
        location: SourceLocation,
        name: String,
    },

    /// A quoted or backtick string is never closed.
    #[error("{location}: unterminated {delimiter} string")]
    UnterminatedString {
        location: SourceLocation,
        delimiter: char,
    },

    /// The rule could not be built (unknown plugin, invalid id, ...).
    #[error("{location}: {source}")]
    Rule {
        location: SourceLocation,
        #[source]
        source: RuleError,
    },

    /// An include pattern matched no file.
    #[error("{location}: no file matches '{pattern}'")]
    IncludeNotFound {
        location: SourceLocation,
        pattern: String,
    },

    /// Too many includes were processed for one load.
    #[error("{location}: more than {limit} includes processed, possible include loop")]
    IncludeRecursion {
        location: SourceLocation,
        limit: usize,
    },

    /// A rule declared `chain` but no rule followed before the end of input.
    #[error("{location}: chain started by rule {head_id} is never completed")]
    UnterminatedChain {
        location: SourceLocation,
        head_id: u64,
    },

    /// A configuration file could not be read.
    #[error("{location}: cannot read '{}': {source}", .path.display())]
    Io {
        location: SourceLocation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// The location of the offending directive.
    pub fn location(&self) -> &SourceLocation {
        match self {
            Self::Syntax { location, .. }
            | Self::UnknownDirective { location, .. }
            | Self::UnterminatedString { location, .. }
            | Self::Rule { location, .. }
            | Self::IncludeNotFound { location, .. }
            | Self::IncludeRecursion { location, .. }
            | Self::UnterminatedChain { location, .. }
            | Self::Io { location, .. } => location,
        }
    }

    pub(crate) fn syntax(location: &SourceLocation, message: impl Into<String>) -> Self {
        Self::Syntax {
            location: location.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn rule(location: &SourceLocation, source: impl Into<RuleError>) -> Self {
        Self::Rule {
            location: location.clone(),
            source: source.into(),
        }
    }
}
