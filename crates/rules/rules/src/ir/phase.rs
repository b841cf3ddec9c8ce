use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the five ordered evaluation points of a transaction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Phase 1: request line and headers are available.
    RequestHeaders,
    /// Phase 2: the request body is available. Default phase for rules.
    #[default]
    RequestBody,
    /// Phase 3: response status and headers are available.
    ResponseHeaders,
    /// Phase 4: the response body is available.
    ResponseBody,
    /// Phase 5: bookkeeping after the response was sent. Always runs.
    Logging,
}

impl Phase {
    /// All phases in evaluation order.
    pub const ALL: [Self; 5] = [
        Self::RequestHeaders,
        Self::RequestBody,
        Self::ResponseHeaders,
        Self::ResponseBody,
        Self::Logging,
    ];

    /// The numeric phase as written in rule sources (`1`..=`5`).
    pub fn number(self) -> u8 {
        match self {
            Self::RequestHeaders => 1,
            Self::RequestBody => 2,
            Self::ResponseHeaders => 3,
            Self::ResponseBody => 4,
            Self::Logging => 5,
        }
    }

    /// Zero-based index, suitable for phase-bucketed storage.
    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }

    /// Look a phase up by its number.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::RequestHeaders),
            2 => Some(Self::RequestBody),
            3 => Some(Self::ResponseHeaders),
            4 => Some(Self::ResponseBody),
            5 => Some(Self::Logging),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Error returned when a `phase:` argument is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid phase '{0}', expected 1-5, request, response or logging")]
pub struct InvalidPhase(pub String);

impl FromStr for Phase {
    type Err = InvalidPhase;

    /// Accepts `1`..`5` plus the `request` (2), `response` (4) and
    /// `logging` (5) aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "request" => Ok(Self::RequestBody),
            "response" => Ok(Self::ResponseBody),
            "logging" => Ok(Self::Logging),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(Self::from_number)
                .ok_or_else(|| InvalidPhase(s.to_owned())),
        }
    }
}
