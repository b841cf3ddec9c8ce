//! Phase-driven evaluation of a rule set against one transaction.

pub mod eval;
pub mod state;
pub mod transaction;
pub mod verdict;

pub use state::{AllowScope, TransactionState};
pub use transaction::Transaction;
pub use verdict::{Interruption, MatchData, MatchRecord};
