pub mod action;
pub mod phase;
pub mod rule;
pub mod variable;
