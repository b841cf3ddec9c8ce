//! Operators, actions and transformations installed by
//! [`Registry::with_builtins`](crate::Registry::with_builtins).

pub mod actions;
pub mod operators;
pub mod transformations;
