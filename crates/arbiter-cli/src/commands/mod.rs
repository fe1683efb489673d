//! Subcommand implementations.

pub mod classify;
pub mod invoke;
pub mod score;
pub mod validate;
