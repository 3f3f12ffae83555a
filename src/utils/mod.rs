//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Local process execution with a deadline
//! - `shell` - Shell escaping, quoting and heredoc embedding
//! - `slugify` - String slug generation
//! - `truncate` - Byte-budget truncation of command output
//! - `validation` - Input validation helpers

pub mod command;
pub mod shell;
pub mod slugify;
pub mod truncate;
pub mod validation;
