//! Terminal interaction

pub mod prompt;
