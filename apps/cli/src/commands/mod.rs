//! Command implementations for the chattune CLI.

pub mod prepare;
pub mod runs;
pub mod train;
pub mod types;
