//! Training backends.

pub mod runtime;

pub use runtime::{RuntimeBackend, RuntimeCommand, RuntimeMessage};
