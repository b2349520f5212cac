//! Builder API for ergonomic automata construction.
//!
//! Builders assemble the same definition document a JSON file would carry
//! and validate it on `build()`, so programmatic and loaded automata go
//! through one path.

pub mod automata;
pub mod error;
pub mod transition;

pub use automata::AutomataBuilder;
pub use error::BuildError;
pub use transition::{StateBuilder, TransitionBuilder};
