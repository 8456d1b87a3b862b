//! Etos Script - RON loader for simulation documents
//!
//! Loads simulation input from RON files:
//! - Transaction documents (a `transaction` node tree)
//! - Entity libraries: shared definitions merged into transactions by
//!   tag and id
//! - Parameter sets bound into `Param` attributes
//! - Simulation configuration

mod error;
mod loader;

pub use error::{Error, Result};
pub use loader::{EntityLibrary, Loader};
