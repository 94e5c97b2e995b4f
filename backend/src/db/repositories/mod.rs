//! Repository implementations.
//!
//! - `local`: In-memory implementation for unit testing, the CLI and local development
pub mod local;

pub use local::LocalRepository;
