//! Assessment storage behind the Repository pattern.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Caller (CLI, embedding application)                    │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services.rs)                            │
//! │  - Analysis fan-out and checksum staleness checks       │
//! │  - Compare / trend / report / overlay by id             │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/)                        │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────▼──────────────────────────────┐
//!     │             Local Repository                  │
//!     │               (in-memory)                     │
//!     └──────────────────────────────────────────────┘
//! ```

#[cfg(not(feature = "local-repo"))]
compile_error!("Enable at least one repository backend feature.");

pub mod checksum;
pub mod factory;
pub mod repositories;
pub mod repository;
pub mod services;

pub use checksum::calculate_checksum;
pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
pub use repository::{
    AnalysisRepository, AssessmentRepository, ErrorContext, FullRepository, RepositoryError,
    RepositoryResult,
};
pub use services::{ServiceError, ServiceResult};

use anyhow::{Context, Result};
use std::sync::{Arc, OnceLock};

use crate::config::EngineConfig;

/// Global repository instance initialized once per process.
static REPOSITORY: OnceLock<Arc<dyn FullRepository>> = OnceLock::new();

/// Initialize the global repository from `engine.toml` and the environment.
///
/// Later calls are no-ops once a repository is installed.
pub fn init_repository() -> Result<()> {
    if REPOSITORY.get().is_some() {
        return Ok(());
    }

    let config = EngineConfig::load().context("Failed to load engine configuration")?;
    let repo = RepositoryFactory::from_config(&config)
        .context("Failed to create the configured repository")?;
    let _ = REPOSITORY.set(repo);
    Ok(())
}

/// Install a specific repository as the global instance.
///
/// Returns `false` when one was already installed.
pub fn install_repository(repo: Arc<dyn FullRepository>) -> bool {
    REPOSITORY.set(repo).is_ok()
}

/// Get a reference to the global repository instance.
pub fn get_repository() -> Result<&'static Arc<dyn FullRepository>> {
    if REPOSITORY.get().is_none() {
        init_repository()?;
    }

    REPOSITORY
        .get()
        .context("Repository not initialized. Call init_repository() first.")
}

#[cfg(test)]
#[path = "services_tests.rs"]
mod services_tests;
