//! Repository trait definitions for assessment storage.
//!
//! - [`error`]: Error types for repository operations
//! - [`assessment`]: Core CRUD operations for assessments and images
//! - [`analysis`]: Stored analysis results
//!
//! For functions that need every capability, use the [`FullRepository`]
//! trait bound:
//!
//! ```ignore
//! async fn reanalyze<R: FullRepository + ?Sized>(repo: &R, id: AssessmentId) -> RepositoryResult<()> {
//!     let assessment = repo.get_assessment(id).await?;
//!     repo.store_analysis(id, &analysis).await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod assessment;
pub mod error;

pub use analysis::AnalysisRepository;
pub use assessment::AssessmentRepository;
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

/// Composite trait bound for a complete repository implementation.
pub trait FullRepository: AssessmentRepository + AnalysisRepository {}

// Any type implementing both traits is a FullRepository.
impl<T> FullRepository for T where T: AssessmentRepository + AnalysisRepository {}
