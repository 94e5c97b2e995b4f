//! Analysis repository trait for derived deviation data.
//!
//! Deviations are derived from landmarks and can always be recomputed. They
//! are stored together with the landmark checksum they were computed from so
//! callers can tell stale results apart from current ones.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::AssessmentAnalysis;
use crate::models::{AssessmentId, Deviation};

#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Replace the stored deviations, overall severity, summary and checksum.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of deviations stored
    async fn store_analysis(
        &self,
        id: AssessmentId,
        analysis: &AssessmentAnalysis,
    ) -> RepositoryResult<usize>;

    /// Stored deviations of an assessment, in storage order.
    async fn get_deviations(&self, id: AssessmentId) -> RepositoryResult<Vec<Deviation>>;

    /// Delete stored analysis results.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of deviations removed
    async fn clear_analysis(&self, id: AssessmentId) -> RepositoryResult<usize>;

    /// Whether stored deviations match the assessment's current landmarks.
    async fn has_current_analysis(&self, id: AssessmentId) -> RepositoryResult<bool>;
}
