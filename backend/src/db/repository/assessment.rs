//! Assessment repository trait for core CRUD operations.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{Assessment, AssessmentId, Image, PatientId};

/// Repository trait for assessments and their images.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    /// Check that the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Store a new assessment and return its id.
    ///
    /// An assessment without an id gets the next free one. Storing an id
    /// that already exists is a conflict.
    async fn store_assessment(&self, assessment: &Assessment) -> RepositoryResult<AssessmentId>;

    /// Fetch one assessment with images and stored deviations.
    async fn get_assessment(&self, id: AssessmentId) -> RepositoryResult<Assessment>;

    /// All assessments of a patient, oldest first.
    async fn list_assessments_for_patient(
        &self,
        patient_id: PatientId,
    ) -> RepositoryResult<Vec<Assessment>>;

    /// Replace the images of an assessment that is still open for edits.
    async fn update_images(&self, id: AssessmentId, images: Vec<Image>) -> RepositoryResult<()>;

    /// Mark an assessment complete. Completing twice is a no-op.
    async fn complete_assessment(&self, id: AssessmentId) -> RepositoryResult<()>;
}
