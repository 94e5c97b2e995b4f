//! In-memory local repository implementation.
//!
//! Stores assessments in a `BTreeMap` behind a `parking_lot` lock. Suitable for
//! unit tests, the CLI and local development where isolation and
//! deterministic ordering matter more than durability.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::AssessmentAnalysis;
use crate::db::repository::*;
use crate::models::{landmark_checksum, Assessment, AssessmentId, Deviation, Image, PatientId};

/// In-memory local repository.
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    assessments: BTreeMap<AssessmentId, Assessment>,
    next_assessment_id: i64,
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            assessments: BTreeMap::new(),
            next_assessment_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalRepository {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Simulate a lost connection (or its recovery) in tests.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data, keeping the health flag.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    pub fn assessment_count(&self) -> usize {
        self.data.read().assessments.len()
    }

    fn check_health(&self, operation: &str) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection_with_context(
                "Local repository is not healthy",
                ErrorContext::new(operation),
            ));
        }
        Ok(())
    }

    fn not_found(operation: &str, id: AssessmentId) -> RepositoryError {
        RepositoryError::not_found_with_context(
            format!("Assessment {} not found", id),
            ErrorContext::assessment(operation, id),
        )
    }

    /// Run `f` on a stored assessment under the write lock.
    fn with_assessment_mut<T>(
        &self,
        operation: &str,
        id: AssessmentId,
        f: impl FnOnce(&mut Assessment) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        self.check_health(operation)?;
        let mut data = self.data.write();
        let assessment = data
            .assessments
            .get_mut(&id)
            .ok_or_else(|| Self::not_found(operation, id))?;
        f(assessment)
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssessmentRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn store_assessment(&self, assessment: &Assessment) -> RepositoryResult<AssessmentId> {
        self.check_health("store_assessment")?;
        let mut data = self.data.write();

        let id = match assessment.id {
            Some(id) if data.assessments.contains_key(&id) => {
                return Err(RepositoryError::conflict_with_context(
                    format!("Assessment {} already exists", id),
                    ErrorContext::assessment("store_assessment", id),
                ));
            }
            Some(id) => id,
            None => AssessmentId::new(data.next_assessment_id),
        };
        data.next_assessment_id = data.next_assessment_id.max(id.value() + 1);

        let mut stored = assessment.clone();
        stored.id = Some(id);
        data.assessments.insert(id, stored);
        Ok(id)
    }

    async fn get_assessment(&self, id: AssessmentId) -> RepositoryResult<Assessment> {
        self.check_health("get_assessment")?;
        self.data
            .read()
            .assessments
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::not_found("get_assessment", id))
    }

    async fn list_assessments_for_patient(
        &self,
        patient_id: PatientId,
    ) -> RepositoryResult<Vec<Assessment>> {
        self.check_health("list_assessments_for_patient")?;
        let data = self.data.read();
        let mut assessments: Vec<Assessment> = data
            .assessments
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        assessments.sort_by_key(|a| (a.assessment_date, a.id));
        Ok(assessments)
    }

    async fn update_images(&self, id: AssessmentId, images: Vec<Image>) -> RepositoryResult<()> {
        self.with_assessment_mut("update_images", id, |assessment| {
            if assessment.completed {
                return Err(RepositoryError::conflict_with_context(
                    "Completed assessments cannot be edited",
                    ErrorContext::assessment("update_images", id),
                ));
            }
            let mut images = images;
            images.sort_by_key(|i| i.view);
            assessment.images = images;
            Ok(())
        })
    }

    async fn complete_assessment(&self, id: AssessmentId) -> RepositoryResult<()> {
        self.with_assessment_mut("complete_assessment", id, |assessment| {
            assessment.complete();
            Ok(())
        })
    }
}

#[async_trait]
impl AnalysisRepository for LocalRepository {
    async fn store_analysis(
        &self,
        id: AssessmentId,
        analysis: &AssessmentAnalysis,
    ) -> RepositoryResult<usize> {
        self.with_assessment_mut("store_analysis", id, |assessment| {
            assessment.deviations = analysis.deviations.clone();
            assessment.overall_severity = Some(analysis.overall_severity);
            assessment.summary = Some(analysis.summary.clone());
            assessment.landmark_checksum = Some(analysis.landmark_checksum.clone());
            Ok(assessment.deviations.len())
        })
    }

    async fn get_deviations(&self, id: AssessmentId) -> RepositoryResult<Vec<Deviation>> {
        self.check_health("get_deviations")?;
        self.data
            .read()
            .assessments
            .get(&id)
            .map(|a| a.deviations.clone())
            .ok_or_else(|| Self::not_found("get_deviations", id))
    }

    async fn clear_analysis(&self, id: AssessmentId) -> RepositoryResult<usize> {
        self.with_assessment_mut("clear_analysis", id, |assessment| {
            let removed = assessment.deviations.len();
            assessment.deviations.clear();
            assessment.overall_severity = None;
            assessment.summary = None;
            assessment.landmark_checksum = None;
            Ok(removed)
        })
    }

    async fn has_current_analysis(&self, id: AssessmentId) -> RepositoryResult<bool> {
        self.check_health("has_current_analysis")?;
        let data = self.data.read();
        let assessment = data
            .assessments
            .get(&id)
            .ok_or_else(|| Self::not_found("has_current_analysis", id))?;
        Ok(assessment.landmark_checksum.as_deref()
            == Some(landmark_checksum(&assessment.images).as_str()))
    }
}
