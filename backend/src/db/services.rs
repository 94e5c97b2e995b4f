//! Repository-backed service layer.
//!
//! These functions fetch assessments through any [`FullRepository`], run the
//! pure computations from [`crate::services`] and store derived results. They
//! hold the cross-cutting rules that must not depend on the storage backend:
//! checksum-based staleness checks, completion before comparison and the
//! per-image analysis fan-out.
//!
//! ```ignore
//! use posture_engine::db::{services, RepositoryFactory};
//!
//! let repo = RepositoryFactory::create_local();
//! let id = services::store_assessment(repo.as_ref(), &assessment).await?;
//! services::analyze_and_store(repo.as_ref(), id, &config.analysis).await?;
//! ```

use futures::future::join_all;
use log::{debug, info, warn};

use super::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::api::{
    AssessmentAnalysis, ComparisonResult, OverlayAlignment, ReportBundle, ReportIdentities,
    TreatmentGoalProgress, TrendSeries, ViewAnalysis,
};
use crate::config::{AnalysisSettings, ComparisonSettings, TrendSettings};
use crate::error::EngineError;
use crate::models::{
    landmark_checksum, Assessment, AssessmentId, DeviationType, Image, PatientId, View,
};
use crate::services::{aggregate_views, align_overlay, analyze_image, build_report, compare, trend};

/// Errors surfaced by repository-backed services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Engine(err) => err.code(),
            ServiceError::Repository(RepositoryError::NotFound { .. }) => "NOT_FOUND",
            ServiceError::Repository(RepositoryError::ConflictError { .. }) => "CONFLICT",
            ServiceError::Repository(_) => "REPOSITORY_ERROR",
        }
    }
}

// ==================== Health & Storage ====================

pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

/// Store a new assessment (typically parsed from a detector payload).
pub async fn store_assessment<R: FullRepository + ?Sized>(
    repo: &R,
    assessment: &Assessment,
) -> RepositoryResult<AssessmentId> {
    info!(
        "Service layer: storing assessment for patient {} dated {} ({} images)",
        assessment.patient_id,
        assessment.assessment_date.format("%Y-%m-%d"),
        assessment.images.len()
    );
    repo.store_assessment(assessment).await
}

pub async fn get_assessment<R: FullRepository + ?Sized>(
    repo: &R,
    id: AssessmentId,
) -> RepositoryResult<Assessment> {
    repo.get_assessment(id).await
}

/// Attach or replace one image of an open assessment.
pub async fn attach_image<R: FullRepository + ?Sized>(
    repo: &R,
    id: AssessmentId,
    image: Image,
) -> ServiceResult<()> {
    let mut assessment = repo.get_assessment(id).await?;
    assessment.attach_image(image)?;
    repo.update_images(id, assessment.images).await?;
    Ok(())
}

// ==================== Analysis ====================

/// Analyze every analyzed image of an assessment and replace stored results.
///
/// Each image is analyzed on a blocking task; the per-view results are joined
/// and aggregated in view order, so the outcome does not depend on which
/// task finishes first.
pub async fn analyze_and_store<R: FullRepository + ?Sized>(
    repo: &R,
    id: AssessmentId,
    settings: &AnalysisSettings,
) -> ServiceResult<AssessmentAnalysis> {
    let assessment = repo.get_assessment(id).await?;
    let images: Vec<Image> = assessment.analyzed_images().cloned().collect();
    if images.is_empty() {
        warn!("Service layer: assessment {} has no analyzed images", id);
        return Err(EngineError::no_analyzed_images().into());
    }

    let height = assessment.patient_height_cm;
    let tasks = images.into_iter().map(|image| {
        let settings = *settings;
        tokio::task::spawn_blocking(move || analyze_image(&image, height, &settings))
    });

    let mut views: Vec<ViewAnalysis> = Vec::new();
    for joined in join_all(tasks).await {
        let view = joined.map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Analysis task failed: {}", e),
                ErrorContext::assessment("analyze_and_store", id)
                    .with_details("view analysis task"),
            )
        })?;
        views.push(view);
    }

    let analysis = aggregate_views(views, landmark_checksum(&assessment.images));
    let stored = repo.store_analysis(id, &analysis).await?;
    info!(
        "Service layer: stored {} deviations for assessment {} (overall {}, {} warnings)",
        stored,
        id,
        analysis.overall_severity,
        analysis.warnings.len()
    );
    Ok(analysis)
}

/// Return the assessment, re-analyzing first when its stored deviations were
/// computed from different landmarks.
pub async fn ensure_analysis<R: FullRepository + ?Sized>(
    repo: &R,
    id: AssessmentId,
    settings: &AnalysisSettings,
) -> ServiceResult<Assessment> {
    if repo.has_current_analysis(id).await? {
        debug!("Service layer: analysis of assessment {} is current", id);
    } else {
        info!("Service layer: analysis of assessment {} is stale, recomputing", id);
        analyze_and_store(repo, id, settings).await?;
    }
    Ok(repo.get_assessment(id).await?)
}

/// Bring the analysis up to date and mark the assessment complete.
pub async fn complete_assessment<R: FullRepository + ?Sized>(
    repo: &R,
    id: AssessmentId,
    settings: &AnalysisSettings,
) -> ServiceResult<Assessment> {
    ensure_analysis(repo, id, settings).await?;
    repo.complete_assessment(id).await?;
    info!("Service layer: assessment {} completed", id);
    Ok(repo.get_assessment(id).await?)
}

// ==================== Comparison & Trends ====================

/// Compare two stored assessments by id.
pub async fn compare_assessments<R: FullRepository + ?Sized>(
    repo: &R,
    previous_id: AssessmentId,
    current_id: AssessmentId,
    settings: &ComparisonSettings,
) -> ServiceResult<ComparisonResult> {
    let previous = repo.get_assessment(previous_id).await?;
    let current = repo.get_assessment(current_id).await?;
    for assessment in [&previous, &current] {
        if assessment.completed && !assessment.is_analysis_current() {
            warn!(
                "Service layer: assessment {:?} has deviations computed from older landmarks",
                assessment.id
            );
        }
    }
    Ok(compare(&previous, &current, settings)?)
}

/// Compare the two most recent completed assessments of a patient.
pub async fn compare_latest<R: FullRepository + ?Sized>(
    repo: &R,
    patient_id: PatientId,
    settings: &ComparisonSettings,
) -> ServiceResult<ComparisonResult> {
    let completed: Vec<Assessment> = repo
        .list_assessments_for_patient(patient_id)
        .await?
        .into_iter()
        .filter(|a| a.completed)
        .collect();
    match completed.as_slice() {
        [.., previous, current] => Ok(compare(previous, current, settings)?),
        _ => Err(EngineError::precondition(format!(
            "patient {} has fewer than two completed assessments",
            patient_id
        ))
        .into()),
    }
}

/// Trend series over all stored assessments of a patient.
pub async fn patient_trends<R: FullRepository + ?Sized>(
    repo: &R,
    patient_id: PatientId,
    deviation_type: Option<DeviationType>,
    settings: &TrendSettings,
) -> ServiceResult<Vec<TrendSeries>> {
    let assessments = repo
        .list_assessments_for_patient(patient_id)
        .await
        .map_err(|e| e.with_operation("patient_trends"))?;
    info!(
        "Service layer: building trends for patient {} over {} assessments",
        patient_id,
        assessments.len()
    );
    Ok(trend(&assessments, deviation_type, settings)?)
}

// ==================== Reports & Overlays ====================

/// Compare two stored assessments and build the progress report.
pub async fn progress_report<R: FullRepository + ?Sized>(
    repo: &R,
    previous_id: AssessmentId,
    current_id: AssessmentId,
    settings: &ComparisonSettings,
    identities: &ReportIdentities,
    goals: &[TreatmentGoalProgress],
) -> ServiceResult<ReportBundle> {
    let comparison = compare_assessments(repo, previous_id, current_id, settings).await?;
    Ok(build_report(&comparison, identities, goals))
}

fn image_for_view(assessment: &Assessment, view: View) -> Result<&Image, EngineError> {
    assessment.image(view).ok_or_else(|| {
        EngineError::precondition(format!(
            "assessment {} has no {} image",
            assessment
                .id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "(unsaved)".to_string()),
            view
        ))
    })
}

/// Overlay alignment of one view between two stored assessments.
pub async fn overlay_for_view<R: FullRepository + ?Sized>(
    repo: &R,
    previous_id: AssessmentId,
    current_id: AssessmentId,
    view: View,
) -> ServiceResult<OverlayAlignment> {
    let previous = repo.get_assessment(previous_id).await?;
    let current = repo.get_assessment(current_id).await?;
    let alignment = align_overlay(
        image_for_view(&previous, view)?,
        image_for_view(&current, view)?,
    )?;
    if alignment.low_confidence {
        warn!(
            "Service layer: {} overlay between {} and {} uses only {} common landmarks",
            view, previous_id, current_id, alignment.common_landmark_count
        );
    }
    Ok(alignment)
}
