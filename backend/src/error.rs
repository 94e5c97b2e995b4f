//! Typed rejections raised by the computation core.
//!
//! Only requests where nothing could be computed are errors. Partial results
//! (missing landmarks, short trends, underdetermined overlays) are returned
//! successfully with warnings or flags attached.

use crate::models::{AssessmentId, PatientId, View};

/// Result type for core operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Assessments are out of chronological order.
    #[error("Invalid ordering: {message}")]
    InvalidOrdering { message: String },

    /// Assessments belong to different patients.
    #[error("Invalid ordering: assessments belong to different patients ({previous} vs {current})")]
    PatientMismatch {
        previous: PatientId,
        current: PatientId,
    },

    /// Overlay alignment requested across different views.
    #[error("View mismatch: cannot align {previous} onto {current}")]
    ViewMismatch { previous: View, current: View },

    /// The input does not satisfy the operation's precondition.
    #[error("Precondition not met: {message}")]
    PreconditionNotMet { message: String },
}

impl EngineError {
    pub fn invalid_ordering(message: impl Into<String>) -> Self {
        Self::InvalidOrdering {
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionNotMet {
            message: message.into(),
        }
    }

    pub fn no_analyzed_images() -> Self {
        Self::precondition("no analyzed images")
    }

    pub fn not_completed(id: Option<AssessmentId>) -> Self {
        match id {
            Some(id) => Self::precondition(format!("assessment {} is not complete", id)),
            None => Self::precondition("assessment is not complete"),
        }
    }

    pub fn locked(id: Option<AssessmentId>) -> Self {
        match id {
            Some(id) => Self::precondition(format!(
                "assessment {} is complete and can no longer be edited",
                id
            )),
            None => Self::precondition("assessment is complete and can no longer be edited"),
        }
    }

    /// Whether this is an ordering rejection (chronology or patient).
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrdering { .. } | Self::PatientMismatch { .. }
        )
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidOrdering { .. } | Self::PatientMismatch { .. } => "INVALID_ORDERING",
            Self::ViewMismatch { .. } => "VIEW_MISMATCH",
            Self::PreconditionNotMet { .. } => "PRECONDITION_NOT_MET",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            EngineError::invalid_ordering("dates").code(),
            "INVALID_ORDERING"
        );
        assert_eq!(
            EngineError::PatientMismatch {
                previous: PatientId::new(1),
                current: PatientId::new(2)
            }
            .code(),
            "INVALID_ORDERING"
        );
        assert_eq!(EngineError::no_analyzed_images().code(), "PRECONDITION_NOT_MET");
        assert_eq!(
            EngineError::ViewMismatch {
                previous: View::Anterior,
                current: View::Posterior
            }
            .code(),
            "VIEW_MISMATCH"
        );
    }

    #[test]
    fn test_messages() {
        let err = EngineError::no_analyzed_images();
        assert_eq!(err.to_string(), "Precondition not met: no analyzed images");
        let err = EngineError::ViewMismatch {
            previous: View::LateralLeft,
            current: View::Anterior,
        };
        assert_eq!(
            err.to_string(),
            "View mismatch: cannot align Left lateral onto Anterior"
        );
        assert!(EngineError::invalid_ordering("x").is_ordering());
    }
}
