//! Landmark catalog and deviation taxonomy.
//!
//! This table is the single source of truth for which deviation types apply
//! to which view, which landmarks each measurement needs, and the normal
//! range and unit of every type. Analysis, comparison and trend code all read
//! it through [`view_deviation_types`] and the [`DeviationType`] accessors.

use serde::{Deserialize, Serialize};

use super::landmark::{BodyPart, LandmarkName, Side, View};
use super::severity::MeasurementUnit;

/// Closed taxonomy of postural deviations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationType {
    HeadForward,
    HeadTilt,
    HeadRotation,
    ShoulderUneven,
    ShoulderProtracted,
    Kyphosis,
    Lordosis,
    Scoliosis,
    HipUneven,
    PelvicTiltLateral,
    PelvicTiltAnterior,
    KneeValgus,
    KneeVarus,
    KneeHyperextension,
    AnklePronation,
    AnkleSupination,
    WeightShift,
}

/// Body regions used to group deviations in summaries and reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyRegion {
    HeadNeck,
    Shoulders,
    Spine,
    Pelvis,
    Knees,
    Ankles,
    WeightShift,
}

impl BodyRegion {
    pub const ALL: [BodyRegion; 7] = [
        BodyRegion::HeadNeck,
        BodyRegion::Shoulders,
        BodyRegion::Spine,
        BodyRegion::Pelvis,
        BodyRegion::Knees,
        BodyRegion::Ankles,
        BodyRegion::WeightShift,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BodyRegion::HeadNeck => "Head and neck",
            BodyRegion::Shoulders => "Shoulders",
            BodyRegion::Spine => "Spine",
            BodyRegion::Pelvis => "Pelvis",
            BodyRegion::Knees => "Knees",
            BodyRegion::Ankles => "Ankles",
            BodyRegion::WeightShift => "Weight distribution",
        }
    }
}

/// Landmarks needed for one measurement of a deviation type in a view.
///
/// Side-specific types produce one plan per side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementPlan {
    pub side: Option<Side>,
    pub landmarks: Vec<LandmarkName>,
}

impl MeasurementPlan {
    fn midline(landmarks: Vec<LandmarkName>) -> Self {
        Self {
            side: None,
            landmarks,
        }
    }

    fn sided(side: Side, parts: &[BodyPart]) -> Self {
        Self {
            side: Some(side),
            landmarks: parts.iter().map(|p| p.on(side)).collect(),
        }
    }
}

const FRONTAL: &[View] = &[View::Anterior, View::Posterior];
const ANTERIOR: &[View] = &[View::Anterior];
const POSTERIOR: &[View] = &[View::Posterior];
const LATERAL: &[View] = &[View::LateralLeft, View::LateralRight];

impl DeviationType {
    pub const ALL: [DeviationType; 17] = [
        DeviationType::HeadForward,
        DeviationType::HeadTilt,
        DeviationType::HeadRotation,
        DeviationType::ShoulderUneven,
        DeviationType::ShoulderProtracted,
        DeviationType::Kyphosis,
        DeviationType::Lordosis,
        DeviationType::Scoliosis,
        DeviationType::HipUneven,
        DeviationType::PelvicTiltLateral,
        DeviationType::PelvicTiltAnterior,
        DeviationType::KneeValgus,
        DeviationType::KneeVarus,
        DeviationType::KneeHyperextension,
        DeviationType::AnklePronation,
        DeviationType::AnkleSupination,
        DeviationType::WeightShift,
    ];

    pub fn views(self) -> &'static [View] {
        use DeviationType::*;
        match self {
            HeadForward | ShoulderProtracted | Kyphosis | Lordosis | PelvicTiltAnterior
            | KneeHyperextension => LATERAL,
            HeadTilt | ShoulderUneven | HipUneven | PelvicTiltLateral | WeightShift => FRONTAL,
            HeadRotation | KneeValgus | KneeVarus => ANTERIOR,
            Scoliosis | AnklePronation | AnkleSupination => POSTERIOR,
        }
    }

    pub fn applies_to(self, view: View) -> bool {
        self.views().contains(&view)
    }

    pub fn unit(self) -> MeasurementUnit {
        use DeviationType::*;
        match self {
            ShoulderUneven | ShoulderProtracted | HipUneven | WeightShift => {
                MeasurementUnit::LevelDifference
            }
            _ => MeasurementUnit::Degrees,
        }
    }

    /// Normal range `(min, max)` in the type's unit.
    pub fn normal_range(self) -> (f64, f64) {
        use DeviationType::*;
        match self {
            HeadForward => (0.0, 40.0),
            HeadTilt => (0.0, 2.0),
            HeadRotation => (0.0, 5.0),
            ShoulderUneven => (0.0, 0.02),
            ShoulderProtracted => (0.0, 0.03),
            Kyphosis => (20.0, 45.0),
            Lordosis => (10.0, 25.0),
            Scoliosis => (0.0, 5.0),
            HipUneven => (0.0, 0.02),
            PelvicTiltLateral => (0.0, 2.0),
            PelvicTiltAnterior => (4.0, 12.0),
            KneeValgus | KneeVarus | KneeHyperextension => (0.0, 5.0),
            AnklePronation | AnkleSupination => (0.0, 4.0),
            WeightShift => (0.0, 0.02),
        }
    }

    pub fn region(self) -> BodyRegion {
        use DeviationType::*;
        match self {
            HeadForward | HeadTilt | HeadRotation => BodyRegion::HeadNeck,
            ShoulderUneven | ShoulderProtracted => BodyRegion::Shoulders,
            Kyphosis | Lordosis | Scoliosis => BodyRegion::Spine,
            HipUneven | PelvicTiltLateral | PelvicTiltAnterior => BodyRegion::Pelvis,
            KneeValgus | KneeVarus | KneeHyperextension => BodyRegion::Knees,
            AnklePronation | AnkleSupination => BodyRegion::Ankles,
            WeightShift => BodyRegion::WeightShift,
        }
    }

    /// Types measured per leg, matched across assessments by side as well.
    pub fn is_side_specific(self) -> bool {
        matches!(
            self,
            DeviationType::KneeValgus
                | DeviationType::KneeVarus
                | DeviationType::AnklePronation
                | DeviationType::AnkleSupination
        )
    }

    pub fn label(self) -> &'static str {
        use DeviationType::*;
        match self {
            HeadForward => "Forward head posture",
            HeadTilt => "Head tilt",
            HeadRotation => "Head rotation",
            ShoulderUneven => "Uneven shoulders",
            ShoulderProtracted => "Shoulder protraction",
            Kyphosis => "Thoracic kyphosis",
            Lordosis => "Lumbar lordosis",
            Scoliosis => "Lateral spinal curvature",
            HipUneven => "Uneven hips",
            PelvicTiltLateral => "Lateral pelvic tilt",
            PelvicTiltAnterior => "Anterior pelvic tilt",
            KneeValgus => "Knee valgus",
            KneeVarus => "Knee varus",
            KneeHyperextension => "Knee hyperextension",
            AnklePronation => "Ankle pronation",
            AnkleSupination => "Ankle supination",
            WeightShift => "Lateral weight shift",
        }
    }

    /// Suggested clinical focus when the deviation persists or worsens.
    pub fn recommendation(self) -> &'static str {
        use DeviationType::*;
        match self {
            HeadForward => "Cervical retraction drills and deep neck flexor strengthening",
            HeadTilt => "Upper cervical assessment and lateral neck flexibility work",
            HeadRotation => "Cervical rotation mobility and workstation ergonomics review",
            ShoulderUneven => "Scapular stabilization and upper trapezius balance work",
            ShoulderProtracted => "Pectoral stretching and scapular retraction strengthening",
            Kyphosis => "Thoracic extension mobility and postural endurance training",
            Lordosis => "Hip flexor lengthening and core stabilization",
            Scoliosis => "Asymmetric spinal assessment and targeted trunk strengthening",
            HipUneven => "Leg length evaluation and hip abductor balance work",
            PelvicTiltLateral => "Quadratus lumborum release and gluteus medius strengthening",
            PelvicTiltAnterior => "Gluteal activation and hip flexor stretching",
            KneeValgus => "Hip external rotator strengthening and landing mechanics",
            KneeVarus => "Lateral chain flexibility and foot position review",
            KneeHyperextension => "Hamstring strengthening and knee position awareness",
            AnklePronation => "Arch support review and intrinsic foot strengthening",
            AnkleSupination => "Peroneal strengthening and footwear assessment",
            WeightShift => "Balance retraining and symmetrical loading drills",
        }
    }

    /// Landmark requirements for measuring this type in `view`.
    ///
    /// Returns an empty list when the type does not apply to the view.
    pub fn measurement_plans(self, view: View) -> Vec<MeasurementPlan> {
        use DeviationType::*;
        use LandmarkName as L;

        if !self.applies_to(view) {
            return Vec::new();
        }
        let both = [Side::Left, Side::Right];

        match (self, view.visible_side()) {
            (HeadForward, Some(side)) => vec![MeasurementPlan::midline(vec![
                L::C7,
                BodyPart::Ear.on(side),
            ])],
            (ShoulderProtracted, Some(side)) => {
                vec![MeasurementPlan::sided(side, &[BodyPart::Shoulder, BodyPart::Hip])]
            }
            (PelvicTiltAnterior, Some(side)) => {
                vec![MeasurementPlan::sided(side, &[BodyPart::Asis, BodyPart::Psis])]
            }
            (KneeHyperextension, Some(side)) => vec![MeasurementPlan::sided(
                side,
                &[BodyPart::Hip, BodyPart::Knee, BodyPart::Ankle],
            )],
            (Kyphosis, Some(_)) => vec![MeasurementPlan::midline(vec![L::C7, L::T8, L::T12])],
            (Lordosis, Some(_)) => vec![MeasurementPlan::midline(vec![L::T12, L::L3, L::Sacrum])],
            (HeadTilt, None) => match view {
                View::Anterior => vec![MeasurementPlan::midline(vec![L::EyeLeft, L::EyeRight])],
                _ => vec![MeasurementPlan::midline(vec![L::EarLeft, L::EarRight])],
            },
            (HeadRotation, None) => vec![MeasurementPlan::midline(vec![
                L::Nose,
                L::EyeLeft,
                L::EyeRight,
            ])],
            (ShoulderUneven, None) => vec![MeasurementPlan::midline(vec![
                L::ShoulderLeft,
                L::ShoulderRight,
            ])],
            (HipUneven, None) => vec![MeasurementPlan::midline(vec![L::HipLeft, L::HipRight])],
            (PelvicTiltLateral, None) => match view {
                View::Anterior => vec![MeasurementPlan::midline(vec![L::AsisLeft, L::AsisRight])],
                _ => vec![MeasurementPlan::midline(vec![L::PsisLeft, L::PsisRight])],
            },
            (Scoliosis, None) => vec![MeasurementPlan::midline(vec![L::C7, L::T8, L::Sacrum])],
            (WeightShift, None) => vec![MeasurementPlan::midline(vec![
                L::ShoulderLeft,
                L::ShoulderRight,
                L::AnkleLeft,
                L::AnkleRight,
            ])],
            (KneeValgus | KneeVarus, None) => both
                .iter()
                .map(|side| {
                    MeasurementPlan::sided(*side, &[BodyPart::Hip, BodyPart::Knee, BodyPart::Ankle])
                })
                .collect(),
            (AnklePronation | AnkleSupination, None) => both
                .iter()
                .map(|side| {
                    MeasurementPlan::sided(
                        *side,
                        &[BodyPart::Calf, BodyPart::Ankle, BodyPart::Heel],
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for DeviationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Deviation types applicable to a view, in catalog order.
pub fn view_deviation_types(view: View) -> Vec<DeviationType> {
    DeviationType::ALL
        .iter()
        .copied()
        .filter(|t| t.applies_to(view))
        .collect()
}
