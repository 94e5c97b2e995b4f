//! Severity tiers and the unit-specific threshold tables.
//!
//! The same tables drive classification, comparison tolerances and trend
//! thresholds so the three stay consistent.

use serde::{Deserialize, Serialize};

/// Unit in which a deviation is measured.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementUnit {
    /// Angular measurement in degrees.
    Degrees,
    /// Scaled level difference (fraction of visible body height).
    LevelDifference,
}

impl MeasurementUnit {
    pub fn thresholds(self) -> &'static SeverityThresholds {
        match self {
            MeasurementUnit::Degrees => &DEGREE_THRESHOLDS,
            MeasurementUnit::LevelDifference => &LEVEL_THRESHOLDS,
        }
    }

    /// Typical magnitude of one unit of concern, used to put degrees and
    /// level differences on a common footing when aggregating.
    pub fn normalizer(self) -> f64 {
        match self {
            MeasurementUnit::Degrees => 10.0,
            MeasurementUnit::LevelDifference => 0.05,
        }
    }

    /// Human readable value with unit.
    pub fn format_value(self, value: f64) -> String {
        match self {
            MeasurementUnit::Degrees => format!("{:.1}°", value),
            MeasurementUnit::LevelDifference => format!("{:.1}%", value * 100.0),
        }
    }
}

/// Severity tiers, ordered from least to most severe.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Minimal,
    Mild,
    Moderate,
    Severe,
    Extreme,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Minimal,
        Severity::Mild,
        Severity::Moderate,
        Severity::Severe,
        Severity::Extreme,
    ];

    /// Position in the total order, `0` for `Minimal`.
    pub fn rank(self) -> i32 {
        match self {
            Severity::Minimal => 0,
            Severity::Mild => 1,
            Severity::Moderate => 2,
            Severity::Severe => 3,
            Severity::Extreme => 4,
        }
    }

    /// Weight used by the improvement score.
    pub fn weight(self) -> f64 {
        f64::from(self.rank() + 1)
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Minimal => "minimal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Extreme => "extreme",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Exclusive upper bounds on `deviation_amount` for each tier below `Extreme`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeverityThresholds {
    pub minimal: f64,
    pub mild: f64,
    pub moderate: f64,
    pub severe: f64,
}

pub const DEGREE_THRESHOLDS: SeverityThresholds = SeverityThresholds {
    minimal: 2.0,
    mild: 5.0,
    moderate: 10.0,
    severe: 20.0,
};

pub const LEVEL_THRESHOLDS: SeverityThresholds = SeverityThresholds {
    minimal: 0.005,
    mild: 0.04,
    moderate: 0.08,
    severe: 0.15,
};

impl SeverityThresholds {
    pub fn classify(&self, deviation_amount: f64) -> Severity {
        // NaN falls through to Minimal: no usable excess.
        if !(deviation_amount >= self.minimal) {
            Severity::Minimal
        } else if deviation_amount < self.mild {
            Severity::Mild
        } else if deviation_amount < self.moderate {
            Severity::Moderate
        } else if deviation_amount < self.severe {
            Severity::Severe
        } else {
            Severity::Extreme
        }
    }
}

/// Magnitude by which `value` lies outside `[min, max]`; zero inside.
pub fn deviation_amount(value: f64, normal_min: f64, normal_max: f64) -> f64 {
    (normal_min - value).max(value - normal_max).max(0.0)
}

/// Severity of a measurement, a pure function of value, range and unit.
pub fn classify(value: f64, normal_min: f64, normal_max: f64, unit: MeasurementUnit) -> Severity {
    unit.thresholds()
        .classify(deviation_amount(value, normal_min, normal_max))
}
