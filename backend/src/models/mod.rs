pub mod assessment;
pub mod catalog;
pub mod landmark;
pub mod macros;
pub mod severity;

pub use assessment::*;
pub use catalog::*;
pub use landmark::*;
pub use severity::{MeasurementUnit, Severity, SeverityThresholds};
