//! Checking graphs against logs and against each other
/// Bounded behavioral equivalence checks
pub mod comparer;
/// Fitness, precision and simplicity
pub mod quality;

#[doc(inline)]
pub use comparer::{compare_behavior, verify_reduction, ComparerOptions, ComparisonReport};
#[doc(inline)]
pub use quality::{QualityMeasures, NOT_COMPUTED};
