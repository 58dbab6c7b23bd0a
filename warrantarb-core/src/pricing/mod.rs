//! Pricing support: the bucket-predictor oracle contract and the numeric
//! scale bridge.

pub mod bucket;
pub mod scale;

pub use bucket::{
    BucketPredictor, BucketPredictorFactory, PredictorConfig, PricingMode, Violation,
};
pub use scale::{formula_for, EquityScaleFormula, GenericScaleFormula, ScaleFormula};

/// Delta allowance (×1000) handed to every predictor instance.
pub const DELTA_ALLOWANCE: i32 = 1100;
