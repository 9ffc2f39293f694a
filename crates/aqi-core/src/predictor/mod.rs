//! Feature building, model invocation and fallback orchestration

mod executor;
mod features;
mod inference;
mod output;

pub use executor::PredictionExecutor;
pub use features::FeatureBuilder;
pub use inference::{
    Aggregation, LinearModel, ModelSpec, OnnxModel, TreeEnsemble, TreeNode, UnverifiedModel,
};
pub use output::finalize_prediction;

use crate::error::ModelError;
use crate::models::FeatureRow;
use std::fmt;
use std::sync::Arc;

/// Capability every registered model is adapted to at load time
pub trait AqiModel: Send + Sync + fmt::Debug {
    /// Predict a raw AQI value for one feature row
    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError>;

    /// Short name of the model family, for diagnostics
    fn kind(&self) -> &'static str;
}

/// Shared handle to a registered model
pub type ModelHandle = Arc<dyn AqiModel>;
