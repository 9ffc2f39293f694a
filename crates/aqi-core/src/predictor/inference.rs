//! Model families an archive can carry
//!
//! Archive entries are decoded into a [`ModelSpec`] and built into a
//! [`ModelHandle`]; nothing downstream of the loader sees raw JSON. ONNX
//! graphs run on tract, the tree and linear families are evaluated in place.

use super::{AqiModel, ModelHandle};
use crate::error::ModelError;
use crate::models::FeatureRow;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Maximum inference latency before warning
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Serialized description of a model inside an archive
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
    Onnx { path: PathBuf, n_features: usize },
}

impl ModelSpec {
    /// Decode and build a handle from an archive value.
    ///
    /// Relative ONNX paths resolve against `base_dir`.
    pub fn build_from_value(value: &serde_json::Value, base_dir: &Path) -> Result<ModelHandle> {
        let spec: ModelSpec =
            serde_json::from_value(value.clone()).context("Value is not a model description")?;
        spec.build(base_dir)
    }

    pub fn build(self, base_dir: &Path) -> Result<ModelHandle> {
        match self {
            ModelSpec::Linear(model) => {
                model.validate()?;
                Ok(Arc::new(model))
            }
            ModelSpec::TreeEnsemble(model) => {
                model.validate()?;
                Ok(Arc::new(model))
            }
            ModelSpec::Onnx { path, n_features } => {
                let resolved = if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                };
                Ok(Arc::new(OnnxModel::load(&resolved, n_features)?))
            }
        }
    }
}

/// Positional linear regressor
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            bail!("Linear model has non-finite parameters");
        }
        Ok(())
    }
}

impl AqiModel for LinearModel {
    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        if row.len() != self.coefficients.len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.coefficients.len(),
                actual: row.len(),
            });
        }
        let dot: f64 = self
            .coefficients
            .iter()
            .zip(row.values())
            .map(|(w, x)| w * x)
            .sum();
        Ok(self.intercept + dot)
    }

    fn kind(&self) -> &'static str {
        "linear"
    }
}

/// How tree outputs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Bagged ensembles (random forest, extra trees)
    #[default]
    Mean,
    /// Boosted ensembles, scaled by the learning rate
    Sum,
}

/// A node of a regression tree
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn evaluate(&self, values: &[f64]) -> Result<f64, ModelError> {
        let mut idx = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = values.get(*feature).ok_or(ModelError::FeatureIndexOutOfRange {
                        index: *feature,
                        len: values.len(),
                    })?;
                    idx = if *x <= *threshold { *left } else { *right };
                }
                None => break,
            }
        }
        Err(ModelError::Runtime("tree walk did not reach a leaf".to_string()))
    }
}

/// Regression tree ensemble
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub base_score: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
}

fn default_learning_rate() -> f64 {
    1.0
}

impl TreeEnsemble {
    fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            bail!("Tree ensemble has no trees");
        }
        if self.trees.iter().any(|t| t.nodes.is_empty()) {
            bail!("Tree ensemble contains an empty tree");
        }
        Ok(())
    }
}

impl AqiModel for TreeEnsemble {
    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.evaluate(row.values())?;
        }
        let combined = match self.aggregation {
            Aggregation::Mean => total / self.trees.len() as f64,
            Aggregation::Sum => total * self.learning_rate,
        };
        Ok(self.base_score + combined)
    }

    fn kind(&self) -> &'static str {
        "tree_ensemble"
    }
}

/// ONNX regressor executed with tract
pub struct OnnxModel {
    plan: TractModel,
    n_features: usize,
    path: PathBuf,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("path", &self.path)
            .field("n_features", &self.n_features)
            .finish()
    }
}

impl OnnxModel {
    /// Load and optimize an ONNX model with a `[1, n_features]` f32 input
    pub fn load(path: &Path, n_features: usize) -> Result<Self> {
        if n_features == 0 {
            bail!("ONNX model must declare at least one input feature");
        }
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("Failed to parse ONNX model {:?}", path))?
            .with_input_fact(0, f32::fact([1, n_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        debug!(path = ?path, n_features, "ONNX model loaded");
        Ok(Self {
            plan,
            n_features,
            path: path.to_path_buf(),
        })
    }

    fn row_to_tensor(&self, row: &FeatureRow) -> Result<Tensor, ModelError> {
        let data: Vec<f32> = row.values().iter().map(|v| *v as f32).collect();
        tract_ndarray::Array2::from_shape_vec((1, self.n_features), data)
            .map(Into::into)
            .map_err(|e| ModelError::Runtime(e.to_string()))
    }
}

impl AqiModel for OnnxModel {
    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        if row.len() != self.n_features {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }

        let start = Instant::now();
        let input = self.row_to_tensor(row)?;
        let result = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| ModelError::Runtime(e.to_string()))?;
        let output = result.first().ok_or(ModelError::EmptyOutput)?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Runtime(e.to_string()))?;
        let value = view.iter().next().copied().ok_or(ModelError::EmptyOutput)?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(f64::from(value))
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}

/// Legacy-layout entry registered without a usable predict capability.
///
/// Every invocation fails, which sends the executor down its retry path.
#[derive(Debug, Clone)]
pub struct UnverifiedModel {
    pub key: String,
}

impl UnverifiedModel {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl AqiModel for UnverifiedModel {
    fn predict(&self, _row: &FeatureRow) -> Result<f64, ModelError> {
        Err(ModelError::NotPredictable(self.key.clone()))
    }

    fn kind(&self) -> &'static str {
        "unverified"
    }
}
