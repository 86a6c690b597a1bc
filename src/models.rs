//! The model runtime seam (§6 of the spec) and [`DnnModels`], the
//! per-worker preloaded model table.
//!
//! The actual DNN framework (loading weights, running a forward pass,
//! measuring FLOPs) is an external collaborator: the core protocol state
//! machine only depends on the [`ModelRuntime`]/[`DnnModel`] trait seam, not
//! on any particular framework. [`MockModelRuntime`] is the test double
//! shipped with the crate.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A minimal tensor stand-in: a flat buffer plus its shape. Real deployments
/// would plug in their framework's tensor type behind [`DnnModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self { shape: shape.to_vec(), data: vec![0.0; len] }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// A loaded, runnable model handle.
pub trait DnnModel: Send + Sync {
    fn forward(&self, input: &Tensor) -> Tensor;
}

/// Injected seam standing in for the physical DNN framework: `load_model`
/// and `calculate_flops` from the spec.
pub trait ModelRuntime: Send + Sync {
    fn load(&self, name: &str, input_shape: &[usize]) -> Result<Box<dyn DnnModel>>;
    fn calculate_flops(&self, model: &dyn DnnModel, input_shape: &[usize]) -> f64;
}

/// Deterministic test double: an identity transform whose FLOPs are taken
/// as the input element count, enough to exercise backlog accounting
/// without a real framework.
#[derive(Debug, Default)]
pub struct MockModelRuntime;

impl MockModelRuntime {
    pub fn new() -> Self {
        Self
    }
}

struct IdentityModel;

impl DnnModel for IdentityModel {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.clone()
    }
}

impl ModelRuntime for MockModelRuntime {
    fn load(&self, _name: &str, _input_shape: &[usize]) -> Result<Box<dyn DnnModel>> {
        Ok(Box::new(IdentityModel))
    }

    fn calculate_flops(&self, model: &dyn DnnModel, input_shape: &[usize]) -> f64 {
        let input = Tensor::zeros(input_shape);
        let _ = model.forward(&input);
        input_shape.iter().product::<usize>() as f64
    }
}

/// Preloads every configured model for a worker and precomputes, per model,
/// the GFLOPs required for a forward pass and the KB of its output tensor.
pub struct DnnModels {
    models: HashMap<String, Arc<dyn DnnModel>>,
    computing_gflops: HashMap<String, f64>,
    transfer_kb: HashMap<String, f64>,
}

const BYTES_PER_KB: f64 = 1024.0;
const FLOPS_PER_GFLOP: f64 = 1e9;

impl DnnModels {
    pub fn new(model_names: &[String], input_sizes: impl Fn(&str) -> Result<Vec<usize>>, runtime: &dyn ModelRuntime) -> Result<Self> {
        let mut models = HashMap::new();
        let mut computing_gflops = HashMap::new();
        let mut transfer_kb = HashMap::new();

        for name in model_names {
            let input_shape = input_sizes(name)?;
            let model: Arc<dyn DnnModel> = Arc::from(runtime.load(name, &input_shape)?);

            let flops = runtime.calculate_flops(model.as_ref(), &input_shape);
            computing_gflops.insert(name.clone(), flops / FLOPS_PER_GFLOP);

            let zero_input = Tensor::zeros(&input_shape);
            let output = model.forward(&zero_input);
            transfer_kb.insert(name.clone(), output.byte_len() as f64 / BYTES_PER_KB);

            models.insert(name.clone(), model);
        }

        Ok(Self { models, computing_gflops, transfer_kb })
    }

    pub fn model(&self, name: &str) -> Result<Arc<dyn DnnModel>> {
        self.models.get(name).cloned().ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    pub fn computing(&self, name: &str) -> Result<f64> {
        self.computing_gflops.get(name).copied().ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    pub fn transfer(&self, name: &str) -> Result<f64> {
        self.transfer_kb.get(name).copied().ok_or_else(|| Error::UnknownModel(name.to_string()))
    }
}
