use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Per-model entry of the `Model` section of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub input_size: Vec<usize>,
    #[serde(default)]
    pub warmup: Option<bool>,
    #[serde(default)]
    pub warmup_input: Option<Vec<usize>>,
    #[serde(default = "default_ratio")]
    pub computing_ratio: f64,
    #[serde(default = "default_ratio")]
    pub transfer_ratio: f64,
}

fn default_ratio() -> f64 {
    1.0
}

/// The `Model` section of `config.json`: one [`ModelSpec`] per model name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(flatten)]
    models: HashMap<String, ModelSpec>,
}

impl ModelConfig {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: ModelConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, spec) in &self.models {
            if spec.input_size.is_empty() {
                return Err(Error::Config(format!("model '{name}' is missing input_size")));
            }
            if spec.computing_ratio < 0.0 {
                return Err(Error::Config(format!("model '{name}' has a negative computing_ratio")));
            }
            if spec.transfer_ratio < 0.0 {
                return Err(Error::Config(format!("model '{name}' has a negative transfer_ratio")));
            }
        }
        Ok(())
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn spec(&self, model_name: &str) -> Option<&ModelSpec> {
        self.models.get(model_name)
    }

    pub fn input_size(&self, model_name: &str) -> Result<&[usize]> {
        self.spec(model_name).map(|spec| spec.input_size.as_slice()).ok_or_else(|| Error::UnknownModel(model_name.to_string()))
    }

    /// Scales the backlog contributed to a computing edge by this model's input bytes.
    pub fn computing_ratio(&self, model_name: &str) -> f64 {
        self.spec(model_name).map(|spec| spec.computing_ratio).unwrap_or(1.0)
    }

    /// Scales the backlog contributed to the transmission edge that follows this model.
    pub fn transfer_ratio(&self, model_name: &str) -> f64 {
        self.spec(model_name).map(|spec| spec.transfer_ratio).unwrap_or(1.0)
    }
}
