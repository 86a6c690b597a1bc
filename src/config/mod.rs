pub mod controller_config;
pub mod model_config;
pub mod network_config;

pub use controller_config::ControllerConfig;
pub use model_config::ModelConfig;
pub use network_config::NetworkConfig;

use std::fs;

use crate::error::{Error, Result};

/// Top-level `config.json`: `{ "Controller": ..., "Network": ..., "Model": ... }`.
pub struct AppConfig {
    pub controller: ControllerConfig,
    pub network: NetworkConfig,
    pub model: ModelConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        Self::from_value(value)
    }

    pub fn from_value(mut value: serde_json::Value) -> Result<Self> {
        let controller = value
            .get_mut("Controller")
            .map(serde_json::Value::take)
            .ok_or_else(|| Error::Config("missing top-level key: Controller".to_string()))?;
        let network = value
            .get_mut("Network")
            .map(serde_json::Value::take)
            .ok_or_else(|| Error::Config("missing top-level key: Network".to_string()))?;
        let model = value
            .get_mut("Model")
            .map(serde_json::Value::take)
            .ok_or_else(|| Error::Config("missing top-level key: Model".to_string()))?;

        let network = NetworkConfig::from_value(network)?;

        if !crate::scheduling::is_registered(&network.scheduling_algorithm) {
            return Err(Error::UnknownSchedulingAlgorithm(network.scheduling_algorithm.clone()));
        }

        Ok(Self { controller: ControllerConfig::from_value(controller)?, network, model: ModelConfig::from_value(model)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "Controller": { "experiment_name": "exp", "sync_time": 5.0 },
            "Network": {
                "queue_name": "q",
                "scheduling_algorithm": "RandomSelection",
                "collect_garbage_job_time": 30,
                "jobs": { "j": { "job_type": "dnn", "source": "10.0.0.1", "destination": "10.0.0.1" } },
                "network": { "10.0.0.1": [] },
                "router": [],
                "models": { "10.0.0.1": ["m"] }
            },
            "Model": { "m": { "input_size": [1,3,224,224] } }
        })
    }

    #[test]
    fn loads_full_config() {
        let config = AppConfig::from_value(sample()).unwrap();
        assert_eq!(config.controller.experiment_name, "exp");
        assert_eq!(config.network.queue_name, "q");
    }

    #[test]
    fn rejects_unknown_scheduling_algorithm() {
        let mut value = sample();
        value["Network"]["scheduling_algorithm"] = serde_json::json!("Nonexistent");
        let err = AppConfig::from_value(value).unwrap_err();
        assert!(matches!(err, Error::UnknownSchedulingAlgorithm(_)));
    }

    #[test]
    fn rejects_missing_top_level_key() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("Model");
        let err = AppConfig::from_value(value).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
