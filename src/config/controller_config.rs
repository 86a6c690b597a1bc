use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The `Controller` section of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub experiment_name: String,
    pub sync_time: f64,
}

impl ControllerConfig {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: ControllerConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.experiment_name.is_empty() {
            return Err(Error::Config("experiment_name cannot be empty".to_string()));
        }
        if self.sync_time <= 0.0 {
            return Err(Error::Config("sync_time must be positive".to_string()));
        }
        Ok(())
    }
}
