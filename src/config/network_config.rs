use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// One entry of `Network.jobs` in `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_type: String,
    pub source: String,
    pub destination: String,
}

/// The `Network` section of `config.json`.
///
/// Describes the physical adjacency of nodes, which nodes are routers
/// (carry data but execute no model), which models each node may run,
/// and the job templates senders will instantiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub queue_name: String,
    pub scheduling_algorithm: String,
    pub collect_garbage_job_time: u64,
    pub jobs: HashMap<String, JobSpec>,
    pub network: HashMap<String, Vec<String>>,
    pub router: Vec<String>,
    pub models: HashMap<String, Vec<String>>,
}

impl NetworkConfig {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: NetworkConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(Error::Config("jobs cannot be empty".to_string()));
        }

        for (name, job) in &self.jobs {
            if job.source.is_empty() {
                return Err(Error::Config(format!("job '{name}' has an empty source ip")));
            }
            if job.destination.is_empty() {
                return Err(Error::Config(format!("job '{name}' has an empty destination ip")));
            }
            if !self.network.contains_key(&job.source) {
                return Err(Error::Config(format!("job '{name}' source '{}' is not a known node", job.source)));
            }
            if !self.network.contains_key(&job.destination) {
                return Err(Error::Config(format!("job '{name}' destination '{}' is not a known node", job.destination)));
            }
        }

        for ip in self.network.keys() {
            if ip.is_empty() {
                return Err(Error::Config("network contains an empty node ip".to_string()));
            }
            if !self.models.contains_key(ip) {
                return Err(Error::Config(format!("node '{ip}' has no entry in 'models'")));
            }
        }

        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }

    pub fn job(&self, job_name: &str) -> Option<&JobSpec> {
        self.jobs.get(job_name)
    }

    pub fn neighbors(&self, ip: &str) -> &[String] {
        self.network.get(ip).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn node_ips(&self) -> Vec<&str> {
        self.network.keys().map(String::as_str).collect()
    }

    pub fn is_router(&self, ip: &str) -> bool {
        self.router.iter().any(|r| r == ip)
    }

    pub fn models_for(&self, ip: &str) -> Vec<String> {
        self.models.get(ip).cloned().unwrap_or_default()
    }

    /// Every distinct `job_type` appearing in `jobs`, the set of `job/*`
    /// topics a worker must subscribe to in order to receive forwarded
    /// `DNNOutput`s for any job it might participate in.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.jobs.values().map(|job| job.job_type.clone()).collect();
        types.sort();
        types.dedup();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "queue_name": "q",
            "scheduling_algorithm": "RandomSelection",
            "collect_garbage_job_time": 30,
            "jobs": {
                "j": { "job_type": "dnn", "source": "10.0.0.1", "destination": "10.0.0.2" }
            },
            "network": {
                "10.0.0.1": ["10.0.0.2"],
                "10.0.0.2": []
            },
            "router": [],
            "models": {
                "10.0.0.1": [],
                "10.0.0.2": ["m"]
            }
        })
    }

    #[test]
    fn parses_valid_config() {
        let config = NetworkConfig::from_value(sample()).unwrap();
        assert_eq!(config.job_names(), vec!["j"]);
        assert_eq!(config.neighbors("10.0.0.1"), &["10.0.0.2".to_string()]);
    }

    #[test]
    fn rejects_empty_jobs() {
        let mut value = sample();
        value["jobs"] = serde_json::json!({});
        let err = NetworkConfig::from_value(value).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn job_types_are_deduplicated() {
        let mut value = sample();
        value["jobs"]["k"] = serde_json::json!({ "job_type": "dnn", "source": "10.0.0.1", "destination": "10.0.0.2" });
        let config = NetworkConfig::from_value(value).unwrap();
        assert_eq!(config.job_types(), vec!["dnn".to_string()]);
    }

    #[test]
    fn rejects_unknown_job_source() {
        let mut value = sample();
        value["jobs"]["j"]["source"] = serde_json::json!("10.0.0.9");
        let err = NetworkConfig::from_value(value).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
