//! Wire payloads for the topics in §6: every message is JSON-encoded opaque
//! bytes on the [`crate::bus::Bus`]. `Message` is the envelope every
//! publish/subscribe handler actually exchanges; topic names double as the
//! dispatch key on the receiving side.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, NetworkConfig};
use crate::job::{DNNOutput, JobInfo, SubtaskInfo};

pub const TOPIC_CONFIG: &str = "mdc/config";
pub const TOPIC_NODE_INFO: &str = "mdc/node_info";
pub const TOPIC_NETWORK_PERFORMANCE: &str = "mdc/network_performance_info";
pub const TOPIC_ARRIVAL_RATE: &str = "mdc/arrival_rate";
pub const TOPIC_REQUEST_SCHEDULING: &str = "job/request_scheduling";
pub const TOPIC_SUBTASK_INFO: &str = "job/subtask_info";
pub const TOPIC_RESPONSE: &str = "job/response";
pub const TOPIC_FINISH: &str = "mdc/finish";

pub fn job_topic(job_type: &str) -> String {
    format!("job/{job_type}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub network_config: NetworkConfig,
    pub model_config: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBacklog {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestNetworkPerformance {}

/// A worker's authoritative report of its outgoing links, keyed by
/// [`crate::layered_graph::node::LayerNodePair::to_string_id`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLinkInfo {
    pub ip: String,
    pub links: HashMap<String, f64>,
    pub computing_capacity: f64,
    pub transfer_capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPerformance {
    pub ip: String,
    pub gpu_capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalRateReply {
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Message {
    RequestConfig(RequestConfig),
    ConfigResponse(ConfigResponse),
    RequestBacklog(RequestBacklog),
    NodeLinkInfo(NodeLinkInfo),
    RequestNetworkPerformance(RequestNetworkPerformance),
    NetworkPerformance(NetworkPerformance),
    ArrivalRateRequest(RequestConfig),
    ArrivalRateReply(ArrivalRateReply),
    RequestScheduling(JobInfo),
    SubtaskAssignment(SubtaskInfo),
    JobOutput(DNNOutput),
    JobResponse(SubtaskInfo),
    Finish(JobInfo),
}

impl Message {
    pub fn to_bytes(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
