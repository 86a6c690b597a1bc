use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::{ModelConfig, NetworkConfig};
use crate::error::Result;
use crate::job::JobInfo;
use crate::layered_graph::node::{LayerNode, LayerNodePair};
use crate::scheduling::{self, GraphSnapshot, PathStep, SchedulingPolicy};

/// Everything that must be observed and mutated atomically with respect to
/// the drain tick: adjacency, backlog, capacity, the drain timer, and the
/// expected-arrival-rate and network-performance scalars derived from it.
struct GraphState {
    adjacency: HashMap<LayerNode, Vec<LayerNode>>,
    backlog: HashMap<LayerNodePair, f64>,
    capacity: HashMap<LayerNodePair, f64>,
    last_update: Instant,
    expected_arrival_rate: f64,
    idle_baseline: HashMap<String, f64>,
    idle_capacity: HashMap<String, f64>,
}

/// The controller's central network/compute state model: backlog per edge,
/// measured capacity per edge, and a pluggable path scheduler over them.
pub struct LayeredGraph {
    state: Mutex<GraphState>,
    policy: Box<dyn SchedulingPolicy>,
}

impl LayeredGraph {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let mut adjacency = HashMap::new();
        let mut backlog = HashMap::new();
        let mut capacity = HashMap::new();

        for ip in network.node_ips() {
            let node = LayerNode::new(ip, network.models_for(ip));
            let mut neighbors: Vec<LayerNode> = network.neighbors(ip).iter().map(|neighbor_ip| LayerNode::new(neighbor_ip.clone(), network.models_for(neighbor_ip))).collect();

            if !network.is_router(ip) {
                neighbors.push(node.clone());
                let pair = LayerNodePair::new(node.clone(), node.clone());
                backlog.insert(pair.clone(), 0.0);
                capacity.insert(pair, 0.0);
            }

            for neighbor in &neighbors {
                if neighbor != &node {
                    let pair = LayerNodePair::new(node.clone(), neighbor.clone());
                    backlog.insert(pair.clone(), 0.0);
                    capacity.insert(pair, 0.0);
                }
            }

            adjacency.insert(node, neighbors);
        }

        let policy = scheduling::create(&network.scheduling_algorithm)?;

        Ok(Self {
            state: Mutex::new(GraphState {
                adjacency,
                backlog,
                capacity,
                last_update: Instant::now(),
                expected_arrival_rate: 0.0,
                idle_baseline: HashMap::new(),
                idle_capacity: HashMap::new(),
            }),
            policy,
        })
    }

    pub fn schedule(&self, job: &JobInfo) -> Result<Vec<PathStep>> {
        let snapshot = {
            let state = self.state.lock().expect("layered graph mutex poisoned");
            GraphSnapshot::new(state.adjacency.clone())
        };
        self.policy.get_path(job, &snapshot)
    }

    /// Walks `path`, adding each step's backlog delta. Computing edges add
    /// `model.computing_ratio * input_bytes`; transmission edges add
    /// `last_transfer_ratio * input_bytes`, where `last_transfer_ratio` is
    /// the `transfer_ratio` of the most recently seen computing edge's
    /// model, defaulting to 1.0 before any computing edge is seen.
    pub fn update_path_backlog(&self, job: &JobInfo, path: &[PathStep], models: &ModelConfig) {
        let mut state = self.state.lock().expect("layered graph mutex poisoned");
        let mut last_transfer_ratio = 1.0;

        for (source, destination, model_name) in path {
            let pair = LayerNodePair::new(source.clone(), destination.clone());
            let delta = if pair.is_computing() {
                let ratio = models.computing_ratio(model_name);
                last_transfer_ratio = models.transfer_ratio(model_name);
                ratio * job.input_bytes
            } else {
                last_transfer_ratio * job.input_bytes
            };
            *state.backlog.entry(pair).or_insert(0.0) += delta;
        }
    }

    /// Drains backlog by elapsed-time-scaled capacity, dividing capacity
    /// equally among the concurrently active virtual links sharing the same
    /// physical (unordered) edge.
    pub fn update_graph(&self) {
        let mut state = self.state.lock().expect("layered graph mutex poisoned");
        let now = Instant::now();
        let elapsed_ms = now.duration_since(state.last_update).as_secs_f64() * 1000.0;

        let mut counts: HashMap<(String, String), usize> = HashMap::new();
        for (pair, backlog) in state.backlog.iter() {
            if *backlog > 0.0 {
                *counts.entry(unordered_key(pair)).or_insert(0) += 1;
            }
        }

        for (pair, backlog) in state.backlog.iter_mut() {
            if *backlog <= 0.0 {
                continue;
            }
            let count = counts.get(&unordered_key(pair)).copied().unwrap_or(1).max(1);
            let capacity = state.capacity.get(pair).copied().unwrap_or(0.0);
            *backlog = (*backlog - elapsed_ms * capacity / count as f64).max(0.0);
        }

        state.last_update = now;
    }

    /// Overwrites the backlog of each reported pair with the worker's
    /// authoritative value.
    pub fn set_graph(&self, links: &[(LayerNodePair, f64)]) {
        let mut state = self.state.lock().expect("layered graph mutex poisoned");
        for (pair, backlog) in links {
            state.backlog.insert(pair.clone(), *backlog);
        }
    }

    /// Applies a worker's `NodeLinkInfo` report: every edge known to
    /// originate at `ip` is sparse-filled to 0 before the reported values
    /// are written, so a link with no current backlog (and therefore absent
    /// from the report) is not left stale at its last nonzero value.
    pub fn apply_node_link_info(&self, ip: &str, links: &HashMap<String, f64>, computing_capacity: f64, transfer_capacity: f64) {
        {
            let mut state = self.state.lock().expect("layered graph mutex poisoned");
            let node = LayerNode::new(ip, vec![]);
            let neighbors = state.adjacency.get(&node).cloned().unwrap_or_default();

            for neighbor in &neighbors {
                let pair = LayerNodePair::new(node.clone(), neighbor.clone());
                let backlog = links.get(&pair.to_string_id()).copied().unwrap_or(0.0);
                state.backlog.insert(pair, backlog);
            }
        }
        self.set_capacity(ip, computing_capacity, transfer_capacity);
    }

    /// Sets the self-loop capacity of `source_ip` to `compute` and every
    /// outgoing non-self edge from `source_ip` to `transfer`.
    pub fn set_capacity(&self, source_ip: &str, compute: f64, transfer: f64) {
        let mut state = self.state.lock().expect("layered graph mutex poisoned");
        let node = LayerNode::new(source_ip, vec![]);
        let neighbors = state.adjacency.get(&node).cloned().unwrap_or_default();

        for neighbor in neighbors {
            let pair = LayerNodePair::new(node.clone(), neighbor.clone());
            let value = if neighbor == node { compute } else { transfer };
            state.capacity.insert(pair, value);
        }
    }

    pub fn update_expected_arrival_rate(&self, r_obs: f64) {
        const ALPHA: f64 = 0.5;
        let mut state = self.state.lock().expect("layered graph mutex poisoned");
        state.expected_arrival_rate = ALPHA * state.expected_arrival_rate + (1.0 - ALPHA) * r_obs;
    }

    pub fn expected_arrival_rate(&self) -> f64 {
        self.state.lock().expect("layered graph mutex poisoned").expected_arrival_rate
    }

    /// Sum of current backlogs on the pairs a path touches.
    pub fn get_arrival_rate(&self, path: &[PathStep]) -> f64 {
        let state = self.state.lock().expect("layered graph mutex poisoned");
        path.iter().map(|(source, destination, _)| state.backlog.get(&LayerNodePair::new(source.clone(), destination.clone())).copied().unwrap_or(0.0)).sum()
    }

    /// Idle-compute-capacity residual per tier (`end`/`edge`/`cloud`), kept
    /// for the JDPCRA/TLDOC-style scheduling extension points; no shipped
    /// policy reads it yet. Each report *sets* the tier's idle capacity to
    /// `idle_baseline * ratio`, it does not compound onto the previous
    /// report's value; `idle_baseline` defaults to 1.0 the first time a
    /// tier is seen and is otherwise left untouched.
    pub fn update_network_performance_info(&self, tier: &str, ratio: f64) {
        let mut state = self.state.lock().expect("layered graph mutex poisoned");
        let baseline = *state.idle_baseline.entry(tier.to_string()).or_insert(1.0);
        state.idle_capacity.insert(tier.to_string(), baseline * ratio);
    }

    pub fn network_performance(&self, tier: &str) -> f64 {
        self.state.lock().expect("layered graph mutex poisoned").idle_capacity.get(tier).copied().unwrap_or(1.0)
    }

    /// Every edge known at construction time, sorted for a stable CSV
    /// column order.
    pub fn edge_labels(&self) -> Vec<String> {
        let state = self.state.lock().expect("layered graph mutex poisoned");
        let mut labels: Vec<String> = state.backlog.keys().map(LayerNodePair::to_string_id).collect();
        labels.sort();
        labels
    }

    /// Current backlog of every known edge, the row `record_virtual_backlog`
    /// summarizes and appends each tick.
    pub fn backlog_snapshot(&self) -> HashMap<LayerNodePair, f64> {
        self.state.lock().expect("layered graph mutex poisoned").backlog.clone()
    }
}

fn unordered_key(pair: &LayerNodePair) -> (String, String) {
    let a = pair.source().ip().to_string();
    let b = pair.destination().ip().to_string();
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> NetworkConfig {
        let value = serde_json::json!({
            "queue_name": "q",
            "scheduling_algorithm": "RandomSelection",
            "collect_garbage_job_time": 30,
            "jobs": { "j": { "job_type": "dnn", "source": "10.0.0.1", "destination": "10.0.0.2" } },
            "network": { "10.0.0.1": ["10.0.0.2"], "10.0.0.2": [] },
            "router": [],
            "models": { "10.0.0.1": [], "10.0.0.2": ["m"] }
        });
        NetworkConfig::from_value(value).unwrap()
    }

    fn job() -> JobInfo {
        JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.2", 1)
    }

    #[test]
    fn construction_seeds_self_loops_for_non_routers() {
        let graph = LayeredGraph::new(&network()).unwrap();
        let a = LayerNode::new("10.0.0.1", vec![]);
        let path = graph.schedule(&job()).unwrap();
        assert_eq!(path.first().unwrap().0, a);
    }

    #[test]
    fn update_path_backlog_uses_default_transfer_ratio_before_any_compute() {
        let graph = LayeredGraph::new(&network()).unwrap();
        let models = ModelConfig::from_value(serde_json::json!({ "m": { "input_size": [1] } })).unwrap();
        let a = LayerNode::new("10.0.0.1", vec![]);
        let b = LayerNode::new("10.0.0.2", vec!["m".to_string()]);
        let path = vec![(a.clone(), b.clone(), String::new())];

        graph.update_path_backlog(&job(), &path, &models);
        let rate = graph.get_arrival_rate(&path);
        assert_eq!(rate, 10.0);
    }

    #[test]
    fn drain_never_goes_negative() {
        let graph = LayeredGraph::new(&network()).unwrap();
        let models = ModelConfig::from_value(serde_json::json!({ "m": { "input_size": [1] } })).unwrap();
        let a = LayerNode::new("10.0.0.1", vec![]);
        let b = LayerNode::new("10.0.0.2", vec!["m".to_string()]);
        let path = vec![(a, b.clone(), String::new())];
        graph.update_path_backlog(&job(), &path, &models);
        graph.set_capacity("10.0.0.1", 0.0, 1_000_000.0);
        graph.update_graph();
        assert!(graph.get_arrival_rate(&path) >= 0.0);
    }

    #[test]
    fn apply_node_link_info_zero_fills_links_missing_from_the_report() {
        let graph = LayeredGraph::new(&network()).unwrap();
        let models = ModelConfig::from_value(serde_json::json!({ "m": { "input_size": [1] } })).unwrap();
        let a = LayerNode::new("10.0.0.1", vec![]);
        let b = LayerNode::new("10.0.0.2", vec!["m".to_string()]);
        let path = vec![(a, b, String::new())];
        graph.update_path_backlog(&job(), &path, &models);
        assert_eq!(graph.get_arrival_rate(&path), 10.0);

        graph.apply_node_link_info("10.0.0.1", &HashMap::new(), 0.0, 0.0);
        assert_eq!(graph.get_arrival_rate(&path), 0.0);
    }

    #[test]
    fn network_performance_defaults_to_one() {
        let graph = LayeredGraph::new(&network()).unwrap();
        assert_eq!(graph.network_performance("edge"), 1.0);
        graph.update_network_performance_info("edge", 0.5);
        assert_eq!(graph.network_performance("edge"), 0.5);
    }

    #[test]
    fn network_performance_report_sets_rather_than_compounds() {
        let graph = LayeredGraph::new(&network()).unwrap();
        graph.update_network_performance_info("edge", 0.5);
        graph.update_network_performance_info("edge", 0.5);
        assert_eq!(graph.network_performance("edge"), 0.5, "a repeated identical report leaves the value unchanged, it does not multiply onto itself");
    }
}
