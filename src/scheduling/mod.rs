//! Pluggable path-scheduling policies (§4.9): `SchedulingPolicy` is the seam
//! a [`crate::layered_graph::graph::LayeredGraph`] delegates `schedule` to,
//! resolved by name from configuration. [`random_selection::RandomSelection`]
//! is the only policy shipped; the registry exists so JDPCRA/TLDOC-style
//! policies can be added without touching the graph.

pub mod random_selection;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::job::JobInfo;
use crate::layered_graph::node::LayerNode;

/// A read-only view of the graph a policy needs to compute a path: for each
/// known node, the neighbors reachable from it (including itself, so a
/// policy can discover which models are runnable in place).
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub adjacency: HashMap<LayerNode, Vec<LayerNode>>,
}

impl GraphSnapshot {
    pub fn new(adjacency: HashMap<LayerNode, Vec<LayerNode>>) -> Self {
        Self { adjacency }
    }

    pub fn neighbors(&self, node: &LayerNode) -> &[LayerNode] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// One path step: a `(source, destination, model_name)` triple. `model_name`
/// is empty for transmission edges and set for computing (self-loop) edges.
pub type PathStep = (LayerNode, LayerNode, String);

pub trait SchedulingPolicy: Send + Sync {
    /// Computes a path from `job.source_ip` to `job.terminal_destination`.
    /// The first triple's source and the last triple's destination must
    /// match those endpoints whenever `graph` contains a route between them.
    fn get_path(&self, job: &JobInfo, graph: &GraphSnapshot) -> Result<Vec<PathStep>>;
}

type Constructor = fn() -> Box<dyn SchedulingPolicy>;

fn registry() -> HashMap<&'static str, Constructor> {
    let mut registry: HashMap<&'static str, Constructor> = HashMap::new();
    registry.insert("RandomSelection", || Box::new(random_selection::RandomSelection::new()));
    registry
}

pub fn is_registered(name: &str) -> bool {
    registry().contains_key(name)
}

pub fn create(name: &str) -> Result<Box<dyn SchedulingPolicy>> {
    registry().get(name).map(|constructor| constructor()).ok_or_else(|| Error::UnknownSchedulingAlgorithm(name.to_string()))
}
