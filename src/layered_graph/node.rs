use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A physical node in the layered graph. Identity is the node's IP; the
/// model names are carried along for convenience but never participate in
/// equality or hashing.
#[derive(Debug, Clone)]
pub struct LayerNode {
    ip: String,
    model_names: Vec<String>,
}

impl LayerNode {
    pub fn new(ip: impl Into<String>, model_names: Vec<String>) -> Self {
        Self { ip: ip.into(), model_names }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn model_names(&self) -> &[String] {
        &self.model_names
    }

    pub fn is_same_node(&self, other: &LayerNode) -> bool {
        self.ip == other.ip
    }

    pub fn to_string_id(&self) -> String {
        self.ip.clone()
    }
}

impl PartialEq for LayerNode {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip
    }
}

impl Eq for LayerNode {}

impl Hash for LayerNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ip.hash(state);
    }
}

impl PartialOrd for LayerNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LayerNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ip.cmp(&other.ip)
    }
}

impl fmt::Display for LayerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ip)
    }
}

/// An ordered pair of [`LayerNode`]s: an edge of the layered graph. A
/// self-loop (`source == destination`) is a *computing* edge; any other
/// pair is a *transmission* edge.
#[derive(Debug, Clone)]
pub struct LayerNodePair {
    source: LayerNode,
    destination: LayerNode,
}

impl LayerNodePair {
    pub fn new(source: LayerNode, destination: LayerNode) -> Self {
        Self { source, destination }
    }

    pub fn source(&self) -> &LayerNode {
        &self.source
    }

    pub fn destination(&self) -> &LayerNode {
        &self.destination
    }

    pub fn is_same_node(&self) -> bool {
        self.source.is_same_node(&self.destination)
    }

    pub fn is_computing(&self) -> bool {
        self.is_same_node()
    }

    pub fn to_string_id(&self) -> String {
        format!("{}->{}", self.source.ip, self.destination.ip)
    }
}

impl PartialEq for LayerNodePair {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.destination == other.destination
    }
}

impl Eq for LayerNodePair {}

impl Hash for LayerNodePair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string_id().hash(state);
    }
}

impl PartialOrd for LayerNodePair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LayerNodePair {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string_id().cmp(&other.to_string_id())
    }
}

impl fmt::Display for LayerNodePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_id())
    }
}
