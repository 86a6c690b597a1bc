use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::job::job_info::JobInfo;
use crate::layered_graph::node::{LayerNode, LayerNodePair};

/// One step of a job's assigned path.
///
/// Embeds a [`JobInfo`] value rather than extending it (the source system
/// models a JobInfo -> SubtaskInfo inheritance hierarchy; a plain embedded
/// value carries the same information without dynamic dispatch).
///
/// Invariant: `0 <= primary_path_index <= terminal_index`, and
/// `is_terminated() <=> primary_path_index == terminal_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskInfo {
    pub job: JobInfo,
    pub source_layer_node: LayerNode,
    pub destination_layer_node: LayerNode,
    /// Empty on pure transmission edges.
    pub model_name: String,
    pub primary_path_index: usize,
    pub terminal_index: usize,
}

impl SubtaskInfo {
    pub fn new(job: JobInfo, source_layer_node: LayerNode, destination_layer_node: LayerNode, model_name: impl Into<String>, primary_path_index: usize, terminal_index: usize) -> Self {
        Self { job, source_layer_node, destination_layer_node, model_name: model_name.into(), primary_path_index, terminal_index }
    }

    pub fn job_id(&self) -> String {
        self.job.job_id()
    }

    pub fn subtask_id(&self) -> String {
        format!("{}_{}_{}", self.job_id(), self.source_layer_node.to_string_id(), self.primary_path_index)
    }

    pub fn link(&self) -> LayerNodePair {
        LayerNodePair::new(self.source_layer_node.clone(), self.destination_layer_node.clone())
    }

    pub fn is_computing(&self) -> bool {
        self.source_layer_node.is_same_node(&self.destination_layer_node)
    }

    pub fn is_transmission(&self) -> bool {
        !self.is_computing()
    }

    pub fn is_terminated(&self) -> bool {
        self.primary_path_index == self.terminal_index
    }

    /// Advances to the next hop: the destination becomes the source and the
    /// index increments. A no-op once terminated, so repeated calls at the
    /// terminal state are idempotent.
    pub fn advance(&mut self) {
        if self.is_terminated() {
            return;
        }
        self.source_layer_node = self.destination_layer_node.clone();
        self.primary_path_index += 1;
    }
}

impl PartialEq for SubtaskInfo {
    fn eq(&self, other: &Self) -> bool {
        self.subtask_id() == other.subtask_id()
    }
}

impl Eq for SubtaskInfo {}

impl Hash for SubtaskInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subtask_id().hash(state);
    }
}
