use std::sync::Arc;

use crate::job::dnn_output::DNNOutput;
use crate::job::subtask_info::SubtaskInfo;
use crate::models::{DnnModel, Tensor};

/// A [`SubtaskInfo`] bound to a resolved model handle (absent on pure
/// transmission edges) plus the two scalars that dimension its backlog.
#[derive(Clone)]
pub struct DNNSubtask {
    pub subtask_info: SubtaskInfo,
    pub model: Option<Arc<dyn DnnModel>>,
    /// GFLOPs required; 0 if this edge is pure transmission.
    pub computing_capacity: f64,
    /// KB to move; 0 if this edge is pure computing.
    pub transfer_capacity: f64,
}

impl DNNSubtask {
    pub fn new(subtask_info: SubtaskInfo, model: Option<Arc<dyn DnnModel>>, computing_capacity: f64, transfer_capacity: f64) -> Self {
        Self { subtask_info, model, computing_capacity, transfer_capacity }
    }

    /// The one non-zero of `computing_capacity`/`transfer_capacity`,
    /// according to which kind of edge this subtask occupies.
    pub fn backlog(&self) -> f64 {
        if self.subtask_info.is_computing() {
            self.computing_capacity
        } else {
            self.transfer_capacity
        }
    }

    /// Executes the subtask: runs the model on a computing edge, or simply
    /// carries the data through unchanged on a transmission edge.
    pub fn run(&self, data: Tensor) -> DNNOutput {
        let output = if self.subtask_info.is_transmission() {
            data
        } else {
            self.model.as_ref().expect("computing subtask must have a resolved model").forward(&data)
        };
        DNNOutput::new(output, self.subtask_info.clone())
    }
}
