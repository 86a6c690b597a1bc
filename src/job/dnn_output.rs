use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::job::subtask_info::SubtaskInfo;
use crate::models::Tensor;

/// The result of running one [`crate::job::dnn_subtask::DNNSubtask`]: the
/// produced tensor plus the subtask it belongs to, so the receiving side can
/// look up the matching entry in the ahead-output rendezvous queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DNNOutput {
    pub payload: Tensor,
    pub subtask_info: SubtaskInfo,
}

impl DNNOutput {
    pub fn new(payload: Tensor, subtask_info: SubtaskInfo) -> Self {
        Self { payload, subtask_info }
    }

    pub fn subtask_id(&self) -> String {
        self.subtask_info.subtask_id()
    }
}

impl PartialEq for DNNOutput {
    fn eq(&self, other: &Self) -> bool {
        self.subtask_id() == other.subtask_id()
    }
}

impl Eq for DNNOutput {}

impl Hash for DNNOutput {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subtask_id().hash(state);
    }
}
