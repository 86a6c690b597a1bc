use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::job::dnn_subtask::DNNSubtask;
use crate::job::subtask_info::SubtaskInfo;
use crate::layered_graph::node::LayerNodePair;

fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis()
}

/// Per-worker registry of "this node has been told to perform this subtask;
/// it awaits the data" entries, keyed by [`SubtaskInfo`]. Every operation
/// holds the queue's mutex for its whole critical section.
pub struct VirtualQueue {
    entries: Mutex<HashMap<SubtaskInfo, (DNNSubtask, u128)>>,
}

impl VirtualQueue {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Returns `false` without modifying the queue if `info` is already present.
    pub fn add(&self, info: SubtaskInfo, subtask: DNNSubtask) -> bool {
        let mut entries = self.entries.lock().expect("virtual queue mutex poisoned");
        if entries.contains_key(&info) {
            return false;
        }
        entries.insert(info, (subtask, now_ms()));
        true
    }

    pub fn exists(&self, info: &SubtaskInfo) -> bool {
        self.entries.lock().expect("virtual queue mutex poisoned").contains_key(info)
    }

    /// Returns the stored subtask's own `SubtaskInfo`, used to rewrite a
    /// just-arrived `DNNOutput` whose embedded info reflects the sender's
    /// view rather than this hop's obligations.
    pub fn get_subtask_info(&self, info: &SubtaskInfo) -> Result<SubtaskInfo> {
        self.entries
            .lock()
            .expect("virtual queue mutex poisoned")
            .get(info)
            .map(|(subtask, _)| subtask.subtask_info.clone())
            .ok_or_else(|| Error::SubtaskNotFound(info.subtask_id()))
    }

    pub fn pop(&self, info: &SubtaskInfo) -> Result<DNNSubtask> {
        self.entries.lock().expect("virtual queue mutex poisoned").remove(info).map(|(subtask, _)| subtask).ok_or_else(|| Error::SubtaskNotFound(info.subtask_id()))
    }

    pub fn garbage_collect(&self, ttl_sec: u64) {
        let ttl_ms = ttl_sec as u128 * 1000;
        let now = now_ms();
        self.entries.lock().expect("virtual queue mutex poisoned").retain(|_, (_, arrival_ms)| now.saturating_sub(*arrival_ms) < ttl_ms);
    }

    /// Accumulates each entry's `subtask.backlog()` into its link.
    pub fn backlogs(&self) -> HashMap<LayerNodePair, f64> {
        let mut totals = HashMap::new();
        for (subtask, _) in self.entries.lock().expect("virtual queue mutex poisoned").values() {
            *totals.entry(subtask.subtask_info.link()).or_insert(0.0) += subtask.backlog();
        }
        totals
    }
}

impl Default for VirtualQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::job_info::JobInfo;
    use crate::layered_graph::node::LayerNode;

    fn info(index: usize) -> SubtaskInfo {
        let job = JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.1", 1);
        let node = LayerNode::new("10.0.0.1", vec![]);
        SubtaskInfo::new(job, node.clone(), node, "m", index, 1)
    }

    fn subtask(index: usize, capacity: f64) -> DNNSubtask {
        DNNSubtask::new(info(index), None, capacity, 0.0)
    }

    #[test]
    fn add_rejects_duplicate_key() {
        let queue = VirtualQueue::new();
        assert!(queue.add(info(0), subtask(0, 1.0)));
        assert!(!queue.add(info(0), subtask(0, 2.0)));
    }

    #[test]
    fn pop_removes_and_returns_the_entry() {
        let queue = VirtualQueue::new();
        queue.add(info(0), subtask(0, 5.0));
        let popped = queue.pop(&info(0)).unwrap();
        assert_eq!(popped.computing_capacity, 5.0);
        assert!(!queue.exists(&info(0)));
    }

    #[test]
    fn pop_missing_entry_is_subtask_not_found() {
        let queue = VirtualQueue::new();
        assert!(matches!(queue.pop(&info(0)), Err(Error::SubtaskNotFound(_))));
    }

    #[test]
    fn garbage_collect_drops_only_expired_entries() {
        let queue = VirtualQueue::new();
        queue.add(info(0), subtask(0, 1.0));
        queue.garbage_collect(3600);
        assert!(queue.exists(&info(0)));
        queue.garbage_collect(0);
        assert!(!queue.exists(&info(0)));
    }

    #[test]
    fn backlogs_accumulate_by_link() {
        let queue = VirtualQueue::new();
        queue.add(info(0), subtask(0, 3.0));
        queue.add(info(1), subtask(1, 4.0));
        let totals = queue.backlogs();
        assert_eq!(totals.len(), 1);
        assert_eq!(*totals.values().next().unwrap(), 7.0);
    }
}
