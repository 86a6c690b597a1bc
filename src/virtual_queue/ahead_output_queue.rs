use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::job::dnn_output::DNNOutput;
use crate::job::subtask_info::SubtaskInfo;

fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis()
}

/// Per-worker registry of "data arrived before the scheduling message did"
/// entries, keyed by the `SubtaskInfo` that would consume the data. Same
/// shape and TTL semantics as [`crate::virtual_queue::VirtualQueue`].
pub struct AheadOutputQueue {
    entries: Mutex<HashMap<SubtaskInfo, (DNNOutput, u128)>>,
}

impl AheadOutputQueue {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    pub fn add(&self, info: SubtaskInfo, output: DNNOutput) -> bool {
        let mut entries = self.entries.lock().expect("ahead-output queue mutex poisoned");
        if entries.contains_key(&info) {
            return false;
        }
        entries.insert(info, (output, now_ms()));
        true
    }

    pub fn exists(&self, info: &SubtaskInfo) -> bool {
        self.entries.lock().expect("ahead-output queue mutex poisoned").contains_key(info)
    }

    pub fn pop(&self, info: &SubtaskInfo) -> Result<DNNOutput> {
        self.entries.lock().expect("ahead-output queue mutex poisoned").remove(info).map(|(output, _)| output).ok_or_else(|| Error::SubtaskNotFound(info.subtask_id()))
    }

    pub fn garbage_collect(&self, ttl_sec: u64) {
        let ttl_ms = ttl_sec as u128 * 1000;
        let now = now_ms();
        self.entries.lock().expect("ahead-output queue mutex poisoned").retain(|_, (_, arrival_ms)| now.saturating_sub(*arrival_ms) < ttl_ms);
    }
}

impl Default for AheadOutputQueue {
    fn default() -> Self {
        Self::new()
    }
}
