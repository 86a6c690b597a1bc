//! Per-worker rolling averages of effective computing and transfer capacity
//! (§4.2), fed by each executed subtask and by a periodic byte-counter
//! sample, and read back by the sync-backlog responder.

use std::sync::Mutex;
use std::time::Instant;

/// Bounds the rolling window so memory stays flat under long runs.
const WINDOW: u64 = 100;

/// Injected byte counter standing in for the OS's per-interface send
/// counter (e.g. `/proc/net/dev` or a platform socket API).
pub trait BytesSentProbe: Send + Sync {
    fn bytes_sent(&self) -> u64;
}

struct RollingAverage {
    average: f64,
    count: u64,
}

impl RollingAverage {
    fn new() -> Self {
        Self { average: 0.0, count: 0 }
    }

    fn feed(&mut self, sample: f64) {
        self.count += 1;
        let divisor = self.count.min(WINDOW) as f64;
        self.average += (sample - self.average) / divisor;
    }
}

struct State {
    computing: RollingAverage,
    transfer: RollingAverage,
    last_sample: Instant,
    last_bytes: u64,
}

pub struct CapacityManager {
    state: Mutex<State>,
}

impl CapacityManager {
    pub fn new() -> Self {
        Self { state: Mutex::new(State { computing: RollingAverage::new(), transfer: RollingAverage::new(), last_sample: Instant::now(), last_bytes: 0 }) }
    }

    /// Samples `probe.bytes_sent()`, converts the delta since the last
    /// sample to KB/ms, and feeds it. A non-positive elapsed time (clock
    /// hiccup) feeds 0 rather than dividing by it.
    pub fn update_transfer_capacity(&self, probe: &dyn BytesSentProbe) {
        let mut state = self.state.lock().expect("capacity manager mutex poisoned");
        let now = Instant::now();
        let elapsed_ms = now.duration_since(state.last_sample).as_secs_f64() * 1000.0;
        let bytes_now = probe.bytes_sent();
        let delta_kb = bytes_now.saturating_sub(state.last_bytes) as f64 / 1024.0;

        let sample = if elapsed_ms > 0.0 { delta_kb / elapsed_ms } else { 0.0 };
        state.transfer.feed(sample);
        state.last_sample = now;
        state.last_bytes = bytes_now;
    }

    /// Feeds a computing-capacity sample directly: `GFLOPs / ms_elapsed`,
    /// with the caller passing 0 when elapsed was 0.
    pub fn update_computing_capacity(&self, gflops_per_ms: f64) {
        self.state.lock().expect("capacity manager mutex poisoned").computing.feed(gflops_per_ms);
    }

    pub fn avg_computing(&self) -> f64 {
        self.state.lock().expect("capacity manager mutex poisoned").computing.average
    }

    pub fn avg_transfer(&self) -> f64 {
        self.state.lock().expect("capacity manager mutex poisoned").transfer.average
    }
}

impl Default for CapacityManager {
    fn default() -> Self {
        Self::new()
    }
}
