//! Sender: the bus-side client that originates jobs (§2, §4.8). Not given
//! its own numbered component in the distilled spec's table, but named
//! throughout control flow as the other end of `job/request_scheduling` and
//! `mdc/arrival_rate`; grounded on the same handshake/publish shape as
//! [`crate::worker::Worker`]. Also plays the role the original's `Sender`
//! plays as a layer-0 MDC node (`program/Sender.py::handle_subtask_info`):
//! it originates the frame itself as a `DNNOutput` on `job/{job_type}`
//! addressed to the job's source node, so the source's `JobManager` has
//! something to rendezvous the controller's first subtask assignment with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bus::Bus;
use crate::job::{DNNOutput, JobInfo, SubtaskInfo};
use crate::layered_graph::node::LayerNode;
use crate::messages::{job_topic, ArrivalRateReply, Message, RequestConfig, TOPIC_ARRIVAL_RATE, TOPIC_FINISH, TOPIC_REQUEST_SCHEDULING};
use crate::models::Tensor;
use crate::seams::FrameSource;

fn now_ns() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_nanos() as i64
}

/// A placeholder key identifying the job's own layer-0 subtask (the step
/// the controller will assign with `source_layer_node == job.source_ip`).
/// `SubtaskInfo` identity (`subtask_id`, used for `Hash`/`Eq`) depends only
/// on `job_id`, the source node, and `primary_path_index`, so the model
/// name, destination, and terminal index here are placeholders: whichever
/// side of the rendezvous (the controller's assignment or this frame)
/// arrives second adopts the other's authoritative `SubtaskInfo` in
/// `JobManager::run`. `terminal_index` is set away from `0` only so this
/// placeholder never reads as already terminated before that rendezvous.
fn origin_subtask_key(job: &JobInfo) -> SubtaskInfo {
    let node = LayerNode::new(job.source_ip.clone(), vec![]);
    SubtaskInfo::new(job.clone(), node.clone(), node, "", 0, 1)
}

/// Represents a raw frame as the flat tensor a transmission-edge subtask
/// carries unchanged into the first hop.
fn frame_to_tensor(frame: &[u8]) -> Tensor {
    Tensor { shape: vec![frame.len()], data: frame.iter().map(|byte| *byte as f32).collect() }
}

/// Originates one job per frame its [`FrameSource`] produces, stamping each
/// with a fresh `start_time` (the job's uniqueness key) and publishing a
/// `job/request_scheduling` request. Announces the last frame it ever sends
/// to the controller on `mdc/finish` so the controller knows which
/// `job/response` should trigger the shutdown broadcast.
pub struct Sender {
    ip: String,
    controller_ip: String,
    job_name: String,
    job_type: String,
    source_ip: String,
    terminal_destination: String,
    bus: Arc<dyn Bus>,
}

impl Sender {
    pub fn new(
        ip: impl Into<String>,
        controller_ip: impl Into<String>,
        job_name: impl Into<String>,
        job_type: impl Into<String>,
        source_ip: impl Into<String>,
        terminal_destination: impl Into<String>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        Self {
            ip: ip.into(),
            controller_ip: controller_ip.into(),
            job_name: job_name.into(),
            job_type: job_type.into(),
            source_ip: source_ip.into(),
            terminal_destination: terminal_destination.into(),
            bus,
        }
    }

    /// Drains `frames` to exhaustion, publishing one scheduling request per
    /// frame alongside the frame itself, wrapped as a `DNNOutput` addressed
    /// to the job's own source node on `job/{job_type}` (mirroring the
    /// original's `Sender` acting as the layer-0 MDC node that runs or
    /// forwards its own first hop). The scheduling request and the frame
    /// race each other to the source node's `JobManager`; whichever side of
    /// that rendezvous loses is staged until the other arrives (§4.6).
    /// The last request sent is announced to the controller via
    /// `mdc/finish` before returning, so a response to it can end the run.
    /// Observes `shutdown` between frames so an external finish broadcast
    /// (another sender's last job already answered) stops this one too.
    pub fn run(&self, mut frames: impl FrameSource, shutdown: Arc<AtomicBool>) {
        let mut last_job: Option<JobInfo> = None;

        while !shutdown.load(Ordering::Relaxed) {
            let Some(frame) = frames.next_frame() else { break };
            let input_bytes = frame.len() as f64 / 1024.0;
            let job = JobInfo::new(self.job_name.clone(), self.job_type.clone(), input_bytes, self.source_ip.clone(), self.terminal_destination.clone(), now_ns());
            self.publish_best_effort(&self.controller_ip.clone(), TOPIC_REQUEST_SCHEDULING, &Message::RequestScheduling(job.clone()));

            let output = DNNOutput::new(frame_to_tensor(&frame), origin_subtask_key(&job));
            let topic = job_topic(&job.job_type);
            self.publish_best_effort(&self.source_ip.clone(), &topic, &Message::JobOutput(output));

            last_job = Some(job);
        }

        if let Some(job) = last_job {
            self.publish_best_effort(&self.controller_ip.clone(), TOPIC_FINISH, &Message::Finish(job));
        }
    }

    /// Requests the controller's current backlog-derived arrival rate along
    /// this sender's path, for senders that back off before offloading
    /// more frames (§4.7 path telemetry).
    pub fn request_arrival_rate(&self, bus_with_reply: &dyn Bus) -> Option<f64> {
        let received = std::sync::Arc::new(std::sync::Mutex::new(None));
        let received_clone = received.clone();
        bus_with_reply.subscribe(
            &self.ip.clone(),
            TOPIC_ARRIVAL_RATE,
            Box::new(move |bytes| {
                if let Ok(Message::ArrivalRateReply(ArrivalRateReply { rate })) = Message::from_bytes(&bytes) {
                    *received_clone.lock().expect("arrival rate mutex poisoned") = Some(rate);
                }
            }),
        );
        let request = Message::ArrivalRateRequest(RequestConfig { ip: self.ip.clone() });
        self.publish_best_effort(&self.controller_ip.clone(), TOPIC_ARRIVAL_RATE, &request);
        std::thread::sleep(std::time::Duration::from_millis(50));
        received.lock().expect("arrival rate mutex poisoned").take()
    }

    fn publish_best_effort(&self, host: &str, topic: &str, message: &Message) {
        match message.to_bytes() {
            Ok(bytes) => {
                if let Err(err) = self.bus.publish_to(host, topic, &bytes) {
                    log::warn!("publish to {host}/{topic} failed: {err}");
                }
            }
            Err(err) => log::warn!("failed to encode message for {host}/{topic}: {err}"),
        }
    }
}
