//! Black-box end-to-end scenarios (SPEC_FULL §8) driving a real
//! `Controller`/`Worker` pair over a `LocalBus`, the way a deployment would
//! see the system rather than exercising any single module in isolation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use dnn_offload_scheduler::bus::{Bus, LocalBus};
use dnn_offload_scheduler::config::AppConfig;
use dnn_offload_scheduler::job::{DNNOutput, JobInfo, SubtaskInfo};
use dnn_offload_scheduler::layered_graph::LayerNode;
use dnn_offload_scheduler::messages::{TOPIC_FINISH, TOPIC_RESPONSE};
use dnn_offload_scheduler::models::{DnnModel, MockModelRuntime, ModelRuntime, Tensor};
use dnn_offload_scheduler::seams::StaticGpuProbe;
use dnn_offload_scheduler::{Controller, Result, Sender, Worker};

const CONTROLLER_IP: &str = "10.0.0.254";

/// A model that records how many times its forward pass actually ran and
/// returns a fixed, input-independent tensor, so a test can tell an
/// executed inference step apart from a skipped one (rather than merely
/// observing that *some* response arrived).
struct CountingModel {
    calls: Arc<AtomicUsize>,
    output: Tensor,
}

impl DnnModel for CountingModel {
    fn forward(&self, _input: &Tensor) -> Tensor {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output.clone()
    }
}

struct CountingRuntime {
    calls: Arc<AtomicUsize>,
}

impl ModelRuntime for CountingRuntime {
    fn load(&self, _name: &str, _input_shape: &[usize]) -> Result<Box<dyn DnnModel>> {
        Ok(Box::new(CountingModel { calls: self.calls.clone(), output: Tensor { shape: vec![4], data: vec![1.0, 2.0, 3.0, 4.0] } }))
    }

    fn calculate_flops(&self, _model: &dyn DnnModel, input_shape: &[usize]) -> f64 {
        input_shape.iter().product::<usize>().max(1) as f64
    }
}

fn one_node_config() -> AppConfig {
    AppConfig::from_value(serde_json::json!({
        "Controller": { "experiment_name": "single-hop", "sync_time": 60.0 },
        "Network": {
            "queue_name": "q",
            "scheduling_algorithm": "RandomSelection",
            "collect_garbage_job_time": 3600,
            "jobs": { "j": { "job_type": "dnn", "source": "10.0.0.1", "destination": "10.0.0.1" } },
            "network": { "10.0.0.1": [] },
            "router": [],
            "models": { "10.0.0.1": ["m"] }
        },
        "Model": { "m": { "input_size": [1, 3, 2, 2] } }
    }))
    .unwrap()
}

fn two_node_config() -> AppConfig {
    AppConfig::from_value(serde_json::json!({
        "Controller": { "experiment_name": "two-hop", "sync_time": 60.0 },
        "Network": {
            "queue_name": "q",
            "scheduling_algorithm": "RandomSelection",
            "collect_garbage_job_time": 3600,
            "jobs": { "j": { "job_type": "dnn", "source": "10.0.0.1", "destination": "10.0.0.2" } },
            "network": { "10.0.0.1": ["10.0.0.2"], "10.0.0.2": [] },
            "router": [],
            "models": { "10.0.0.1": [], "10.0.0.2": ["m"] }
        },
        "Model": { "m": { "input_size": [1, 3, 2, 2], "computing_ratio": 2.0, "transfer_ratio": 1.0 } }
    }))
    .unwrap()
}

/// Scenario 1: single-hop computing path. One `job/subtask_info` out, one
/// `job/response` back, latency > 0 logged under the job's name.
#[test]
fn single_hop_computing_job_round_trips_through_controller_and_worker() {
    let bus = Arc::new(LocalBus::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let controller = Controller::new(CONTROLLER_IP, one_node_config(), bus.clone(), shutdown.clone()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let runtime = CountingRuntime { calls: calls.clone() };
    let worker = Worker::new("10.0.0.1", CONTROLLER_IP, bus.clone(), &runtime, Arc::new(StaticGpuProbe::new(1.0)), shutdown.clone(), Duration::from_millis(10)).unwrap();

    let subtask_assignments: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let assignments_clone = subtask_assignments.clone();
    bus.subscribe("10.0.0.1", dnn_offload_scheduler::messages::TOPIC_SUBTASK_INFO, Box::new(move |bytes| assignments_clone.lock().unwrap().push(bytes)));

    let responses: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let responses_clone = responses.clone();
    bus.subscribe(CONTROLLER_IP, TOPIC_RESPONSE, Box::new(move |bytes| responses_clone.lock().unwrap().push(bytes)));

    // Drive the job through the real Sender, the way a deployment would,
    // rather than hand-publishing RequestScheduling: only the Sender
    // originates the DNNOutput a worker's JobManager needs to rendezvous
    // with the controller's assignment.
    let sender = Sender::new("10.0.0.1", CONTROLLER_IP, "j", "dnn", "10.0.0.1", "10.0.0.1", bus.clone());
    let frames = dnn_offload_scheduler::seams::FixedSizeFrameSource::new(64, 1);
    sender.run(frames, Arc::new(AtomicBool::new(false)));
    thread::sleep(Duration::from_millis(200));

    assert_eq!(subtask_assignments.lock().unwrap().len(), 1, "exactly one subtask_info fanned out for a single-hop path");
    assert_eq!(responses.lock().unwrap().len(), 1, "worker answers with exactly one job/response");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "the assigned model actually ran its forward pass rather than being skipped");

    let _ = (controller, worker);
}

/// Scenario 2: two-hop transmit-then-compute. Node A forwards to B; B runs
/// the model and answers the controller. (Backlog accounting for this same
/// path shape is covered directly against `LayeredGraph` in
/// `src/layered_graph/graph.rs`'s unit tests.)
#[test]
fn two_hop_path_forwards_then_computes() {
    let bus = Arc::new(LocalBus::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let controller = Controller::new(CONTROLLER_IP, two_node_config(), bus.clone(), shutdown.clone()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let runtime = CountingRuntime { calls: calls.clone() };
    let worker_a = Worker::new("10.0.0.1", CONTROLLER_IP, bus.clone(), &runtime, Arc::new(StaticGpuProbe::new(1.0)), shutdown.clone(), Duration::from_millis(10)).unwrap();
    let worker_b = Worker::new("10.0.0.2", CONTROLLER_IP, bus.clone(), &runtime, Arc::new(StaticGpuProbe::new(1.0)), shutdown.clone(), Duration::from_millis(10)).unwrap();

    let responses: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let responses_clone = responses.clone();
    bus.subscribe(CONTROLLER_IP, TOPIC_RESPONSE, Box::new(move |bytes| responses_clone.lock().unwrap().push(bytes)));

    let sender = Sender::new("10.0.0.1", CONTROLLER_IP, "j", "dnn", "10.0.0.1", "10.0.0.2", bus.clone());
    let frames = dnn_offload_scheduler::seams::FixedSizeFrameSource::new(64, 1);
    sender.run(frames, Arc::new(AtomicBool::new(false)));
    thread::sleep(Duration::from_millis(250));

    assert_eq!(responses.lock().unwrap().len(), 1, "the job completes its two-hop path exactly once");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "node B's model ran its forward pass exactly once, node A only forwarded");

    let _ = (controller, worker_a, worker_b);
}

/// Scenario 3: out-of-order rendezvous. The DNNOutput for a subtask is
/// delivered to the worker's JobManager before the controller's
/// SubtaskInfo; once it arrives, the subtask runs exactly once.
#[test]
fn out_of_order_rendezvous_runs_the_subtask_exactly_once() {
    let bus = Arc::new(LocalBus::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let _controller = Controller::new(CONTROLLER_IP, one_node_config(), bus.clone(), shutdown.clone()).unwrap();

    let runtime = MockModelRuntime::new();
    let worker = Worker::new("10.0.0.1", CONTROLLER_IP, bus.clone(), &runtime, Arc::new(StaticGpuProbe::new(1.0)), shutdown, Duration::from_millis(10)).unwrap();

    let job = JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.1", 1);
    let node = LayerNode::new("10.0.0.1", vec!["m".to_string()]);
    let info = SubtaskInfo::new(job, node.clone(), node, "m", 0, 0);

    let responses: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let responses_clone = responses.clone();
    bus.subscribe(CONTROLLER_IP, TOPIC_RESPONSE, Box::new(move |bytes| responses_clone.lock().unwrap().push(bytes)));

    // Data arrives first: it has nowhere to run yet, so it stages.
    worker.run(DNNOutput::new(Tensor::zeros(&[1, 3, 2, 2]), info.clone()));
    assert!(worker.job_manager().ahead_output_queue().exists(&info));

    // The scheduling message arrives second; the staged output completes.
    worker.job_manager().add_subtask(info.clone()).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert!(!worker.job_manager().ahead_output_queue().exists(&info));
    assert!(!worker.job_manager().virtual_queue().exists(&info));
    assert_eq!(responses.lock().unwrap().len(), 1, "the subtask ran exactly once");
}

/// Scenario 4: GC of an orphan subtask. Registered, never fed data; once
/// the TTL elapses it is gone from the VirtualQueue.
#[test]
fn orphan_subtask_is_garbage_collected_after_its_ttl() {
    let bus = Arc::new(LocalBus::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let runtime = MockModelRuntime::new();
    let models = dnn_offload_scheduler::models::DnnModels::new(&["m".to_string()], |_| Ok(vec![1, 2]), &runtime).unwrap();
    let job_manager = dnn_offload_scheduler::job_manager::JobManager::new(models, bus, "10.0.0.254", 0, shutdown);

    let job = JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.1", 1);
    let node = LayerNode::new("10.0.0.1", vec!["m".to_string()]);
    let info = SubtaskInfo::new(job, node.clone(), node, "m", 0, 0);

    job_manager.add_subtask(info.clone()).unwrap();
    assert!(job_manager.virtual_queue().exists(&info));

    thread::sleep(Duration::from_millis(1400));
    assert!(!job_manager.virtual_queue().exists(&info), "GC thread sweeps an orphaned subtask once its TTL has elapsed");
}

/// Scenario 6: duplicate subtask registration surfaces as a logic error
/// and leaves the queue's existing entry untouched.
#[test]
fn duplicate_subtask_registration_is_a_logic_error() {
    let bus = Arc::new(LocalBus::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let runtime = MockModelRuntime::new();
    let models = dnn_offload_scheduler::models::DnnModels::new(&["m".to_string()], |_| Ok(vec![1, 2]), &runtime).unwrap();
    let job_manager = dnn_offload_scheduler::job_manager::JobManager::new(models, bus, "10.0.0.254", 3600, shutdown);

    let job = JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.1", 1);
    let node = LayerNode::new("10.0.0.1", vec!["m".to_string()]);
    let info = SubtaskInfo::new(job, node.clone(), node, "m", 0, 0);

    job_manager.add_subtask(info.clone()).unwrap();
    let err = job_manager.add_subtask(info.clone()).unwrap_err();
    assert!(matches!(err, dnn_offload_scheduler::Error::DuplicateSubtask(_)));
    assert!(job_manager.virtual_queue().exists(&info));
}

/// A sender that exhausts its frame source announces `mdc/finish`, and the
/// controller rebroadcasts it once the matching response lands.
#[test]
fn sender_exhaustion_and_matching_response_trigger_shutdown_broadcast() {
    let bus = Arc::new(LocalBus::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let controller = Controller::new(CONTROLLER_IP, one_node_config(), bus.clone(), shutdown.clone()).unwrap();
    let runtime = MockModelRuntime::new();
    let worker = Worker::new("10.0.0.1", CONTROLLER_IP, bus.clone(), &runtime, Arc::new(StaticGpuProbe::new(1.0)), shutdown.clone(), Duration::from_millis(10)).unwrap();

    let finish_seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let finish_clone = finish_seen.clone();
    bus.subscribe("10.0.0.1", TOPIC_FINISH, Box::new(move |bytes| finish_clone.lock().unwrap().push(bytes)));

    let sender = dnn_offload_scheduler::Sender::new("10.0.0.1", CONTROLLER_IP, "j", "dnn", "10.0.0.1", "10.0.0.1", bus.clone());
    let frames = dnn_offload_scheduler::seams::FixedSizeFrameSource::new(64, 1);
    sender.run(frames, shutdown.clone());

    thread::sleep(Duration::from_millis(250));
    assert!(shutdown.load(Ordering::Relaxed), "the matching job/response ends the run");
    assert_eq!(finish_seen.lock().unwrap().len(), 1, "every node hears exactly one mdc/finish broadcast");

    let _ = (controller, worker);
}
