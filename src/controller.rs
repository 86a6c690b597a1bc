//! The controller process (§4.8): owns the [`LayeredGraph`], the in-flight
//! `job_list`, and the five background loops that keep both synchronized
//! with the workers over the [`Bus`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Local;

use crate::bus::Bus;
use crate::config::{AppConfig, ModelConfig, NetworkConfig};
use crate::csv_log::{BacklogLog, LatencyLog, PathLog};
use crate::error::Result;
use crate::job::{JobInfo, SubtaskInfo};
use crate::layered_graph::LayeredGraph;
use crate::messages::{
    ConfigResponse, Message, RequestBacklog, TOPIC_ARRIVAL_RATE, TOPIC_CONFIG, TOPIC_FINISH, TOPIC_NETWORK_PERFORMANCE, TOPIC_NODE_INFO, TOPIC_REQUEST_SCHEDULING, TOPIC_RESPONSE,
    TOPIC_SUBTASK_INFO,
};

fn now_ns() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_nanos() as i64
}

struct State {
    job_list: HashMap<String, i64>,
    last_job_id: Option<String>,
    arrival_rate: f64,
    recorder_started: bool,
}

/// Central scheduling authority: one per deployment, subscribed on its own
/// `ip` across every topic in the controller column of §6's table.
pub struct Controller {
    ip: String,
    network: NetworkConfig,
    model: ModelConfig,
    graph: Arc<LayeredGraph>,
    bus: Arc<dyn Bus>,
    state: Arc<Mutex<State>>,
    send_num: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    latency_log: Arc<LatencyLog>,
    backlog_log: Arc<BacklogLog>,
    path_log: Arc<PathLog>,
}

impl Controller {
    pub fn new(ip: impl Into<String>, config: AppConfig, bus: Arc<dyn Bus>, shutdown: Arc<AtomicBool>) -> Result<Arc<Self>> {
        let ip = ip.into();
        let graph = Arc::new(LayeredGraph::new(&config.network)?);
        let collect_garbage_job_time = config.network.collect_garbage_job_time;
        let sync_time = config.controller.sync_time;

        let timestamp = Local::now().format("%m-%d_%H%M%S");
        let results_dir = format!("results/{}_{}", config.controller.experiment_name, timestamp);

        let latency_log = Arc::new(LatencyLog::new(results_dir.clone()));
        let backlog_log = Arc::new(BacklogLog::new(results_dir.clone(), graph.edge_labels())?);
        let path_log = Arc::new(PathLog::new(results_dir)?);

        let controller = Arc::new(Self {
            ip,
            network: config.network,
            model: config.model,
            graph,
            bus,
            state: Arc::new(Mutex::new(State { job_list: HashMap::new(), last_job_id: None, arrival_rate: 0.0, recorder_started: false })),
            send_num: Arc::new(AtomicU64::new(0)),
            shutdown,
            latency_log,
            backlog_log,
            path_log,
        });

        controller.clone().subscribe_all();
        controller.clone().spawn_garbage_job_collector(collect_garbage_job_time);
        controller.clone().spawn_sync_backlog(sync_time);
        controller.clone().spawn_sync_network_performance(sync_time);
        controller.clone().spawn_measure_arrival_rate();

        Ok(controller)
    }

    fn subscribe_all(self: Arc<Self>) {
        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_CONFIG, Box::new(move |bytes| this.clone().on_config_request(bytes)));

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_NODE_INFO, Box::new(move |bytes| this.clone().on_node_info(bytes)));

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_REQUEST_SCHEDULING, Box::new(move |bytes| this.clone().on_request_scheduling(bytes)));

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_RESPONSE, Box::new(move |bytes| this.clone().on_response(bytes)));

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_NETWORK_PERFORMANCE, Box::new(move |bytes| this.clone().on_network_performance(bytes)));

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_ARRIVAL_RATE, Box::new(move |bytes| this.clone().on_arrival_rate_request(bytes)));

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_FINISH, Box::new(move |bytes| this.clone().on_finish(bytes)));
    }

    fn on_config_request(self: Arc<Self>, bytes: Vec<u8>) {
        let Ok(Message::RequestConfig(request)) = Message::from_bytes(&bytes) else { return };
        let response = Message::ConfigResponse(ConfigResponse { network_config: self.network.clone(), model_config: self.model.clone() });
        self.publish_best_effort(&request.ip, TOPIC_CONFIG, &response);
    }

    fn on_node_info(self: Arc<Self>, bytes: Vec<u8>) {
        let Ok(Message::NodeLinkInfo(info)) = Message::from_bytes(&bytes) else { return };
        self.graph.apply_node_link_info(&info.ip, &info.links, info.computing_capacity, info.transfer_capacity);
    }

    fn on_request_scheduling(self: Arc<Self>, bytes: Vec<u8>) {
        let Ok(Message::RequestScheduling(job)) = Message::from_bytes(&bytes) else { return };
        self.send_num.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = self.state.lock().expect("controller state mutex poisoned");
            if !state.recorder_started {
                state.recorder_started = true;
                self.clone().spawn_record_virtual_backlog();
            }
            state.job_list.insert(job.job_id(), now_ns());
        }

        let path = match self.graph.schedule(&job) {
            Ok(path) => path,
            Err(err) => {
                log::warn!("no path found for job {}: {err}", job.job_id());
                return;
            }
        };

        self.graph.update_path_backlog(&job, &path, &self.model);
        {
            let mut state = self.state.lock().expect("controller state mutex poisoned");
            state.arrival_rate = self.graph.get_arrival_rate(&path);
        }
        self.path_log.log(&path);

        // A subtask is terminal once its `primary_path_index` has advanced
        // past the last assigned step, not when it arrives at that step:
        // the worker holding the last step must still run it before
        // `advance()` reaches the terminal index (§4.6).
        let terminal_index = path.len();
        for (index, (source, destination, model_name)) in path.into_iter().enumerate() {
            let subtask_info = SubtaskInfo::new(job.clone(), source.clone(), destination, model_name, index, terminal_index);
            let message = Message::SubtaskAssignment(subtask_info);
            self.publish_best_effort(source.ip(), TOPIC_SUBTASK_INFO, &message);
        }
    }

    fn on_response(self: Arc<Self>, bytes: Vec<u8>) {
        let Ok(Message::JobResponse(info)) = Message::from_bytes(&bytes) else { return };
        let job_id = info.job_id();

        let start_time = {
            let mut state = self.state.lock().expect("controller state mutex poisoned");
            state.job_list.remove(&job_id)
        };
        let Some(start_time) = start_time else {
            log::warn!("job/response for unknown job {job_id}");
            return;
        };

        let latency_ms = (now_ns() - start_time) as f64 / 1_000_000.0;
        if let Err(err) = self.latency_log.log(&info.job.job_name, latency_ms) {
            log::warn!("failed to log latency for {}: {err}", info.job.job_name);
        }

        let is_last = self.state.lock().expect("controller state mutex poisoned").last_job_id.as_deref() == Some(job_id.as_str());
        if is_last {
            self.notify_finish();
            self.shutdown.store(true, Ordering::Relaxed);
        }
    }

    fn on_network_performance(self: Arc<Self>, bytes: Vec<u8>) {
        let Ok(Message::NetworkPerformance(performance)) = Message::from_bytes(&bytes) else { return };
        self.graph.update_network_performance_info(&performance.ip, performance.gpu_capacity);
    }

    fn on_arrival_rate_request(self: Arc<Self>, bytes: Vec<u8>) {
        let Ok(Message::ArrivalRateRequest(request)) = Message::from_bytes(&bytes) else { return };
        let rate = self.state.lock().expect("controller state mutex poisoned").arrival_rate;
        let message = Message::ArrivalRateReply(crate::messages::ArrivalRateReply { rate });
        self.publish_best_effort(&request.ip, TOPIC_ARRIVAL_RATE, &message);
    }

    /// A sender announcing the job it expects to be its last. Recorded so
    /// the matching `job/response` can trigger the finish broadcast.
    fn on_finish(self: Arc<Self>, bytes: Vec<u8>) {
        let Ok(Message::Finish(job)) = Message::from_bytes(&bytes) else { return };
        self.state.lock().expect("controller state mutex poisoned").last_job_id = Some(job.job_id());
    }

    fn notify_finish(&self) {
        let message = Message::Finish(JobInfo::new("", "", 0.0, "", "", 0));
        for ip in self.network.node_ips() {
            self.publish_best_effort(ip, TOPIC_FINISH, &message);
        }
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

    fn spawn_garbage_job_collector(self: Arc<Self>, ttl_sec: u64) {
        thread::Builder::new()
            .name("controller-garbage-job-collector".to_string())
            .spawn(move || {
                while !self.shutdown.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_secs(ttl_sec.max(1)));
                    let ttl_ns = ttl_sec as i64 * 1_000_000_000;
                    let now = now_ns();
                    let mut state = self.state.lock().expect("controller state mutex poisoned");
                    let expired: Vec<String> = state.job_list.iter().filter(|(_, start)| now - **start > ttl_ns).map(|(job_id, _)| job_id.clone()).collect();
                    for job_id in &expired {
                        state.job_list.remove(job_id);
                        let job_name = job_id.rsplit_once('_').map(|(name, _)| name).unwrap_or(job_id);
                        if let Err(err) = self.latency_log.log(job_name, ttl_sec as f64 * 1000.0) {
                            log::warn!("failed to log GC latency for {job_name}: {err}");
                        }
                    }
                }
            })
            .expect("failed to spawn garbage-job-collector thread");
    }

    fn spawn_record_virtual_backlog(self: Arc<Self>) {
        thread::Builder::new()
            .name("controller-record-virtual-backlog".to_string())
            .spawn(move || {
                while !self.shutdown.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(100));
                    self.graph.update_graph();

                    let snapshot = self.graph.backlog_snapshot();
                    let mut per_edge: HashMap<String, f64> = HashMap::new();
                    let mut sum_gflops = 0.0;
                    let mut sum_kb = 0.0;
                    let mut compute_edges = 0u32;
                    let mut transfer_edges = 0u32;

                    for (pair, value) in &snapshot {
                        per_edge.insert(pair.to_string_id(), *value);
                        if pair.is_computing() {
                            sum_gflops += value;
                            compute_edges += 1;
                        } else {
                            sum_kb += value;
                            transfer_edges += 1;
                        }
                    }

                    let avg_gflops = if compute_edges > 0 { sum_gflops / compute_edges as f64 } else { 0.0 };
                    let avg_kb = if transfer_edges > 0 { sum_kb / transfer_edges as f64 } else { 0.0 };
                    self.backlog_log.log(sum_gflops, avg_gflops, sum_kb, avg_kb, &per_edge);
                }
            })
            .expect("failed to spawn record-virtual-backlog thread");
    }

    fn spawn_sync_backlog(self: Arc<Self>, sync_time: f64) {
        thread::Builder::new()
            .name("controller-sync-backlog".to_string())
            .spawn(move || {
                let period = Duration::from_secs_f64(sync_time.max(0.001));
                while !self.shutdown.load(Ordering::Relaxed) {
                    thread::sleep(period);
                    let message = Message::RequestBacklog(RequestBacklog {});
                    for ip in self.network.node_ips() {
                        self.publish_best_effort(ip, TOPIC_NODE_INFO, &message);
                    }
                }
            })
            .expect("failed to spawn sync-backlog thread");
    }

    fn spawn_sync_network_performance(self: Arc<Self>, sync_time: f64) {
        thread::Builder::new()
            .name("controller-sync-network-performance".to_string())
            .spawn(move || {
                let period = Duration::from_secs_f64(sync_time.max(0.001));
                while !self.shutdown.load(Ordering::Relaxed) {
                    thread::sleep(period);
                    let message = Message::RequestNetworkPerformance(crate::messages::RequestNetworkPerformance {});
                    for ip in self.network.node_ips() {
                        self.publish_best_effort(ip, TOPIC_NETWORK_PERFORMANCE, &message);
                    }
                }
            })
            .expect("failed to spawn sync-network-performance thread");
    }

    fn spawn_measure_arrival_rate(self: Arc<Self>) {
        thread::Builder::new()
            .name("controller-measure-arrival-rate".to_string())
            .spawn(move || {
                while !self.shutdown.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_secs(1));
                    let sent = self.send_num.swap(0, Ordering::Relaxed);
                    let r_obs = sent as f64 / 30.0;
                    self.graph.update_expected_arrival_rate(r_obs);
                }
            })
            .expect("failed to spawn measure-arrival-rate thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::layered_graph::node::LayerNode;
    use crate::messages::{RequestConfig, TOPIC_SUBTASK_INFO};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration as StdDuration;

    fn config() -> AppConfig {
        AppConfig::from_value(serde_json::json!({
            "Controller": { "experiment_name": "test", "sync_time": 60.0 },
            "Network": {
                "queue_name": "q",
                "scheduling_algorithm": "RandomSelection",
                "collect_garbage_job_time": 3600,
                "jobs": { "j": { "job_type": "dnn", "source": "10.0.0.1", "destination": "10.0.0.1" } },
                "network": { "10.0.0.1": [] },
                "router": [],
                "models": { "10.0.0.1": ["m"] }
            },
            "Model": { "m": { "input_size": [1] } }
        }))
        .unwrap()
    }

    #[test]
    fn config_request_responds_with_network_and_model_config() {
        let bus = Arc::new(LocalBus::new());
        let controller = Controller::new("10.0.0.254", config(), bus.clone(), Arc::new(AtomicBool::new(false))).unwrap();

        let received: Arc<StdMutex<Option<Vec<u8>>>> = Arc::new(StdMutex::new(None));
        let received_clone = received.clone();
        bus.subscribe("10.0.0.1", TOPIC_CONFIG, Box::new(move |bytes| *received_clone.lock().unwrap() = Some(bytes)));

        let request = Message::RequestConfig(RequestConfig { ip: "10.0.0.1".to_string() });
        bus.publish_to("10.0.0.254", TOPIC_CONFIG, &request.to_bytes().unwrap()).unwrap();
        thread::sleep(StdDuration::from_millis(100));

        let bytes = received.lock().unwrap().clone().expect("config response received");
        assert!(matches!(Message::from_bytes(&bytes).unwrap(), Message::ConfigResponse(_)));
        let _ = controller;
    }

    #[test]
    fn scheduling_request_fans_out_one_subtask_info_per_path_step() {
        let bus = Arc::new(LocalBus::new());
        let controller = Controller::new("10.0.0.254", config(), bus.clone(), Arc::new(AtomicBool::new(false))).unwrap();

        let received: Arc<StdMutex<Vec<Vec<u8>>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        bus.subscribe("10.0.0.1", TOPIC_SUBTASK_INFO, Box::new(move |bytes| received_clone.lock().unwrap().push(bytes)));

        let job = JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.1", 1);
        let message = Message::RequestScheduling(job);
        bus.publish_to("10.0.0.254", TOPIC_REQUEST_SCHEDULING, &message.to_bytes().unwrap()).unwrap();
        thread::sleep(StdDuration::from_millis(100));

        assert_eq!(received.lock().unwrap().len(), 1);
        let _ = controller;
    }

    #[test]
    fn response_for_last_job_broadcasts_finish() {
        let bus = Arc::new(LocalBus::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let controller = Controller::new("10.0.0.254", config(), bus.clone(), shutdown.clone()).unwrap();

        let received: Arc<StdMutex<Vec<Vec<u8>>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        bus.subscribe("10.0.0.1", TOPIC_FINISH, Box::new(move |bytes| received_clone.lock().unwrap().push(bytes)));

        let job = JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.1", 1);
        let node = LayerNode::new("10.0.0.1", vec!["m".to_string()]);
        let info = SubtaskInfo::new(job.clone(), node.clone(), node, "m", 0, 0);

        bus.publish_to("10.0.0.254", TOPIC_REQUEST_SCHEDULING, &Message::RequestScheduling(job.clone()).to_bytes().unwrap()).unwrap();
        thread::sleep(StdDuration::from_millis(50));
        bus.publish_to("10.0.0.254", TOPIC_FINISH, &Message::Finish(job).to_bytes().unwrap()).unwrap();
        thread::sleep(StdDuration::from_millis(50));
        bus.publish_to("10.0.0.254", TOPIC_RESPONSE, &Message::JobResponse(info).to_bytes().unwrap()).unwrap();
        thread::sleep(StdDuration::from_millis(100));

        assert_eq!(received.lock().unwrap().len(), 1);
        assert!(shutdown.load(Ordering::Relaxed));
    }
}
