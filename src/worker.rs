//! The worker process ("MDC" in the original's naming): fetches its
//! configuration from the controller, then runs a [`JobManager`] behind
//! subscriptions for every topic a compute node answers on (§6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::bus::Bus;
use crate::capacity_manager::{BytesSentProbe, CapacityManager};
use crate::config::{ModelConfig, NetworkConfig};
use crate::error::Result;
use crate::job::DNNOutput;
use crate::job_manager::JobManager;
use crate::messages::{job_topic, ConfigResponse, Message, NetworkPerformance, NodeLinkInfo, RequestConfig, TOPIC_CONFIG, TOPIC_FINISH, TOPIC_NETWORK_PERFORMANCE, TOPIC_NODE_INFO, TOPIC_SUBTASK_INFO};
use crate::models::ModelRuntime;
use crate::seams::GpuProbe;

/// Repeatedly publishes a `RequestConfig` to `controller_ip` until the
/// matching `ConfigResponse` arrives, mirroring the blocking handshake every
/// node performs before it can build its [`JobManager`].
fn fetch_config(ip: &str, controller_ip: &str, bus: &dyn Bus, poll_interval: Duration) -> (NetworkConfig, ModelConfig) {
    let received: Arc<Mutex<Option<(NetworkConfig, ModelConfig)>>> = Arc::new(Mutex::new(None));
    let received_clone = received.clone();

    bus.subscribe(
        ip,
        TOPIC_CONFIG,
        Box::new(move |bytes| {
            if let Ok(Message::ConfigResponse(ConfigResponse { network_config, model_config })) = Message::from_bytes(&bytes) {
                *received_clone.lock().expect("config handshake mutex poisoned") = Some((network_config, model_config));
            }
        }),
    );

    loop {
        if let Some(config) = received.lock().expect("config handshake mutex poisoned").take() {
            return config;
        }
        let request = Message::RequestConfig(RequestConfig { ip: ip.to_string() });
        if let Ok(bytes) = request.to_bytes() {
            let _ = bus.publish_to(controller_ip, TOPIC_CONFIG, &bytes);
        }
        thread::sleep(poll_interval);
    }
}

pub struct Worker {
    ip: String,
    bus: Arc<dyn Bus>,
    controller_ip: String,
    job_manager: Arc<JobManager>,
    capacity: Arc<CapacityManager>,
    network: NetworkConfig,
    gpu_probe: Arc<dyn GpuProbe>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        ip: impl Into<String>,
        controller_ip: impl Into<String>,
        bus: Arc<dyn Bus>,
        model_runtime: &dyn ModelRuntime,
        gpu_probe: Arc<dyn GpuProbe>,
        shutdown: Arc<AtomicBool>,
        config_poll_interval: Duration,
    ) -> Result<Arc<Self>> {
        let ip = ip.into();
        let controller_ip = controller_ip.into();
        let (network, model) = fetch_config(&ip, &controller_ip, bus.as_ref(), config_poll_interval);

        let own_models = network.models_for(&ip);
        let dnn_models = crate::models::DnnModels::new(&own_models, |name| model.input_size(name).map(<[usize]>::to_vec), model_runtime)?;

        let job_manager = Arc::new(JobManager::new(dnn_models, bus.clone(), controller_ip.clone(), network.collect_garbage_job_time, shutdown.clone()));
        let capacity = job_manager.capacity_handle();

        let worker = Arc::new(Self { ip, bus, controller_ip, job_manager, capacity, network, gpu_probe, shutdown });
        worker.clone().subscribe_all();
        Ok(worker)
    }

    pub fn job_manager(&self) -> &JobManager {
        &self.job_manager
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    fn subscribe_all(self: Arc<Self>) {
        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_SUBTASK_INFO, Box::new(move |bytes| this.on_subtask_info(bytes)));

        for job_type in self.network.job_types() {
            let this = self.clone();
            let topic = job_topic(&job_type);
            self.bus.subscribe(&self.ip.clone(), &topic, Box::new(move |bytes| this.on_job_output(bytes)));
        }

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_NODE_INFO, Box::new(move |bytes| this.on_request_backlog(bytes)));

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_NETWORK_PERFORMANCE, Box::new(move |bytes| this.on_request_network_performance(bytes)));

        let this = self.clone();
        self.bus.subscribe(&self.ip.clone(), TOPIC_FINISH, Box::new(move |_bytes| this.shutdown.store(true, Ordering::Relaxed)));
    }

    fn on_subtask_info(&self, bytes: Vec<u8>) {
        let Ok(Message::SubtaskAssignment(info)) = Message::from_bytes(&bytes) else { return };
        if let Err(err) = self.job_manager.add_subtask(info) {
            log::warn!("failed to register subtask on {}: {err}", self.ip);
        }
    }

    fn on_job_output(&self, bytes: Vec<u8>) {
        let Ok(Message::JobOutput(output)) = Message::from_bytes(&bytes) else { return };
        self.run(output);
    }

    /// Drives an arriving [`DNNOutput`] through the local [`JobManager`];
    /// shared by the plain worker path and the sender's first-hop path.
    pub fn run(&self, output: DNNOutput) {
        if let Err(err) = self.job_manager.run(output) {
            log::warn!("job manager run failed on {}: {err}", self.ip);
        }
    }

    fn on_request_backlog(&self, bytes: Vec<u8>) {
        let Ok(Message::RequestBacklog(_)) = Message::from_bytes(&bytes) else { return };

        self.capacity.update_transfer_capacity(self.bytes_probe());
        let links = self
            .job_manager
            .virtual_queue()
            .backlogs()
            .into_iter()
            .map(|(pair, value)| (pair.to_string_id(), value))
            .collect();

        let info = NodeLinkInfo { ip: self.ip.clone(), links, computing_capacity: self.capacity.avg_computing(), transfer_capacity: self.capacity.avg_transfer() };
        self.publish_best_effort(&self.controller_ip.clone(), TOPIC_NODE_INFO, &Message::NodeLinkInfo(info));
    }

    fn on_request_network_performance(&self, bytes: Vec<u8>) {
        let Ok(Message::RequestNetworkPerformance(_)) = Message::from_bytes(&bytes) else { return };
        let performance = NetworkPerformance { ip: self.ip.clone(), gpu_capacity: self.gpu_probe.gpu_capacity() };
        self.publish_best_effort(&self.controller_ip.clone(), TOPIC_NETWORK_PERFORMANCE, &Message::NetworkPerformance(performance));
    }

    fn bytes_probe(&self) -> &dyn BytesSentProbe {
        &NoBytesSentProbe
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

/// Placeholder byte counter for nodes with no real NIC to sample; always
/// reports a flat zero so `update_transfer_capacity` feeds 0 rather than a
/// fabricated rate.
struct NoBytesSentProbe;

impl BytesSentProbe for NoBytesSentProbe {
    fn bytes_sent(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::config::AppConfig;
    use crate::controller::Controller;
    use crate::models::MockModelRuntime;
    use crate::seams::StaticGpuProbe;
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
    fn worker_fetches_config_and_handles_a_subtask_round_trip() {
        let bus = Arc::new(LocalBus::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let _controller = Controller::new("10.0.0.254", config(), bus.clone(), shutdown.clone()).unwrap();

        let runtime = MockModelRuntime::new();
        let worker = Worker::new("10.0.0.1", "10.0.0.254", bus.clone(), &runtime, Arc::new(StaticGpuProbe::new(1.0)), shutdown, StdDuration::from_millis(10)).unwrap();

        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        bus.subscribe("10.0.0.254", crate::messages::TOPIC_RESPONSE, Box::new(move |bytes| received_clone.lock().unwrap().push(bytes)));

        let job = crate::job::JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.1", 1);
        let message = Message::RequestScheduling(job);
        bus.publish_to("10.0.0.254", crate::messages::TOPIC_REQUEST_SCHEDULING, &message.to_bytes().unwrap()).unwrap();
        thread::sleep(StdDuration::from_millis(100));

        let node = crate::layered_graph::node::LayerNode::new("10.0.0.1", vec!["m".to_string()]);
        let info = crate::job::SubtaskInfo::new(crate::job::JobInfo::new("j", "dnn", 10.0, "10.0.0.1", "10.0.0.1", 1), node.clone(), node, "m", 0, 0);
        let output = DNNOutput::new(crate::models::Tensor::zeros(&[1]), info);
        worker.run(output);
        thread::sleep(StdDuration::from_millis(100));

        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
