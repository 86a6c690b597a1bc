//! Worker-side pipeline (§4.6): advances a job through its assigned path,
//! invoking model inference, measuring effective capacity, and feeding
//! statistics back to the controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::bus::Bus;
use crate::capacity_manager::CapacityManager;
use crate::error::{Error, Result};
use crate::job::dnn_output::DNNOutput;
use crate::job::dnn_subtask::DNNSubtask;
use crate::job::subtask_info::SubtaskInfo;
use crate::messages::{job_topic, Message, TOPIC_RESPONSE};
use crate::models::DnnModels;
use crate::virtual_queue::{AheadOutputQueue, VirtualQueue};

pub struct JobManager {
    models: DnnModels,
    virtual_queue: Arc<VirtualQueue>,
    ahead_output_queue: Arc<AheadOutputQueue>,
    capacity: Arc<CapacityManager>,
    bus: Arc<dyn Bus>,
    controller_ip: String,
}

impl JobManager {
    pub fn new(models: DnnModels, bus: Arc<dyn Bus>, controller_ip: impl Into<String>, collect_garbage_job_time: u64, shutdown: Arc<AtomicBool>) -> Self {
        let virtual_queue = Arc::new(VirtualQueue::new());
        let ahead_output_queue = Arc::new(AheadOutputQueue::new());

        spawn_gc_loop("virtual-queue-gc", virtual_queue.clone(), collect_garbage_job_time, shutdown.clone(), |queue, ttl| queue.garbage_collect(ttl));
        spawn_gc_loop("ahead-output-queue-gc", ahead_output_queue.clone(), collect_garbage_job_time, shutdown, |queue, ttl| queue.garbage_collect(ttl));

        Self { models, virtual_queue, ahead_output_queue, capacity: Arc::new(CapacityManager::new()), bus, controller_ip: controller_ip.into() }
    }

    pub fn virtual_queue(&self) -> &VirtualQueue {
        &self.virtual_queue
    }

    pub fn ahead_output_queue(&self) -> &AheadOutputQueue {
        &self.ahead_output_queue
    }

    pub fn capacity(&self) -> &CapacityManager {
        &self.capacity
    }

    /// A shared handle to the capacity averages, for the worker's
    /// sync-backlog responder to read alongside the job manager.
    pub fn capacity_handle(&self) -> Arc<CapacityManager> {
        self.capacity.clone()
    }

    /// Registers that this node has been told to perform `info`. Computes
    /// the `(computing, transfer)` pair from the preloaded models; a pure
    /// transmission edge (`model_name == ""`) takes its transfer size from
    /// the job's own `input_bytes` instead of a model's output size.
    pub fn add_subtask(&self, info: SubtaskInfo) -> Result<()> {
        let (model, computing_capacity, transfer_capacity) = if info.model_name.is_empty() {
            (None, 0.0, info.job.input_bytes)
        } else {
            let model = self.models.model(&info.model_name)?;
            let computing_capacity = self.models.computing(&info.model_name)?;
            let transfer_capacity = self.models.transfer(&info.model_name)?;
            (Some(model), computing_capacity, transfer_capacity)
        };

        let subtask = DNNSubtask::new(info.clone(), model, computing_capacity, transfer_capacity);
        if !self.virtual_queue.add(info.clone(), subtask) {
            return Err(Error::DuplicateSubtask(info.subtask_id()));
        }

        // The data for this hop may have already arrived and been staged in
        // the ahead-output queue (rendezvous case B); complete it now rather
        // than waiting for a message that will never come.
        if self.ahead_output_queue.exists(&info) {
            let output = self.ahead_output_queue.pop(&info)?;
            self.run(output)?;
        }
        Ok(())
    }

    pub fn add_dnn_output(&self, output: DNNOutput) -> Result<()> {
        let info = output.subtask_info.clone();
        if !self.ahead_output_queue.add(info.clone(), output) {
            return Err(Error::DuplicateOutput(info.subtask_id()));
        }
        Ok(())
    }

    /// Drives one arriving [`DNNOutput`] through as many steps as it can
    /// complete locally: every computing hop loops in place; a transmission
    /// hop (or the terminal destination) stops the call.
    pub fn run(&self, mut output: DNNOutput) -> Result<()> {
        loop {
            if output.subtask_info.is_terminated() {
                let message = Message::JobResponse(output.subtask_info.clone());
                self.publish_best_effort(&self.controller_ip.clone(), TOPIC_RESPONSE, &message);
                return Ok(());
            }

            if !self.virtual_queue.exists(&output.subtask_info) {
                self.add_dnn_output(output)?;
                return Ok(());
            }

            let authoritative_info = self.virtual_queue.get_subtask_info(&output.subtask_info)?;
            let subtask = self.virtual_queue.pop(&authoritative_info)?;

            let t0 = Instant::now();
            let result = subtask.run(output.payload);
            let elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0;

            let backlog = subtask.backlog();
            let effective_capacity = if backlog > 0.0 && elapsed_ms > 0.0 { backlog / elapsed_ms } else { 0.0 };
            if authoritative_info.is_computing() {
                self.capacity.update_computing_capacity(effective_capacity);
            }

            let mut next_info = authoritative_info.clone();
            next_info.advance();
            let next_output = DNNOutput::new(result.payload, next_info.clone());

            if authoritative_info.is_transmission() {
                let topic = job_topic(&next_info.job.job_type);
                let message = Message::JobOutput(next_output);
                self.publish_best_effort(next_info.source_layer_node.ip(), &topic, &message);
                return Ok(());
            }

            output = next_output;
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
}

fn spawn_gc_loop<T: Send + Sync + 'static>(name: &'static str, queue: Arc<T>, ttl_sec: u64, shutdown: Arc<AtomicBool>, sweep: fn(&T, u64)) {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(ttl_sec.max(1)));
                sweep(&queue, ttl_sec);
            }
        })
        .expect("failed to spawn garbage-collector thread");
}
