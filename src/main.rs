//! Binary entry point: wires a [`Controller`], one [`Worker`] per configured
//! node, and one [`Sender`] per configured job onto a single in-process
//! [`LocalBus`], using the [`MockModelRuntime`] demo model runtime. A real
//! deployment would run each process separately against a networked `Bus`
//! and a real `ModelRuntime`; this binary exists so the crate runs
//! end-to-end without either.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use dnn_offload_scheduler::bus::LocalBus;
use dnn_offload_scheduler::config::AppConfig;
use dnn_offload_scheduler::models::MockModelRuntime;
use dnn_offload_scheduler::seams::{FixedSizeFrameSource, StaticGpuProbe};
use dnn_offload_scheduler::{Controller, Error, Sender, Worker};

#[derive(Parser, Debug)]
#[command(about = "Distributed, backlog-aware DNN inference offloading scheduler")]
struct Cli {
    /// Path to the JSON configuration file (Controller/Network/Model sections).
    #[arg(long)]
    config: String,

    /// IP the controller answers on; must not collide with a node in `Network.network`.
    #[arg(long, default_value = "controller")]
    controller_ip: String,

    /// Frames each sender offloads before announcing it is done.
    #[arg(long, default_value_t = 10)]
    frames_per_job: usize,

    /// Bytes per synthetic frame.
    #[arg(long, default_value_t = 4096)]
    frame_bytes: usize,
}

fn run(cli: Cli) -> Result<(), Error> {
    let config = AppConfig::load(&cli.config)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let bus = Arc::new(LocalBus::new());
    let runtime = MockModelRuntime::new();

    let node_ips: Vec<String> = config.network.node_ips().into_iter().map(str::to_string).collect();
    let jobs: Vec<(String, String, String, String)> =
        config.network.job_names().into_iter().map(|name| { let job = config.network.job(name).expect("job listed by job_names"); (name.to_string(), job.job_type.clone(), job.source.clone(), job.destination.clone()) }).collect();

    let controller = Controller::new(&cli.controller_ip, config, bus.clone(), shutdown.clone())?;
    log::info!("controller listening on {}", cli.controller_ip);

    let mut workers = Vec::new();
    for ip in &node_ips {
        let worker = Worker::new(ip.clone(), cli.controller_ip.clone(), bus.clone(), &runtime, Arc::new(StaticGpuProbe::new(1.0)), shutdown.clone(), Duration::from_millis(50))?;
        log::info!("worker {ip} online");
        workers.push(worker);
    }

    let mut sender_handles = Vec::new();
    for (job_name, job_type, source, destination) in jobs {
        let bus = bus.clone();
        let controller_ip = cli.controller_ip.clone();
        let shutdown = shutdown.clone();
        let frames_per_job = cli.frames_per_job;
        let frame_bytes = cli.frame_bytes;
        let sender_ip = source.clone();

        sender_handles.push(thread::spawn(move || {
            let sender = Sender::new(sender_ip, controller_ip, job_name, job_type, source, destination, bus);
            sender.run(FixedSizeFrameSource::new(frame_bytes, frames_per_job), shutdown);
        }));
    }

    for handle in sender_handles {
        let _ = handle.join();
    }

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    let _ = controller;
    let _ = workers;
    log::info!("run finished");
    Ok(())
}

fn main() {
    dnn_offload_scheduler::logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        log::error!("fatal: {err}");
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}
