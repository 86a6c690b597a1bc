//! Distributed, backlog-aware DNN inference offloading scheduler.
//!
//! A central [`controller::Controller`] assigns each incoming job an
//! ordered path over a [`layered_graph::LayeredGraph`] of compute nodes;
//! [`worker::Worker`]s execute their assigned step or forward data to the
//! next hop, rendezvousing scheduling messages and data through the
//! [`virtual_queue`] pair. See `SPEC_FULL.md` for the full design.

pub mod bus;
pub mod capacity_manager;
pub mod config;
pub mod controller;
pub mod csv_log;
pub mod error;
pub mod job;
pub mod job_manager;
pub mod layered_graph;
pub mod logger;
pub mod messages;
pub mod models;
pub mod scheduling;
pub mod seams;
pub mod sender;
pub mod virtual_queue;
pub mod worker;

pub use config::AppConfig;
pub use controller::Controller;
pub use error::{Error, Result};
pub use sender::Sender;
pub use worker::Worker;
