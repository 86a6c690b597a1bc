use serde::{Deserialize, Serialize};

/// Immutable description of a single originating inference request.
///
/// `start_time` (nanoseconds) doubles as the uniqueness key: two jobs with
/// the same name and the same start time are the same job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_name: String,
    pub job_type: String,
    pub input_bytes: f64,
    pub source_ip: String,
    pub terminal_destination: String,
    pub start_time: i64,
}

impl JobInfo {
    pub fn new(job_name: impl Into<String>, job_type: impl Into<String>, input_bytes: f64, source_ip: impl Into<String>, terminal_destination: impl Into<String>, start_time: i64) -> Self {
        Self { job_name: job_name.into(), job_type: job_type.into(), input_bytes, source_ip: source_ip.into(), terminal_destination: terminal_destination.into(), start_time }
    }

    pub fn job_id(&self) -> String {
        format!("{}_{}", self.job_name, self.start_time)
    }
}
