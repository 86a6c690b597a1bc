use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown scheduling algorithm: {0}")]
    UnknownSchedulingAlgorithm(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("subtask already exists in virtual queue: {0}")]
    DuplicateSubtask(String),

    #[error("DNN output already exists in ahead-output queue: {0}")]
    DuplicateOutput(String),

    #[error("subtask {0} is not present in the virtual queue")]
    SubtaskNotFound(String),

    #[error("no route found from {0} to {1}")]
    NoRoute(String, String),
}

pub type Result<T> = std::result::Result<T, Error>;
