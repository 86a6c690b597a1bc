//! Latency/backlog/path CSV writers (§6), each backed by its own
//! background writer thread fed over an `mpsc` channel — the same shape as
//! the teacher's statistics collector, adapted to the three fixed formats
//! this system persists instead of one generic event schema.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex};
use std::thread;

use crate::error::Result;

enum WriterMessage {
    Row(Vec<String>),
    Shutdown,
}

struct CsvWriter {
    sender: mpsc::Sender<WriterMessage>,
}

impl CsvWriter {
    fn new(path: impl AsRef<Path>, header: &[&str]) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path.as_ref())?;
        let (tx, rx) = mpsc::channel::<WriterMessage>();
        let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();

        thread::Builder::new()
            .name(format!("csv-writer-{}", path.as_ref().display()))
            .spawn(move || {
                let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
                if let Err(err) = writer.write_record(&header) {
                    log::error!("failed to write CSV header: {err}");
                }
                for message in rx {
                    match message {
                        WriterMessage::Row(row) => {
                            if let Err(err) = writer.write_record(&row) {
                                log::error!("failed to write CSV row: {err}");
                            }
                            let _ = writer.flush();
                        }
                        WriterMessage::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn CSV writer thread");

        Ok(Self { sender: tx })
    }

    fn write_row(&self, row: Vec<String>) {
        let _ = self.sender.send(WriterMessage::Row(row));
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        let _ = self.sender.send(WriterMessage::Shutdown);
    }
}

/// `latency/{job_name}.csv`, one column `latency (ms)`. A writer is created
/// lazily the first time a given job name is logged.
pub struct LatencyLog {
    dir: PathBuf,
    writers: Mutex<HashMap<String, CsvWriter>>,
}

impl LatencyLog {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self { dir: results_dir.into().join("latency"), writers: Mutex::new(HashMap::new()) }
    }

    pub fn log(&self, job_name: &str, latency_ms: f64) -> Result<()> {
        let mut writers = self.writers.lock().expect("latency log mutex poisoned");
        if !writers.contains_key(job_name) {
            let writer = CsvWriter::new(self.dir.join(format!("{job_name}.csv")), &["latency (ms)"])?;
            writers.insert(job_name.to_string(), writer);
        }
        writers.get(job_name).expect("just inserted").write_row(vec![latency_ms.to_string()]);
        Ok(())
    }
}

/// `backlog/total_backlog.csv`: `sum_GFLOPs, avg_GFLOPs, sum_KB, avg_KB,
/// {per-edge labels...}`, one row appended per drain tick.
pub struct BacklogLog {
    writer: CsvWriter,
    edge_labels: Vec<String>,
}

impl BacklogLog {
    pub fn new(results_dir: impl Into<PathBuf>, edge_labels: Vec<String>) -> Result<Self> {
        let mut header: Vec<&str> = vec!["sum_GFLOPs", "avg_GFLOPs", "sum_KB", "avg_KB"];
        header.extend(edge_labels.iter().map(String::as_str));
        let writer = CsvWriter::new(results_dir.into().join("backlog").join("total_backlog.csv"), &header)?;
        Ok(Self { writer, edge_labels })
    }

    pub fn log(&self, sum_gflops: f64, avg_gflops: f64, sum_kb: f64, avg_kb: f64, per_edge: &HashMap<String, f64>) {
        let mut row = vec![sum_gflops.to_string(), avg_gflops.to_string(), sum_kb.to_string(), avg_kb.to_string()];
        row.extend(self.edge_labels.iter().map(|label| per_edge.get(label).copied().unwrap_or(0.0).to_string()));
        self.writer.write_row(row);
    }
}

/// `path/path.csv`: one row per scheduled job; cells are either
/// `"(computing) {ip}: {model}"` or `"(transmission) {src}->{dst}"`.
pub struct PathLog {
    writer: CsvWriter,
}

impl PathLog {
    pub fn new(results_dir: impl Into<PathBuf>) -> Result<Self> {
        let writer = CsvWriter::new(results_dir.into().join("path").join("path.csv"), &["path"])?;
        Ok(Self { writer })
    }

    pub fn log(&self, path: &[(crate::layered_graph::node::LayerNode, crate::layered_graph::node::LayerNode, String)]) {
        let row = path
            .iter()
            .map(|(source, destination, model)| {
                if source == destination {
                    format!("(computing) {}: {}", source.ip(), model)
                } else {
                    format!("(transmission) {}->{}", source.ip(), destination.ip())
                }
            })
            .collect();
        self.writer.write_row(row);
    }
}
