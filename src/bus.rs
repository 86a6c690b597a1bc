//! The publish/subscribe transport seam (§6). The crate ships one
//! implementation, [`LocalBus`]: an in-process registry of `(host, topic) →
//! actor thread`, the same directory-of-senders shape the original
//! component registry used for routing requests between in-process actors.
//! A networked implementation is a drop-in seam, not built here.

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use crate::error::Result;

pub trait Bus: Send + Sync {
    /// Registers `handler` to run, on its own thread, for every message
    /// published to `(host, topic)`.
    fn subscribe(&self, host: &str, topic: &str, handler: Box<dyn Fn(Vec<u8>) + Send + 'static>);

    /// Publishes `payload` to every subscriber of `(host, topic)`. An
    /// unreachable host (no subscriber registered) is not an error.
    fn publish_to(&self, host: &str, topic: &str, payload: &[u8]) -> Result<()>;
}

type Directory = Mutex<HashMap<(String, String), Vec<mpsc::Sender<Vec<u8>>>>>;

/// In-process bus suitable for the test suite and single-process
/// multi-node simulation: each `subscribe` call spawns an actor thread that
/// owns its handler and drains an `mpsc::Receiver` fed by `publish_to`.
pub struct LocalBus {
    directory: Arc<Directory>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self { directory: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, host: &str, topic: &str, handler: Box<dyn Fn(Vec<u8>) + Send + 'static>) {
        let (tx, rx) = mpsc::channel::<Vec<u8>>();

        {
            let mut directory = self.directory.lock().expect("bus directory mutex poisoned");
            directory.entry((host.to_string(), topic.to_string())).or_default().push(tx);
        }

        let actor_name = format!("bus-{host}-{topic}");
        thread::Builder::new()
            .name(actor_name)
            .spawn(move || {
                while let Ok(payload) = rx.recv() {
                    handler(payload);
                }
            })
            .expect("failed to spawn bus actor thread");
    }

    fn publish_to(&self, host: &str, topic: &str, payload: &[u8]) -> Result<()> {
        let directory = self.directory.lock().expect("bus directory mutex poisoned");
        if let Some(senders) = directory.get(&(host.to_string(), topic.to_string())) {
            for sender in senders {
                let _ = sender.send(payload.to_vec());
            }
        }
        Ok(())
    }
}
