//! Optional background persistence of accepted states.
//!
//! The step loop itself is single-threaded; the only concurrency allowed
//! around it is this consumer. Accepted states are deep-cloned and handed
//! over a channel strictly after validation, so the consumer can never
//! observe an in-progress step's working buffers.

use std::sync::mpsc::{channel, Sender};
use std::thread::JoinHandle;

use log::warn;
use serde::Serialize;

use crate::state::ReservoirState;

/// A fully computed, validated state plus the step diagnostics it was
/// accepted with.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub state: ReservoirState,
}

/// Receives accepted snapshots on a background thread. Implementations
/// typically serialize to storage; the format is entirely theirs.
pub trait SnapshotConsumer: Send {
    fn consume(&mut self, snapshot: Snapshot);
}

impl<F: FnMut(Snapshot) + Send> SnapshotConsumer for F {
    fn consume(&mut self, snapshot: Snapshot) {
        self(snapshot)
    }
}

/// Handle to the consumer thread. Dropping it closes the channel and joins.
pub struct BackgroundWriter {
    tx: Option<Sender<Snapshot>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWriter {
    /// Spawn `consumer` on its own thread.
    pub fn spawn<C: SnapshotConsumer + 'static>(mut consumer: C) -> Self {
        let (tx, rx) = channel::<Snapshot>();
        let handle = std::thread::spawn(move || {
            for snapshot in rx {
                consumer.consume(snapshot);
            }
        });
        Self { tx: Some(tx), handle: Some(handle) }
    }

    /// Hand a snapshot to the consumer. A disappeared consumer is logged
    /// and ignored: persistence is advisory, stepping is not.
    pub fn offer(&self, snapshot: Snapshot) {
        if let Some(tx) = &self.tx {
            if tx.send(snapshot).is_err() {
                warn!("snapshot consumer is gone; dropping snapshot");
            }
        }
    }

    /// Close the channel and wait for the consumer to drain.
    pub fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("snapshot consumer panicked");
            }
        }
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn snapshots_arrive_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let writer = BackgroundWriter::spawn(move |s: Snapshot| {
            sink.lock().unwrap().push(s.step);
        });
        for step in 1..=5 {
            writer.offer(Snapshot {
                step,
                time: step as f64,
                dt: 1.0,
                state: ReservoirState::uniform(2, 1.0e7, 0.3),
            });
        }
        writer.finish();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }
}
