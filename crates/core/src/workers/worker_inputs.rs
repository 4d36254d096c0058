use std::sync::Arc;

use tokio::sync::{Notify, mpsc};

use crate::{
    events::EnrichedEvent,
    queues::{FifoDropOldestReceiver, Latest1Queue},
};

pub struct Latest1Input {
    pub event_type: &'static str,
    pub queue: Arc<Latest1Queue<Arc<EnrichedEvent>>>,
}

pub enum FifoReceiver {
    FifoDropOldest(FifoDropOldestReceiver<Arc<EnrichedEvent>>),
    Isolated(mpsc::Receiver<Arc<EnrichedEvent>>),
}

impl FifoReceiver {
    fn try_recv(&mut self) -> Option<Arc<EnrichedEvent>> {
        match self {
            FifoReceiver::FifoDropOldest(r) => r.try_recv(),
            FifoReceiver::Isolated(r) => r.try_recv().ok(),
        }
    }
}

pub struct FifoInput {
    pub event_type: &'static str,
    pub receiver: FifoReceiver,
}

/// Every inbox of one subscriber, woken through a shared [`Notify`].
pub struct WorkerInputs {
    pub latest: Vec<Latest1Input>,
    pub fifos: Vec<FifoInput>,
    pub notify_any: Arc<Notify>,
    pub fifo_index: usize,
}

pub enum WorkerBatch {
    /// Fresh values from latest-only inputs, at most one per event type.
    Snapshots(Vec<SnapshotUpdate>),
    FifoItem {
        event_type: &'static str,
        event: Arc<EnrichedEvent>,
    },
}

pub struct SnapshotUpdate {
    pub event_type: &'static str,
    pub event: Arc<EnrichedEvent>,
}

impl WorkerInputs {
    fn poll_latest(&self) -> Vec<SnapshotUpdate> {
        self.latest
            .iter()
            .filter_map(|l| {
                l.queue.try_recv().map(|event| SnapshotUpdate {
                    event_type: l.event_type,
                    event,
                })
            })
            .collect()
    }

    /// Round-robin over the FIFO inputs so one busy type cannot starve the
    /// others.
    fn poll_fifos(&mut self) -> Option<WorkerBatch> {
        let count = self.fifos.len();
        for _ in 0..count {
            let i = self.fifo_index;
            self.fifo_index = (self.fifo_index + 1) % count;
            let fifo = &mut self.fifos[i];
            if let Some(event) = fifo.receiver.try_recv() {
                return Some(WorkerBatch::FifoItem {
                    event_type: fifo.event_type,
                    event,
                });
            }
        }
        None
    }

    /// Wait for the next batch. Snapshots take priority over FIFO items.
    pub async fn next(&mut self) -> WorkerBatch {
        loop {
            let snaps = self.poll_latest();
            if !snaps.is_empty() {
                return WorkerBatch::Snapshots(snaps);
            }
            if let Some(item) = self.poll_fifos() {
                return item;
            }
            self.notify_any.notified().await;
        }
    }
}
