use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    events::{EnrichedEvent, EventBus},
    workers::{SubscriptionSpec, WorkerBatch, WorkerFailed, WorkerInputs},
};

/// A bus subscriber. Implementors say what they listen to and how to handle
/// one event; [`Worker::run`] does the rest.
#[async_trait]
pub trait Worker: Send + Sized + 'static {
    const SUBSCRIBER_ID: &'static str;

    fn subscription() -> SubscriptionSpec;

    async fn handle(&mut self, event: Arc<EnrichedEvent>, bus: &EventBus) -> Result<()>;

    /// Handle events until `shutdown` fires or its sender goes away. A
    /// failing handler is reported as [`WorkerFailed`] and the loop goes on.
    async fn run(
        mut self,
        mut inputs: WorkerInputs,
        bus: EventBus,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        debug!(worker = Self::SUBSCRIBER_ID, "worker started");
        loop {
            let events = tokio::select! {
                _ = shutdown.recv() => break,
                batch = inputs.next() => match batch {
                    WorkerBatch::Snapshots(updates) => {
                        updates.into_iter().map(|u| u.event).collect::<Vec<_>>()
                    }
                    WorkerBatch::FifoItem { event, .. } => vec![event],
                },
            };

            for event in events {
                if let Err(e) = self.handle(Arc::clone(&event), &bus).await {
                    warn!(
                        worker = Self::SUBSCRIBER_ID,
                        event_type = event.event_type(),
                        error = %e,
                        "handler failed"
                    );
                    // a failure report must not trigger another one
                    if event.event_type() != WorkerFailed::EVENT_TYPE {
                        bus.publish(Arc::new(WorkerFailed::new(
                            &event,
                            Self::SUBSCRIBER_ID,
                            format!("{e:#}"),
                        )));
                    }
                }
            }
        }
        debug!(worker = Self::SUBSCRIBER_ID, "worker stopped");
        Ok(())
    }
}
