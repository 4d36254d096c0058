use std::sync::Arc;

use async_trait::async_trait;
use tldw_core::{
    events::{EnrichedEvent, EventBus, downcast_ref},
    queues::QueueKind,
    types::SummaryResult,
    workers::{InputSpec, SubscriptionSpec, SummaryResultReady, Worker, WorkerFailed},
};
use tokio::sync::oneshot;

pub type Completion = Result<SummaryResult, WorkerFailed>;

/// Hands the first reply back to a one-shot CLI command.
pub struct CliCompletionSinkWorker {
    done: Option<oneshot::Sender<Completion>>,
}

impl CliCompletionSinkWorker {
    pub fn new(done: oneshot::Sender<Completion>) -> Self {
        Self { done: Some(done) }
    }

    fn complete(&mut self, outcome: Completion) {
        if let Some(done) = self.done.take() {
            // the command may have given up waiting
            let _ = done.send(outcome);
        }
    }
}

#[async_trait]
impl Worker for CliCompletionSinkWorker {
    const SUBSCRIBER_ID: &'static str = "cli.completion_sink";

    fn subscription() -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![
                InputSpec::new(
                    SummaryResultReady::EVENT_TYPE,
                    QueueKind::Isolated { output_buffer: 4 },
                ),
                InputSpec::new(
                    WorkerFailed::EVENT_TYPE,
                    QueueKind::FifoDropOldest { capacity: 4 },
                ),
            ],
        }
    }

    async fn handle(&mut self, event: Arc<EnrichedEvent>, _bus: &EventBus) -> anyhow::Result<()> {
        if let Some(reply) = downcast_ref::<SummaryResultReady>(&event.event) {
            self.complete(Ok(reply.result.clone()));
        } else if let Some(failure) = downcast_ref::<WorkerFailed>(&event.event) {
            self.complete(Err(failure.clone()));
        }
        Ok(())
    }
}
