use std::collections::HashMap;

use anyhow::Result;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    events::EventBus,
    queues::QueueKind,
    workers::{Worker, WorkerInputs},
};

pub struct SubscriptionSpec {
    pub subscriber_id: &'static str,
    pub inputs: Vec<InputSpec>,
}

pub struct InputSpec {
    pub event_type: &'static str,
    pub queue_kind: QueueKind,
}

impl InputSpec {
    pub fn new(event_type: &'static str, queue_kind: QueueKind) -> Self {
        Self {
            event_type,
            queue_kind,
        }
    }
}

pub struct WorkerWiring {
    inputs: HashMap<&'static str, WorkerInputs>,
}

impl WorkerWiring {
    pub fn new(inputs: HashMap<&'static str, WorkerInputs>) -> Self {
        Self { inputs }
    }

    pub fn take(&mut self, subscriber_id: &'static str) -> Option<WorkerInputs> {
        self.inputs.remove(subscriber_id)
    }

    /// Start `worker` on its own task with the inputs the builder made for it.
    pub fn spawn<W: Worker>(
        &mut self,
        worker: W,
        bus: &EventBus,
        shutdown: &broadcast::Sender<()>,
    ) -> Result<JoinHandle<Result<()>>> {
        let inputs = self.take(W::SUBSCRIBER_ID).ok_or_else(|| {
            anyhow::anyhow!("worker {} was not subscribed on the bus", W::SUBSCRIBER_ID)
        })?;
        Ok(tokio::spawn(worker.run(
            inputs,
            bus.clone(),
            shutdown.subscribe(),
        )))
    }
}
