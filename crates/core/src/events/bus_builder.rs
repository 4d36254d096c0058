use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::Result;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::{
    events::{EnrichedEvent, EventBus},
    queues::{FifoDropOldestQueue, IsolatedForwarder, Latest1Queue, QueueKind, StartupTasks},
    routes::{Route, RouteInbox, Routes},
    workers::{
        FifoInput, FifoReceiver, InputSpec, Latest1Input, SubscriptionSpec, WorkerInputs,
        WorkerWiring,
    },
};

pub struct BusConfig {
    pub session_id: Uuid,
    pub strict_routing: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            strict_routing: false,
        }
    }
}

#[derive(Default)]
pub struct BusMetrics {
    pub unrouted_publish_total: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_unrouted(&self, evt: &'static str) {
        self.unrouted_publish_total.fetch_add(1, Ordering::Relaxed);
        debug!(event_type = evt, "no subscriber for event");
    }

    pub fn unrouted(&self) -> u64 {
        self.unrouted_publish_total.load(Ordering::Relaxed)
    }
}

fn validate(subs: &[SubscriptionSpec]) -> Result<()> {
    use std::collections::HashSet;

    let mut seen_subscribers: HashSet<&'static str> = HashSet::new();
    for s in subs {
        if s.subscriber_id.trim().is_empty() {
            anyhow::bail!("empty subscriber_id");
        }
        if !seen_subscribers.insert(s.subscriber_id) {
            anyhow::bail!("duplicate subscriber_id={}", s.subscriber_id);
        }
        if s.inputs.is_empty() {
            anyhow::bail!("subscriber_id={} has no inputs", s.subscriber_id);
        }

        let mut seen_inputs: HashSet<&'static str> = HashSet::new();
        for i in &s.inputs {
            if i.event_type.trim().is_empty() {
                anyhow::bail!("subscriber_id={} has empty event_type", s.subscriber_id);
            }
            if !seen_inputs.insert(i.event_type) {
                anyhow::bail!(
                    "subscriber_id={} has duplicate input event_type={}",
                    s.subscriber_id,
                    i.event_type
                );
            }

            match i.queue_kind {
                QueueKind::Latest1 => {}
                QueueKind::FifoDropOldest { capacity } => {
                    anyhow::ensure!(capacity > 0, "capacity must be > 0")
                }
                QueueKind::Isolated { output_buffer } => {
                    anyhow::ensure!(output_buffer > 0, "output_buffer must be > 0")
                }
            }
        }
    }
    Ok(())
}

pub struct EventBusBuilder {
    cfg: BusConfig,
    subs: Vec<SubscriptionSpec>,
}

impl EventBusBuilder {
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            cfg,
            subs: Vec::new(),
        }
    }

    pub fn subscribe(mut self, s: SubscriptionSpec) -> Self {
        self.subs.push(s);
        self
    }

    /// Validate the subscriptions and create one inbox per subscribed input.
    /// The returned startup tasks have to be spawned before anything is
    /// published.
    pub fn build(self) -> Result<(EventBus, WorkerWiring, StartupTasks)> {
        validate(&self.subs)?;

        let mut table: HashMap<&'static str, Vec<Route>> = HashMap::new();
        let mut wiring: HashMap<&'static str, WorkerInputs> = HashMap::new();
        let mut tasks = StartupTasks { tokio: Vec::new() };

        for spec in self.subs {
            let mut inputs = WorkerInputs {
                latest: Vec::new(),
                fifos: Vec::new(),
                notify_any: Arc::new(Notify::new()),
                fifo_index: 0,
            };
            for input in spec.inputs {
                let inbox = wire_input(&input, &mut inputs, &mut tasks);
                table.entry(input.event_type).or_default().push(Route {
                    subscriber_id: spec.subscriber_id,
                    inbox,
                    drops_total: Arc::new(AtomicU64::new(0)),
                });
            }
            debug!(
                subscriber = spec.subscriber_id,
                latest = inputs.latest.len(),
                fifos = inputs.fifos.len(),
                "subscriber wired"
            );
            wiring.insert(spec.subscriber_id, inputs);
        }

        let metrics = Arc::new(BusMetrics::new());
        let bus = EventBus::new(self.cfg, Routes { table }, metrics);
        Ok((bus, WorkerWiring::new(wiring), tasks))
    }
}

/// Create the queue for one input: the sending half becomes the route's
/// inbox, the receiving half joins the subscriber's inputs.
fn wire_input(
    input: &InputSpec,
    inputs: &mut WorkerInputs,
    tasks: &mut StartupTasks,
) -> RouteInbox {
    let notify_any = Arc::clone(&inputs.notify_any);
    match input.queue_kind {
        QueueKind::Latest1 => {
            let queue = Arc::new(Latest1Queue::new(notify_any));
            inputs.latest.push(Latest1Input {
                event_type: input.event_type,
                queue: Arc::clone(&queue),
            });
            RouteInbox::Latest1(queue)
        }
        QueueKind::FifoDropOldest { capacity } => {
            let queue = Arc::new(FifoDropOldestQueue::new(capacity, notify_any));
            inputs.fifos.push(FifoInput {
                event_type: input.event_type,
                receiver: FifoReceiver::FifoDropOldest(queue.receiver()),
            });
            RouteInbox::FifoDropOldest(queue)
        }
        QueueKind::Isolated { output_buffer } => {
            let (forwarder, out_rx, drain_task) =
                IsolatedForwarder::<Arc<EnrichedEvent>>::new(output_buffer, notify_any);
            tasks.tokio.push(drain_task);
            inputs.fifos.push(FifoInput {
                event_type: input.event_type,
                receiver: FifoReceiver::Isolated(out_rx),
            });
            RouteInbox::Isolated(forwarder)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::{EventHeader, expect},
        workers::{InputSpec, WorkerBatch, events::WorkerFailed},
    };

    fn spec(id: &'static str, kind: QueueKind) -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: id,
            inputs: vec![InputSpec {
                event_type: WorkerFailed::EVENT_TYPE,
                queue_kind: kind,
            }],
        }
    }

    fn failure(message: &str) -> Arc<WorkerFailed> {
        Arc::new(WorkerFailed {
            header: EventHeader::root(),
            worker: "test",
            message: message.to_string(),
        })
    }

    #[test]
    fn rejects_duplicate_subscribers() {
        let result = EventBusBuilder::new(BusConfig::default())
            .subscribe(spec("a", QueueKind::Latest1))
            .subscribe(spec("a", QueueKind::Latest1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_capacity() {
        let result = EventBusBuilder::new(BusConfig::default())
            .subscribe(spec("a", QueueKind::FifoDropOldest { capacity: 0 }))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn unrouted_events_are_counted() {
        let (bus, _, _) = EventBusBuilder::new(BusConfig::default()).build().unwrap();
        bus.publish(failure("nobody listens"));
        assert_eq!(bus.metrics().unrouted(), 1);
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber() {
        let (bus, mut wiring, _) = EventBusBuilder::new(BusConfig::default())
            .subscribe(spec("latest", QueueKind::Latest1))
            .subscribe(spec("fifo", QueueKind::FifoDropOldest { capacity: 2 }))
            .build()
            .unwrap();

        assert_eq!(bus.subscribers(WorkerFailed::EVENT_TYPE), vec!["latest", "fifo"]);
        assert!(bus.subscribers("nothing.routes.this").is_empty());

        bus.publish(failure("one"));
        bus.publish(failure("two"));
        bus.publish(failure("three"));
        assert_eq!(bus.drops("latest"), 2);
        assert_eq!(bus.drops("fifo"), 1);
        assert_eq!(bus.drops("nobody"), 0);

        let mut latest = wiring.take("latest").unwrap();
        match latest.next().await {
            WorkerBatch::Snapshots(snaps) => {
                assert_eq!(snaps.len(), 1);
                let e = expect::<WorkerFailed>(&snaps[0].event.event, WorkerFailed::EVENT_TYPE)
                    .unwrap();
                assert_eq!(e.message, "three");
            }
            WorkerBatch::FifoItem { .. } => panic!("expected snapshot"),
        }

        let mut fifo = wiring.take("fifo").unwrap();
        let mut seen = Vec::new();
        for _ in 0..2 {
            match fifo.next().await {
                WorkerBatch::FifoItem { event, .. } => {
                    let e = expect::<WorkerFailed>(&event.event, WorkerFailed::EVENT_TYPE).unwrap();
                    seen.push(e.message.clone());
                }
                WorkerBatch::Snapshots(_) => panic!("expected fifo item"),
            }
        }
        // capacity 2 drops the oldest
        assert_eq!(seen, vec!["two", "three"]);
    }
}
