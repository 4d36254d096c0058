use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::{
    events::{BusConfig, BusMetrics, EnrichedEvent, Event},
    routes::{Delivery, Routes},
};

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

pub struct EventBusInner {
    session_id: Uuid,
    next_ingest_seq: AtomicU64,
    routes: Arc<Routes>,
    metrics: Arc<BusMetrics>,
    strict_routing: bool,
}

impl EventBus {
    pub fn new(cfg: BusConfig, routes: Routes, metrics: Arc<BusMetrics>) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                session_id: cfg.session_id,
                next_ingest_seq: AtomicU64::new(0),
                routes: Arc::new(routes),
                metrics,
                strict_routing: cfg.strict_routing,
            }),
        }
    }

    /// Fire-and-forget delivery to every subscriber of the event's type.
    pub fn publish(&self, event: Arc<dyn Event>) {
        let ingest_ns = self.inner.next_ingest_seq.fetch_add(1, Ordering::Relaxed);
        trace!(
            event_type = event.event_type(),
            schema = event.schema_version(),
            subscribers = ?self.subscribers(event.event_type()),
            payload = %serde_json::to_string(&*event).unwrap_or_default(),
            "publish"
        );

        let enriched_event = Arc::new(EnrichedEvent {
            event,
            session_id: self.inner.session_id,
            ingest_ns,
            ingested_at: Instant::now(),
        });

        let Some(routes) = self
            .inner
            .routes
            .table
            .get(enriched_event.event_type())
        else {
            self.inner
                .metrics
                .record_unrouted(enriched_event.event_type());

            if self.inner.strict_routing {
                panic!("Unrouted event type: {}", enriched_event.event_type());
            }

            return;
        };

        for route in routes {
            match route.inbox.try_deliver(Arc::clone(&enriched_event)) {
                Delivery::Accepted => {}
                Delivery::Displaced => {
                    route.drops_total.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        subscriber = route.subscriber_id,
                        event_type = enriched_event.event_type(),
                        "older event displaced"
                    );
                }
                Delivery::Refused => {
                    route.drops_total.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscriber = route.subscriber_id,
                        event_type = enriched_event.event_type(),
                        "inbox full, event dropped"
                    );
                }
            }
        }
    }

    /// Events a subscriber lost to overflow so far.
    pub fn drops(&self, subscriber_id: &str) -> u64 {
        self.inner
            .routes
            .table
            .values()
            .flatten()
            .filter(|r| r.subscriber_id == subscriber_id)
            .map(|r| r.drops_total.load(Ordering::Relaxed))
            .sum()
    }

    /// Subscriber ids routed `event_type`, in subscription order.
    pub fn subscribers(&self, event_type: &str) -> Vec<&'static str> {
        self.inner.routes.subscribers(event_type).collect()
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.inner.metrics
    }
}
