use std::{
    collections::HashMap,
    sync::{Arc, atomic::AtomicU64},
};

use crate::{
    events::EnrichedEvent,
    queues::{FifoDropOldestQueue, IsolatedForwarder, Latest1Queue},
};

/// Event type to the inboxes subscribed to it.
pub struct Routes {
    pub table: HashMap<&'static str, Vec<Route>>,
}

impl Routes {
    pub fn subscribers(&self, event_type: &str) -> impl Iterator<Item = &'static str> + '_ {
        self.table
            .get(event_type)
            .into_iter()
            .flatten()
            .map(|r| r.subscriber_id)
    }
}

pub struct Route {
    pub subscriber_id: &'static str,
    pub inbox: RouteInbox,
    pub drops_total: Arc<AtomicU64>,
}

pub enum RouteInbox {
    Latest1(Arc<Latest1Queue<Arc<EnrichedEvent>>>),
    FifoDropOldest(Arc<FifoDropOldestQueue<Arc<EnrichedEvent>>>),
    Isolated(IsolatedForwarder<Arc<EnrichedEvent>>),
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    /// Accepted, but an older undelivered event was discarded for it.
    Displaced,
    Refused,
}

impl RouteInbox {
    pub fn try_deliver(&self, event: Arc<EnrichedEvent>) -> Delivery {
        match self {
            RouteInbox::Latest1(q) => match q.set(event) {
                Some(_) => Delivery::Displaced,
                None => Delivery::Accepted,
            },
            RouteInbox::FifoDropOldest(q) => match q.push_overwrite(event) {
                Some(_) => Delivery::Displaced,
                None => Delivery::Accepted,
            },
            RouteInbox::Isolated(fwd) => match fwd.try_send(event) {
                Ok(()) => Delivery::Accepted,
                Err(_) => Delivery::Refused,
            },
        }
    }
}
