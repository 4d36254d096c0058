use serde::Serialize;

use crate::{
    events::{EnrichedEvent, EventHeader},
    workers::events::header_event,
};

/// A worker's handler returned an error for the event named in the parents.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerFailed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub worker: &'static str,
    pub message: String,
}

impl WorkerFailed {
    pub const EVENT_TYPE: &'static str = "worker.failed";

    pub fn new(cause: &EnrichedEvent, worker: &'static str, message: String) -> Self {
        Self {
            header: EventHeader::child_of(cause.event.event_id()),
            worker,
            message,
        }
    }
}

header_event!(WorkerFailed);
