use std::{any::Any, sync::Arc, time::SystemTime};

use erased_serde::Serialize as ErasedSerialize;
use tokio::time::Instant;
use uuid::Uuid;

/// A message on the bus. The content side and the background side only talk
/// through these.
pub trait Event: Send + Sync + ErasedSerialize + 'static {
    fn event_id(&self) -> Uuid;
    fn parent_ids(&self) -> &[Uuid];
    fn event_type(&self) -> &'static str;
    fn timestamp(&self) -> SystemTime;

    fn schema_version(&self) -> u32 {
        1
    }

    fn as_any(&self) -> &dyn Any;
}

erased_serde::serialize_trait_object!(Event);

/// An event as delivered: the payload plus what the bus knows about it.
pub struct EnrichedEvent {
    pub event: Arc<dyn Event>,
    /// Publish order on this bus.
    pub ingest_ns: u64,
    pub session_id: Uuid,
    pub ingested_at: Instant,
}

impl EnrichedEvent {
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

pub fn downcast_ref<T: 'static>(e: &Arc<dyn Event>) -> Option<&T> {
    e.as_any().downcast_ref::<T>()
}

/// Downcast for handlers that subscribe to a single type, where anything else
/// is a wiring mistake.
pub fn expect<'a, T: 'static>(
    e: &'a Arc<dyn Event>,
    expected_event_type: &'static str,
) -> anyhow::Result<&'a T> {
    match downcast_ref::<T>(e) {
        Some(event) => Ok(event),
        None => anyhow::bail!(
            "expected event_type={expected_event_type}, got={}",
            e.event_type()
        ),
    }
}
