/// Implements [`Event`](crate::events::Event) for a struct with a `header`
/// field and an associated `EVENT_TYPE`.
macro_rules! header_event {
    ($ty:ty) => {
        impl $crate::events::Event for $ty {
            fn event_id(&self) -> uuid::Uuid {
                self.header.event_id
            }

            fn parent_ids(&self) -> &[uuid::Uuid] {
                &self.header.parent_ids
            }

            fn event_type(&self) -> &'static str {
                <$ty>::EVENT_TYPE
            }

            fn timestamp(&self) -> std::time::SystemTime {
                self.header.timestamp
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

pub(crate) use header_event;

pub mod summarize_requested;
pub mod summary_result_ready;
pub mod worker_failed;

pub use summarize_requested::*;
pub use summary_result_ready::*;
pub use worker_failed::*;
