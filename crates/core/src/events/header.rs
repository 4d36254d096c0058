use std::time::SystemTime;

use uuid::Uuid;

/// Identity shared by every concrete event.
#[derive(Clone, Debug, serde::Serialize)]
pub struct EventHeader {
    pub event_id: Uuid,
    pub parent_ids: Vec<Uuid>,
    pub timestamp: SystemTime,
}

impl EventHeader {
    pub fn root() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            parent_ids: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn child_of(parent_event_id: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            parent_ids: vec![parent_event_id],
            timestamp: SystemTime::now(),
        }
    }
}
