use serde::Serialize;
use uuid::Uuid;

use crate::{events::EventHeader, types::TranscriptRequest, workers::events::header_event};

/// Transcript ready to be summarized. Sent once per completed extraction.
#[derive(Debug, Clone, Serialize)]
pub struct SummarizeRequested {
    #[serde(flatten)]
    pub header: EventHeader,
    pub session_id: Uuid,
    #[serde(flatten)]
    pub request: TranscriptRequest,
}

impl SummarizeRequested {
    pub const EVENT_TYPE: &'static str = "summarize";

    pub fn new(session_id: Uuid, request: TranscriptRequest) -> Self {
        Self {
            header: EventHeader::root(),
            session_id,
            request,
        }
    }
}

header_event!(SummarizeRequested);
