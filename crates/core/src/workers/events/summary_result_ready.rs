use serde::Serialize;
use uuid::Uuid;

use crate::{
    events::EventHeader,
    types::SummaryResult,
    workers::events::{SummarizeRequested, header_event},
};

/// Outcome of one summarize request, success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResultReady {
    #[serde(flatten)]
    pub header: EventHeader,
    pub session_id: Uuid,
    pub source_url: String,
    pub result: SummaryResult,
}

impl SummaryResultReady {
    pub const EVENT_TYPE: &'static str = "summary_result";

    pub fn reply_to(request: &SummarizeRequested, result: SummaryResult) -> Self {
        Self {
            header: EventHeader::child_of(request.header.event_id),
            session_id: request.session_id,
            source_url: request.request.source_url.clone(),
            result,
        }
    }
}

header_event!(SummaryResultReady);
