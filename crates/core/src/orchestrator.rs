//! Drives one summary cycle and renders what comes back.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{
    config::ExtractorConfig,
    error::Result,
    events::{EnrichedEvent, EventBus, expect},
    extractor::TranscriptExtractor,
    page::Page,
    panel::{Panel, PanelContent},
    queues::QueueKind,
    session::{SessionController, SessionGuard},
    types::{Stage, TranscriptRequest},
    workers::{
        InputSpec, SubscriptionSpec, SummarizeRequested, SummaryResultReady, Worker, WorkerFailed,
    },
};

pub struct Orchestrator {
    extractor: TranscriptExtractor,
    panel: Arc<Panel>,
    bus: EventBus,
    in_flight: AtomicUsize,
}

/// Counts a cycle as running until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Orchestrator {
    pub fn new(
        page: Arc<dyn Page>,
        config: ExtractorConfig,
        panel: Arc<Panel>,
        bus: EventBus,
    ) -> Self {
        Self {
            extractor: TranscriptExtractor::new(page, config),
            panel,
            bus,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Cycles currently inside [`Orchestrator::run_cycle`].
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Extract the transcript for the guarded session and hand it to the
    /// summarizer. Errors are shown in the panel before being returned. The
    /// session is released when this returns, whatever the outcome.
    pub async fn run_cycle(&self, guard: SessionGuard) -> Result<()> {
        let _running = InFlight::enter(&self.in_flight);
        let session = guard.session().clone();
        info!(session_id = %session.id, url = %session.url, "summary cycle started");

        let transcript = match self.extract().await {
            Ok(text) => text,
            Err(e) => {
                error!(session_id = %session.id, url = %session.url, error = %e, "summary cycle failed");
                self.panel.show_error(&e).await;
                self.extractor.close_transcript().await;
                return Err(e);
            }
        };

        self.panel.show_progress(Stage::Summarizing).await;
        self.bus.publish(Arc::new(SummarizeRequested::new(
            session.id,
            TranscriptRequest {
                text: transcript,
                source_url: session.url.clone(),
            },
        )));
        self.extractor.close_transcript().await;

        info!(session_id = %session.id, "transcript dispatched");
        drop(guard);
        Ok(())
    }

    async fn extract(&self) -> Result<String> {
        self.panel.show_progress(Stage::ExpandingDescription).await;
        self.extractor.expand_description().await?;

        self.panel.show_progress(Stage::OpeningTranscript).await;
        self.extractor.open_transcript().await?;

        self.panel.show_progress(Stage::ReadingTranscript).await;
        self.extractor.read_transcript().await
    }
}

/// Renders `summary_result` replies and worker failures into the panel.
pub struct PanelResultWorker {
    panel: Arc<Panel>,
    sessions: SessionController,
}

impl PanelResultWorker {
    pub fn new(panel: Arc<Panel>, sessions: SessionController) -> Self {
        Self { panel, sessions }
    }
}

#[async_trait]
impl Worker for PanelResultWorker {
    const SUBSCRIBER_ID: &'static str = "panel";

    fn subscription() -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![
                InputSpec::new(SummaryResultReady::EVENT_TYPE, QueueKind::Latest1),
                InputSpec::new(
                    WorkerFailed::EVENT_TYPE,
                    QueueKind::FifoDropOldest { capacity: 8 },
                ),
            ],
        }
    }

    async fn handle(&mut self, event: Arc<EnrichedEvent>, _bus: &EventBus) -> AnyResult<()> {
        match event.event_type() {
            SummaryResultReady::EVENT_TYPE => {
                let reply =
                    expect::<SummaryResultReady>(&event.event, SummaryResultReady::EVENT_TYPE)?;
                if self.sessions.last_url().as_deref() != Some(reply.source_url.as_str()) {
                    warn!(
                        session_id = %reply.session_id,
                        url = %reply.source_url,
                        "rendering summary for a video that is no longer current"
                    );
                }
                self.panel.show_result(&reply.result).await;
            }
            WorkerFailed::EVENT_TYPE => {
                let failure = expect::<WorkerFailed>(&event.event, WorkerFailed::EVENT_TYPE)?;
                self.panel
                    .render(PanelContent::Error {
                        message: "Something went wrong.".to_string(),
                        detail: format!("{}: {}", failure.worker, failure.message),
                    })
                    .await?;
            }
            other => anyhow::bail!("unexpected event_type={other}"),
        }
        Ok(())
    }
}
