use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    error::TldwError,
    events::{EnrichedEvent, EventBus, expect},
    queues::QueueKind,
    settings::{API_KEY, SettingsStore},
    summarizer::GeminiClient,
    types::SummaryResult,
    workers::{InputSpec, SubscriptionSpec, SummarizeRequested, SummaryResultReady, Worker},
};

/// Answers every `summarize` message with exactly one `summary_result`.
pub struct SummarizeWorker {
    settings: Arc<dyn SettingsStore>,
    client: GeminiClient,
}

impl SummarizeWorker {
    pub fn new(settings: Arc<dyn SettingsStore>, client: GeminiClient) -> Self {
        Self { settings, client }
    }

    /// The key is read per request so `options set-key` applies without a
    /// restart.
    async fn api_key(&self) -> Result<String, TldwError> {
        match self.settings.get(API_KEY).await? {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(TldwError::ApiKeyMissing),
        }
    }

    pub async fn summarize(&self, transcript: &str) -> SummaryResult {
        let outcome = async {
            let key = self.api_key().await?;
            self.client.summarize(&key, transcript).await
        }
        .await;

        match outcome {
            Ok(markdown) => SummaryResult::summary(markdown),
            Err(e) => {
                warn!(error = %e, "summarization failed");
                SummaryResult::error(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Worker for SummarizeWorker {
    const SUBSCRIBER_ID: &'static str = "summarizer";

    fn subscription() -> SubscriptionSpec {
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![InputSpec::new(
                SummarizeRequested::EVENT_TYPE,
                QueueKind::FifoDropOldest { capacity: 4 },
            )],
        }
    }

    async fn handle(&mut self, event: Arc<EnrichedEvent>, bus: &EventBus) -> Result<()> {
        let request = expect::<SummarizeRequested>(&event.event, SummarizeRequested::EVENT_TYPE)?;
        info!(
            session_id = %request.session_id,
            url = %request.request.source_url,
            chars = request.request.text.chars().count(),
            model = self.client.model(),
            "summarizing transcript"
        );

        let result = self.summarize(&request.request.text).await;
        bus.publish(Arc::new(SummaryResultReady::reply_to(request, result)));
        Ok(())
    }
}
