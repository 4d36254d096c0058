use std::sync::Arc;

use anyhow::Result;
use tldw_core::{
    Config, GeminiClient, Panel, PanelResultWorker, SessionController, SettingsStore,
    SummarizeWorker,
    events::{BusConfig, EventBus, EventBusBuilder},
    workers::{SummarizeRequested, Worker},
};
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use crate::workers::cli_completion_sink::{CliCompletionSinkWorker, Completion};

pub struct PipelineHandle {
    pub bus: EventBus,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl PipelineHandle {
    pub fn shutdown(&self) {
        debug!(
            summarizer_drops = self.bus.drops(SummarizeWorker::SUBSCRIBER_ID),
            panel_drops = self.bus.drops(PanelResultWorker::SUBSCRIBER_ID),
            unrouted = self.bus.metrics().unrouted(),
            "stopping workers"
        );
        // no receivers left means every worker already stopped
        let _ = self.shutdown_tx.send(());
    }
}

/// Summarizer plus the panel sink, for `attach`.
pub fn start_attached(
    config: &Config,
    settings: Arc<dyn SettingsStore>,
    panel: Arc<Panel>,
    sessions: SessionController,
) -> Result<PipelineHandle> {
    let (bus, mut wiring, tasks) = EventBusBuilder::new(BusConfig::default())
        .subscribe(SummarizeWorker::subscription())
        .subscribe(PanelResultWorker::subscription())
        .build()?;
    // start isolated drain tasks BEFORE sources publish anything
    tasks.spawn_all();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let client = GeminiClient::new(&config.gemini)?;
    wiring.spawn(SummarizeWorker::new(settings, client), &bus, &shutdown_tx)?;
    wiring.spawn(PanelResultWorker::new(panel, sessions), &bus, &shutdown_tx)?;
    debug!(
        subscribers = ?bus.subscribers(SummarizeRequested::EVENT_TYPE),
        "summarize requests routed"
    );

    Ok(PipelineHandle { bus, shutdown_tx })
}

/// Summarizer plus a completion sink, for `summarize`.
pub fn start_one_shot(
    config: &Config,
    settings: Arc<dyn SettingsStore>,
) -> Result<(PipelineHandle, oneshot::Receiver<Completion>)> {
    let (bus, mut wiring, tasks) = EventBusBuilder::new(BusConfig::default())
        .subscribe(SummarizeWorker::subscription())
        .subscribe(CliCompletionSinkWorker::subscription())
        .build()?;
    tasks.spawn_all();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (done_tx, done_rx) = oneshot::channel();
    let client = GeminiClient::new(&config.gemini)?;
    wiring.spawn(SummarizeWorker::new(settings, client), &bus, &shutdown_tx)?;
    wiring.spawn(CliCompletionSinkWorker::new(done_tx), &bus, &shutdown_tx)?;

    Ok((PipelineHandle { bus, shutdown_tx }, done_rx))
}
