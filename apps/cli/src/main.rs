use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tldw_core::{
    Config, FileSettingsStore, NavigationMonitor, Orchestrator, Panel, SessionController,
    SettingsStore, SummaryResult, TranscriptRequest,
    page::{CdpPage, IntervalChangeSource},
    workers::SummarizeRequested,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::status::{create_spinner, format_duration, mirror_panel};

mod options;
mod pipeline;
mod status;
mod workers;

#[derive(Parser)]
#[command(name = "tldw")]
#[command(about = "Summarize the YouTube video open in your browser with Google Gemini")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "tldw_core=trace". Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attach to a browser tab and summarize every video opened in it
    Attach {
        /// Chrome DevTools endpoint of a browser started with --remote-debugging-port
        #[arg(long, default_value = "http://127.0.0.1:9222")]
        cdp: String,

        /// Attach to the first tab whose URL contains this
        #[arg(long, default_value = "youtube.com")]
        tab: String,

        /// Check the page every MS milliseconds instead of watching DOM mutations
        #[arg(long, value_name = "MS")]
        poll_changes: Option<u64>,
    },

    /// Summarize a transcript from a file, or from stdin with "-"
    Summarize { input: String },

    /// Manage the stored Gemini API Key
    Options {
        #[command(subcommand)]
        action: OptionsAction,
    },
}

#[derive(Subcommand)]
enum OptionsAction {
    /// Store the API Key
    SetKey { key: String },
    /// Show the stored API Key, masked
    Show,
    /// Remove the stored API Key
    Clear,
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn banner(subtitle: &str) {
    println!(
        "\n{}  {}\n",
        style("tldw").cyan().bold(),
        style(subtitle).dim()
    );
}

async fn read_transcript(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read transcript {input}"))
    }
}

async fn attach(
    config: Config,
    endpoint: &str,
    tab: &str,
    poll_changes: Option<Duration>,
) -> Result<()> {
    banner("Video Summary");

    let spinner = create_spinner(&format!("Attaching to {endpoint}..."));
    let page = Arc::new(CdpPage::connect(endpoint, tab).await?);
    spinner.finish_with_message(format!(
        "{} Attached: {}",
        style("✓").green().bold(),
        style(&page.target().url).dim()
    ));

    let panel = Arc::new(Panel::new(page.clone()));
    panel.mount().await?;

    let sessions = SessionController::new();
    let settings: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::open_default());
    let handle = pipeline::start_attached(&config, settings, panel.clone(), sessions.clone())?;

    let orchestrator = Arc::new(Orchestrator::new(
        page.clone(),
        config.extractor.clone(),
        panel.clone(),
        handle.bus.clone(),
    ));
    let monitor = NavigationMonitor::new(
        page.clone(),
        sessions,
        orchestrator.clone(),
        &config.monitor,
    )?;

    let mut page_events = page.subscribe();
    let listener_panel = panel.clone();
    let mut page_listener = tokio::spawn(async move {
        while let Ok(event) = page_events.recv().await {
            if event.is_detached() {
                break;
            }
            if event.is_new_document() {
                // a full load wipes the injected panel
                if let Err(e) = listener_panel.restore().await {
                    debug!(error = %e, "panel restore failed");
                }
            }
            if event.is_toggle_request() {
                match listener_panel.toggle().await {
                    Ok(visible) => debug!(visible, "panel toggled"),
                    Err(e) => debug!(error = %e, "panel toggle failed"),
                }
            }
        }
    });
    let mirror = tokio::spawn(mirror_panel(panel, create_spinner("Waiting for a video...")));

    // the tab may already be showing a video
    monitor.evaluate().await;
    let watch = async {
        match poll_changes {
            Some(period) => {
                debug!(period_ms = period.as_millis() as u64, "polling for changes");
                monitor.run(IntervalChangeSource::new(period)).await
            }
            None => monitor.run(page.change_source()).await,
        }
    };
    tokio::select! {
        _ = watch => info!("tab closed"),
        _ = &mut page_listener => info!("tab closed"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    debug!(cycles_in_flight = orchestrator.in_flight(), "detaching");
    mirror.abort();
    page_listener.abort();
    handle.shutdown();
    Ok(())
}

async fn summarize(config: Config, input: &str) -> Result<()> {
    let transcript = read_transcript(input).await?;
    let transcript = transcript.trim();
    if transcript.is_empty() {
        anyhow::bail!("The transcript is empty.");
    }

    let settings: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::open_default());
    let (handle, done) = pipeline::start_one_shot(&config, settings)?;

    let started = Instant::now();
    let spinner = create_spinner(&format!("Summarizing with {}...", config.gemini.model));
    handle.bus.publish(Arc::new(SummarizeRequested::new(
        uuid::Uuid::new_v4(),
        TranscriptRequest {
            text: transcript.to_string(),
            source_url: input.to_string(),
        },
    )));

    let outcome = tokio::time::timeout(
        config.gemini.request_timeout() + Duration::from_secs(5),
        done,
    )
    .await
    .context("Timed out waiting for the summarizer")?
    .context("Summarizer stopped without replying")?;
    handle.shutdown();

    match outcome {
        Ok(SummaryResult::Summary { markdown }) => {
            spinner.finish_with_message(format!(
                "{} Summarized {}",
                style("✓").green().bold(),
                style(format!("[{}]", format_duration(started.elapsed()))).dim()
            ));
            println!("{}", style("─".repeat(60)).dim());
            println!("{markdown}");
            Ok(())
        }
        Ok(SummaryResult::Error { message }) => {
            spinner.finish_and_clear();
            anyhow::bail!(message)
        }
        Err(failure) => {
            spinner.finish_and_clear();
            anyhow::bail!("{} failed: {}", failure.worker, failure.message)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Attach {
            cdp,
            tab,
            poll_changes,
        } => {
            let config = Config::load(cli.config.as_deref()).await?;
            let poll_changes = poll_changes.filter(|ms| *ms > 0).map(Duration::from_millis);
            attach(config, &cdp, &tab, poll_changes).await
        }
        Command::Summarize { input } => {
            let config = Config::load(cli.config.as_deref()).await?;
            summarize(config, &input).await
        }
        Command::Options { action } => {
            let store = FileSettingsStore::open_default();
            debug!(path = %store.path().display(), "settings store");
            match action {
                OptionsAction::SetKey { key } => options::set_key(&store, &key).await,
                OptionsAction::Show => options::show(&store).await,
                OptionsAction::Clear => options::clear(&store).await,
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}
