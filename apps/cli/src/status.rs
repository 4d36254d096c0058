use std::{sync::Arc, time::Duration};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tldw_core::{Panel, PanelContent};

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

fn describe(content: &PanelContent) -> String {
    match content {
        PanelContent::Idle => "Waiting for a video...".to_string(),
        PanelContent::Progress(stage) => format!("{}...", stage.label()),
        PanelContent::Summary(_) => format!("{} Summary ready", style("✓").green().bold()),
        PanelContent::Error { message, .. } => format!("{} {}", style("✗").red().bold(), message),
    }
}

/// Mirror the panel in the terminal until the task is aborted.
pub async fn mirror_panel(panel: Arc<Panel>, spinner: ProgressBar) {
    let mut last = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        ticker.tick().await;
        let content = panel.state().content;
        if last.as_ref() != Some(&content) {
            spinner.set_message(describe(&content));
            last = Some(content);
        }
    }
}
