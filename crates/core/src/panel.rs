//! The injected summary panel.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::{
    error::{PageError, TldwError},
    format::{escape_html, render_markdown},
    page::PanelSurface,
    types::{Stage, SummaryResult},
};

pub const PANEL_ID: &str = "tldw-panel";
pub const CONTENT_ID: &str = "tldw-summary-content";
pub const TOGGLE_ID: &str = "tldw-toggle-panel";

const PANEL_CHROME: &str = r#"<style>
#tldw-panel { position: fixed; top: 72px; right: 16px; width: 380px; max-height: 75vh; overflow-y: auto; z-index: 9999; background: #212121; color: #f1f1f1; border-radius: 12px; padding: 12px 16px; font: 14px/1.5 Roboto, Arial, sans-serif; box-shadow: 0 4px 24px rgba(0, 0, 0, 0.5); opacity: 0.6; transition: opacity 0.3s ease; }
#tldw-panel.visible { opacity: 1; }
#tldw-panel:not(.visible) #tldw-summary-content { display: none; }
#tldw-panel h2 { display: flex; justify-content: space-between; align-items: center; margin: 0 0 8px; font-size: 16px; }
#tldw-toggle-panel { background: none; border: none; color: inherit; font-size: 20px; cursor: pointer; }
#tldw-panel .tldw-error { color: #ffaaaa; }
#tldw-panel .tldw-error-detail { color: #aaaaaa; font-size: 12px; }
</style>
<h2>
  <span>Video Summary</span>
  <button id="tldw-toggle-panel" title="Hide/Show Panel">&times;</button>
</h2>
<div id="tldw-summary-content"></div>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelContent {
    Idle,
    Progress(Stage),
    /// Already rendered HTML.
    Summary(String),
    Error { message: String, detail: String },
}

impl PanelContent {
    pub fn from_result(result: &SummaryResult) -> Self {
        match result {
            SummaryResult::Summary { markdown } => PanelContent::Summary(render_markdown(markdown)),
            SummaryResult::Error { message } => PanelContent::Error {
                message: message.clone(),
                detail: String::new(),
            },
        }
    }

    pub fn from_error(err: &TldwError) -> Self {
        PanelContent::Error {
            message: err.user_message().to_string(),
            detail: err.detail(),
        }
    }

    pub fn to_html(&self) -> String {
        match self {
            PanelContent::Idle => {
                r#"<div class="tldw-idle">Open a video to see its summary.</div>"#.to_string()
            }
            PanelContent::Progress(stage) => {
                format!(r#"<div class="tldw-loader">{}...</div>"#, capitalize(stage.label()))
            }
            PanelContent::Summary(html) => html.clone(),
            PanelContent::Error { message, detail } => {
                let mut html = format!(r#"<p class="tldw-error">{}</p>"#, escape_html(message));
                if !detail.is_empty() {
                    html.push_str(&format!(
                        r#"<p class="tldw-error-detail">{}</p>"#,
                        escape_html(detail)
                    ));
                }
                html
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelState {
    pub visible: bool,
    pub content: PanelContent,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            visible: false,
            content: PanelContent::Idle,
        }
    }
}

pub struct Panel {
    surface: Arc<dyn PanelSurface>,
    state: Mutex<PanelState>,
}

impl Panel {
    pub fn new(surface: Arc<dyn PanelSurface>) -> Self {
        Self {
            surface,
            state: Mutex::new(PanelState::default()),
        }
    }

    pub fn state(&self) -> PanelState {
        self.state.lock().expect("panel state poisoned").clone()
    }

    /// Inject the panel and show it.
    pub async fn mount(&self) -> Result<(), PageError> {
        self.state.lock().expect("panel state poisoned").visible = true;
        self.restore().await
    }

    /// Inject the panel again with its current content and visibility, for
    /// when the host replaced the whole document. The surface skips the
    /// injection if the panel is still there.
    pub async fn restore(&self) -> Result<(), PageError> {
        let PanelState { visible, content } = self.state();
        self.surface.mount(PANEL_CHROME).await?;
        self.surface.set_content(&content.to_html()).await?;
        self.surface.set_visible(visible).await
    }

    /// Replace the content region. Rendering the same content twice leaves the
    /// panel unchanged. A panel lost to a document load is mounted again.
    pub async fn render(&self, content: PanelContent) -> Result<(), PageError> {
        let html = content.to_html();
        self.state.lock().expect("panel state poisoned").content = content;
        match self.surface.set_content(&html).await {
            Err(PageError::PanelMissing) => {
                debug!("panel missing from document, mounting again");
                self.restore().await
            }
            other => other,
        }
    }

    /// Flip visibility. Purely presentational.
    pub async fn toggle(&self) -> Result<bool, PageError> {
        let visible = {
            let mut state = self.state.lock().expect("panel state poisoned");
            state.visible = !state.visible;
            state.visible
        };
        self.surface.set_visible(visible).await?;
        Ok(visible)
    }

    pub async fn show_progress(&self, stage: Stage) {
        self.render_logged(PanelContent::Progress(stage)).await;
    }

    pub async fn show_result(&self, result: &SummaryResult) {
        self.render_logged(PanelContent::from_result(result)).await;
    }

    pub async fn show_error(&self, err: &TldwError) {
        self.render_logged(PanelContent::from_error(err)).await;
    }

    async fn render_logged(&self, content: PanelContent) {
        if let Err(e) = self.render(content).await {
            warn!(error = %e, "panel update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::MemorySurface;

    fn panel() -> (Arc<MemorySurface>, Panel) {
        let surface = Arc::new(MemorySurface::new());
        let panel = Panel::new(surface.clone());
        (surface, panel)
    }

    #[tokio::test]
    async fn summary_renders_markup() {
        let (surface, panel) = panel();
        panel.show_result(&SummaryResult::summary("**Bold** point")).await;
        assert!(surface.content().contains("<strong>Bold</strong>"));
    }

    #[tokio::test]
    async fn error_renders_as_text() {
        let (surface, panel) = panel();
        panel.show_result(&SummaryResult::error("<script>")).await;
        let html = surface.content();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn progress_shows_stage_label() {
        let (surface, panel) = panel();
        panel.show_progress(Stage::ReadingTranscript).await;
        assert_eq!(
            surface.content(),
            r#"<div class="tldw-loader">Reading transcript...</div>"#
        );
        assert_eq!(
            panel.state().content,
            PanelContent::Progress(Stage::ReadingTranscript)
        );
    }

    #[tokio::test]
    async fn render_is_idempotent() {
        let (surface, panel) = panel();
        panel.render(PanelContent::Summary("<p>x</p>".into())).await.unwrap();
        let first = surface.content();
        panel.render(PanelContent::Summary("<p>x</p>".into())).await.unwrap();
        assert_eq!(first, surface.content());
    }

    #[tokio::test]
    async fn mount_shows_and_toggle_flips() {
        let (surface, panel) = panel();
        panel.mount().await.unwrap();
        assert_eq!(surface.mounts(), 1);
        assert!(surface.is_visible());
        assert!(surface.content().contains("Open a video"));

        assert!(!panel.toggle().await.unwrap());
        assert!(!surface.is_visible());
        assert!(panel.toggle().await.unwrap());
        assert!(panel.state().visible);
    }

    #[tokio::test]
    async fn render_mounts_again_after_document_load() {
        let (surface, panel) = panel();
        panel.mount().await.unwrap();
        panel.show_progress(Stage::OpeningTranscript).await;

        surface.unmount();
        panel.show_result(&SummaryResult::summary("fresh")).await;

        assert_eq!(surface.mounts(), 2);
        assert!(surface.is_visible());
        assert_eq!(surface.content(), "<p>fresh</p>\n");
    }

    #[tokio::test]
    async fn restore_keeps_hidden_panel_hidden() {
        let (surface, panel) = panel();
        panel.mount().await.unwrap();
        panel.toggle().await.unwrap();
        panel.show_progress(Stage::ReadingTranscript).await;

        surface.unmount();
        panel.restore().await.unwrap();

        assert_eq!(surface.mounts(), 2);
        assert!(!surface.is_visible());
        assert!(surface.content().contains("Reading transcript"));
    }

    #[test]
    fn pipeline_error_has_headline_and_detail() {
        let err = TldwError::EmptyTranscript {
            length: 2,
            minimum: 50,
        };
        let html = PanelContent::from_error(&err).to_html();
        assert!(html.contains("The transcript is empty."));
        assert!(html.contains("2 of at least 50"));
    }
}
