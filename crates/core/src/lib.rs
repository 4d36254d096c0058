pub mod config;
pub mod error;
pub mod events;
pub mod extractor;
pub mod format;
pub mod monitor;
pub mod orchestrator;
pub mod page;
pub mod panel;
pub mod queues;
pub mod routes;
pub mod session;
pub mod settings;
pub mod summarizer;
pub mod types;
pub mod waiter;
pub mod workers;

pub use config::{Config, ExtractorConfig, GeminiConfig, MonitorConfig, Selectors};
pub use error::{PageError, Result, TldwError};
pub use extractor::{TranscriptExtractor, segments_to_text};
pub use format::{escape_html, render_markdown};
pub use monitor::NavigationMonitor;
pub use orchestrator::{Orchestrator, PanelResultWorker};
pub use panel::{Panel, PanelContent};
pub use session::{SessionController, SessionGuard, VideoSession};
pub use settings::{FileSettingsStore, MemorySettingsStore, SettingsStore};
pub use summarizer::{GeminiClient, SummarizeWorker};
pub use types::{Stage, SummaryResult, TranscriptRequest};
pub use waiter::{wait_for, wait_for_element};
