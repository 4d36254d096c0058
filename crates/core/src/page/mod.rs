//! The host page as seen by the content side.
//!
//! The extractor only ever needs read-only selector queries, clicks and
//! text collection; the panel only needs somewhere to write markup; the
//! monitor only needs to hear that "something changed". Each of those is a
//! trait so the browser backend can be swapped without touching the
//! orchestrator.

pub mod cdp;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PageError;

pub use cdp::{CdpChangeSource, CdpPage};
pub use memory::{MemoryNode, MemoryPage, MemorySurface, NodeAction};

/// Opaque reference to an element, only meaningful to the page that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

#[async_trait]
pub trait Page: Send + Sync {
    async fn current_url(&self) -> Result<String, PageError>;

    /// First element matching `selector`, if any.
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>, PageError>;

    async fn click(&self, element: &ElementRef) -> Result<(), PageError>;

    /// Text content of every element matching `selector`, in document order.
    async fn text_contents(&self, selector: &str) -> Result<Vec<String>, PageError>;

    /// Drop every [`ElementRef`] handed out so far. Refs issued before the
    /// call must not be used afterwards.
    async fn release_handles(&self) -> Result<(), PageError> {
        Ok(())
    }
}

/// Where the summary panel lives.
#[async_trait]
pub trait PanelSurface: Send + Sync {
    /// Inject the panel chrome. Calling it twice must not duplicate the panel.
    async fn mount(&self, chrome_html: &str) -> Result<(), PageError>;

    /// Replace the content region. Fails with [`PageError::PanelMissing`]
    /// when the document no longer holds the panel.
    async fn set_content(&self, html: &str) -> Result<(), PageError>;

    async fn set_visible(&self, visible: bool) -> Result<(), PageError>;
}

/// One "the document changed" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentChanged;

#[async_trait]
pub trait ChangeSource: Send {
    /// Wait for the next change. `None` once the source is closed.
    async fn next_change(&mut self) -> Option<DocumentChanged>;
}

#[async_trait]
impl ChangeSource for mpsc::Receiver<DocumentChanged> {
    async fn next_change(&mut self) -> Option<DocumentChanged> {
        self.recv().await
    }
}

#[async_trait]
impl ChangeSource for mpsc::UnboundedReceiver<DocumentChanged> {
    async fn next_change(&mut self) -> Option<DocumentChanged> {
        self.recv().await
    }
}

/// Fallback for hosts that cannot report mutations: treat every tick as a
/// change and let the URL comparison sort it out.
pub struct IntervalChangeSource {
    interval: tokio::time::Interval,
}

impl IntervalChangeSource {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl ChangeSource for IntervalChangeSource {
    async fn next_change(&mut self) -> Option<DocumentChanged> {
        self.interval.tick().await;
        Some(DocumentChanged)
    }
}
