//! In-process scripted page.
//!
//! Nodes are matched by exact selector string rather than by a CSS engine.
//! A node can be hidden until something reveals it, or appear after a delay,
//! which is enough to reproduce the asynchronous rendering of the real page.

use std::{
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::mpsc, time::Instant};

use crate::{
    error::PageError,
    page::{DocumentChanged, ElementRef, Page, PanelSurface},
};

/// What clicking a node does to the document.
#[derive(Debug, Clone)]
pub enum NodeAction {
    /// Make every hidden node with this selector present.
    Reveal(String),
    Insert(MemoryNode),
    /// Drop every node with this selector.
    Remove(String),
}

#[derive(Debug, Clone)]
pub struct MemoryNode {
    selector: String,
    text: String,
    hidden: bool,
    appears_after: Duration,
    on_click: Vec<NodeAction>,
}

impl MemoryNode {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            text: String::new(),
            hidden: false,
            appears_after: Duration::ZERO,
            on_click: Vec::new(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Not present until revealed by a click.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Present only once `delay` has passed since it was inserted or revealed.
    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn on_click(mut self, action: NodeAction) -> Self {
        self.on_click.push(action);
        self
    }
}

struct StoredNode {
    id: u64,
    node: MemoryNode,
    present_from: Option<Instant>,
}

impl StoredNode {
    fn is_present(&self, now: Instant) -> bool {
        self.present_from.is_some_and(|at| at <= now)
    }
}

struct MemoryDocument {
    url: String,
    nodes: Vec<StoredNode>,
    next_id: u64,
    clicks: Vec<String>,
    queries: usize,
    releases: usize,
}

impl MemoryDocument {
    fn insert(&mut self, node: MemoryNode) {
        let present_from = if node.hidden {
            None
        } else {
            Some(Instant::now() + node.appears_after)
        };
        self.nodes.push(StoredNode {
            id: self.next_id,
            node,
            present_from,
        });
        self.next_id += 1;
    }

    fn apply(&mut self, action: NodeAction) {
        match action {
            NodeAction::Reveal(selector) => {
                let now = Instant::now();
                for stored in self
                    .nodes
                    .iter_mut()
                    .filter(|n| n.node.selector == selector && n.present_from.is_none())
                {
                    stored.present_from = Some(now + stored.node.appears_after);
                }
            }
            NodeAction::Insert(node) => self.insert(node),
            NodeAction::Remove(selector) => self.nodes.retain(|n| n.node.selector != selector),
        }
    }
}

pub struct MemoryPage {
    doc: Mutex<MemoryDocument>,
    changes: Mutex<Option<mpsc::UnboundedSender<DocumentChanged>>>,
}

impl MemoryPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            doc: Mutex::new(MemoryDocument {
                url: url.into(),
                nodes: Vec::new(),
                next_id: 1,
                clicks: Vec::new(),
                queries: 0,
                releases: 0,
            }),
            changes: Mutex::new(None),
        }
    }

    /// Subscribe to document changes. A later call replaces the earlier
    /// subscriber.
    pub fn change_source(&self) -> mpsc::UnboundedReceiver<DocumentChanged> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.changes.lock().expect("MemoryPage poisoned") = Some(tx);
        rx
    }

    /// Drop the subscriber so the change source reports closed.
    pub fn close_changes(&self) {
        self.changes.lock().expect("MemoryPage poisoned").take();
    }

    /// Emit a change without touching the document, like an unrelated
    /// mutation somewhere on the page.
    pub fn touch(&self) {
        if let Some(tx) = self.changes.lock().expect("MemoryPage poisoned").as_ref() {
            let _ = tx.send(DocumentChanged);
        }
    }

    /// Change the URL without reloading, the way the host SPA navigates.
    pub fn navigate(&self, url: impl Into<String>) {
        self.doc.lock().expect("MemoryPage poisoned").url = url.into();
        self.touch();
    }

    pub fn insert(&self, node: MemoryNode) {
        self.doc.lock().expect("MemoryPage poisoned").insert(node);
        self.touch();
    }

    pub fn clear(&self) {
        self.doc.lock().expect("MemoryPage poisoned").nodes.clear();
        self.touch();
    }

    /// Selectors of every clicked node, in click order.
    pub fn clicks(&self) -> Vec<String> {
        self.doc.lock().expect("MemoryPage poisoned").clicks.clone()
    }

    pub fn query_count(&self) -> usize {
        self.doc.lock().expect("MemoryPage poisoned").queries
    }

    /// How many times element handles were released.
    pub fn releases(&self) -> usize {
        self.doc.lock().expect("MemoryPage poisoned").releases
    }
}

#[async_trait]
impl Page for MemoryPage {
    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.doc.lock().expect("MemoryPage poisoned").url.clone())
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>, PageError> {
        let mut doc = self.doc.lock().expect("MemoryPage poisoned");
        doc.queries += 1;
        let now = Instant::now();
        Ok(doc
            .nodes
            .iter()
            .find(|n| n.node.selector == selector && n.is_present(now))
            .map(|n| ElementRef(n.id.to_string())))
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        {
            let mut doc = self.doc.lock().expect("MemoryPage poisoned");
            let now = Instant::now();
            let Some(stored) = doc
                .nodes
                .iter()
                .find(|n| n.id.to_string() == element.0 && n.is_present(now))
            else {
                return Err(PageError::StaleElement(element.0.clone()));
            };

            let selector = stored.node.selector.clone();
            let actions = stored.node.on_click.clone();
            doc.clicks.push(selector);
            for action in actions {
                doc.apply(action);
            }
        }
        self.touch();
        Ok(())
    }

    async fn text_contents(&self, selector: &str) -> Result<Vec<String>, PageError> {
        let doc = self.doc.lock().expect("MemoryPage poisoned");
        let now = Instant::now();
        Ok(doc
            .nodes
            .iter()
            .filter(|n| n.node.selector == selector && n.is_present(now))
            .map(|n| n.node.text.clone())
            .collect())
    }

    async fn release_handles(&self) -> Result<(), PageError> {
        self.doc.lock().expect("MemoryPage poisoned").releases += 1;
        Ok(())
    }
}

#[derive(Default)]
struct SurfaceState {
    mounted: bool,
    mounts: usize,
    content: String,
    visible: bool,
}

/// Panel surface that just remembers what was written to it.
#[derive(Default)]
pub struct MemorySurface {
    state: Mutex<SurfaceState>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> String {
        self.state.lock().expect("MemorySurface poisoned").content.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().expect("MemorySurface poisoned").visible
    }

    pub fn mounts(&self) -> usize {
        self.state.lock().expect("MemorySurface poisoned").mounts
    }

    /// Forget the panel, the way a full document load does.
    pub fn unmount(&self) {
        let mut state = self.state.lock().expect("MemorySurface poisoned");
        state.mounted = false;
        state.content.clear();
        state.visible = false;
    }
}

#[async_trait]
impl PanelSurface for MemorySurface {
    async fn mount(&self, _chrome_html: &str) -> Result<(), PageError> {
        let mut state = self.state.lock().expect("MemorySurface poisoned");
        if !state.mounted {
            state.mounted = true;
            state.mounts += 1;
        }
        Ok(())
    }

    async fn set_content(&self, html: &str) -> Result<(), PageError> {
        let mut state = self.state.lock().expect("MemorySurface poisoned");
        if !state.mounted {
            return Err(PageError::PanelMissing);
        }
        state.content = html.to_string();
        Ok(())
    }

    async fn set_visible(&self, visible: bool) -> Result<(), PageError> {
        self.state.lock().expect("MemorySurface poisoned").visible = visible;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn click_reveals_hidden_nodes() {
        let page = MemoryPage::new("https://www.youtube.com/watch?v=a");
        page.insert(MemoryNode::new("#open").on_click(NodeAction::Reveal(".seg".into())));
        page.insert(MemoryNode::new(".seg").text("one").hidden());
        page.insert(MemoryNode::new(".seg").text("two").hidden());

        assert!(page.text_contents(".seg").await.unwrap().is_empty());

        let open = page.query_selector("#open").await.unwrap().unwrap();
        page.click(&open).await.unwrap();

        assert_eq!(page.text_contents(".seg").await.unwrap(), vec!["one", "two"]);
        assert_eq!(page.clicks(), vec!["#open"]);
    }

    #[tokio::test(start_paused = true)]
    async fn click_can_swap_nodes() {
        let page = MemoryPage::new("https://www.youtube.com/watch?v=a");
        page.insert(
            MemoryNode::new("#open")
                .on_click(NodeAction::Remove("#open".into()))
                .on_click(NodeAction::Insert(
                    MemoryNode::new("#close").appears_after(Duration::from_millis(300)),
                )),
        );

        let open = page.query_selector("#open").await.unwrap().unwrap();
        page.click(&open).await.unwrap();

        assert!(page.query_selector("#open").await.unwrap().is_none());
        assert!(page.query_selector("#close").await.unwrap().is_none());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(page.query_selector("#close").await.unwrap().is_some());
        assert!(matches!(page.click(&open).await, Err(PageError::StaleElement(_))));
    }

    #[tokio::test]
    async fn releasing_handles_is_counted() {
        let page = MemoryPage::new("about:blank");
        page.release_handles().await.unwrap();
        page.release_handles().await.unwrap();
        assert_eq!(page.releases(), 2);
    }

    #[tokio::test]
    async fn surface_refuses_content_until_mounted() {
        let surface = MemorySurface::new();
        assert!(matches!(
            surface.set_content("<p>x</p>").await,
            Err(PageError::PanelMissing)
        ));
        surface.mount("").await.unwrap();
        surface.mount("").await.unwrap();
        surface.set_content("<p>x</p>").await.unwrap();
        assert_eq!(surface.mounts(), 1);
        assert_eq!(surface.content(), "<p>x</p>");

        surface.unmount();
        assert!(surface.content().is_empty());
        assert!(surface.set_content("<p>y</p>").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_node_appears_later() {
        let page = MemoryPage::new("about:blank");
        page.insert(MemoryNode::new("#late").appears_after(Duration::from_secs(1)));

        assert!(page.query_selector("#late").await.unwrap().is_none());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(page.query_selector("#late").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removed_element_is_stale() {
        let page = MemoryPage::new("about:blank");
        page.insert(MemoryNode::new("#x"));
        let x = page.query_selector("#x").await.unwrap().unwrap();
        page.clear();
        assert!(matches!(page.click(&x).await, Err(PageError::StaleElement(_))));
    }

    #[tokio::test]
    async fn navigation_notifies_subscriber() {
        let page = MemoryPage::new("about:blank");
        let mut changes = page.change_source();
        page.navigate("https://www.youtube.com/watch?v=b");
        assert_eq!(changes.recv().await, Some(DocumentChanged));
        assert_eq!(
            page.current_url().await.unwrap(),
            "https://www.youtube.com/watch?v=b"
        );
    }
}
