//! Chrome DevTools Protocol backend.
//!
//! Attaches to one tab of a browser started with `--remote-debugging-port`,
//! runs every DOM query as a `Runtime.evaluate` inside that tab and turns a
//! page-side `MutationObserver` into change notifications through a runtime
//! binding.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::{
    net::TcpStream,
    sync::{broadcast, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tracing::{debug, trace, warn};

use crate::{
    error::PageError,
    page::{ChangeSource, DocumentChanged, ElementRef, Page, PanelSurface},
    panel::{CONTENT_ID, PANEL_ID, TOGGLE_ID},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, PageError>>>>>;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const CHANGE_BINDING: &str = "__tldwChanged";
const TOGGLE_BINDING: &str = "__tldwToggle";
const DETACHED_EVENT: &str = "Inspector.detached";
const OBJECT_GROUP: &str = "tldw";

/// Installs a throttled mutation observer that reports through the change
/// binding. Safe to evaluate more than once per document.
const OBSERVER_SCRIPT: &str = r#"
(() => {
  if (window.__tldwObserver) return;
  let pending = false;
  window.__tldwObserver = new MutationObserver(() => {
    if (pending) return;
    pending = true;
    setTimeout(() => {
      pending = false;
      if (typeof window.__tldwChanged === 'function') window.__tldwChanged('');
    }, 100);
  });
  window.__tldwObserver.observe(document.documentElement, { childList: true, subtree: true });
})()
"#;

/// Assigns markup through a Trusted Types policy when the page enforces one.
const TRUSTED_HTML_HELPER: &str = r#"
const toHtml = (s) => {
  if (!window.trustedTypes) return s;
  window.__tldwPolicy = window.__tldwPolicy || trustedTypes.createPolicy('tldw', { createHTML: (x) => x });
  return window.__tldwPolicy.createHTML(s);
};
"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}

impl CdpEvent {
    fn binding_name(&self) -> Option<&str> {
        if self.method == "Runtime.bindingCalled" {
            self.params["name"].as_str()
        } else {
            None
        }
    }

    pub fn is_toggle_request(&self) -> bool {
        self.binding_name() == Some(TOGGLE_BINDING)
    }

    pub fn is_document_change(&self) -> bool {
        matches!(
            self.method.as_str(),
            "Page.navigatedWithinDocument" | "Page.frameNavigated"
        ) || self.binding_name() == Some(CHANGE_BINDING)
    }

    /// The top-level frame loaded a new document, dropping anything injected
    /// into the old one.
    pub fn is_new_document(&self) -> bool {
        self.method == "Page.frameNavigated" && self.params["frame"]["parentId"].is_null()
    }

    pub fn is_detached(&self) -> bool {
        self.method == DETACHED_EVENT
    }
}

#[derive(Deserialize)]
struct CdpMessage {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpErrorBody>,
    method: Option<String>,
    params: Option<Value>,
}

#[derive(Deserialize)]
struct CdpErrorBody {
    code: i64,
    message: String,
}

pub struct CdpPage {
    target: TargetInfo,
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    request_id: AtomicU64,
    pending: Pending,
    events: broadcast::Sender<CdpEvent>,
    recv_task: JoinHandle<()>,
}

impl CdpPage {
    /// Attach to the first page tab whose URL contains `tab_filter`.
    pub async fn connect(endpoint: &str, tab_filter: &str) -> Result<Self, PageError> {
        let endpoint = endpoint.trim_end_matches('/');
        let list_url = format!("{}/json/list", endpoint);
        debug!(%list_url, "discovering tabs");

        let unavailable = |e: reqwest::Error| PageError::Unavailable {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        };
        let targets: Vec<TargetInfo> = reqwest::get(&list_url)
            .await
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        let target = select_target(targets, tab_filter)?;
        let ws_url = target
            .web_socket_debugger_url
            .clone()
            .ok_or_else(|| PageError::TabNotFound(format!("{} is already attached", target.url)))?;

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url.as_str()).await?;
        let (ws_sink, ws_source) = ws_stream.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(256);
        let recv_task = tokio::spawn(receive_loop(ws_source, pending.clone(), events.clone()));

        let page = Self {
            target,
            ws_tx: Arc::new(tokio::sync::Mutex::new(ws_sink)),
            request_id: AtomicU64::new(1),
            pending,
            events,
            recv_task,
        };
        page.install().await?;

        debug!(tab = %page.target.url, title = %page.target.title, "attached to tab");
        Ok(page)
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    /// Raw protocol events from the tab.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub fn change_source(&self) -> CdpChangeSource {
        CdpChangeSource {
            rx: self.events.subscribe(),
        }
    }

    async fn install(&self) -> Result<(), PageError> {
        self.call("Page.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        for name in [CHANGE_BINDING, TOGGLE_BINDING] {
            self.call("Runtime.addBinding", Some(json!({ "name": name })))
                .await?;
        }
        self.call(
            "Page.addScriptToEvaluateOnNewDocument",
            Some(json!({ "source": OBSERVER_SCRIPT })),
        )
        .await?;
        self.evaluate_value(OBSERVER_SCRIPT).await?;
        Ok(())
    }

    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, PageError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let mut request = json!({ "id": id, "method": method });
        if let Some(params) = params {
            request["params"] = params;
        }
        let text = serde_json::to_string(&request)?;
        trace!("CDP send: {}", text);

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("CDP pending map poisoned")
            .insert(id, tx);

        {
            let mut ws = self.ws_tx.lock().await;
            if let Err(e) = ws.send(Message::Text(text.into())).await {
                self.pending
                    .lock()
                    .expect("CDP pending map poisoned")
                    .remove(&id);
                return Err(e.into());
            }
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PageError::Closed),
            Err(_) => {
                self.pending
                    .lock()
                    .expect("CDP pending map poisoned")
                    .remove(&id);
                Err(PageError::Script(format!(
                    "{} did not answer within {}s",
                    method,
                    CALL_TIMEOUT.as_secs()
                )))
            }
        }
    }

    async fn evaluate(&self, expression: &str, by_value: bool) -> Result<Value, PageError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": by_value,
                    "objectGroup": OBJECT_GROUP,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            return Err(PageError::Script(exception_text(exception)));
        }
        Ok(result["result"].clone())
    }

    async fn evaluate_value(&self, expression: &str) -> Result<Value, PageError> {
        Ok(self.evaluate(expression, true).await?["value"].clone())
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

fn select_target(targets: Vec<TargetInfo>, tab_filter: &str) -> Result<TargetInfo, PageError> {
    targets
        .into_iter()
        .find(|t| t.target_type == "page" && t.url.contains(tab_filter))
        .ok_or_else(|| PageError::TabNotFound(format!("no page tab with URL containing {tab_filter:?}")))
}

fn exception_text(exception: &Value) -> String {
    exception["exception"]["description"]
        .as_str()
        .or_else(|| exception["text"].as_str())
        .unwrap_or("Unknown error")
        .to_string()
}

/// Quote `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

async fn receive_loop(mut ws_source: WsSource, pending: Pending, events: broadcast::Sender<CdpEvent>) {
    while let Some(msg) = ws_source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                trace!("CDP recv: {}", text.as_str());
                let message: CdpMessage = match serde_json::from_str(text.as_str()) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("Failed to parse CDP message: {}", e);
                        continue;
                    }
                };

                if let Some(id) = message.id {
                    let waiter = pending.lock().expect("CDP pending map poisoned").remove(&id);
                    if let Some(tx) = waiter {
                        let result = match message.error {
                            Some(error) => Err(PageError::Protocol {
                                code: error.code,
                                message: error.message,
                            }),
                            None => Ok(message.result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(result);
                    }
                } else if let Some(method) = message.method {
                    let _ = events.send(CdpEvent {
                        method,
                        params: message.params.unwrap_or(Value::Null),
                    });
                }
            }
            Ok(Message::Close(_)) => {
                debug!("CDP socket closed");
                break;
            }
            Err(e) => {
                warn!("CDP socket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    pending.lock().expect("CDP pending map poisoned").clear();
    let _ = events.send(CdpEvent {
        method: DETACHED_EVENT.to_string(),
        params: Value::Null,
    });
}

#[async_trait]
impl Page for CdpPage {
    async fn current_url(&self) -> Result<String, PageError> {
        let value = self.evaluate_value("location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PageError::Script(format!("location.href was {value}")))
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>, PageError> {
        let expression = format!("document.querySelector({})", js_string(selector));
        let object = self.evaluate(&expression, false).await?;
        if object["subtype"] == "null" || object["type"] == "undefined" {
            return Ok(None);
        }
        Ok(object["objectId"]
            .as_str()
            .map(|id| ElementRef(id.to_string())))
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        let result = self
            .call(
                "Runtime.callFunctionOn",
                Some(json!({
                    "objectId": element.0,
                    "functionDeclaration": "function() { this.click(); }",
                })),
            )
            .await
            .map_err(|e| match e {
                PageError::Protocol { .. } => PageError::StaleElement(element.0.clone()),
                other => other,
            })?;

        if let Some(exception) = result.get("exceptionDetails") {
            return Err(PageError::Script(exception_text(exception)));
        }
        Ok(())
    }

    async fn text_contents(&self, selector: &str) -> Result<Vec<String>, PageError> {
        let expression = format!(
            "Array.from(document.querySelectorAll({}), (el) => el.textContent || '')",
            js_string(selector)
        );
        let value = self.evaluate_value(&expression).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn release_handles(&self) -> Result<(), PageError> {
        self.call(
            "Runtime.releaseObjectGroup",
            Some(json!({ "objectGroup": OBJECT_GROUP })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PanelSurface for CdpPage {
    async fn mount(&self, chrome_html: &str) -> Result<(), PageError> {
        let expression = format!(
            r#"(() => {{
  {helper}
  if (document.getElementById({panel_id})) return;
  const panel = document.createElement('div');
  panel.id = {panel_id};
  panel.innerHTML = toHtml({html});
  document.body.appendChild(panel);
  const toggle = panel.querySelector('#' + {toggle_id});
  if (toggle) toggle.addEventListener('click', () => {{
    if (typeof window.{binding} === 'function') window.{binding}('');
  }});
}})()"#,
            helper = TRUSTED_HTML_HELPER,
            panel_id = js_string(PANEL_ID),
            toggle_id = js_string(TOGGLE_ID),
            html = js_string(chrome_html),
            binding = TOGGLE_BINDING,
        );
        self.evaluate_value(&expression).await?;
        Ok(())
    }

    async fn set_content(&self, html: &str) -> Result<(), PageError> {
        let expression = format!(
            r#"(() => {{
  {helper}
  const content = document.getElementById({content_id});
  if (!content) return false;
  content.innerHTML = toHtml({html});
  return true;
}})()"#,
            helper = TRUSTED_HTML_HELPER,
            content_id = js_string(CONTENT_ID),
            html = js_string(html),
        );
        match self.evaluate_value(&expression).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(PageError::PanelMissing),
        }
    }

    async fn set_visible(&self, visible: bool) -> Result<(), PageError> {
        let expression = format!(
            "document.getElementById({})?.classList.toggle('visible', {})",
            js_string(PANEL_ID),
            visible
        );
        self.evaluate_value(&expression).await?;
        Ok(())
    }
}

/// Change notifications from the tab's mutation observer and in-document
/// navigations.
pub struct CdpChangeSource {
    rx: broadcast::Receiver<CdpEvent>,
}

#[async_trait]
impl ChangeSource for CdpChangeSource {
    async fn next_change(&mut self) -> Option<DocumentChanged> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.is_detached() => return None,
                Ok(event) if event.is_document_change() => return Some(DocumentChanged),
                Ok(_) => continue,
                // Missed some events; one evaluation covers all of them.
                Err(broadcast::error::RecvError::Lagged(_)) => return Some(DocumentChanged),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(kind: &str, url: &str) -> TargetInfo {
        TargetInfo {
            id: url.to_string(),
            target_type: kind.to_string(),
            title: String::new(),
            url: url.to_string(),
            web_socket_debugger_url: Some(format!("ws://127.0.0.1:9222/devtools/page/{url}")),
        }
    }

    #[test]
    fn selects_first_matching_page() {
        let targets = vec![
            target("service_worker", "https://www.youtube.com/sw.js"),
            target("page", "https://example.com/"),
            target("page", "https://www.youtube.com/watch?v=a"),
        ];
        let chosen = select_target(targets, "youtube.com").unwrap();
        assert_eq!(chosen.url, "https://www.youtube.com/watch?v=a");
    }

    #[test]
    fn no_matching_tab() {
        let err = select_target(vec![target("page", "https://example.com/")], "youtube.com");
        assert!(matches!(err, Err(PageError::TabNotFound(_))));
    }

    #[test]
    fn target_list_deserializes() {
        let raw = r#"[{
            "description": "",
            "devtoolsFrontendUrl": "/devtools/inspector.html?ws=127.0.0.1:9222/devtools/page/ABC",
            "id": "ABC",
            "title": "Some video - YouTube",
            "type": "page",
            "url": "https://www.youtube.com/watch?v=abc",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/ABC"
        }]"#;
        let targets: Vec<TargetInfo> = serde_json::from_str(raw).unwrap();
        assert_eq!(targets[0].target_type, "page");
        assert_eq!(
            targets[0].web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/page/ABC")
        );
    }

    #[test]
    fn classifies_events() {
        let change = CdpEvent {
            method: "Runtime.bindingCalled".into(),
            params: json!({ "name": CHANGE_BINDING, "payload": "" }),
        };
        let toggle = CdpEvent {
            method: "Runtime.bindingCalled".into(),
            params: json!({ "name": TOGGLE_BINDING, "payload": "" }),
        };
        let nav = CdpEvent {
            method: "Page.navigatedWithinDocument".into(),
            params: json!({ "url": "https://www.youtube.com/watch?v=b" }),
        };
        assert!(change.is_document_change() && !change.is_toggle_request());
        assert!(toggle.is_toggle_request() && !toggle.is_document_change());
        assert!(nav.is_document_change());
        assert!(!nav.is_new_document());
    }

    #[test]
    fn only_top_level_frame_navigation_is_new_document() {
        let top = CdpEvent {
            method: "Page.frameNavigated".into(),
            params: json!({ "frame": { "id": "F1", "url": "https://www.youtube.com/" } }),
        };
        let iframe = CdpEvent {
            method: "Page.frameNavigated".into(),
            params: json!({ "frame": { "id": "F2", "parentId": "F1", "url": "about:blank" } }),
        };
        assert!(top.is_new_document() && top.is_document_change());
        assert!(!iframe.is_new_document());
    }

    #[test]
    fn js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
        assert_eq!(js_string("x[target-id='y']"), r#""x[target-id='y']""#);
    }

    #[tokio::test]
    async fn change_source_ends_on_detach() {
        let (tx, rx) = broadcast::channel(8);
        let mut source = CdpChangeSource { rx };
        tx.send(CdpEvent {
            method: "Runtime.consoleAPICalled".into(),
            params: Value::Null,
        })
        .unwrap();
        tx.send(CdpEvent {
            method: "Page.frameNavigated".into(),
            params: Value::Null,
        })
        .unwrap();
        tx.send(CdpEvent {
            method: DETACHED_EVENT.into(),
            params: Value::Null,
        })
        .unwrap();

        assert_eq!(source.next_change().await, Some(DocumentChanged));
        assert_eq!(source.next_change().await, None);
    }
}
