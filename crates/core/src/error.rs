use std::time::Duration;

use thiserror::Error;

/// Failures of the host page backend itself, as opposed to the page not
/// looking the way we expect.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Browser not available at {endpoint}: {reason}")]
    Unavailable { endpoint: String, reason: String },

    #[error("No matching tab: {0}")]
    TabNotFound(String),

    #[error("Protocol error: {message} (code: {code})")]
    Protocol { code: i64, message: String },

    #[error("Script error: {0}")]
    Script(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    #[error("Panel is not mounted in the document")]
    PanelMissing,

    #[error("Page session closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for PageError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        PageError::WebSocket(e.to_string())
    }
}

impl From<serde_json::Error> for PageError {
    fn from(e: serde_json::Error) -> Self {
        PageError::Script(format!("malformed protocol payload: {e}"))
    }
}

#[derive(Error, Debug)]
pub enum TldwError {
    #[error("Could not find the \"{control}\" control ({selector})")]
    ControlNotFound {
        control: &'static str,
        selector: String,
    },

    #[error("Timed out after {}ms waiting for {selector}", elapsed.as_millis())]
    Timeout { selector: String, elapsed: Duration },

    #[error("Transcript is too short to summarize ({length} of at least {minimum} characters)")]
    EmptyTranscript { length: usize, minimum: usize },

    #[error("Google Gemini API Key not found. Please set it with `tldw options set-key`.")]
    ApiKeyMissing,

    #[error("API Error: {reason}")]
    ApiCall { reason: String },

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl TldwError {
    /// Headline shown in the summary panel.
    pub fn user_message(&self) -> &'static str {
        match self {
            TldwError::ControlNotFound { .. } => "This video does not expose a transcript.",
            TldwError::Timeout { .. } => "The page took too long to show the transcript.",
            TldwError::EmptyTranscript { .. } => "The transcript is empty.",
            TldwError::ApiKeyMissing => "API Key not found.",
            TldwError::ApiCall { .. } => "The summarization service failed.",
            TldwError::Page(_) => "Lost contact with the page.",
            TldwError::IoError(_) | TldwError::JsonError(_) | TldwError::HttpError(_) => {
                "Something went wrong."
            }
        }
    }

    /// Diagnostic line shown under the headline.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, TldwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_missing_mentions_key() {
        assert!(TldwError::ApiKeyMissing.to_string().contains("API Key not found"));
    }

    #[test]
    fn timeout_reports_selector_and_elapsed() {
        let err = TldwError::Timeout {
            selector: "#segments".into(),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.detail(), "Timed out after 1500ms waiting for #segments");
    }

    #[test]
    fn control_not_found_blames_control() {
        let err = TldwError::ControlNotFound {
            control: "show transcript",
            selector: "button.transcript".into(),
        };
        assert!(err.detail().contains("show transcript"));
        assert_eq!(err.user_message(), "This video does not expose a transcript.");
    }
}
