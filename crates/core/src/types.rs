use std::fmt;

use serde::{Deserialize, Serialize};

/// Orchestrator stages, in the order a cycle walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExpandingDescription,
    OpeningTranscript,
    ReadingTranscript,
    Summarizing,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::ExpandingDescription => "expanding description",
            Stage::OpeningTranscript => "opening transcript",
            Stage::ReadingTranscript => "reading transcript",
            Stage::Summarizing => "summarizing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transcript text extracted for one video session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRequest {
    pub text: String,
    pub source_url: String,
}

/// Reply from the summarizer: markdown on success, a plain message otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryResult {
    Summary {
        #[serde(rename = "summary")]
        markdown: String,
    },
    Error {
        #[serde(rename = "error")]
        message: String,
    },
}

impl SummaryResult {
    pub fn summary(markdown: impl Into<String>) -> Self {
        SummaryResult::Summary {
            markdown: markdown.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SummaryResult::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SummaryResult::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_result_wire_shape() {
        let ok = serde_json::to_value(SummaryResult::summary("**Bold** point")).unwrap();
        assert_eq!(ok, serde_json::json!({ "summary": "**Bold** point" }));

        let err: SummaryResult = serde_json::from_str(r#"{ "error": "<script>" }"#).unwrap();
        assert_eq!(err, SummaryResult::error("<script>"));
        assert!(err.is_error());
    }

    #[test]
    fn stage_labels() {
        assert_eq!(Stage::ExpandingDescription.to_string(), "expanding description");
        assert_eq!(Stage::Summarizing.label(), "summarizing");
    }
}
