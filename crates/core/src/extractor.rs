//! Transcript acquisition from the watch page.
//!
//! Each stage waits for its own affordance and fails on its own terms, so a
//! failure says which part of the page went missing: "this video has no
//! transcript" reads differently from "the page layout changed".

use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    config::ExtractorConfig,
    error::{Result, TldwError},
    page::Page,
    waiter::{WaitOptions, wait_for_element_with},
};

/// Trim every segment and join them with single spaces, keeping order.
/// Segments that are blank after trimming are skipped.
pub fn segments_to_text(segments: &[String]) -> String {
    segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct TranscriptExtractor {
    page: Arc<dyn Page>,
    config: ExtractorConfig,
}

impl TranscriptExtractor {
    pub fn new(page: Arc<dyn Page>, config: ExtractorConfig) -> Self {
        Self { page, config }
    }

    fn wait_options(&self, timeout: Duration) -> WaitOptions {
        WaitOptions::new(timeout, self.config.poll_interval())
    }

    /// Stage 1. Returns whether the expander was clicked; a missing expander
    /// usually means the description is already open.
    pub async fn expand_description(&self) -> Result<bool> {
        let selector = &self.config.selectors.expand_description;
        let expander = match wait_for_element_with(
            self.page.as_ref(),
            selector,
            self.wait_options(self.config.expand_timeout()),
        )
        .await
        {
            Ok(el) => el,
            Err(TldwError::Timeout { .. }) => {
                debug!(selector = %selector, "no description expander, assuming expanded");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match self.page.click(&expander).await {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(error = %e, "description expander click failed, continuing");
                Ok(false)
            }
        }
    }

    /// Stage 2. A missing control means the video exposes no transcript.
    pub async fn open_transcript(&self) -> Result<()> {
        let selector = &self.config.selectors.show_transcript;
        let control = wait_for_element_with(
            self.page.as_ref(),
            selector,
            self.wait_options(self.config.transcript_control_timeout()),
        )
        .await
        .map_err(|e| match e {
            TldwError::Timeout { .. } => TldwError::ControlNotFound {
                control: "show transcript",
                selector: selector.clone(),
            },
            other => other,
        })?;

        self.page.click(&control).await?;
        Ok(())
    }

    /// Stage 3. Waits for the first segment, then reads them all.
    pub async fn read_transcript(&self) -> Result<String> {
        let selectors = &self.config.selectors;
        wait_for_element_with(
            self.page.as_ref(),
            &selectors.transcript_segment,
            self.wait_options(self.config.segment_timeout()),
        )
        .await?;

        let segments = self.page.text_contents(&selectors.segment_text).await?;
        let text = segments_to_text(&segments);
        let length = text.chars().count();
        debug!(segments = segments.len(), length, "transcript collected");

        if length < self.config.min_transcript_chars {
            return Err(TldwError::EmptyTranscript {
                length,
                minimum: self.config.min_transcript_chars,
            });
        }
        Ok(text)
    }

    /// Stage 4 cleanup. Never fails.
    pub async fn close_transcript(&self) {
        let selector = &self.config.selectors.close_transcript;
        let result = async {
            let close = wait_for_element_with(
                self.page.as_ref(),
                selector,
                self.wait_options(self.config.close_timeout()),
            )
            .await?;
            self.page.click(&close).await?;
            Ok::<_, TldwError>(())
        }
        .await;

        if let Err(e) = result {
            debug!(error = %e, "could not close transcript panel");
        }
        if let Err(e) = self.page.release_handles().await {
            debug!(error = %e, "could not release element handles");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Selectors,
        page::{MemoryNode, MemoryPage, NodeAction},
    };

    const URL: &str = "https://www.youtube.com/watch?v=abc";

    fn extractor(page: Arc<MemoryPage>) -> TranscriptExtractor {
        let config = ExtractorConfig {
            min_transcript_chars: 10,
            ..ExtractorConfig::default()
        };
        TranscriptExtractor::new(page, config)
    }

    fn watch_page(segments: &[&str]) -> Arc<MemoryPage> {
        let s = Selectors::default();
        let page = MemoryPage::new(URL);
        page.insert(MemoryNode::new(&s.expand_description));
        page.insert(
            MemoryNode::new(&s.show_transcript)
                .on_click(NodeAction::Reveal(s.transcript_segment.clone()))
                .on_click(NodeAction::Reveal(s.segment_text.clone())),
        );
        for text in segments {
            page.insert(MemoryNode::new(&s.transcript_segment).hidden());
            page.insert(MemoryNode::new(&s.segment_text).text(*text).hidden());
        }
        page.insert(MemoryNode::new(&s.close_transcript));
        Arc::new(page)
    }

    #[test]
    fn joins_segments_in_order() {
        let segments = vec!["Hello".to_string(), "world".to_string()];
        assert_eq!(segments_to_text(&segments), "Hello world");
    }

    #[test]
    fn trims_and_skips_blank_segments() {
        let segments = vec!["  Hello\n".to_string(), "   ".to_string(), "\tworld ".to_string()];
        assert_eq!(segments_to_text(&segments), "Hello world");
    }

    #[tokio::test(start_paused = true)]
    async fn full_pipeline_reads_transcript() {
        let page = watch_page(&["Hello there", "general", "Kenobi"]);
        let ex = extractor(page.clone());

        assert!(ex.expand_description().await.unwrap());
        ex.open_transcript().await.unwrap();
        assert_eq!(
            ex.read_transcript().await.unwrap(),
            "Hello there general Kenobi"
        );
        ex.close_transcript().await;

        let s = Selectors::default();
        assert_eq!(
            page.clicks(),
            vec![s.expand_description, s.show_transcript, s.close_transcript]
        );
        assert_eq!(page.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_expander_is_not_fatal() {
        let page = Arc::new(MemoryPage::new(URL));
        let ex = extractor(page);
        assert!(!ex.expand_description().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_transcript_control_is_control_not_found() {
        let page = Arc::new(MemoryPage::new(URL));
        let ex = extractor(page);
        let err = ex.open_transcript().await.unwrap_err();
        assert!(matches!(
            err,
            TldwError::ControlNotFound {
                control: "show transcript",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn segments_never_rendering_is_timeout() {
        let s = Selectors::default();
        let page = MemoryPage::new(URL);
        page.insert(MemoryNode::new(&s.show_transcript));
        let ex = extractor(Arc::new(page));

        ex.open_transcript().await.unwrap();
        let err = ex.read_transcript().await.unwrap_err();
        match err {
            TldwError::Timeout { selector, .. } => assert_eq!(selector, s.transcript_segment),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn short_transcript_is_empty_error() {
        let page = watch_page(&["hi"]);
        let ex = extractor(page);
        ex.open_transcript().await.unwrap();
        let err = ex.read_transcript().await.unwrap_err();
        assert!(matches!(
            err,
            TldwError::EmptyTranscript {
                length: 2,
                minimum: 10
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn close_failure_is_swallowed() {
        let page = Arc::new(MemoryPage::new(URL));
        extractor(page.clone()).close_transcript().await;
        assert!(page.clicks().is_empty());
        // handles are dropped even when there was nothing to close
        assert_eq!(page.releases(), 1);
    }
}
