//! Detects in-app navigation to a video page and starts summary cycles.
//!
//! The monitor never awaits a cycle. It only decides whether a change in the
//! document warrants one, and the [`SessionController`] decides whether one
//! may start now.

use std::{sync::Arc, time::Duration};

use regex::Regex;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, trace};

use crate::{
    config::{ConfigError, MonitorConfig},
    orchestrator::Orchestrator,
    page::{ChangeSource, Page},
    session::SessionController,
};

pub struct NavigationMonitor {
    page: Arc<dyn Page>,
    sessions: SessionController,
    orchestrator: Arc<Orchestrator>,
    video_url: Regex,
    settle_delay: Duration,
    debounce: Duration,
    debounce_max: Duration,
}

impl NavigationMonitor {
    pub fn new(
        page: Arc<dyn Page>,
        sessions: SessionController,
        orchestrator: Arc<Orchestrator>,
        config: &MonitorConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            page,
            sessions,
            orchestrator,
            video_url: config.video_url_regex()?,
            settle_delay: config.settle_delay(),
            debounce: config.debounce(),
            debounce_max: config.debounce_max(),
        })
    }

    pub fn is_video_url(&self, url: &str) -> bool {
        self.video_url.is_match(url)
    }

    /// Evaluate the page once per burst of changes until `source` closes.
    /// Cycles still running at that point are left to finish.
    pub async fn run<S: ChangeSource>(&self, mut source: S) {
        while source.next_change().await.is_some() {
            let open = self.settle_burst(&mut source).await;
            self.evaluate().await;
            if !open {
                break;
            }
        }
        debug!("change source closed, monitor stopped");
    }

    /// Swallow changes until the source is quiet for `debounce`, or for at
    /// most `debounce_max` on a page that never stops mutating. Returns
    /// whether the source is still open.
    async fn settle_burst<S: ChangeSource>(&self, source: &mut S) -> bool {
        if self.debounce.is_zero() {
            return true;
        }
        let deadline = Instant::now() + self.debounce_max;
        loop {
            let quiet = deadline
                .saturating_duration_since(Instant::now())
                .min(self.debounce);
            if quiet.is_zero() {
                trace!("burst still going, evaluating anyway");
                return true;
            }
            match tokio::time::timeout(quiet, source.next_change()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return false,
                Err(_) => return true,
            }
        }
    }

    /// Start a cycle if the page is on a new video and nothing is running.
    /// Returns the spawned cycle task.
    pub async fn evaluate(&self) -> Option<JoinHandle<()>> {
        let url = match self.page.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, "could not read page URL");
                return None;
            }
        };

        if !self.is_video_url(&url) {
            trace!(url = %url, "not a video page");
            return None;
        }

        let Some(guard) = self.sessions.try_begin(&url) else {
            trace!(url = %url, "already handled or busy");
            return None;
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let settle_delay = self.settle_delay;
        Some(tokio::spawn(async move {
            // let the page finish rendering the new video
            tokio::time::sleep(settle_delay).await;
            let session_id = guard.session().id;
            match orchestrator.run_cycle(guard).await {
                Ok(()) => debug!(%session_id, "cycle finished"),
                // already logged and shown in the panel
                Err(e) => debug!(%session_id, error = %e, "cycle ended with error"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ExtractorConfig, Selectors},
        events::{BusConfig, EventBusBuilder},
        page::{MemoryNode, MemoryPage, MemorySurface, NodeAction},
        panel::Panel,
        session::VideoSession,
    };

    const A: &str = "https://www.youtube.com/watch?v=aaa";
    const B: &str = "https://www.youtube.com/watch?v=bbb";
    const C: &str = "https://m.youtube.com/watch?v=ccc";
    const HOME: &str = "https://www.youtube.com/";

    fn monitor(
        page: Arc<MemoryPage>,
    ) -> (NavigationMonitor, SessionController, Arc<Orchestrator>) {
        let panel = Arc::new(Panel::new(Arc::new(MemorySurface::new())));
        let (bus, _, _) = EventBusBuilder::new(BusConfig::default()).build().unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            page.clone(),
            ExtractorConfig::default(),
            panel,
            bus,
        ));
        let sessions = SessionController::new();
        let monitor = NavigationMonitor::new(
            page,
            sessions.clone(),
            orchestrator.clone(),
            &MonitorConfig::default(),
        )
        .unwrap();
        (monitor, sessions, orchestrator)
    }

    fn add_transcript(page: &MemoryPage) {
        let s = Selectors::default();
        page.insert(
            MemoryNode::new(&s.show_transcript)
                .on_click(NodeAction::Reveal(s.transcript_segment.clone()))
                .on_click(NodeAction::Reveal(s.segment_text.clone())),
        );
        page.insert(MemoryNode::new(&s.transcript_segment).hidden());
        page.insert(
            MemoryNode::new(&s.segment_text)
                .text("a transcript comfortably longer than the minimum length")
                .hidden(),
        );
        page.insert(MemoryNode::new(&s.close_transcript));
    }

    /// Reproducible pseudo-random choices.
    struct Lcg(u64);

    impl Lcg {
        fn below(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 33) % bound
        }
    }

    fn observe(
        sessions: &SessionController,
        orchestrator: &Orchestrator,
        peak: &mut usize,
        seen: &mut Vec<VideoSession>,
    ) {
        *peak = (*peak).max(orchestrator.in_flight());
        if let Some(active) = sessions.active_session() {
            if seen.last().map(|s| s.id) != Some(active.id) {
                seen.push(active);
            }
        }
    }

    #[test]
    fn recognises_video_urls() {
        let (m, _, _) = monitor(Arc::new(MemoryPage::new("about:blank")));
        assert!(m.is_video_url(A));
        assert!(m.is_video_url("https://m.youtube.com/watch?feature=share&v=x-Y_1"));
        assert!(!m.is_video_url("https://www.youtube.com/"));
        assert!(!m.is_video_url("https://www.youtube.com/results?search_query=v"));
    }

    #[tokio::test(start_paused = true)]
    async fn non_video_pages_are_ignored() {
        let (m, sessions, _) = monitor(Arc::new(MemoryPage::new("https://www.youtube.com/")));
        assert!(m.evaluate().await.is_none());
        assert_eq!(sessions.started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_during_cycle_waits_for_next_change() {
        let page = Arc::new(MemoryPage::new(A));
        let (m, sessions, _) = monitor(page.clone());

        let cycle_a = m.evaluate().await.unwrap();
        assert!(sessions.is_active());

        page.navigate(B);
        assert!(m.evaluate().await.is_none());
        assert_eq!(sessions.last_url().as_deref(), Some(A));

        cycle_a.await.unwrap();
        assert!(!sessions.is_active());

        let cycle_b = m.evaluate().await.unwrap();
        assert_eq!(sessions.last_url().as_deref(), Some(B));
        cycle_b.await.unwrap();
        assert_eq!(sessions.started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn same_url_is_not_reprocessed() {
        let page = Arc::new(MemoryPage::new(A));
        let (m, sessions, _) = monitor(page.clone());
        m.evaluate().await.unwrap().await.unwrap();
        assert!(m.evaluate().await.is_none());
        assert_eq!(sessions.started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_are_coalesced_and_run_ends_on_close() {
        let page = Arc::new(MemoryPage::new("https://www.youtube.com/"));
        let (m, sessions, _) = monitor(page.clone());
        let source = page.change_source();

        for _ in 0..5 {
            page.touch();
        }
        page.navigate(A);
        page.close_changes();

        m.run(source).await;
        assert_eq!(sessions.started(), 1);
        assert_eq!(sessions.last_url().as_deref(), Some(A));
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_changes_still_get_evaluated() {
        let page = Arc::new(MemoryPage::new(HOME));
        let (m, sessions, _) = monitor(page.clone());
        let source = page.change_source();

        let churn = async {
            page.navigate(A);
            let mut started_while_churning = 0;
            // a change every 90 ms, under the 100 ms debounce, for ~50 s
            for i in 0..550 {
                tokio::time::sleep(Duration::from_millis(90)).await;
                page.touch();
                if i == 30 {
                    started_while_churning = sessions.started();
                }
            }
            page.close_changes();
            started_while_churning
        };

        let ((), started_while_churning) = tokio::join!(m.run(source), churn);
        assert_eq!(started_while_churning, 1);
        assert_eq!(sessions.started(), 1);
        assert_eq!(sessions.last_url().as_deref(), Some(A));
    }

    #[tokio::test(start_paused = true)]
    async fn interleaved_navigation_runs_one_cycle_at_a_time() {
        const URLS: [&str; 4] = [A, B, C, HOME];
        let page = Arc::new(MemoryPage::new(HOME));
        let (m, sessions, orchestrator) = monitor(page.clone());
        let source = page.change_source();

        let drive = async {
            let mut rng = Lcg(0x7d1c);
            let mut peak = 0;
            let mut seen = Vec::new();
            let tick = Duration::from_millis(100);

            for _ in 0..200 {
                // transcript present or not gives short and long cycles
                match rng.below(6) {
                    0..=2 => page.navigate(URLS[rng.below(4) as usize]),
                    3 => page.touch(),
                    4 => add_transcript(&page),
                    _ => page.clear(),
                }
                observe(&sessions, &orchestrator, &mut peak, &mut seen);
                for _ in 0..rng.below(30) {
                    tokio::time::sleep(tick).await;
                    observe(&sessions, &orchestrator, &mut peak, &mut seen);
                }
            }

            while sessions.is_active() {
                tokio::time::sleep(tick).await;
                observe(&sessions, &orchestrator, &mut peak, &mut seen);
            }
            // the URL left behind by the last release is picked up on the next change
            page.touch();
            tokio::time::sleep(Duration::from_secs(1)).await;
            observe(&sessions, &orchestrator, &mut peak, &mut seen);
            while sessions.is_active() {
                tokio::time::sleep(tick).await;
                observe(&sessions, &orchestrator, &mut peak, &mut seen);
            }
            page.close_changes();
            (peak, seen)
        };

        let ((), (peak, seen)) = tokio::join!(m.run(source), drive);

        assert_eq!(peak, 1);
        assert!(seen.len() >= 3, "only {} cycles ran", seen.len());
        assert_eq!(seen.len() as u64, sessions.started());
        assert!(seen.windows(2).all(|w| w[0].url != w[1].url));

        let current = page.current_url().await.unwrap();
        if m.is_video_url(&current) {
            assert_eq!(seen.last().map(|s| s.url.as_str()), Some(current.as_str()));
        }
    }
}
