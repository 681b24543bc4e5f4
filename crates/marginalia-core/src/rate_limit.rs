//! Per-source request spacing.
//!
//! Each scraper waits on its source's quota before touching the
//! network; `until_ready()` spaces calls at the configured period
//! across all concurrent workers. A 429 that slips through anyway is
//! classified as a temporary scrape failure and retried next build —
//! no state is kept here.

use std::collections::HashMap;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Politeness window per source, keyed by scraper name. arXiv asks for
/// generous spacing on its export API; Crossref's polite pool is ~1/s.
const SOURCE_PERIODS: &[(&str, Duration)] = &[
    ("arxiv", Duration::from_secs(15)),
    ("crossref", Duration::from_secs(1)),
    ("biorxiv", Duration::from_secs(1)),
    ("pubmed", Duration::from_secs(1)),
    ("wikipedia", Duration::from_millis(500)),
];

/// One governor quota per scrape source. Sources without an entry
/// (local PDFs, the pubmed helper's own process) are not throttled.
pub struct SourceLimiters {
    limiters: HashMap<&'static str, (Duration, DirectLimiter)>,
}

impl Default for SourceLimiters {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLimiters {
    pub fn new() -> Self {
        let limiters = SOURCE_PERIODS
            .iter()
            .map(|&(source, period)| {
                let quota = Quota::with_period(period).expect("period must be > 0");
                (source, (period, DirectLimiter::direct(quota)))
            })
            .collect();
        Self { limiters }
    }

    /// Wait until `source` permits another request. Unregistered
    /// sources return immediately.
    pub async fn acquire(&self, source: &str) {
        if let Some((_, limiter)) = self.limiters.get(source) {
            limiter.until_ready().await;
        }
    }

    /// The configured spacing for a source, if it is throttled at all.
    pub fn period(&self, source: &str) -> Option<Duration> {
        self.limiters.get(source).map(|(period, _)| *period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_sources_registered() {
        let limiters = SourceLimiters::new();
        for source in ["arxiv", "crossref", "biorxiv", "pubmed", "wikipedia"] {
            assert!(limiters.period(source).is_some(), "missing limiter: {source}");
        }
        assert!(limiters.period("nope").is_none());
    }

    #[test]
    fn arxiv_period_is_polite() {
        let limiters = SourceLimiters::new();
        assert_eq!(limiters.period("arxiv"), Some(Duration::from_secs(15)));
        assert_eq!(limiters.period("crossref"), Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        // The first token is available instantly; only the second waits
        // out the period.
        let limiters = SourceLimiters::new();
        limiters.acquire("arxiv").await;
    }

    #[tokio::test]
    async fn unknown_source_is_not_throttled() {
        let limiters = SourceLimiters::new();
        limiters.acquire("local-pdf").await;
        limiters.acquire("local-pdf").await;
    }

    #[tokio::test]
    async fn fast_source_allows_back_to_back_waits() {
        // 500ms period: two acquires complete within the test timeout,
        // the second after the spacer elapses.
        let limiters = SourceLimiters::new();
        let start = std::time::Instant::now();
        limiters.acquire("wikipedia").await;
        limiters.acquire("wikipedia").await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
