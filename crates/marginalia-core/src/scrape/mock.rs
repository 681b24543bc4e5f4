//! Canned fetchers for tests: no network, call counting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{AnnotationFetcher, ScrapeError, ScrapeFuture};
use crate::metadata::MetadataItem;

pub(crate) enum MockResponse {
    Found(MetadataItem),
    Permanent,
    Temporary,
}

/// Returns a canned response per path; unknown paths are permanent.
pub(crate) struct MockFetcher {
    responses: HashMap<String, MockResponse>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with(mut self, path: &str, response: MockResponse) -> Self {
        self.responses.insert(path.to_string(), response);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AnnotationFetcher for MockFetcher {
    fn fetch<'a>(&'a self, path: &'a str) -> ScrapeFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(path) {
                Some(MockResponse::Found(item)) => Ok(item.clone()),
                Some(MockResponse::Temporary) => {
                    Err(ScrapeError::Temporary("mock temporary".into()))
                }
                Some(MockResponse::Permanent) | None => Err(ScrapeError::Permanent),
            }
        })
    }
}
