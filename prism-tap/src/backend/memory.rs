//! In-process backend over a fixed document list.
//!
//! Tokens encode the session and the offset of the page they lead to, so a
//! token can be re-issued after a failed scroll and resumes at the same place.
//! Faults and latency can be injected to exercise the cursor's error paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::traits::{ContinuationToken, ResultPage, SearchBackend};
use crate::decoder::Document;
use crate::error::{BackendError, BackendResult};
use crate::query::QuerySpec;

#[derive(Debug, Default)]
struct MemoryState {
    next_session: u64,
    page_sizes: Vec<usize>,
    cleared: HashSet<u64>,
    fail_searches: usize,
    fail_scrolls: usize,
    searches: usize,
    scrolls: usize,
    clears: usize,
    last_search_body: Option<Value>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: Vec<Document>,
    /// Serve this many documents per page regardless of the requested size
    page_size_override: Option<usize>,
    latency: Option<Duration>,
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }

    /// Ignore the requested page size and serve `size` documents per page.
    pub fn with_page_size_override(mut self, size: usize) -> Self {
        self.page_size_override = Some(size);
        self
    }

    /// Delay every request by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `count` search requests.
    pub fn fail_next_searches(&self, count: usize) {
        self.state.lock().fail_searches = count;
    }

    /// Fail the next `count` scroll requests without consuming their tokens.
    pub fn fail_next_scrolls(&self, count: usize) {
        self.state.lock().fail_scrolls = count;
    }

    pub fn search_count(&self) -> usize {
        self.state.lock().searches
    }

    pub fn scroll_count(&self) -> usize {
        self.state.lock().scrolls
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().clears
    }

    /// Sessions opened and not yet cleared
    pub fn open_sessions(&self) -> usize {
        let state = self.state.lock();
        (state.next_session as usize).saturating_sub(state.cleared.len())
    }

    pub fn last_search_body(&self) -> Option<Value> {
        self.state.lock().last_search_body.clone()
    }

    fn page(&self, session: u64, offset: usize, page_size: usize) -> ResultPage {
        let end = (offset + page_size).min(self.documents.len());
        let documents = self.documents[offset.min(end)..end].to_vec();
        ResultPage {
            documents,
            token: Some(encode_token(session, end)),
            total: Some(self.documents.len() as u64),
        }
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn encode_token(session: u64, offset: usize) -> ContinuationToken {
    ContinuationToken::new(format!("mem-{}-{}", session, offset))
}

fn decode_token(token: &ContinuationToken) -> BackendResult<(u64, usize)> {
    let malformed = || BackendError::ScrollExpired(token.to_string());
    let rest = token.as_str().strip_prefix("mem-").ok_or_else(malformed)?;
    let (session, offset) = rest.split_once('-').ok_or_else(malformed)?;
    Ok((
        session.parse().map_err(|_| malformed())?,
        offset.parse().map_err(|_| malformed())?,
    ))
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn search(&self, spec: &QuerySpec) -> BackendResult<ResultPage> {
        self.delay().await;
        let mut state = self.state.lock();
        state.searches += 1;
        state.last_search_body = Some(spec.search_body());

        if state.fail_searches > 0 {
            state.fail_searches -= 1;
            return Err(BackendError::Injected("search failed".to_string()));
        }

        let session = state.next_session;
        state.next_session += 1;
        let page_size = self.page_size_override.unwrap_or(spec.page_size);
        state.page_sizes.push(page_size);
        drop(state);

        debug!(session, page_size, "Opened memory search session");
        Ok(self.page(session, 0, page_size))
    }

    async fn scroll(
        &self,
        token: &ContinuationToken,
        _keep_alive: &str,
    ) -> BackendResult<ResultPage> {
        self.delay().await;
        let (session, offset) = decode_token(token)?;
        let mut state = self.state.lock();
        state.scrolls += 1;

        if state.fail_scrolls > 0 {
            state.fail_scrolls -= 1;
            return Err(BackendError::Injected("scroll failed".to_string()));
        }
        if state.cleared.contains(&session) {
            return Err(BackendError::ScrollExpired(token.to_string()));
        }
        let page_size = *state
            .page_sizes
            .get(session as usize)
            .ok_or_else(|| BackendError::ScrollExpired(token.to_string()))?;
        drop(state);

        Ok(self.page(session, offset, page_size))
    }

    async fn clear(&self, token: &ContinuationToken) -> BackendResult<()> {
        let (session, _) = decode_token(token)?;
        let mut state = self.state.lock();
        state.clears += 1;
        // Unknown sessions are a no-op, like a 404 from the real endpoint
        if session < state.next_session {
            state.cleared.insert(session);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
