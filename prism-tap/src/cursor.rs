//! Paged result cursor.
//!
//! ```text
//!            open                 page + token
//!   Idle ──────────▶ Fetching ────────────────▶ HasMore ──next_page──▶ Fetching
//!                       │  │
//!                       │  └── empty page / no token ──▶ Done (next_page: None, no I/O)
//!                       └───── error ──▶ Failed ──next_page──▶ Fetching (same token)
//!
//!   close: any state ──▶ Closed (scroll cleared, in-flight prefetch aborted)
//! ```
//!
//! The stored token only moves forward once a page has been received, so
//! retrying after a failure resumes exactly where the last page ended. The
//! cursor never retries on its own.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{ContinuationToken, ResultPage, SearchBackend};
use crate::error::{BackendResult, Result, TapError};
use crate::metrics::{self, FetchTimer};
use crate::query::QuerySpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Idle,
    Fetching,
    HasMore,
    Done,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct CursorOptions {
    /// Request the next page in the background as soon as one arrives
    pub prefetch: bool,
}

pub struct ResultCursor {
    backend: Arc<dyn SearchBackend>,
    spec: Arc<QuerySpec>,
    options: CursorOptions,
    state: CursorState,
    token: Option<ContinuationToken>,
    /// First page, handed out by the first `next_page`
    buffered: Option<ResultPage>,
    prefetch: Option<JoinHandle<BackendResult<ResultPage>>>,
    total: Option<u64>,
    pages_fetched: u64,
    documents_fetched: u64,
}

impl ResultCursor {
    /// Issue the initial search.
    ///
    /// A backend failure here means the session could not be established and
    /// is reported as [`TapError::SourceUnavailable`].
    pub async fn open(
        backend: Arc<dyn SearchBackend>,
        spec: Arc<QuerySpec>,
        options: CursorOptions,
    ) -> Result<Self> {
        let mut cursor = Self {
            backend,
            spec,
            options,
            state: CursorState::Idle,
            token: None,
            buffered: None,
            prefetch: None,
            total: None,
            pages_fetched: 0,
            documents_fetched: 0,
        };

        cursor.state = CursorState::Fetching;
        let timer = FetchTimer::new("search", cursor.backend.backend_name());
        match cursor.backend.search(&cursor.spec).await {
            Ok(page) => {
                timer.success(page.len());
                cursor.total = page.total;
                info!(
                    resource = %cursor.spec.resource,
                    total = ?page.total,
                    page_size = cursor.spec.page_size,
                    "Opened result cursor"
                );
                cursor.buffered = cursor.accept(page);
                cursor.maybe_prefetch();
                Ok(cursor)
            }
            Err(e) => {
                timer.error(e.error_type());
                cursor.state = CursorState::Failed;
                Err(TapError::SourceUnavailable(e))
            }
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn token(&self) -> Option<&ContinuationToken> {
        self.token.as_ref()
    }

    /// Total hits reported with the first page
    pub fn total_hits(&self) -> Option<u64> {
        self.total
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    pub fn documents_fetched(&self) -> u64 {
        self.documents_fetched
    }

    /// Next page in backend order, or `None` once the result set is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<ResultPage>> {
        match self.state {
            CursorState::Closed => Err(TapError::illegal_state("cursor is closed")),
            CursorState::Idle => Err(TapError::illegal_state("cursor was never opened")),
            _ if self.buffered.is_some() => Ok(self.buffered.take()),
            CursorState::Done => Ok(None),
            // A fetch whose future was dropped never advanced the token
            CursorState::HasMore | CursorState::Failed | CursorState::Fetching => {
                self.fetch_continuation().await
            }
        }
    }

    async fn fetch_continuation(&mut self) -> Result<Option<ResultPage>> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| TapError::illegal_state("no continuation token to resume from"))?;

        self.state = CursorState::Fetching;
        let timer = FetchTimer::new("scroll", self.backend.backend_name());
        let result = match self.prefetch.take() {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Prefetch task did not complete ({}), fetching directly", e);
                    self.backend
                        .scroll(&token, &self.spec.scroll_keep_alive)
                        .await
                }
            },
            None => {
                self.backend
                    .scroll(&token, &self.spec.scroll_keep_alive)
                    .await
            }
        };

        match result {
            Ok(page) => {
                timer.success(page.len());
                let page = self.accept(page);
                self.maybe_prefetch();
                Ok(page)
            }
            Err(e) => {
                timer.error(e.error_type());
                warn!(token = %token, "Continuation request failed: {}", e);
                self.state = CursorState::Failed;
                Err(TapError::BackendQuery(e))
            }
        }
    }

    /// Record a received page and move to `HasMore` or `Done`.
    ///
    /// Returns `None` for an empty page.
    fn accept(&mut self, mut page: ResultPage) -> Option<ResultPage> {
        let limit = self.spec.page_size;
        if page.documents.len() > limit {
            let dropped = page.documents.len() - limit;
            warn!(
                received = page.documents.len(),
                page_size = limit,
                "Backend returned more documents than requested, truncating"
            );
            metrics::record_page_truncated(self.backend.backend_name(), dropped);
            page.documents.truncate(limit);
        }

        let has_token = page.token.is_some();
        if let Some(token) = page.token.take() {
            self.token = Some(token);
        }

        self.pages_fetched += 1;
        self.documents_fetched += page.documents.len() as u64;

        if page.documents.is_empty() || !has_token {
            debug!(pages = self.pages_fetched, documents = self.documents_fetched, "Result set exhausted");
            self.state = CursorState::Done;
        } else {
            self.state = CursorState::HasMore;
        }

        if page.documents.is_empty() {
            None
        } else {
            page.token = self.token.clone();
            Some(page)
        }
    }

    fn maybe_prefetch(&mut self) {
        if !self.options.prefetch || self.state != CursorState::HasMore {
            return;
        }
        let Some(token) = self.token.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime, prefetch disabled");
            return;
        };

        let backend = Arc::clone(&self.backend);
        let keep_alive = self.spec.scroll_keep_alive.clone();
        self.prefetch = Some(runtime.spawn(async move { backend.scroll(&token, &keep_alive).await }));
    }

    /// Release the backend session. Valid in any state; repeated calls do
    /// nothing.
    pub async fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        if let Some(handle) = self.prefetch.take() {
            handle.abort();
            debug!("Discarded in-flight prefetch");
        }
        self.buffered = None;

        if let Some(token) = self.token.take() {
            if let Err(e) = self.backend.clear(&token).await {
                warn!(token = %token, "Failed to clear scroll context: {}", e);
            }
        }
        self.state = CursorState::Closed;
        debug!(pages = self.pages_fetched, documents = self.documents_fetched, "Closed result cursor");
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        if let Some(handle) = self.prefetch.take() {
            handle.abort();
        }
        if self.state != CursorState::Closed && self.token.is_some() {
            debug!("Cursor dropped without close, scroll context left to expire");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::decoder::Document;
    use crate::mapping::FieldMapping;
    use crate::projection::Projection;
    use crate::query::{Query, Resource};
    use serde_json::json;
    use std::time::Duration;

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::try_from(json!({ "n": i })).unwrap())
            .collect()
    }

    fn spec(page_size: usize) -> Arc<QuerySpec> {
        Arc::new(QuerySpec {
            resource: Resource::new("test"),
            query: Query::MatchAll,
            projection: Projection::default(),
            mapping: Arc::new(FieldMapping::empty()),
            page_size,
            scroll_keep_alive: "1m".to_string(),
        })
    }

    async fn drain(cursor: &mut ResultCursor) -> Vec<i64> {
        let mut seen = Vec::new();
        while let Some(page) = cursor.next_page().await.unwrap() {
            seen.extend(page.documents.iter().map(|d| d.source["n"].as_i64().unwrap()));
        }
        seen
    }

    #[tokio::test]
    async fn test_pages_in_order() {
        let backend = Arc::new(MemoryBackend::new(docs(7)));
        let mut cursor = ResultCursor::open(backend.clone(), spec(3), CursorOptions::default())
            .await
            .unwrap();
        assert_eq!(cursor.state(), CursorState::HasMore);
        assert_eq!(cursor.total_hits(), Some(7));

        assert_eq!(drain(&mut cursor).await, (0..7).collect::<Vec<_>>());
        assert_eq!(cursor.state(), CursorState::Done);

        // Exhausted is sticky and costs no request
        let scrolls = backend.scroll_count();
        assert!(cursor.next_page().await.unwrap().is_none());
        assert!(cursor.next_page().await.unwrap().is_none());
        assert_eq!(backend.scroll_count(), scrolls);
    }

    #[tokio::test]
    async fn test_empty_result() {
        let backend = Arc::new(MemoryBackend::new(Vec::new()));
        let mut cursor = ResultCursor::open(backend, spec(3), CursorOptions::default())
            .await
            .unwrap();
        assert_eq!(cursor.state(), CursorState::Done);
        assert!(cursor.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_failure_is_source_unavailable() {
        let backend = Arc::new(MemoryBackend::new(docs(2)));
        backend.fail_next_searches(1);
        let result = ResultCursor::open(backend, spec(3), CursorOptions::default()).await;
        assert!(matches!(result, Err(TapError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_failed_continuation_resumes_with_same_token() {
        let backend = Arc::new(MemoryBackend::new(docs(6)));
        let mut cursor = ResultCursor::open(backend.clone(), spec(2), CursorOptions::default())
            .await
            .unwrap();
        let first = cursor.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);

        let token_before = cursor.token().cloned();
        backend.fail_next_scrolls(1);
        let err = cursor.next_page().await.unwrap_err();
        assert!(matches!(err, TapError::BackendQuery(_)));
        assert_eq!(cursor.state(), CursorState::Failed);
        assert_eq!(cursor.token().cloned(), token_before);

        assert_eq!(drain(&mut cursor).await, vec![2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_oversized_page_is_truncated() {
        let backend = Arc::new(MemoryBackend::new(docs(5)).with_page_size_override(4));
        let mut cursor = ResultCursor::open(backend, spec(2), CursorOptions::default())
            .await
            .unwrap();
        let page = cursor.next_page().await.unwrap().unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let backend = Arc::new(MemoryBackend::new(docs(4)));
        let mut cursor = ResultCursor::open(backend.clone(), spec(2), CursorOptions::default())
            .await
            .unwrap();
        cursor.close().await;
        cursor.close().await;
        assert_eq!(cursor.state(), CursorState::Closed);
        assert_eq!(backend.clear_count(), 1);
        assert_eq!(backend.open_sessions(), 0);
        assert!(matches!(
            cursor.next_page().await,
            Err(TapError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn test_prefetch_preserves_order() {
        let backend = Arc::new(MemoryBackend::new(docs(10)));
        let options = CursorOptions { prefetch: true };
        let mut cursor = ResultCursor::open(backend, spec(3), options).await.unwrap();
        assert_eq!(drain(&mut cursor).await, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_prefetch_failure_surfaces_when_needed() {
        let backend = Arc::new(MemoryBackend::new(docs(4)));
        backend.fail_next_scrolls(1);
        let options = CursorOptions { prefetch: true };
        let mut cursor = ResultCursor::open(backend, spec(2), options).await.unwrap();

        // First page was already fetched, the failed prefetch is not visible yet
        let first = cursor.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);

        assert!(matches!(
            cursor.next_page().await,
            Err(TapError::BackendQuery(_))
        ));
        assert_eq!(drain(&mut cursor).await, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_close_discards_inflight_prefetch() {
        let backend = Arc::new(
            MemoryBackend::new(docs(4)).with_latency(Duration::from_millis(50)),
        );
        let options = CursorOptions { prefetch: true };
        let mut cursor = ResultCursor::open(backend.clone(), spec(2), options)
            .await
            .unwrap();
        cursor.close().await;
        assert_eq!(cursor.state(), CursorState::Closed);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.scroll_count(), 0);
    }
}
