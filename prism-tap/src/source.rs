//! The pull-based connector.
//!
//! A [`ConnectorSource`] goes `Created -> Open -> Closed`. While open it hands
//! out one [`Tuple`] per matching document, fetching pages behind the scenes.

use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::backend::{ElasticsearchBackend, SearchBackend};
use crate::config::TapConfig;
use crate::cursor::{CursorOptions, ResultCursor};
use crate::decoder::{self, Document};
use crate::error::{Result, TapError};
use crate::projection::Projection;
use crate::query::QuerySpec;
use crate::value::Tuple;

/// Tuples of a source, ending after exhaustion or the first error
pub type SourceStream = Pin<Box<dyn Stream<Item = Result<Tuple>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Open,
    Closed,
}

/// Counters for one source session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub pages: u64,
    pub documents: u64,
    pub tuples: u64,
    pub total_hits: Option<u64>,
}

pub struct ConnectorSource {
    config: TapConfig,
    backend: Arc<dyn SearchBackend>,
    phase: Phase,
    spec: Option<Arc<QuerySpec>>,
    /// Copy of the query's projection; the one that gets inferred
    projection: Projection,
    cursor: Option<ResultCursor>,
    pending: VecDeque<Document>,
    exhausted: bool,
    tuples: u64,
}

impl ConnectorSource {
    pub fn new(config: TapConfig, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            config,
            backend,
            phase: Phase::Created,
            spec: None,
            projection: Projection::default(),
            cursor: None,
            pending: VecDeque::new(),
            exhausted: false,
            tuples: 0,
        }
    }

    /// Build a source talking to the Elasticsearch endpoint in `config`.
    pub fn from_config(config: TapConfig) -> Result<Self> {
        let backend = ElasticsearchBackend::new(&config.endpoint).map_err(|e| {
            TapError::config(format!(
                "invalid endpoint '{}': {}",
                config.endpoint.nodes, e
            ))
        })?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    /// Validate the configuration and issue the initial query.
    ///
    /// If the backend cannot be reached the source stays unopened and `open`
    /// may be called again.
    #[instrument(skip(self), fields(resource = %self.config.resource))]
    pub async fn open(&mut self) -> Result<()> {
        match self.phase {
            Phase::Created => {}
            Phase::Open => return Err(TapError::illegal_state("source is already open")),
            Phase::Closed => return Err(TapError::illegal_state("source is closed")),
        }

        let spec = Arc::new(self.config.query_spec()?);
        let options = CursorOptions {
            prefetch: self.config.prefetch,
        };
        let cursor = ResultCursor::open(Arc::clone(&self.backend), Arc::clone(&spec), options).await?;

        info!(
            backend = self.backend.backend_name(),
            columns = ?spec.projection.columns(),
            "Opened source"
        );
        self.projection = spec.projection.clone();
        self.spec = Some(spec);
        self.cursor = Some(cursor);
        self.phase = Phase::Open;
        Ok(())
    }

    /// Whether another tuple is available. Does not consume it.
    ///
    /// Fetches the next page when the current one is used up. A failed fetch
    /// can be retried by calling `has_next` again.
    pub async fn has_next(&mut self) -> Result<bool> {
        self.ensure_open()?;
        loop {
            if let Some(first) = self.pending.front() {
                if self.projection.needs_inference() {
                    let mapping = self.spec.as_ref().map(|s| Arc::clone(&s.mapping));
                    if let Some(mapping) = mapping {
                        self.projection.infer(first, &mapping)?;
                    }
                }
                return Ok(true);
            }
            if self.exhausted {
                return Ok(false);
            }

            let cursor = self
                .cursor
                .as_mut()
                .ok_or_else(|| TapError::illegal_state("source has no cursor"))?;
            match cursor.next_page().await? {
                Some(page) => {
                    debug!(documents = page.len(), "Buffered page");
                    self.pending.extend(page.documents);
                }
                None => self.exhausted = true,
            }
        }
    }

    /// Decode the current document and advance.
    pub async fn next(&mut self) -> Result<Tuple> {
        if !self.has_next().await? {
            return Err(TapError::illegal_state("no more tuples"));
        }
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| TapError::illegal_state("source has no query"))?;
        let document = self
            .pending
            .pop_front()
            .ok_or_else(|| TapError::illegal_state("no more tuples"))?;

        self.tuples += 1;
        Ok(decoder::decode(&document, &self.projection, &spec.mapping))
    }

    /// `has_next` + `next` in one call; `None` when exhausted.
    pub async fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        if self.has_next().await? {
            self.next().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Release the backend session. Safe in any phase and repeatable.
    pub async fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.close().await;
        }
        self.pending.clear();
        self.phase = Phase::Closed;
        debug!(tuples = self.tuples, "Closed source");
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Tuple columns. Empty until the first document was seen when the
    /// projection is inferred.
    pub fn columns(&self) -> &[String] {
        self.projection.columns()
    }

    pub fn stats(&self) -> SourceStats {
        let (pages, documents, total_hits) = match &self.cursor {
            Some(cursor) => (
                cursor.pages_fetched(),
                cursor.documents_fetched(),
                cursor.total_hits(),
            ),
            None => (0, 0, None),
        };
        SourceStats {
            pages,
            documents,
            tuples: self.tuples,
            total_hits,
        }
    }

    /// Turn the source into a stream, opening it first if needed.
    ///
    /// The source is closed when the stream ends, including after an error.
    pub fn into_stream(mut self) -> SourceStream {
        Box::pin(async_stream::stream! {
            if self.phase == Phase::Created {
                if let Err(e) = self.open().await {
                    yield Err(e);
                    self.close().await;
                    return;
                }
            }
            loop {
                match self.next_tuple().await {
                    Ok(Some(tuple)) => yield Ok(tuple),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
            self.close().await;
        })
    }

    fn ensure_open(&self) -> Result<()> {
        match self.phase {
            Phase::Open => Ok(()),
            Phase::Created => Err(TapError::illegal_state("source is not open")),
            Phase::Closed => Err(TapError::illegal_state("source is closed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::value::Cell;
    use futures::StreamExt;
    use serde_json::json;

    fn backend(values: Vec<serde_json::Value>) -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::new(
            values
                .into_iter()
                .map(|v| Document::try_from(v).unwrap())
                .collect(),
        ))
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let backend = backend(vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})]);
        let config = TapConfig::new("idx").with_page_size(2).with_projection(["a"]);
        let mut source = ConnectorSource::new(config, backend.clone());

        assert!(matches!(source.has_next().await, Err(TapError::IllegalState(_))));
        source.open().await.unwrap();
        assert!(matches!(source.open().await, Err(TapError::IllegalState(_))));

        let mut seen = Vec::new();
        while source.has_next().await.unwrap() {
            seen.push(source.next().await.unwrap().get(0).unwrap().as_i64().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(matches!(source.next().await, Err(TapError::IllegalState(_))));

        let stats = source.stats();
        assert_eq!(stats.tuples, 3);
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.total_hits, Some(3));

        source.close().await;
        source.close().await;
        assert!(source.is_closed());
        assert_eq!(source.stats().tuples, 3);
        assert_eq!(backend.open_sessions(), 0);
        assert!(matches!(source.has_next().await, Err(TapError::IllegalState(_))));
    }

    #[tokio::test]
    async fn test_has_next_does_not_consume() {
        let backend = backend(vec![json!({"a": "x"})]);
        let mut source = ConnectorSource::new(TapConfig::new("idx"), backend);
        source.open().await.unwrap();
        assert!(source.has_next().await.unwrap());
        assert!(source.has_next().await.unwrap());
        assert_eq!(source.next().await.unwrap().get(0), Some(&Cell::from("x")));
        assert!(!source.has_next().await.unwrap());
    }

    #[tokio::test]
    async fn test_inference_is_fixed_by_first_document() {
        let backend = backend(vec![
            json!({"b": 1, "a": 2}),
            json!({"a": 3, "c": 4}),
        ]);
        let mut source = ConnectorSource::new(TapConfig::new("idx"), backend);
        source.open().await.unwrap();
        assert!(source.columns().is_empty());

        let first = source.next().await.unwrap();
        assert_eq!(source.columns(), ["b", "a"]);
        assert_eq!(first.len(), 2);

        let second = source.next().await.unwrap();
        assert_eq!(second.get(0), Some(&Cell::Null));
        assert_eq!(second.get(1).and_then(Cell::as_i64), Some(3));
    }

    #[tokio::test]
    async fn test_close_before_open() {
        let backend = backend(vec![json!({"a": 1})]);
        let mut source = ConnectorSource::new(TapConfig::new("idx"), backend.clone());
        source.close().await;
        assert!(source.is_closed());
        assert_eq!(backend.search_count(), 0);
        assert!(matches!(source.open().await, Err(TapError::IllegalState(_))));
    }

    #[tokio::test]
    async fn test_open_failure_allows_retry() {
        let backend = backend(vec![json!({"a": 1})]);
        backend.fail_next_searches(1);
        let mut source = ConnectorSource::new(TapConfig::new("idx"), backend);

        assert!(matches!(source.open().await, Err(TapError::SourceUnavailable(_))));
        assert!(!source.is_open());
        source.open().await.unwrap();
        assert!(source.has_next().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_open() {
        let backend = backend(vec![]);
        let config = TapConfig::new("idx").with_mapping("broken");
        let mut source = ConnectorSource::new(config, backend.clone());
        assert!(matches!(source.open().await, Err(TapError::Config(_))));
        assert_eq!(backend.search_count(), 0);
    }

    #[tokio::test]
    async fn test_into_stream_closes_source() {
        let backend = backend(vec![json!({"a": 1}), json!({"a": 2})]);
        let config = TapConfig::new("idx").with_page_size(1);
        let source = ConnectorSource::new(config, backend.clone());

        let tuples: Vec<Tuple> = source
            .into_stream()
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tuples.len(), 2);
        assert_eq!(backend.clear_count(), 1);
        assert_eq!(backend.open_sessions(), 0);
    }

    #[test]
    fn test_from_config_keeps_config() {
        let config = TapConfig::new("artists/alias").with_nodes("http://es:9200");
        let source = ConnectorSource::from_config(config.clone()).unwrap();
        assert_eq!(source.config(), &config);
        assert!(!source.is_open());
    }

    #[test]
    fn test_from_config_rejects_bad_endpoint() {
        let config = TapConfig::new("idx").with_nodes("http://");
        assert!(matches!(
            ConnectorSource::from_config(config),
            Err(TapError::Config(_))
        ));
    }
}
