//! Blocking facade over [`ConnectorSource`] for callers without a runtime.

use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

use crate::backend::SearchBackend;
use crate::config::TapConfig;
use crate::error::Result;
use crate::source::{ConnectorSource, SourceStats};
use crate::value::Tuple;

/// Owns a current-thread runtime and drives the source on it.
///
/// Must not be used from inside an async context; `block_on` panics there.
pub struct BlockingSource {
    runtime: Runtime,
    source: ConnectorSource,
    failed: bool,
}

impl BlockingSource {
    pub fn new(source: ConnectorSource) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            source,
            failed: false,
        })
    }

    pub fn with_backend(config: TapConfig, backend: Arc<dyn SearchBackend>) -> Result<Self> {
        Self::new(ConnectorSource::new(config, backend))
    }

    pub fn from_config(config: TapConfig) -> Result<Self> {
        Self::new(ConnectorSource::from_config(config)?)
    }

    pub fn open(&mut self) -> Result<()> {
        self.runtime.block_on(self.source.open())
    }

    pub fn has_next(&mut self) -> Result<bool> {
        self.runtime.block_on(self.source.has_next())
    }

    pub fn next_tuple(&mut self) -> Result<Tuple> {
        self.runtime.block_on(self.source.next())
    }

    pub fn close(&mut self) {
        self.runtime.block_on(self.source.close())
    }

    pub fn columns(&self) -> &[String] {
        self.source.columns()
    }

    pub fn stats(&self) -> SourceStats {
        self.source.stats()
    }
}

/// Yields tuples until exhaustion. After an error the iterator is finished;
/// use [`BlockingSource::has_next`] directly to retry a failed fetch.
impl Iterator for BlockingSource {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.runtime.block_on(self.source.next_tuple());
        match result {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for BlockingSource {
    fn drop(&mut self) {
        if !self.source.is_closed() {
            self.runtime.block_on(self.source.close());
        }
    }
}
