//! Read-side connector that pulls search-index documents as tuples.
//!
//! A [`ConnectorSource`] runs one query against a search backend, pages
//! through the results with a scroll cursor and decodes every hit into a
//! fixed-arity [`Tuple`] following a [`Projection`] and an optional
//! [`FieldMapping`] of logical column names to physical field paths.
//!
//! # Architecture
//!
//! ```text
//!  TapConfig ──query_spec()──▶ QuerySpec (immutable, shared via Arc)
//!                                   │
//!  ┌────────────────────────────────┼──────────────────────────┐
//!  │ ConnectorSource                ▼                          │
//!  │   open / has_next / next ─▶ ResultCursor ─▶ SearchBackend │
//!  │          │                     (pages)      ├ Elasticsearch
//!  │          ▼                                  └ Memory     │
//!  │   decoder::decode(Document, Projection, FieldMapping)     │
//!  └───────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//!        Tuple ──▶ caller (pull, Stream, or BlockingSource iterator)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use prism_tap::{ConnectorSource, TapConfig};
//!
//! # async fn run() -> prism_tap::Result<()> {
//! let config = TapConfig::new("cascading-local/artists")
//!     .with_nodes("http://localhost:9200")
//!     .with_query("?q=me*")
//!     .with_projection(["name", "address"])
//!     .with_mapping("address:url");
//!
//! let mut source = ConnectorSource::from_config(config)?;
//! source.open().await?;
//! while source.has_next().await? {
//!     println!("{}", source.next().await?);
//! }
//! source.close().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod blocking;
pub mod config;
pub mod cursor;
pub mod decoder;
pub mod error;
pub mod mapping;
pub mod metrics;
pub mod projection;
pub mod query;
pub mod source;
pub mod value;

pub use backend::{
    AuthMethod, ContinuationToken, ElasticsearchBackend, MemoryBackend, ResultPage, SearchBackend,
};
pub use blocking::BlockingSource;
pub use config::{EndpointConfig, TapConfig};
pub use cursor::{CursorOptions, CursorState, ResultCursor};
pub use decoder::{decode, Document};
pub use error::{BackendError, Result, TapError};
pub use mapping::FieldMapping;
pub use projection::Projection;
pub use query::{Query, QuerySpec, Resource};
pub use source::{ConnectorSource, SourceStats, SourceStream};
pub use value::{Cell, Scalar, Tuple};
