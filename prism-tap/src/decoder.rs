//! Flattening of search hits into tuples.
//!
//! Paths are dot-separated and walked through nested objects. When an
//! intermediate segment holds an array, the walk continues into its first
//! element; arrays are never expanded into several tuples. Keys that
//! contain dots are matched verbatim, longest first, at every level of the
//! walk before the path is split further.
//!
//! Missing fields decode to [`Cell::Null`]. So does a path that runs into a
//! scalar where an object was expected: documents in a search index are
//! heterogeneous and one malformed field must not fail the session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TapError;
use crate::mapping::FieldMapping;
use crate::metrics;
use crate::projection::Projection;
use crate::value::{Cell, Tuple};

/// Hit metadata column holding the document id
pub const ID_COLUMN: &str = "_id";
/// Hit metadata column holding the index the document came from
pub const INDEX_COLUMN: &str = "_index";

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

impl Document {
    pub fn new(source: Map<String, Value>) -> Self {
        Self {
            id: None,
            index: None,
            source,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Top-level source keys in the order the backend sent them
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.source.keys().map(String::as_str)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(source: Map<String, Value>) -> Self {
        Self::new(source)
    }
}

impl TryFrom<Value> for Document {
    type Error = TapError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(TapError::config(format!(
                "document source must be a JSON object, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, PartialEq)]
enum Lookup<'a> {
    Found(&'a Value),
    Missing,
    /// Segment reached a scalar before the path ended
    Anomaly(&'a str),
}

/// Longest key first: `a.b.c` tries `a.b.c`, then `a.b` + `c`, then `a` + `b.c`.
fn walk<'a>(object: &'a Map<String, Value>, path: &'a str) -> Lookup<'a> {
    if let Some(value) = object.get(path) {
        return Lookup::Found(value);
    }
    let mut result = Lookup::Missing;
    for (dot, _) in path.rmatch_indices('.') {
        let (head, rest) = (&path[..dot], &path[dot + 1..]);
        let Some(value) = object.get(head) else {
            continue;
        };
        match descend(value, head, rest) {
            Lookup::Found(found) => return Lookup::Found(found),
            Lookup::Anomaly(segment) => result = Lookup::Anomaly(segment),
            Lookup::Missing => {}
        }
    }
    result
}

fn descend<'a>(value: &'a Value, segment: &'a str, rest: &'a str) -> Lookup<'a> {
    match value {
        Value::Object(inner) => walk(inner, rest),
        Value::Array(items) => match items.first() {
            Some(first) => descend(first, segment, rest),
            None => Lookup::Missing,
        },
        Value::Null => Lookup::Missing,
        _ => Lookup::Anomaly(segment),
    }
}

/// Extract the cell at `path` from a document.
pub fn extract(document: &Document, path: &str) -> Cell {
    match walk(&document.source, path) {
        Lookup::Found(value) => Cell::from(value),
        Lookup::Missing => match path {
            ID_COLUMN => document.id.as_deref().map(Cell::from).unwrap_or_default(),
            INDEX_COLUMN => document.index.as_deref().map(Cell::from).unwrap_or_default(),
            _ => Cell::Null,
        },
        Lookup::Anomaly(segment) => {
            tracing::trace!(
                path,
                segment,
                id = document.id.as_deref().unwrap_or(""),
                "Path segment is a scalar, decoding as null"
            );
            metrics::record_decode_anomaly();
            Cell::Null
        }
    }
}

/// Decode one document into a tuple in projection column order.
pub fn decode(document: &Document, projection: &Projection, mapping: &FieldMapping) -> Tuple {
    projection
        .columns()
        .iter()
        .map(|column| extract(document, mapping.resolve_or_literal(column)))
        .collect::<Vec<_>>()
        .into()
}
