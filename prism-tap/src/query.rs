//! Query specification: what to read and how.
//!
//! Queries come in three forms:
//! - empty: match every document
//! - URI form, `?q=name:me*&df=name`, translated to a `query_string` query
//! - JSON Query DSL, either a full body `{"query": {...}}` or a bare clause

use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TapError};
use crate::mapping::FieldMapping;
use crate::projection::Projection;

/// Target index and optional (legacy) mapping type, written `index/type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub index: String,
    pub doc_type: Option<String>,
}

impl Resource {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
        }
    }

    pub fn parse(resource: &str) -> Result<Self> {
        let trimmed = resource.trim().trim_matches('/');
        let mut parts = trimmed.split('/');
        let index = parts.next().unwrap_or_default().trim();
        let doc_type = parts.next().map(str::trim);

        if index.is_empty() {
            return Err(TapError::config(format!(
                "invalid resource '{}', expected index or index/type",
                resource
            )));
        }
        if parts.next().is_some() || doc_type.is_some_and(str::is_empty) {
            return Err(TapError::config(format!(
                "invalid resource '{}', expected index or index/type",
                resource
            )));
        }

        Ok(Self {
            index: index.to_string(),
            doc_type: doc_type.map(str::to_string),
        })
    }

    /// Path segment used in search URLs
    pub fn path(&self) -> String {
        match &self.doc_type {
            Some(t) => format!("{}/{}", self.index, t),
            None => self.index.clone(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Query {
    #[default]
    MatchAll,
    /// URI search parameters (`q`, `df`, `default_operator`, `analyzer`, `lenient`)
    Uri(Vec<(String, String)>),
    /// A Query DSL clause
    Dsl(Value),
}

impl Query {
    pub fn parse(query: &str) -> Result<Self> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Query::MatchAll);
        }

        if let Some(params) = trimmed.strip_prefix('?') {
            let pairs: Vec<(String, String)> = url::form_urlencoded::parse(params.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if !pairs.iter().any(|(k, _)| k == "q") {
                return Err(TapError::config(format!(
                    "URI query '{}' has no 'q' parameter",
                    query
                )));
            }
            return Ok(Query::Uri(pairs));
        }

        if trimmed.starts_with('{') {
            let body: Value = serde_json::from_str(trimmed)
                .map_err(|e| TapError::config(format!("invalid query DSL: {}", e)))?;
            let clause = match body {
                Value::Object(mut map) if map.contains_key("query") => {
                    map.remove("query").unwrap_or(Value::Null)
                }
                other => other,
            };
            if !clause.is_object() {
                return Err(TapError::config("query DSL must be a JSON object"));
            }
            return Ok(Query::Dsl(clause));
        }

        // Bare Lucene syntax
        Ok(Query::Uri(vec![("q".to_string(), trimmed.to_string())]))
    }

    /// The query clause sent in the search body.
    pub fn to_dsl(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Dsl(clause) => clause.clone(),
            Query::Uri(params) => {
                let mut qs = Map::new();
                for (key, value) in params {
                    match key.as_str() {
                        "q" => {
                            qs.insert("query".to_string(), Value::String(value.clone()));
                        }
                        "df" => {
                            qs.insert("default_field".to_string(), Value::String(value.clone()));
                        }
                        "default_operator" | "analyzer" => {
                            qs.insert(key.clone(), Value::String(value.clone()));
                        }
                        "lenient" => {
                            qs.insert(key.clone(), Value::Bool(value == "true"));
                        }
                        other => {
                            tracing::debug!(param = other, "Ignoring unsupported URI query parameter");
                        }
                    }
                }
                json!({ "query_string": qs })
            }
        }
    }
}

/// Everything a cursor needs to run a query. Immutable once built.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub resource: Resource,
    pub query: Query,
    pub projection: Projection,
    pub mapping: Arc<FieldMapping>,
    pub page_size: usize,
    pub scroll_keep_alive: String,
}

impl QuerySpec {
    /// Body of the initial search request.
    ///
    /// When the projection is fixed, `_source` is narrowed to the top-level
    /// fields the columns read from.
    pub fn search_body(&self) -> Value {
        let mut body = json!({
            "size": self.page_size,
            "query": self.query.to_dsl(),
        });
        if let Some(roots) = self.projection.source_roots(&self.mapping) {
            if !roots.is_empty() && !roots.iter().any(|r| r.starts_with('_')) {
                body["_source"] = json!(roots);
            }
        }
        body
    }
}
