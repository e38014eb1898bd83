//! Connector configuration.
//!
//! A [`TapConfig`] is loaded from TOML or YAML (or built in code), then merged
//! with per-call string overrides. Both short keys (`query`, `pageSize`) and
//! the `es.`-prefixed settings (`es.query`, `es.scroll.size`) are understood;
//! anything else is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::AuthMethod;
use crate::error::{Result, TapError};
use crate::mapping::FieldMapping;
use crate::projection::Projection;
use crate::query::{Query, QuerySpec, Resource};

/// Largest page a single request may ask for
pub const MAX_PAGE_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TapConfig {
    /// `index` or `index/type`
    #[serde(default)]
    pub resource: String,

    /// Empty means match-all
    #[serde(default)]
    pub query: String,

    /// Tuple columns; empty means infer from the first document
    #[serde(default)]
    pub projection: Vec<String>,

    /// `logical:physical` pairs separated by `;` or `,`
    #[serde(default)]
    pub mapping: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Scroll context keep-alive, e.g. `5m`
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,

    /// Fetch the next page while the current one is consumed
    #[serde(default)]
    pub prefetch: bool,

    #[serde(default)]
    pub endpoint: EndpointConfig,
}

fn default_page_size() -> usize {
    50
}

fn default_scroll_keep_alive() -> String {
    "5m".to_string()
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            resource: String::new(),
            query: String::new(),
            projection: Vec::new(),
            mapping: String::new(),
            page_size: default_page_size(),
            scroll_keep_alive: default_scroll_keep_alive(),
            prefetch: false,
            endpoint: EndpointConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Node URL or `host:port`; extra comma-separated nodes are ignored
    #[serde(default = "default_nodes")]
    pub nodes: String,

    #[serde(default)]
    pub auth: AuthMethod,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_nodes() -> String {
    "http://localhost:9200".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    30000
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            auth: AuthMethod::None,
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl EndpointConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl TapConfig {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_projection<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mapping(mut self, mapping: impl Into<String>) -> Self {
        self.mapping = mapping.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_nodes(mut self, nodes: impl Into<String>) -> Self {
        self.endpoint.nodes = nodes.into();
        self
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// Apply string overrides on top of this configuration.
    ///
    /// `es.` keys are applied first, so when both spellings of a setting are
    /// given the short key (`query`) wins.
    pub fn merge_overrides(&mut self, overrides: &HashMap<String, String>) -> Result<()> {
        let mut sorted: Vec<(&str, &str)> = overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        sorted.sort_by_key(|(k, _)| (!k.starts_with("es."), *k));

        let mut user: Option<String> = None;
        let mut password: Option<String> = None;

        for (key, value) in sorted {
            match key {
                "resource" | "es.resource" => self.resource = value.to_string(),
                "query" | "es.query" => self.query = value.to_string(),
                "projection" | "es.read.fields" => {
                    self.projection = Projection::parse(value).columns().to_vec();
                }
                "mapping" | "es.mapping.names" => self.mapping = value.to_string(),
                "pageSize" | "es.scroll.size" => {
                    self.page_size = value.trim().parse().map_err(|_| {
                        TapError::config(format!("{} must be a positive integer, got '{}'", key, value))
                    })?;
                }
                "scrollKeepAlive" | "es.scroll.keepalive" => {
                    self.scroll_keep_alive = value.trim().to_string();
                }
                "prefetch" | "es.read.prefetch" => {
                    self.prefetch = value.trim().parse().map_err(|_| {
                        TapError::config(format!("{} must be true or false, got '{}'", key, value))
                    })?;
                }
                "nodes" | "es.nodes" => self.endpoint.nodes = value.to_string(),
                "requestTimeoutMs" | "es.http.timeout" => {
                    self.endpoint.request_timeout_ms = value.trim().parse().map_err(|_| {
                        TapError::config(format!("{} must be milliseconds, got '{}'", key, value))
                    })?;
                }
                "user" | "es.net.http.auth.user" => user = Some(value.to_string()),
                "password" | "es.net.http.auth.pass" => password = Some(value.to_string()),
                "apiKey" | "es.net.http.auth.api_key" => {
                    self.endpoint.auth = AuthMethod::ApiKey {
                        id: None,
                        key: value.to_string(),
                    };
                }
                other => tracing::debug!(key = other, "Ignoring unrecognized option"),
            }
        }

        if let Some(username) = user {
            self.endpoint.auth = AuthMethod::Basic {
                username,
                password: password.unwrap_or_default(),
            };
        }
        Ok(())
    }

    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Result<Self> {
        self.merge_overrides(overrides)?;
        Ok(self)
    }

    /// Validate and build the immutable query specification.
    pub fn query_spec(&self) -> Result<QuerySpec> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(TapError::config(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if !is_valid_keep_alive(&self.scroll_keep_alive) {
            return Err(TapError::config(format!(
                "invalid scroll keep-alive '{}', expected e.g. 30s, 5m or 1h",
                self.scroll_keep_alive
            )));
        }

        let resource = Resource::parse(&self.resource)?;
        let query = Query::parse(&self.query)?;
        let mapping = FieldMapping::parse(&self.mapping)?;
        let projection = Projection::new(self.projection.iter().map(String::as_str));
        projection.validate(&mapping)?;

        Ok(QuerySpec {
            resource,
            query,
            projection,
            mapping: Arc::new(mapping),
            page_size: self.page_size,
            scroll_keep_alive: self.scroll_keep_alive.clone(),
        })
    }
}

fn is_valid_keep_alive(value: &str) -> bool {
    let unit_start = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(unit_start);
    !amount.is_empty()
        && amount.parse::<u64>().is_ok_and(|n| n > 0)
        && matches!(unit, "d" | "h" | "m" | "s" | "ms" | "micros" | "nanos")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = TapConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.scroll_keep_alive, "5m");
        assert!(!config.prefetch);
        assert_eq!(config.endpoint.nodes, "http://localhost:9200");
        assert_eq!(config.endpoint.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_merge_overrides() {
        let mut config = TapConfig::new("cascading-local/artists");
        config
            .merge_overrides(&overrides(&[
                ("es.query", "?q=me*"),
                ("es.mapping.names", "url:address"),
                ("projection", "url, name"),
                ("pageSize", "10"),
                ("es.nodes", "es1:9200"),
                ("unknown.option", "whatever"),
            ]))
            .unwrap();

        assert_eq!(config.query, "?q=me*");
        assert_eq!(config.mapping, "url:address");
        assert_eq!(config.projection, vec!["url", "name"]);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.endpoint.nodes, "es1:9200");
    }

    #[test]
    fn test_short_key_wins() {
        let config = TapConfig::new("a")
            .with_overrides(&overrides(&[("es.query", "?q=a"), ("query", "?q=b")]))
            .unwrap();
        assert_eq!(config.query, "?q=b");

        // Also when the short key sorts before the `es.` one
        let config = TapConfig::new("a")
            .with_overrides(&overrides(&[
                ("apiKey", "short"),
                ("es.net.http.auth.api_key", "long"),
            ]))
            .unwrap();
        assert_eq!(
            config.endpoint.auth,
            AuthMethod::ApiKey {
                id: None,
                key: "short".into()
            }
        );
    }

    #[test]
    fn test_auth_overrides() {
        let config = TapConfig::new("a")
            .with_overrides(&overrides(&[
                ("es.net.http.auth.user", "elastic"),
                ("es.net.http.auth.pass", "changeme"),
            ]))
            .unwrap();
        assert_eq!(
            config.endpoint.auth,
            AuthMethod::Basic {
                username: "elastic".into(),
                password: "changeme".into()
            }
        );
    }

    #[test]
    fn test_bad_override_values() {
        let err = TapConfig::new("a")
            .with_overrides(&overrides(&[("pageSize", "lots")]))
            .unwrap_err();
        assert!(matches!(err, TapError::Config(_)));

        assert!(TapConfig::new("a")
            .with_overrides(&overrides(&[("prefetch", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_query_spec_validation() {
        assert!(TapConfig::new("a").with_page_size(0).query_spec().is_err());
        assert!(TapConfig::new("a")
            .with_page_size(MAX_PAGE_SIZE + 1)
            .query_spec()
            .is_err());
        assert!(TapConfig::new("").query_spec().is_err());
        assert!(TapConfig::new("a").with_mapping("a:x,b:x").query_spec().is_err());
        assert!(TapConfig::new("a")
            .with_projection(["ok", "bad..path"])
            .query_spec()
            .is_err());

        let mut config = TapConfig::new("a");
        config.scroll_keep_alive = "forever".to_string();
        assert!(config.query_spec().is_err());
    }

    #[test]
    fn test_query_spec() {
        let spec = TapConfig::new("cascading-local/alias")
            .with_projection(["url"])
            .with_mapping("url:address")
            .with_page_size(100)
            .query_spec()
            .unwrap();
        assert_eq!(spec.resource.index, "cascading-local");
        assert_eq!(spec.query, Query::MatchAll);
        assert_eq!(spec.projection.columns(), ["url"]);
        assert_eq!(spec.mapping.resolve("url").unwrap(), "address");
        assert_eq!(spec.page_size, 100);
    }

    #[test]
    fn test_keep_alive_format() {
        assert!(is_valid_keep_alive("30s"));
        assert!(is_valid_keep_alive("5m"));
        assert!(is_valid_keep_alive("250ms"));
        assert!(!is_valid_keep_alive("m"));
        assert!(!is_valid_keep_alive("0m"));
        assert!(!is_valid_keep_alive("5 minutes"));
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tap.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
resource = "artists"
projection = ["url", "name"]
page_size = 20

[endpoint]
nodes = "http://es:9200"

[endpoint.auth]
type = "basic"
username = "u"
password = "p"
"#
        )
        .unwrap();

        let config = TapConfig::load(&path).unwrap();
        assert_eq!(config.resource, "artists");
        assert_eq!(config.projection, vec!["url", "name"]);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.scroll_keep_alive, "5m");
        assert_eq!(config.endpoint.nodes, "http://es:9200");
        assert!(matches!(config.endpoint.auth, AuthMethod::Basic { .. }));
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tap.yaml");
        fs::write(
            &path,
            "resource: artists/alias\nmapping: \"url:address\"\nprefetch: true\n",
        )
        .unwrap();

        let config = TapConfig::load(&path).unwrap();
        assert_eq!(config.resource, "artists/alias");
        assert_eq!(config.mapping, "url:address");
        assert!(config.prefetch);
    }

    #[test]
    fn test_load_missing_file() {
        let err = TapConfig::load(Path::new("/nonexistent/tap.toml")).unwrap_err();
        assert!(matches!(err, TapError::Io(_)));
    }
}
