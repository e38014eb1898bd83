//! Elasticsearch scroll API backend.
//!
//! ```text
//! POST   /{index}[/{type}]/_search?scroll=5m   {"size", "query", "_source"}
//! POST   /_search/scroll                       {"scroll", "scroll_id"}
//! DELETE /_search/scroll                       {"scroll_id": [...]}
//! ```

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};
use url::Url;

use super::traits::{ContinuationToken, ResultPage, SearchBackend};
use crate::config::EndpointConfig;
use crate::decoder::Document;
use crate::error::{BackendError, BackendResult};
use crate::query::QuerySpec;

/// How requests authenticate against the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    /// Either an already encoded key, or an `id` + `key` pair
    ApiKey {
        #[serde(default)]
        id: Option<String>,
        key: String,
    },
}

impl AuthMethod {
    fn api_key_header(id: Option<&str>, key: &str) -> String {
        match id {
            Some(id) => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", id, key));
                format!("ApiKey {}", encoded)
            }
            None => format!("ApiKey {}", key),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(default)]
    timed_out: bool,
    #[serde(rename = "_shards", default)]
    shards: Option<ShardStats>,
    hits: HitsResponse,
}

#[derive(Debug, Deserialize)]
struct ShardStats {
    total: u32,
    #[serde(default)]
    failed: u32,
}

#[derive(Debug, Deserialize)]
struct HitsResponse {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Document>,
}

/// `hits.total` is a bare number before 7.x and an object after
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            TotalHits::Count(v) | TotalHits::Object { value: v } => *v,
        }
    }
}

pub struct ElasticsearchBackend {
    client: reqwest::Client,
    base_url: Url,
    auth: AuthMethod,
}

impl ElasticsearchBackend {
    pub fn new(endpoint: &EndpointConfig) -> BackendResult<Self> {
        let base_url = parse_base_url(&endpoint.nodes)?;
        let client = reqwest::Client::builder()
            .connect_timeout(endpoint.connect_timeout())
            .timeout(endpoint.request_timeout())
            .build()?;

        debug!("Elasticsearch backend at {}", base_url);
        Ok(Self {
            client,
            base_url,
            auth: endpoint.auth.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth {
            AuthMethod::None => builder,
            AuthMethod::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            AuthMethod::ApiKey { id, key } => {
                builder.header(AUTHORIZATION, AuthMethod::api_key_header(id.as_deref(), key))
            }
        }
    }

    /// Map the status line, then decode a search/scroll body into a page.
    async fn read_page(
        response: Response,
        not_found: impl FnOnce() -> BackendError,
    ) -> BackendResult<ResultPage> {
        let response = check_status(response, not_found).await?;
        let bytes = response.bytes().await?;
        let parsed: SearchResponse = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        if parsed.timed_out {
            warn!("Search timed out on the server, page may be partial");
        }
        if let Some(shards) = &parsed.shards {
            if shards.failed > 0 {
                warn!(
                    "{} of {} shards failed, results may be incomplete",
                    shards.failed, shards.total
                );
            }
        }

        Ok(ResultPage {
            documents: parsed.hits.hits,
            token: parsed.scroll_id.map(ContinuationToken::new),
            total: parsed.hits.total.as_ref().map(TotalHits::value),
        })
    }
}

async fn check_status(
    response: Response,
    not_found: impl FnOnce() -> BackendError,
) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BackendError::Auth {
            status: status.as_u16(),
        }),
        StatusCode::NOT_FOUND => Err(not_found()),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Accepts `host:port`, a full URL, or a comma-separated node list (first
/// node wins).
fn parse_base_url(nodes: &str) -> BackendResult<Url> {
    let mut candidates = nodes.split(',').map(str::trim).filter(|n| !n.is_empty());
    let first = candidates.next().unwrap_or("localhost:9200");
    let others: Vec<&str> = candidates.collect();
    if !others.is_empty() {
        debug!(ignored = ?others, "Using first configured node only");
    }

    let with_scheme = if first.contains("://") {
        first.to_string()
    } else {
        format!("http://{}", first)
    };
    let mut url = Url::parse(&with_scheme)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    #[instrument(skip(self, spec), fields(resource = %spec.resource, size = spec.page_size))]
    async fn search(&self, spec: &QuerySpec) -> BackendResult<ResultPage> {
        let mut url = self.base_url.join(&format!("{}/_search", spec.resource.path()))?;
        url.query_pairs_mut()
            .append_pair("scroll", &spec.scroll_keep_alive);

        let body = spec.search_body();
        debug!("POST {} {}", url, body);
        let response = self.request(Method::POST, url).json(&body).send().await?;

        let index = spec.resource.to_string();
        Self::read_page(response, move || BackendError::IndexNotFound(index)).await
    }

    #[instrument(skip(self, token), fields(token = %token))]
    async fn scroll(
        &self,
        token: &ContinuationToken,
        keep_alive: &str,
    ) -> BackendResult<ResultPage> {
        let url = self.base_url.join("_search/scroll")?;
        let body = json!({
            "scroll": keep_alive,
            "scroll_id": token.as_str(),
        });
        let response = self.request(Method::POST, url).json(&body).send().await?;

        let expired = token.to_string();
        Self::read_page(response, move || BackendError::ScrollExpired(expired)).await
    }

    #[instrument(skip(self, token), fields(token = %token))]
    async fn clear(&self, token: &ContinuationToken) -> BackendResult<()> {
        let url = self.base_url.join("_search/scroll")?;
        let body = json!({ "scroll_id": [token.as_str()] });
        let response = self
            .request(Method::DELETE, url)
            .json(&body)
            .send()
            .await?;

        // Already gone is as good as cleared
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Scroll context was already released");
            return Ok(());
        }
        check_status(response, || BackendError::ScrollExpired(token.to_string())).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "elasticsearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_url() {
        assert_eq!(
            parse_base_url("localhost:9200").unwrap().as_str(),
            "http://localhost:9200/"
        );
        assert_eq!(
            parse_base_url("https://es.example.com/proxy").unwrap().as_str(),
            "https://es.example.com/proxy/"
        );
        assert_eq!(
            parse_base_url("node-a:9200, node-b:9200").unwrap().as_str(),
            "http://node-a:9200/"
        );
        assert!(parse_base_url("http://").is_err());
    }

    #[test]
    fn test_api_key_header() {
        assert_eq!(AuthMethod::api_key_header(None, "abc=="), "ApiKey abc==");
        assert_eq!(
            AuthMethod::api_key_header(Some("id"), "secret"),
            "ApiKey aWQ6c2VjcmV0"
        );
    }

    #[test]
    fn test_auth_method_serde() {
        let auth: AuthMethod =
            serde_json::from_str(r#"{"type": "basic", "username": "u", "password": "p"}"#)
                .unwrap();
        assert_eq!(
            auth,
            AuthMethod::Basic {
                username: "u".into(),
                password: "p".into()
            }
        );

        let auth: AuthMethod = serde_json::from_str(r#"{"type": "none"}"#).unwrap();
        assert_eq!(auth, AuthMethod::None);
    }

    #[test]
    fn test_total_hits_formats() {
        let old: HitsResponse = serde_json::from_str(r#"{"total": 12, "hits": []}"#).unwrap();
        assert_eq!(old.total.unwrap().value(), 12);

        let new: HitsResponse =
            serde_json::from_str(r#"{"total": {"value": 7, "relation": "eq"}, "hits": []}"#)
                .unwrap();
        assert_eq!(new.total.unwrap().value(), 7);
    }

    #[test]
    fn test_backend_from_endpoint() {
        let endpoint = EndpointConfig {
            nodes: "127.0.0.1:9201".to_string(),
            ..Default::default()
        };
        let backend = ElasticsearchBackend::new(&endpoint).unwrap();
        assert_eq!(backend.base_url().as_str(), "http://127.0.0.1:9201/");
        assert_eq!(backend.backend_name(), "elasticsearch");
    }
}
