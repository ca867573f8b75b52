//! reqwest-backed transport for the row and storage endpoints
//!
//! Row endpoint:     `{base}/rest/v1/{collection}?select=..&field=eq.value&order=..&limit=..`
//! Storage endpoint: `POST {base}/storage/v1/object/list/{bucket}` with `{"prefix": ..}`

use super::{RawResponse, Transport};
use crate::error::{ProbeError, TransportError};
use crate::identity::Identity;
use crate::operation::Operation;
use crate::resource::ResourceRef;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const REST_PATH: &str = "rest/v1";
const STORAGE_LIST_PATH: &str = "storage/v1/object/list";

/// HTTP transport against one project endpoint
pub struct RestTransport {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl RestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> crate::error::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| {
            ProbeError::Transport(TransportError::InvalidUrl {
                url: base_url.clone(),
                message: e.to_string(),
            })
        })?;

        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            ProbeError::Transport(TransportError::Request(format!(
                "Failed to create HTTP client: {}",
                e
            )))
        })?;

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn with_default_timeout(base_url: impl Into<String>) -> crate::error::Result<Self> {
        Self::new(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for an operation on a resource.
    pub fn request_url(
        &self,
        operation: &Operation,
        resource: &ResourceRef,
    ) -> Result<Url, TransportError> {
        let raw = match operation {
            Operation::ListObjects { .. } => format!(
                "{}/{}/{}",
                self.base_url,
                STORAGE_LIST_PATH,
                resource.collection()
            ),
            _ => format!("{}/{}/{}", self.base_url, REST_PATH, resource.collection()),
        };

        let mut url = Url::parse(&raw).map_err(|e| TransportError::InvalidUrl {
            url: raw.clone(),
            message: e.to_string(),
        })?;

        if !matches!(operation, Operation::ListObjects { .. }) {
            let pairs = resource.query_pairs();
            if !pairs.is_empty() {
                let mut query = url.query_pairs_mut();
                for (key, value) in &pairs {
                    query.append_pair(key, value);
                }
            }
        }

        Ok(url)
    }

    fn method_and_body(operation: &Operation) -> (Method, Option<Value>) {
        match operation {
            Operation::Read => (Method::GET, None),
            Operation::Create { payload, .. } => {
                (Method::POST, Some(Value::Object(payload.clone())))
            }
            Operation::Update { payload, .. } => {
                (Method::PATCH, Some(Value::Object(payload.clone())))
            }
            Operation::ListObjects { prefix } => (Method::POST, Some(json!({ "prefix": prefix }))),
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.timeout_ms(),
            }
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn execute(
        &self,
        identity: &Identity,
        operation: &Operation,
        resource: &ResourceRef,
    ) -> Result<RawResponse, TransportError> {
        let url = self.request_url(operation, resource)?;
        let (method, body) = Self::method_and_body(operation);

        let mut log_url = url.clone();
        log_url.set_query(None);
        debug!(
            method = %method,
            url = %log_url,
            identity = %identity.kind(),
            "Sending probe request"
        );

        let mut request = self.http.request(method, url);
        for (name, value) in identity.headers() {
            request = request.header(name, value);
        }
        if let Some(prefer) = operation.prefer().and_then(|p| p.header_value()) {
            request = request.header("Prefer", prefer);
        }
        if let Some(body) = body {
            // sets Content-Type: application/json
            request = request.json(&body);
        }

        let start = Instant::now();
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    timeout_ms: self.timeout_ms(),
                }
            } else {
                TransportError::Body(e.to_string())
            }
        })?;

        debug!(
            status = status,
            size_bytes = body.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Probe response received"
        );

        Ok(RawResponse {
            status,
            body,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Prefer;
    use crate::resource::Order;

    #[test]
    fn test_rest_url_carries_query() {
        let transport = RestTransport::with_default_timeout("https://xyz.example.co/").unwrap();
        let resource = ResourceRef::new("posts")
            .select(&["id", "author_id"])
            .eq("author_id", "u-1")
            .order(Order::desc("created_at"))
            .limit(5);

        let url = transport.request_url(&Operation::Read, &resource).unwrap();
        assert_eq!(url.path(), "/rest/v1/posts");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs, resource.query_pairs());
    }

    #[test]
    fn test_storage_url_ignores_filters() {
        let transport = RestTransport::with_default_timeout("https://xyz.example.co").unwrap();
        let resource = ResourceRef::new("profile-pics").eq("ignored", "x");
        let url = transport
            .request_url(&Operation::list_objects("u-1"), &resource)
            .unwrap();
        assert_eq!(url.path(), "/storage/v1/object/list/profile-pics");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_url_without_query_has_no_question_mark() {
        let transport = RestTransport::with_default_timeout("https://xyz.example.co").unwrap();
        let url = transport
            .request_url(
                &Operation::create(serde_json::json!({}), Prefer::default()),
                &ResourceRef::new("posts"),
            )
            .unwrap();
        assert_eq!(url.as_str(), "https://xyz.example.co/rest/v1/posts");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(RestTransport::with_default_timeout("not a url").is_err());
    }

    #[test]
    fn test_method_mapping() {
        let (method, body) = RestTransport::method_and_body(&Operation::update(
            serde_json::json!({"bio": "x"}),
            Prefer::default(),
        ));
        assert_eq!(method, Method::PATCH);
        assert_eq!(body, Some(serde_json::json!({"bio": "x"})));

        let (method, body) = RestTransport::method_and_body(&Operation::list_objects("p"));
        assert_eq!(method, Method::POST);
        assert_eq!(body, Some(serde_json::json!({"prefix": "p"})));
    }
}
