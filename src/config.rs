//! Run configuration
//!
//! Collected once at startup (the CLI fills it from flags, environment and
//! `.env`) and validated before any probe runs. A malformed bearer token is
//! fatal for the whole run.

use crate::error::{ProbeError, Result};
use crate::identity::{validate_token, Identities};
use crate::runner::DEFAULT_EXCERPT_LEN;
use crate::transport::rest::DEFAULT_TIMEOUT_SECS;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Project endpoint, e.g. `https://xyz.supabase.co`
    pub base_url: String,
    pub api_key: String,
    pub token: String,
    pub user_id: Uuid,
    /// Second principal for cross-user checks
    pub other_user_id: Option<Uuid>,
    pub storage_bucket: Option<String>,
    /// Extra probes loaded from YAML
    pub catalog: Option<PathBuf>,
    pub timeout: Duration,
    pub excerpt_len: usize,
}

impl RunConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        token: impl Into<String>,
        user_id: Uuid,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            token: token.into(),
            user_id,
            other_user_id: None,
            storage_bucket: None,
            catalog: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            excerpt_len: DEFAULT_EXCERPT_LEN,
        }
    }

    pub fn with_other_user(mut self, other_user_id: Uuid) -> Self {
        self.other_user_id = Some(other_user_id);
        self
    }

    pub fn with_storage_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.storage_bucket = Some(bucket.into());
        self
    }

    /// Preconditions for the whole run. Checked before any request is sent.
    pub fn validate(&self) -> Result<()> {
        validate_token(&self.token)?;

        if self.api_key.trim().is_empty() {
            return Err(ProbeError::config("API key is empty"));
        }

        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ProbeError::config(format!("Invalid URL '{}': {}", self.base_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ProbeError::config(format!(
                "Unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        if self.other_user_id == Some(self.user_id) {
            return Err(ProbeError::config(
                "--other-user-id must differ from --user-id",
            ));
        }

        if matches!(&self.storage_bucket, Some(bucket) if bucket.trim().is_empty()) {
            return Err(ProbeError::config("Storage bucket name is empty"));
        }

        Ok(())
    }

    pub fn identities(&self) -> Identities {
        Identities::new(&self.api_key, &self.token)
    }

    pub fn vars(&self, now: DateTime<Utc>) -> CatalogVars {
        CatalogVars {
            user_id: self.user_id.to_string(),
            other_user_id: self.other_user_id.map(|id| id.to_string()),
            storage_bucket: self.storage_bucket.clone(),
            now: now.timestamp(),
        }
    }
}

/// Values catalog templates may reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogVars {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    /// Unix seconds at run start
    pub now: i64,
}
