//! Transport trait, the only boundary between the probe engine and the network.
//! The runner depends on this trait, never on reqwest directly.

pub mod rest;

use crate::error::TransportError;
use crate::identity::Identity;
use crate::operation::Operation;
use crate::resource::ResourceRef;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use rest::RestTransport;

/// Unclassified HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    /// First `max_chars` characters of the body, for reports.
    pub fn excerpt(&self, max_chars: usize) -> String {
        self.body.chars().take(max_chars).collect()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request on behalf of `identity`. A single attempt; failures
    /// are returned, never retried.
    async fn execute(
        &self,
        identity: &Identity,
        operation: &Operation,
        resource: &ResourceRef,
    ) -> Result<RawResponse, TransportError>;
}
