//! Calling principals and their credentials
//!
//! An `Identity` is a plain value: which kind of principal is calling, the API
//! key every request carries, and (for authenticated principals) the bearer
//! token. Header derivation is a pure function of that state, so swapping
//! principals between probes never touches shared client state.

use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const API_KEY_HEADER: &str = "apikey";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Kind of calling principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Anonymous,
    Authenticated,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Credential bundle for one principal
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    kind: IdentityKind,
    token: Option<String>,
    api_key: String,
}

impl Identity {
    /// Anonymous caller: API key only, never a bearer token.
    pub fn anonymous(api_key: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::Anonymous,
            token: None,
            api_key: api_key.into(),
        }
    }

    pub fn authenticated(api_key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::Authenticated,
            token: Some(token.into()),
            api_key: api_key.into(),
        }
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn is_authenticated(&self) -> bool {
        self.kind == IdentityKind::Authenticated
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Structural check of the credential. Signatures are never verified.
    pub fn validate(&self) -> Result<()> {
        match (self.kind, self.token.as_deref()) {
            (IdentityKind::Anonymous, _) => Ok(()),
            (IdentityKind::Authenticated, None) => Err(ProbeError::invalid_credential(
                "authenticated identity has no bearer token",
            )),
            (IdentityKind::Authenticated, Some(token)) => validate_token(token),
        }
    }

    /// Headers this identity attaches to every request.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![(API_KEY_HEADER, self.api_key.clone())];
        if self.kind == IdentityKind::Authenticated {
            if let Some(token) = &self.token {
                headers.push((AUTHORIZATION_HEADER, format!("Bearer {}", token)));
            }
        }
        headers
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("kind", &self.kind)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// A bearer token must be three dot-separated, non-empty segments.
pub fn validate_token(token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(ProbeError::invalid_credential("bearer token is empty"));
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ProbeError::invalid_credential(format!(
            "token must have 3 dot-separated parts, found {}",
            segments.len()
        )));
    }

    if let Some(position) = segments.iter().position(|s| s.is_empty()) {
        return Err(ProbeError::invalid_credential(format!(
            "token segment {} is empty",
            position + 1
        )));
    }

    Ok(())
}

/// The two principals a run acts as
#[derive(Debug, Clone)]
pub struct Identities {
    pub anonymous: Identity,
    pub caller: Identity,
}

impl Identities {
    pub fn new(api_key: &str, token: &str) -> Self {
        Self {
            anonymous: Identity::anonymous(api_key),
            caller: Identity::authenticated(api_key, token),
        }
    }
}
