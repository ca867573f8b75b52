//! Outcome classification
//!
//! Maps a raw HTTP response to a [`Verdict`]. This is the only place that
//! branches on status codes, and it is a pure function: the same response and
//! context always give the same verdict.
//!
//! | Status              | Scope check | Verdict                              |
//! |---------------------|-------------|--------------------------------------|
//! | 401, 403            | any         | `Denied`                             |
//! | 200, 201, 204       | none        | `Allowed`                            |
//! | 200, 201, 204       | owner field | `Allowed` or `AllowedWithLeak`       |
//! | anything else       | any         | `UnexpectedError`                    |

use crate::transport::RawResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Semantic outcome of one probe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allowed,
    Denied,
    /// Success status, but rows owned by someone else came back.
    AllowedWithLeak,
    /// Malformed request or backend fault; never a passing verdict.
    UnexpectedError,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::Denied => write!(f, "denied"),
            Self::AllowedWithLeak => write!(f, "allowed-with-leak"),
            Self::UnexpectedError => write!(f, "unexpected-error"),
        }
    }
}

/// Rows returned must all belong to `expected_owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipScope {
    pub owner_field: String,
    pub expected_owner: String,
}

impl OwnershipScope {
    pub fn new(owner_field: impl Into<String>, expected_owner: impl Into<String>) -> Self {
        Self {
            owner_field: owner_field.into(),
            expected_owner: expected_owner.into(),
        }
    }

    /// A row without the owner field counts as foreign.
    fn owns(&self, row: &Value) -> bool {
        match row.get(&self.owner_field) {
            Some(Value::String(owner)) => owner == &self.expected_owner,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.expected_owner,
        }
    }
}

/// What the classifier needs to know about the probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeContext {
    pub scope: Option<OwnershipScope>,
}

impl ProbeContext {
    pub fn unscoped() -> Self {
        Self::default()
    }

    pub fn scoped(scope: OwnershipScope) -> Self {
        Self { scope: Some(scope) }
    }
}

/// Row counts behind a verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowInspection {
    pub rows: usize,
    pub leaked: usize,
}

pub fn is_success(status: u16) -> bool {
    matches!(status, 200 | 201 | 204)
}

pub fn is_denial(status: u16) -> bool {
    matches!(status, 401 | 403)
}

pub fn classify(response: &RawResponse, context: &ProbeContext) -> Verdict {
    if is_denial(response.status) {
        return Verdict::Denied;
    }
    if !is_success(response.status) {
        return Verdict::UnexpectedError;
    }
    if inspect_rows(response, context).leaked > 0 {
        Verdict::AllowedWithLeak
    } else {
        Verdict::Allowed
    }
}

/// Count returned rows and, under a scope, how many belong to someone else.
pub fn inspect_rows(response: &RawResponse, context: &ProbeContext) -> RowInspection {
    let rows = parse_rows(&response.body);
    let leaked = match &context.scope {
        Some(scope) if is_success(response.status) => {
            rows.iter().filter(|row| !scope.owns(row)).count()
        }
        _ => 0,
    };
    RowInspection {
        rows: rows.len(),
        leaked,
    }
}

/// Array body → rows, object body → one row, anything else → none.
pub fn parse_rows(body: &str) -> Vec<Value> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(rows)) => rows,
        Ok(row @ Value::Object(_)) => vec![row],
        _ => Vec::new(),
    }
}
