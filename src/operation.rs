//! REST operations a probe can attempt

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One token of a `Prefer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preference {
    #[serde(rename = "return=representation")]
    ReturnRepresentation,
    #[serde(rename = "resolution=merge-duplicates")]
    MergeDuplicates,
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReturnRepresentation => write!(f, "return=representation"),
            Self::MergeDuplicates => write!(f, "resolution=merge-duplicates"),
        }
    }
}

/// `Prefer` header value, sent exactly as listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prefer(Vec<Preference>);

impl Prefer {
    pub fn new(preferences: Vec<Preference>) -> Self {
        Self(preferences)
    }

    pub fn representation() -> Self {
        Self(vec![Preference::ReturnRepresentation])
    }

    /// Upsert: merge into an existing row and echo it back.
    pub fn upsert() -> Self {
        Self(vec![
            Preference::MergeDuplicates,
            Preference::ReturnRepresentation,
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// What a probe attempts against its resource
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// GET rows
    Read,
    /// POST a new row
    Create {
        payload: Map<String, Value>,
        prefer: Prefer,
    },
    /// PATCH rows matched by the resource filters
    Update {
        payload: Map<String, Value>,
        prefer: Prefer,
    },
    /// List objects in a storage bucket under a prefix
    ListObjects { prefix: String },
}

impl Operation {
    pub fn create(payload: Value, prefer: Prefer) -> Self {
        Operation::Create {
            payload: into_object(payload),
            prefer,
        }
    }

    pub fn update(payload: Value, prefer: Prefer) -> Self {
        Operation::Update {
            payload: into_object(payload),
            prefer,
        }
    }

    pub fn list_objects(prefix: impl Into<String>) -> Self {
        Operation::ListObjects {
            prefix: prefix.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::ListObjects { .. } => "list_objects",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create { .. } | Self::Update { .. })
    }

    pub fn prefer(&self) -> Option<&Prefer> {
        match self {
            Self::Create { prefer, .. } | Self::Update { prefer, .. } => Some(prefer),
            Self::Read | Self::ListObjects { .. } => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Non-object payloads are wrapped under `"value"`.
fn into_object(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
