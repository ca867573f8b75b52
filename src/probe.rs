//! Probes and their recorded results
//!
//! A [`Probe`] is plain data: who attempts what against which
//! resource, and which verdicts are acceptable. A [`ProbeResult`] is built once
//! by the runner after classification and never changed afterwards.

use crate::classifier::{OwnershipScope, ProbeContext, Verdict};
use crate::identity::Identity;
use crate::operation::Operation;
use crate::resource::ResourceRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Store a field of the first returned row under a binding name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    pub binding: String,
    pub field: String,
}

#[derive(Debug, Clone)]
pub struct Probe {
    pub name: String,
    /// Report section, e.g. "posts" or "storage".
    pub group: String,
    pub identity: Identity,
    pub operation: Operation,
    pub resource: ResourceRef,
    pub expected: BTreeSet<Verdict>,
    pub description: String,
    pub scope: Option<OwnershipScope>,
    pub capture: Option<Capture>,
    /// An allowed response with no rows fails.
    pub require_rows: bool,
    /// Shown when the probe passes with that verdict.
    pub notes: BTreeMap<Verdict, String>,
}

impl Probe {
    pub fn new(
        name: impl Into<String>,
        identity: Identity,
        operation: Operation,
        resource: ResourceRef,
    ) -> Self {
        let name = name.into();
        let group = name
            .split_once('/')
            .map(|(group, _)| group.to_string())
            .unwrap_or_else(|| name.clone());
        Self {
            name,
            group,
            identity,
            operation,
            resource,
            expected: BTreeSet::new(),
            description: String::new(),
            scope: None,
            capture: None,
            require_rows: false,
            notes: BTreeMap::new(),
        }
    }

    pub fn expect(mut self, verdict: Verdict) -> Self {
        self.expected.insert(verdict);
        self
    }

    pub fn expect_any(mut self, verdicts: &[Verdict]) -> Self {
        self.expected.extend(verdicts.iter().copied());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn scoped_to(mut self, scope: OwnershipScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn capture(mut self, binding: impl Into<String>, field: impl Into<String>) -> Self {
        self.capture = Some(Capture {
            binding: binding.into(),
            field: field.into(),
        });
        self
    }

    pub fn expect_rows(mut self) -> Self {
        self.require_rows = true;
        self
    }

    /// Say which branch a passing result took, e.g. public vs private bucket.
    pub fn note(mut self, verdict: Verdict, note: impl Into<String>) -> Self {
        self.notes.insert(verdict, note.into());
        self
    }

    pub fn context(&self) -> ProbeContext {
        ProbeContext {
            scope: self.scope.clone(),
        }
    }

    /// `UnexpectedError` never passes, even if listed.
    pub fn accepts(&self, verdict: Verdict) -> bool {
        verdict != Verdict::UnexpectedError && self.expected.contains(&verdict)
    }
}

/// What actually happened when a probe ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Verdict { verdict: Verdict },
    /// The probe's identity failed validation; nothing was sent.
    ConfigurationError,
    /// A binding the probe depends on was never captured.
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verdict { verdict } => write!(f, "{}", verdict),
            Self::ConfigurationError => write!(f, "configuration-error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Pass,
    Fail,
    Skip,
}

/// Immutable record of one probe execution
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub index: usize,
    pub name: String,
    pub group: String,
    pub description: String,
    pub outcome: Outcome,
    pub expected: Vec<Verdict>,
    pub status: Option<u16>,
    pub body_excerpt: String,
    pub rows: usize,
    pub leaked_rows: usize,
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub disposition: Disposition,
}

impl ProbeResult {
    pub fn verdict(&self) -> Option<Verdict> {
        match self.outcome {
            Outcome::Verdict { verdict } => Some(verdict),
            Outcome::ConfigurationError | Outcome::Skipped => None,
        }
    }

    pub fn passed(&self) -> bool {
        self.disposition == Disposition::Pass
    }

    pub fn failed(&self) -> bool {
        self.disposition == Disposition::Fail
    }

    pub fn skipped(&self) -> bool {
        self.disposition == Disposition::Skip
    }
}
