//! Sequential probe execution
//!
//! Probes run strictly one after another: later probes may depend on rows
//! created or captured by earlier ones, and the backend is shared state the
//! tool does not own. There is never more than one request in flight.

use crate::classifier::{classify, inspect_rows, parse_rows, Verdict};
use crate::error::ProbeError;
use crate::probe::{Disposition, Outcome, Probe, ProbeResult};
use crate::transport::{RawResponse, Transport};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Body excerpt length kept in results.
pub const DEFAULT_EXCERPT_LEN: usize = 180;

pub struct ProbeRunner {
    transport: Arc<dyn Transport>,
    excerpt_len: usize,
    results: Vec<ProbeResult>,
    bindings: HashMap<String, String>,
}

impl ProbeRunner {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            excerpt_len: DEFAULT_EXCERPT_LEN,
            results: Vec::new(),
            bindings: HashMap::new(),
        }
    }

    pub fn with_excerpt_len(mut self, excerpt_len: usize) -> Self {
        self.excerpt_len = excerpt_len;
        self
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ProbeResult> {
        self.results
    }

    pub fn binding(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// Run every probe in order and hand back the results.
    pub async fn run_all(mut self, probes: &[Probe]) -> Vec<ProbeResult> {
        for probe in probes {
            self.run_probe(probe).await;
        }
        self.results
    }

    /// Run one probe and record its result.
    pub async fn run_probe(&mut self, probe: &Probe) -> &ProbeResult {
        let index = self.results.len();
        let result = self.execute(index, probe).await;

        match result.disposition {
            Disposition::Pass => info!(
                probe = %result.name,
                outcome = %result.outcome,
                status = ?result.status,
                "Probe passed"
            ),
            Disposition::Fail => info!(
                probe = %result.name,
                outcome = %result.outcome,
                status = ?result.status,
                leaked_rows = result.leaked_rows,
                "Probe failed"
            ),
            Disposition::Skip => warn!(
                probe = %result.name,
                detail = ?result.detail,
                "Probe skipped"
            ),
        }

        self.results.push(result);
        &self.results[index]
    }

    async fn execute(&mut self, index: usize, probe: &Probe) -> ProbeResult {
        if let Err(err) = probe.identity.validate() {
            return self.record_without_response(
                index,
                probe,
                Outcome::ConfigurationError,
                Disposition::Fail,
                err.to_string(),
            );
        }

        let resource = match probe.resource.resolve(&self.bindings) {
            Ok(resource) => resource,
            Err(ProbeError::MissingBinding { binding }) => {
                return self.record_without_response(
                    index,
                    probe,
                    Outcome::Skipped,
                    Disposition::Skip,
                    format!("no value captured for '{}'", binding),
                );
            }
            Err(err) => {
                return self.record_without_response(
                    index,
                    probe,
                    Outcome::ConfigurationError,
                    Disposition::Fail,
                    err.to_string(),
                );
            }
        };

        match self
            .transport
            .execute(&probe.identity, &probe.operation, &resource)
            .await
        {
            Ok(response) => self.record_response(index, probe, &response),
            Err(err) => {
                warn!(probe = %probe.name, error = %err, "Transport failure");
                ProbeResult {
                    index,
                    name: probe.name.clone(),
                    group: probe.group.clone(),
                    description: probe.description.clone(),
                    outcome: Outcome::Verdict {
                        verdict: Verdict::UnexpectedError,
                    },
                    expected: probe.expected.iter().copied().collect(),
                    status: None,
                    body_excerpt: String::new(),
                    rows: 0,
                    leaked_rows: 0,
                    detail: Some(err.to_string()),
                    note: None,
                    disposition: Disposition::Fail,
                }
            }
        }
    }

    fn record_response(
        &mut self,
        index: usize,
        probe: &Probe,
        response: &RawResponse,
    ) -> ProbeResult {
        let context = probe.context();
        let verdict = classify(response, &context);
        let inspection = inspect_rows(response, &context);
        let missing_rows =
            probe.require_rows && verdict == Verdict::Allowed && inspection.rows == 0;
        let passed = probe.accepts(verdict) && !missing_rows;

        if verdict == Verdict::Allowed || verdict == Verdict::AllowedWithLeak {
            self.capture(probe, response);
        }

        ProbeResult {
            index,
            name: probe.name.clone(),
            group: probe.group.clone(),
            description: probe.description.clone(),
            outcome: Outcome::Verdict { verdict },
            expected: probe.expected.iter().copied().collect(),
            status: Some(response.status),
            body_excerpt: response.excerpt(self.excerpt_len),
            rows: inspection.rows,
            leaked_rows: inspection.leaked,
            detail: missing_rows.then(|| "no rows returned".to_string()),
            note: probe.notes.get(&verdict).filter(|_| passed).cloned(),
            disposition: if passed {
                Disposition::Pass
            } else {
                Disposition::Fail
            },
        }
    }

    fn record_without_response(
        &self,
        index: usize,
        probe: &Probe,
        outcome: Outcome,
        disposition: Disposition,
        detail: String,
    ) -> ProbeResult {
        ProbeResult {
            index,
            name: probe.name.clone(),
            group: probe.group.clone(),
            description: probe.description.clone(),
            outcome,
            expected: probe.expected.iter().copied().collect(),
            status: None,
            body_excerpt: String::new(),
            rows: 0,
            leaked_rows: 0,
            detail: Some(detail),
            note: None,
            disposition,
        }
    }

    fn capture(&mut self, probe: &Probe, response: &RawResponse) {
        let Some(capture) = &probe.capture else {
            return;
        };
        let value = parse_rows(&response.body)
            .first()
            .and_then(|row| row.get(&capture.field))
            .and_then(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            });

        if let Some(value) = value {
            self.bindings.insert(capture.binding.clone(), value);
        }
    }
}
