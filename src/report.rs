//! Run report rendering
//!
//! Consumes the ordered `ProbeResult`s of a run and renders either a grouped
//! text report or JSON. Probe failures are report content only; they never
//! change the process exit code.

use crate::classifier::Verdict;
use crate::probe::{Outcome, ProbeResult};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Probes whose verdict was `AllowedWithLeak`
    pub leaks: usize,
    pub unexpected_errors: usize,
    pub configuration_errors: usize,
}

impl Summary {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            if result.passed() {
                summary.passed += 1;
            } else if result.skipped() {
                summary.skipped += 1;
            } else {
                summary.failed += 1;
            }
            match result.outcome {
                Outcome::Verdict {
                    verdict: Verdict::AllowedWithLeak,
                } => summary.leaks += 1,
                Outcome::Verdict {
                    verdict: Verdict::UnexpectedError,
                } => summary.unexpected_errors += 1,
                Outcome::ConfigurationError => summary.configuration_errors += 1,
                _ => {}
            }
        }
        summary
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub base_url: String,
    pub summary: Summary,
    pub results: Vec<ProbeResult>,
}

impl RunReport {
    pub fn new(base_url: impl Into<String>, results: Vec<ProbeResult>) -> Self {
        Self {
            generated_at: Utc::now(),
            base_url: base_url.into(),
            summary: Summary::from_results(&results),
            results,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mut current_group: Option<&str> = None;

        for result in &self.results {
            if current_group != Some(result.group.as_str()) {
                push_header(&mut out, &result.group);
                current_group = Some(result.group.as_str());
            }
            push_result(&mut out, result);
        }

        push_header(&mut out, "Summary");
        let s = &self.summary;
        let _ = writeln!(out, "  Total:      {}", s.total);
        let _ = writeln!(out, "  Passed:     {}", s.passed.to_string().green());
        let _ = writeln!(out, "  Failed:     {}", s.failed.to_string().red());
        if s.skipped > 0 {
            let _ = writeln!(out, "  Skipped:    {}", s.skipped.to_string().yellow());
        }
        if s.leaks > 0 {
            let _ = writeln!(out, "  Leaks:      {}", s.leaks.to_string().red().bold());
        }
        if s.unexpected_errors > 0 {
            let _ = writeln!(out, "  Errors:     {}", s.unexpected_errors.to_string().red());
        }
        out
    }
}

fn push_header(out: &mut String, title: &str) {
    let rule = "=".repeat(title.chars().count().max(8));
    let _ = writeln!(out, "\n{}\n{}\n{}", rule, title.cyan().bold(), rule);
}

fn push_result(out: &mut String, result: &ProbeResult) {
    let label = if result.description.is_empty() {
        result.name.as_str()
    } else {
        result.description.as_str()
    };
    let status = result
        .status
        .map(|s| format!(", HTTP {}", s))
        .unwrap_or_default();

    let marker = if result.passed() {
        "✅"
    } else if result.skipped() {
        "•"
    } else {
        "❌"
    };
    let _ = writeln!(
        out,
        "  {} {} [{}: {}{}]",
        marker,
        label,
        result.name.dimmed(),
        result.outcome,
        status
    );

    if result.rows > 0 {
        let _ = writeln!(out, "     {} row(s) returned", result.rows);
    }
    if result.leaked_rows > 0 {
        let _ = writeln!(
            out,
            "     {}",
            format!(
                "{} row(s) belong to another principal, policy may be too open",
                result.leaked_rows
            )
            .red()
        );
    }
    if result.failed() {
        let expected: Vec<String> = result.expected.iter().map(|v| v.to_string()).collect();
        let _ = writeln!(out, "     expected: {}", expected.join(" | "));
        if !result.body_excerpt.is_empty() {
            let _ = writeln!(out, "     body: {}", result.body_excerpt.dimmed());
        }
    }
    if let Some(note) = &result.note {
        let _ = writeln!(out, "     {}", note.yellow());
    }
    if let Some(detail) = &result.detail {
        let _ = writeln!(out, "     {}", detail);
    }
}
