//! Issue types: the structured output of a validation run.

use serde::{Deserialize, Serialize};

use sped_core::Severity;

// ---------------------------------------------------------------------------
// ImpactedRecord / ImpactDetail
// ---------------------------------------------------------------------------

/// Lightweight reference to a record reached by the impact trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactedRecord {
    pub reg: String,
    pub line_no: usize,
}

/// Human-oriented description of one downstream aggregate invalidated by a
/// defect, derived from [`ImpactedRecord`] via a fixed per-reg mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactDetail {
    /// Block letter of the impacted record (`C`, `E`, `H`).
    pub block: String,
    pub reg: String,
    /// What the impacted record aggregates.
    pub impact: String,
    /// `critical` | `high` | `medium`.
    pub gravity: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// One defect found by one rule on one record.
///
/// `rule_id` is the stable public contract; `message` and `suggestion` are
/// user-facing Portuguese text. `impacted_records` and `impact_details` are
/// populated by the engine, not by the rule itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub line_no: usize,
    pub reg: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub impacted_records: Vec<ImpactedRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub impact_details: Vec<ImpactDetail>,
}

impl Issue {
    pub fn new(
        line_no: usize,
        reg: impl Into<String>,
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line_no,
            reg: reg.into(),
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            suggestion: String::new(),
            impacted_records: Vec::new(),
            impact_details: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
