//! Comparison result types: the structured output of a cross-file run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sped_core::{Record, Severity};

// ---------------------------------------------------------------------------
// DifferenceKind
// ---------------------------------------------------------------------------

/// Classification of a single comparison difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    /// Present in the reference, absent from the audit file.
    MissingRecord,
    /// Present in the audit file, absent from the reference.
    ExtraRecord,
    /// Same key on both sides but a monetary field diverges.
    ValueDifference,
    /// Same key on both sides but a quantity field diverges.
    QuantityDifference,
    /// Same key on both sides with a non-numeric field difference.
    FieldDifference,
    /// The audit file repeats a key the reference holds once.
    DuplicateRecord,
}

impl DifferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifferenceKind::MissingRecord => "missing_record",
            DifferenceKind::ExtraRecord => "extra_record",
            DifferenceKind::ValueDifference => "value_difference",
            DifferenceKind::QuantityDifference => "quantity_difference",
            DifferenceKind::FieldDifference => "field_difference",
            DifferenceKind::DuplicateRecord => "duplicate_record",
        }
    }
}

// ---------------------------------------------------------------------------
// RecordSnapshot
// ---------------------------------------------------------------------------

/// The side data carried by a difference: where the record sits and what it
/// holds, enough to locate it in either source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub line_no: usize,
    pub reg: String,
    pub fields: Vec<String>,
}

impl From<&Record> for RecordSnapshot {
    fn from(record: &Record) -> Self {
        Self {
            line_no: record.line_no,
            reg: record.reg.clone(),
            fields: record.fields.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Difference
// ---------------------------------------------------------------------------

/// One classified divergence between the reference and the audit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    #[serde(rename = "type")]
    pub kind: DifferenceKind,
    pub record_type: String,
    pub key: String,
    pub reference_data: Option<RecordSnapshot>,
    pub audit_data: Option<RecordSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_count: Option<usize>,
}

// ---------------------------------------------------------------------------
// ComparisonSummary / ComparisonReport
// ---------------------------------------------------------------------------

/// Aggregate counters over one comparison run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total_records_ref: usize,
    pub total_records_aud: usize,
    pub missing_records: usize,
    pub extra_records: usize,
    pub value_differences: usize,
    pub quantity_differences: usize,
    pub field_differences: usize,
    pub duplicate_records: usize,
}

/// The top-level output of a single comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub run_id: Uuid,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
    pub summary: ComparisonSummary,
    /// Ordered list of differences, reference-side first.
    pub differences: Vec<Difference>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
