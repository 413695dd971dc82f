//! Validation report types returned to the embedding layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sped_core::SpedType;
use sped_rules::Issue;

/// Aggregate counters over one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Records parsed from the input.
    pub total_records: usize,
    /// Records remaining after the repair pass.
    pub retained_records: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// The top-level output of a single validation-and-repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub sped_type: SpedType,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
    pub summary: ValidationSummary,
    pub issues: Vec<Issue>,
    /// The repaired file, reassembled in the original framing.
    pub corrected: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_json() {
        let report = ValidationReport {
            run_id: Uuid::new_v4(),
            sped_type: SpedType::Fiscal,
            elapsed_ms: 3,
            summary: ValidationSummary {
                total_records: 10,
                retained_records: 9,
                errors: 2,
                warnings: 1,
            },
            issues: vec![],
            corrected: "|0000|017|\n".to_string(),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"sped_type\":\"fiscal\""));
        let back: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, report.run_id);
        assert_eq!(back.summary, report.summary);
    }
}
