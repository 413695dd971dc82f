//! Similarity fallback matcher.
//!
//! When the structural keys of [`crate::KeyComparator`] do not apply, each
//! reference record is matched against the audit record of the same type
//! with the highest character-level diff ratio (Myers, via the `similar`
//! crate). Pairs scoring below the threshold are reported as divergences.
//!
//! Scoring runs in parallel with rayon; results are collected with their
//! reference index and re-sorted so the output order is deterministic.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use similar::TextDiff;

use sped_core::Record;

use crate::result::RecordSnapshot;

/// Ratio below which the best candidate counts as a divergence.
const SIMILARITY_THRESHOLD: f64 = 0.95;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A reference record whose best audit-side candidate scored below the
/// threshold (or that has no candidate at all).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityDivergence {
    pub reference: RecordSnapshot,
    /// Best-scoring audit record of the same type, if one exists.
    pub best_match: Option<RecordSnapshot>,
    /// Diff ratio of the best pair, 0.0 when there is no candidate.
    pub ratio: f64,
}

/// Aggregate result of one similarity pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityReport {
    /// Matched reference records divided by the reference total.
    pub similarity: f64,
    pub matched: usize,
    pub total: usize,
    pub divergences: Vec<SimilarityDivergence>,
}

// ---------------------------------------------------------------------------
// SimilarityComparator
// ---------------------------------------------------------------------------

pub struct SimilarityComparator;

impl SimilarityComparator {
    /// Diff ratio between two records of the same type, over their
    /// pipe-joined field text.
    pub fn record_similarity(a: &Record, b: &Record) -> f64 {
        if a.reg != b.reg {
            return 0.0;
        }
        let text_a = a.fields.join("|");
        let text_b = b.fields.join("|");
        TextDiff::from_chars(text_a.as_str(), text_b.as_str()).ratio() as f64
    }

    /// Match every reference record against its most similar audit record.
    pub fn compare(reference: &[Record], audit: &[Record]) -> SimilarityReport {
        let total = reference.len();
        if total == 0 {
            return SimilarityReport {
                similarity: 1.0,
                matched: 0,
                total: 0,
                divergences: Vec::new(),
            };
        }

        let mut scored: Vec<(usize, Option<SimilarityDivergence>)> = reference
            .par_iter()
            .enumerate()
            .map(|(idx, ref_record)| {
                let best = audit
                    .iter()
                    .filter(|a| a.reg == ref_record.reg)
                    .map(|a| (Self::record_similarity(ref_record, a), a))
                    .max_by(|(ra, _), (rb, _)| {
                        ra.partial_cmp(rb).unwrap_or(std::cmp::Ordering::Equal)
                    });
                let divergence = match best {
                    Some((ratio, _)) if ratio >= SIMILARITY_THRESHOLD => None,
                    Some((ratio, candidate)) => Some(SimilarityDivergence {
                        reference: RecordSnapshot::from(ref_record),
                        best_match: Some(RecordSnapshot::from(candidate)),
                        ratio,
                    }),
                    None => Some(SimilarityDivergence {
                        reference: RecordSnapshot::from(ref_record),
                        best_match: None,
                        ratio: 0.0,
                    }),
                };
                (idx, divergence)
            })
            .collect();

        // Restore reference order after the parallel pass.
        scored.sort_by_key(|(idx, _)| *idx);

        let divergences: Vec<SimilarityDivergence> =
            scored.into_iter().filter_map(|(_, d)| d).collect();
        let matched = total - divergences.len();

        SimilarityReport {
            similarity: matched as f64 / total as f64,
            matched,
            total,
            divergences,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sped_core::parse;

    #[test]
    fn identical_files_fully_match() {
        let records = parse("|C100|0|1|NFE1|\n|C170|1|A10|\n");
        let report = SimilarityComparator::compare(&records, &records);
        assert_eq!(report.matched, 2);
        assert_eq!(report.total, 2);
        assert!((report.similarity - 1.0).abs() < 1e-9);
        assert!(report.divergences.is_empty());
    }

    #[test]
    fn different_reg_scores_zero() {
        let a = parse("|C100|0|1|\n");
        let b = parse("|C190|0|1|\n");
        assert_eq!(SimilarityComparator::record_similarity(&a[0], &b[0]), 0.0);
    }

    #[test]
    fn near_identical_records_match() {
        let reference = parse("|C100|0|1|NOTA FISCAL ELETRONICA 12345|100,00|\n");
        let audit = parse("|C100|0|1|NOTA FISCAL ELETRONICA 12346|100,00|\n");
        let report = SimilarityComparator::compare(&reference, &audit);
        assert_eq!(report.matched, 1);
        assert!(report.divergences.is_empty());
    }

    #[test]
    fn disjoint_content_is_a_divergence() {
        let reference = parse("|C100|0|1|AAAAAAAAAA|\n");
        let audit = parse("|C100|9|8|ZZZZZZZZZZ|\n");
        let report = SimilarityComparator::compare(&reference, &audit);
        assert_eq!(report.matched, 0);
        assert_eq!(report.divergences.len(), 1);
        let divergence = &report.divergences[0];
        assert!(divergence.ratio < SIMILARITY_THRESHOLD);
        assert!(divergence.best_match.is_some());
    }

    #[test]
    fn missing_candidate_reports_zero_ratio() {
        let reference = parse("|H010|A10|UN|\n");
        let audit = parse("|C100|0|1|\n");
        let report = SimilarityComparator::compare(&reference, &audit);
        assert_eq!(report.divergences.len(), 1);
        assert!(report.divergences[0].best_match.is_none());
        assert_eq!(report.divergences[0].ratio, 0.0);
    }

    #[test]
    fn empty_reference_is_fully_similar() {
        let report = SimilarityComparator::compare(&[], &parse("|C100|0|\n"));
        assert_eq!(report.total, 0);
        assert!((report.similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn best_match_wins_over_weaker_candidates() {
        let reference = parse("|C170|1|A10|PARAFUSO SEXTAVADO|10,00|\n");
        let audit = parse("\
|C170|1|A10|PARAFUSO SEXTAVADO|10,00|
|C170|2|B20|ARRUELA LISA|1,00|
");
        let report = SimilarityComparator::compare(&reference, &audit);
        assert_eq!(report.matched, 1, "exact candidate should win");
    }

    #[test]
    fn output_order_follows_reference_order() {
        let reference = parse("\
|C100|0|1|AAAA|
|C100|0|2|BBBB|
|C100|0|3|CCCC|
");
        let audit = parse("|D100|x|\n");
        let report = SimilarityComparator::compare(&reference, &audit);
        assert_eq!(report.divergences.len(), 3);
        let lines: Vec<usize> = report
            .divergences
            .iter()
            .map(|d| d.reference.line_no)
            .collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }
}
