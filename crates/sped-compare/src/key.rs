//! Key-based structural comparison between a reference and an audit file.
//!
//! For each matched record kind a semantic key is built from the fields that
//! identify the record (document identity for C100/C170, item code for
//! H010). Both sides are indexed by key; records present on one side only
//! become `missing_record`/`extra_record` differences, keys repeated on the
//! audit side become `duplicate_record` differences, and records present on
//! both sides have their monetary and quantity fields compared under the
//! standard tolerances (0.01 for currency, 0.001 for quantities).
//!
//! Iteration is always in file order, so the output is deterministic.

use std::collections::{HashMap, HashSet};

use sped_core::numeric::parse_decimal_lenient;
use sped_core::{Record, Severity};

use crate::result::{
    ComparisonSummary, Difference, DifferenceKind, RecordSnapshot,
};

/// Monetary tolerance (R$).
const VALUE_TOLERANCE: f64 = 0.01;
/// Quantity tolerance.
const QUANTITY_TOLERANCE: f64 = 0.001;

/// One numeric field compared between matched records.
struct FieldCheck {
    index: usize,
    name: &'static str,
    tolerance: f64,
    quantity: bool,
}

const VALUE: bool = false;
const QUANTITY: bool = true;

/// Per-record-kind comparison layout.
struct KindSpec {
    reg: &'static str,
    /// Records shorter than this cannot produce a key and are skipped.
    min_fields: usize,
    key_indices: &'static [usize],
    checks: &'static [FieldCheck],
    missing_label: &'static str,
    extra_label: &'static str,
}

const KIND_SPECS: &[KindSpec] = &[
    KindSpec {
        reg: "C100",
        min_fields: 9,
        key_indices: &[3, 5, 6, 7, 8],
        checks: &[
            FieldCheck { index: 10, name: "VL_DOC", tolerance: VALUE_TOLERANCE, quantity: VALUE },
            FieldCheck { index: 11, name: "VL_ICMS", tolerance: VALUE_TOLERANCE, quantity: VALUE },
            FieldCheck { index: 14, name: "VL_IPI", tolerance: VALUE_TOLERANCE, quantity: VALUE },
            FieldCheck { index: 15, name: "VL_PIS", tolerance: VALUE_TOLERANCE, quantity: VALUE },
            FieldCheck { index: 16, name: "VL_COFINS", tolerance: VALUE_TOLERANCE, quantity: VALUE },
        ],
        missing_label: "Nota fiscal não encontrada no arquivo auditado",
        extra_label: "Nota fiscal excedente no arquivo auditado",
    },
    KindSpec {
        reg: "C170",
        min_fields: 9,
        key_indices: &[3, 5, 6, 7, 8, 2],
        checks: &[
            FieldCheck { index: 4, name: "QTD", tolerance: QUANTITY_TOLERANCE, quantity: QUANTITY },
            FieldCheck { index: 5, name: "VL_UNIT", tolerance: VALUE_TOLERANCE, quantity: VALUE },
            FieldCheck { index: 12, name: "VL_ITEM", tolerance: VALUE_TOLERANCE, quantity: VALUE },
        ],
        missing_label: "Item de nota fiscal não encontrado no arquivo auditado",
        extra_label: "Item de nota fiscal excedente no arquivo auditado",
    },
    KindSpec {
        reg: "H010",
        min_fields: 2,
        key_indices: &[1],
        checks: &[
            FieldCheck { index: 3, name: "QTD", tolerance: QUANTITY_TOLERANCE, quantity: QUANTITY },
            FieldCheck { index: 4, name: "VL_UNIT", tolerance: VALUE_TOLERANCE, quantity: VALUE },
            FieldCheck { index: 5, name: "VL_ITEM", tolerance: VALUE_TOLERANCE, quantity: VALUE },
        ],
        missing_label: "Item de estoque não encontrado no arquivo auditado",
        extra_label: "Item de estoque excedente no arquivo auditado",
    },
];

/// Record kinds that participate in the totals of the summary counters.
const COUNTED_KINDS: &[&str] = &["C100", "C170", "H010", "E200"];

fn semantic_key(record: &Record, spec: &KindSpec) -> Option<String> {
    if record.fields.len() < spec.min_fields {
        return None;
    }
    Some(
        spec.key_indices
            .iter()
            .map(|&i| record.field(i))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

/// Key-based comparator over two parsed files.
pub struct KeyComparator {
    summary: ComparisonSummary,
    differences: Vec<Difference>,
}

impl KeyComparator {
    pub fn new() -> Self {
        Self {
            summary: ComparisonSummary::default(),
            differences: Vec::new(),
        }
    }

    /// Compare `reference` against `audit` and return the counters plus the
    /// classified differences in deterministic order.
    pub fn compare(
        mut self,
        reference: &[Record],
        audit: &[Record],
    ) -> (ComparisonSummary, Vec<Difference>) {
        self.summary.total_records_ref = reference
            .iter()
            .filter(|r| COUNTED_KINDS.contains(&r.reg.as_str()))
            .count();
        self.summary.total_records_aud = audit
            .iter()
            .filter(|r| COUNTED_KINDS.contains(&r.reg.as_str()))
            .count();

        for spec in KIND_SPECS {
            self.compare_kind(spec, reference, audit);
        }
        self.compare_e200(reference, audit);
        self.compare_block_totals(reference, audit);

        (self.summary, self.differences)
    }

    fn compare_kind(&mut self, spec: &KindSpec, reference: &[Record], audit: &[Record]) {
        let ref_records: Vec<&Record> = reference.iter().filter(|r| r.reg == spec.reg).collect();
        let aud_records: Vec<&Record> = audit.iter().filter(|r| r.reg == spec.reg).collect();

        let mut ref_map: HashMap<String, &Record> = HashMap::new();
        for record in &ref_records {
            if let Some(key) = semantic_key(record, spec) {
                ref_map.insert(key, record);
            }
        }

        // Duplicate detection on the audit side happens before the map is
        // built: every occurrence beyond the first is reported, the map
        // keeps the last.
        let mut aud_map: HashMap<String, &Record> = HashMap::new();
        let mut aud_key_counts: HashMap<String, usize> = HashMap::new();
        let mut duplicate_keys: HashSet<String> = HashSet::new();
        for record in &aud_records {
            if let Some(key) = semantic_key(record, spec) {
                *aud_key_counts.entry(key.clone()).or_insert(0) += 1;
                aud_map.insert(key, record);
            }
        }
        for record in &aud_records {
            let Some(key) = semantic_key(record, spec) else {
                continue;
            };
            let total = aud_key_counts[&key];
            if total > 1 {
                if duplicate_keys.insert(key.clone()) {
                    // Skip the first occurrence; report the repeats.
                    continue;
                }
                self.summary.duplicate_records += 1;
                self.differences.push(Difference {
                    kind: DifferenceKind::DuplicateRecord,
                    record_type: spec.reg.to_string(),
                    key: key.clone(),
                    reference_data: None,
                    audit_data: Some(RecordSnapshot::from(*record)),
                    field: None,
                    reference_value: None,
                    audit_value: None,
                    difference: None,
                    severity: Severity::Warn,
                    message: format!(
                        "Registro {} duplicado no arquivo auditado: {key}",
                        spec.reg
                    ),
                    duplicate_count: Some(total),
                });
            }
        }

        // Missing: in the reference, absent from the audit.
        let mut seen: HashSet<String> = HashSet::new();
        for record in &ref_records {
            let Some(key) = semantic_key(record, spec) else {
                continue;
            };
            if aud_map.contains_key(&key) || !seen.insert(key.clone()) {
                continue;
            }
            self.summary.missing_records += 1;
            self.differences.push(Difference {
                kind: DifferenceKind::MissingRecord,
                record_type: spec.reg.to_string(),
                key: key.clone(),
                reference_data: Some(RecordSnapshot::from(*record)),
                audit_data: None,
                field: None,
                reference_value: None,
                audit_value: None,
                difference: None,
                severity: Severity::Error,
                message: format!("{}: {key}", spec.missing_label),
                duplicate_count: None,
            });
        }

        // Extra: in the audit, absent from the reference. Duplicated keys
        // are already reported above and do not count as extras.
        seen.clear();
        for record in &aud_records {
            let Some(key) = semantic_key(record, spec) else {
                continue;
            };
            if ref_map.contains_key(&key)
                || duplicate_keys.contains(&key)
                || !seen.insert(key.clone())
            {
                continue;
            }
            self.summary.extra_records += 1;
            self.differences.push(Difference {
                kind: DifferenceKind::ExtraRecord,
                record_type: spec.reg.to_string(),
                key: key.clone(),
                reference_data: None,
                audit_data: Some(RecordSnapshot::from(*record)),
                field: None,
                reference_value: None,
                audit_value: None,
                difference: None,
                severity: Severity::Warn,
                message: format!("{}: {key}", spec.extra_label),
                duplicate_count: None,
            });
        }

        // Matched keys: compare the numeric fields under their tolerances.
        seen.clear();
        for record in &ref_records {
            let Some(key) = semantic_key(record, spec) else {
                continue;
            };
            let Some(aud_record) = aud_map.get(&key) else {
                continue;
            };
            if !seen.insert(key.clone()) {
                continue;
            }
            for check in spec.checks {
                self.compare_field(spec.reg, &key, check, record, aud_record);
            }
        }
    }

    fn compare_field(
        &mut self,
        reg: &str,
        key: &str,
        check: &FieldCheck,
        ref_record: &Record,
        aud_record: &Record,
    ) {
        if !ref_record.has_field(check.index) || !aud_record.has_field(check.index) {
            return;
        }
        let ref_value = parse_decimal_lenient(ref_record.field(check.index));
        let aud_value = parse_decimal_lenient(aud_record.field(check.index));
        if (ref_value - aud_value).abs() <= check.tolerance {
            return;
        }
        let (kind, message) = if check.quantity {
            self.summary.quantity_differences += 1;
            (
                DifferenceKind::QuantityDifference,
                format!("Diferença na quantidade ({}): {ref_value} vs {aud_value}", check.name),
            )
        } else {
            self.summary.value_differences += 1;
            (
                DifferenceKind::ValueDifference,
                format!(
                    "Diferença no valor do campo {}: R$ {ref_value:.2} vs R$ {aud_value:.2}",
                    check.name
                ),
            )
        };
        self.differences.push(Difference {
            kind,
            record_type: reg.to_string(),
            key: key.to_string(),
            reference_data: Some(RecordSnapshot::from(ref_record)),
            audit_data: Some(RecordSnapshot::from(aud_record)),
            field: Some(check.name.to_string()),
            reference_value: Some(ref_value),
            audit_value: Some(aud_value),
            difference: Some(ref_value - aud_value),
            severity: Severity::Error,
            message,
            duplicate_count: None,
        });
    }

    /// E200 is a single appraisal record per file: debit and credit totals
    /// are compared positionally.
    fn compare_e200(&mut self, reference: &[Record], audit: &[Record]) {
        let Some(ref_record) = reference.iter().find(|r| r.reg == "E200") else {
            return;
        };
        let Some(aud_record) = audit.iter().find(|r| r.reg == "E200") else {
            return;
        };
        for (index, name, key) in [
            (2usize, "VL_DEBITOS", "TOTAL_DEBITOS"),
            (3usize, "VL_CREDITOS", "TOTAL_CREDITOS"),
        ] {
            if !ref_record.has_field(index) || !aud_record.has_field(index) {
                continue;
            }
            let ref_value = parse_decimal_lenient(ref_record.field(index));
            let aud_value = parse_decimal_lenient(aud_record.field(index));
            if (ref_value - aud_value).abs() <= VALUE_TOLERANCE {
                continue;
            }
            self.summary.value_differences += 1;
            self.differences.push(Difference {
                kind: DifferenceKind::ValueDifference,
                record_type: "E200".to_string(),
                key: key.to_string(),
                reference_data: Some(RecordSnapshot::from(ref_record)),
                audit_data: Some(RecordSnapshot::from(aud_record)),
                field: Some(name.to_string()),
                reference_value: Some(ref_value),
                audit_value: Some(aud_value),
                difference: Some(ref_value - aud_value),
                severity: Severity::Error,
                message: format!(
                    "Diferença no campo {name}: R$ {ref_value:.2} vs R$ {aud_value:.2}"
                ),
                duplicate_count: None,
            });
        }
    }

    /// Σ of the canonical value field per kind: block C from documents and
    /// items, block H from the inventory detail.
    fn block_total(records: &[Record], block: char) -> f64 {
        records
            .iter()
            .filter(|r| r.reg.starts_with(block))
            .map(|r| match r.reg.as_str() {
                "C100" => parse_decimal_lenient(r.field(10)),
                "C170" => parse_decimal_lenient(r.field(12)),
                "H010" => parse_decimal_lenient(r.field(5)),
                _ => 0.0,
            })
            .sum()
    }

    fn compare_block_totals(&mut self, reference: &[Record], audit: &[Record]) {
        for block in ['C', 'H'] {
            let ref_total = Self::block_total(reference, block);
            let aud_total = Self::block_total(audit, block);
            if (ref_total - aud_total).abs() <= VALUE_TOLERANCE {
                continue;
            }
            // Block totals restate the per-record divergences in aggregate;
            // they are reported but do not inflate the value counter.
            self.differences.push(Difference {
                kind: DifferenceKind::ValueDifference,
                record_type: format!("BLOCK_{block}"),
                key: "TOTAL".to_string(),
                reference_data: None,
                audit_data: None,
                field: Some("VL_TOTAL".to_string()),
                reference_value: Some(ref_total),
                audit_value: Some(aud_total),
                difference: Some(ref_total - aud_total),
                severity: Severity::Error,
                message: format!(
                    "Diferença no total do Bloco {block}: R$ {ref_total:.2} vs R$ {aud_total:.2}"
                ),
                duplicate_count: None,
            });
        }
    }
}

impl Default for KeyComparator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sped_core::parse;

    fn c100(numero: &str, vl_doc: &str) -> String {
        format!("|C100|0|1|P1|CNPJ1|55|1|{numero}|01012024|x|{vl_doc}|0|0|0|0|0|0|")
    }

    fn compare_texts(reference: &str, audit: &str) -> (ComparisonSummary, Vec<Difference>) {
        KeyComparator::new().compare(&parse(reference), &parse(audit))
    }

    #[test]
    fn identical_files_produce_no_differences() {
        let text = format!("{}\n{}\n", c100("1", "100.00"), c100("2", "200.00"));
        let (summary, differences) = compare_texts(&text, &text);
        assert!(differences.is_empty());
        assert_eq!(summary.total_records_ref, 2);
        assert_eq!(summary.total_records_aud, 2);
        assert_eq!(summary.missing_records, 0);
    }

    #[test]
    fn missing_extra_duplicate_and_value_difference() {
        // Reference: K1 K2 K3. Audit: K1 (value off by 1.50), K2, K2, K4.
        let reference = format!(
            "{}\n{}\n{}\n",
            c100("K1", "101.50"),
            c100("K2", "200.00"),
            c100("K3", "300.00")
        );
        let audit = format!(
            "{}\n{}\n{}\n{}\n",
            c100("K1", "100.00"),
            c100("K2", "200.00"),
            c100("K2", "200.00"),
            c100("K4", "400.00")
        );
        let (summary, differences) = compare_texts(&reference, &audit);

        assert_eq!(summary.missing_records, 1);
        assert_eq!(summary.extra_records, 1);
        assert_eq!(summary.duplicate_records, 1);
        assert_eq!(summary.value_differences, 1);

        let missing: Vec<&Difference> = differences
            .iter()
            .filter(|d| d.kind == DifferenceKind::MissingRecord)
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].key.contains("K3"));

        let extra: Vec<&Difference> = differences
            .iter()
            .filter(|d| d.kind == DifferenceKind::ExtraRecord)
            .collect();
        assert_eq!(extra.len(), 1);
        assert!(extra[0].key.contains("K4"));

        let duplicate: Vec<&Difference> = differences
            .iter()
            .filter(|d| d.kind == DifferenceKind::DuplicateRecord)
            .collect();
        assert_eq!(duplicate.len(), 1);
        assert!(duplicate[0].key.contains("K2"));
        assert_eq!(duplicate[0].duplicate_count, Some(2));

        let value: Vec<&Difference> = differences
            .iter()
            .filter(|d| d.kind == DifferenceKind::ValueDifference && d.record_type == "C100")
            .collect();
        assert_eq!(value.len(), 1);
        assert!(value[0].key.contains("K1"));
        assert_eq!(value[0].field.as_deref(), Some("VL_DOC"));
        assert!((value[0].difference.unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn swapping_sides_swaps_missing_and_extra() {
        let reference = format!("{}\n{}\n", c100("K1", "100.00"), c100("K2", "200.00"));
        let audit = format!("{}\n{}\n", c100("K1", "100.00"), c100("K9", "900.00"));

        let (forward, _) = compare_texts(&reference, &audit);
        let (backward, _) = compare_texts(&audit, &reference);

        assert_eq!(forward.missing_records, backward.extra_records);
        assert_eq!(forward.extra_records, backward.missing_records);
        assert_eq!(forward.value_differences, backward.value_differences);
    }

    #[test]
    fn value_within_tolerance_passes() {
        let reference = c100("K1", "100.00");
        let audit = c100("K1", "100.01");
        let (summary, differences) = compare_texts(&reference, &audit);
        assert_eq!(summary.value_differences, 0);
        assert!(differences.is_empty());
    }

    #[test]
    fn quantity_uses_finer_tolerance() {
        // C170 key needs fields 2..=8; QTD at 4 differs by 0.002.
        let reference = "|C170|1|A10|DESC|1,000|10,00|0|0|01012024|0|0|0|100,00|\n";
        let audit = "|C170|1|A10|DESC|1,002|10,00|0|0|01012024|0|0|0|100,00|\n";
        let (summary, differences) = compare_texts(reference, audit);
        assert_eq!(summary.quantity_differences, 1);
        assert_eq!(differences[0].kind, DifferenceKind::QuantityDifference);
        assert_eq!(differences[0].field.as_deref(), Some("QTD"));
    }

    #[test]
    fn h010_is_keyed_by_item_code() {
        let reference = "|H010|A10|UN|1,000|2,00|2,00|0|\n";
        let audit = "|H010|B20|UN|1,000|2,00|2,00|0|\n";
        let (summary, differences) = compare_texts(reference, audit);
        assert_eq!(summary.missing_records, 1);
        assert_eq!(summary.extra_records, 1);
        assert!(differences.iter().any(|d| d.key == "A10"));
        assert!(differences.iter().any(|d| d.key == "B20"));
    }

    #[test]
    fn e200_totals_compared_positionally() {
        let reference = "|E200|SP|1000.00|500.00|\n";
        let audit = "|E200|SP|900.00|500.00|\n";
        let (summary, differences) = compare_texts(reference, audit);
        assert_eq!(summary.value_differences, 1);
        assert_eq!(differences[0].key, "TOTAL_DEBITOS");
        assert_eq!(differences[0].record_type, "E200");
    }

    #[test]
    fn block_totals_reported_when_divergent() {
        let reference = c100("K1", "100.00");
        let audit = c100("K1", "150.00");
        let (_, differences) = compare_texts(&reference, &audit);
        assert!(differences
            .iter()
            .any(|d| d.record_type == "BLOCK_C" && d.key == "TOTAL"));
    }

    #[test]
    fn block_h_total_spans_inventory_items() {
        let reference = "|H010|A10|UN|1,000|2,00|250.00|0|\n";
        let audit = "|H010|A10|UN|1,000|2,00|100.00|0|\n";
        let (_, differences) = compare_texts(reference, audit);
        let block_h = differences
            .iter()
            .find(|d| d.record_type == "BLOCK_H")
            .expect("block H difference");
        assert_eq!(block_h.reference_value, Some(250.0));
        assert_eq!(block_h.audit_value, Some(100.0));
    }

    #[test]
    fn truncated_records_are_skipped() {
        let reference = "|C100|0|1|\n";
        let audit = "";
        let (summary, differences) = compare_texts(reference, audit);
        assert_eq!(summary.missing_records, 0);
        assert!(differences.is_empty());
        // Still counted in the totals.
        assert_eq!(summary.total_records_ref, 1);
    }

    #[test]
    fn duplicate_only_key_is_not_an_extra() {
        let reference = c100("K1", "100.00");
        let audit = format!(
            "{}\n{}\n{}\n",
            c100("K1", "100.00"),
            c100("K9", "900.00"),
            c100("K9", "900.00")
        );
        let (summary, _) = compare_texts(&reference, &audit);
        assert_eq!(summary.duplicate_records, 1);
        assert_eq!(summary.extra_records, 0);
    }

    #[test]
    fn comparison_is_deterministic() {
        let reference = format!("{}\n{}\n{}\n", c100("A", "1.00"), c100("B", "2.00"), c100("C", "3.00"));
        let audit = format!("{}\n{}\n", c100("C", "3.00"), c100("D", "4.00"));
        let (s1, d1) = compare_texts(&reference, &audit);
        let (s2, d2) = compare_texts(&reference, &audit);
        assert_eq!(s1, s2);
        assert_eq!(d1, d2);
    }
}
