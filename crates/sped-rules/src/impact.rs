//! Cascading-impact analysis.
//!
//! A defect in a document or item record invalidates the aggregates computed
//! downstream of it. The dependency edges are static:
//!
//! ```text
//! C100 → C170 (children), C190, E110
//! C170 → C190, E110
//! C190 → E110
//! C800 → C850 (children)
//! H005 → H010, H020, H030
//! ```
//!
//! [`trace_impact`] walks this graph breadth-first from the defective record
//! and returns every dependent record present in the context. C190 targets
//! are only followed when their document key matches the defective record's
//! document; E110 is a single per-period appraisal and is always related.

use std::collections::HashSet;

use sped_core::{Context, Record};

use crate::issue::{ImpactDetail, ImpactedRecord};

/// Aggregate record types a given reg invalidates.
fn impact_targets(reg: &str) -> &'static [&'static str] {
    match reg {
        "C100" => &["C190", "E110"],
        "C170" => &["C190", "E110"],
        "C190" => &["E110"],
        "H005" => &["H010", "H020", "H030"],
        _ => &[],
    }
}

/// Access key of the document a record belongs to: a C100's own key, or the
/// parent C100's key for a C170.
fn doc_key<'a>(ctx: &'a Context, record: &'a Record) -> Option<&'a str> {
    match record.reg.as_str() {
        "C100" => Some(record.field(8)),
        "C170" => record
            .parent
            .and_then(|p| ctx.get(p))
            .filter(|p| p.reg == "C100")
            .map(|p| p.field(8)),
        _ => None,
    }
}

fn is_related(ctx: &Context, target: &Record, defective: &Record) -> bool {
    match target.reg.as_str() {
        // C190 carries its document's key; only totals of the same document
        // are invalidated.
        "C190" => match doc_key(ctx, defective) {
            Some(key) => target.field(2) == key,
            None => false,
        },
        // One appraisal per period: always impacted.
        "E110" => true,
        _ => true,
    }
}

/// Breadth-first walk from `defective` over the static dependency graph.
/// The defective record itself is not part of the result.
pub fn trace_impact(ctx: &Context, defective: &Record) -> Vec<ImpactedRecord> {
    let mut visited: HashSet<usize> = HashSet::new();
    let mut impacted: Vec<ImpactedRecord> = Vec::new();
    let mut queue: Vec<usize> = vec![defective.line_no];
    visited.insert(defective.line_no);

    let mut head = 0;
    while head < queue.len() {
        let current_line = queue[head];
        head += 1;
        let Some(current) = ctx.get(current_line) else {
            continue;
        };

        // Structural children (C100 → C170, C800 → C850).
        if matches!(current.reg.as_str(), "C100" | "C800") {
            for child in ctx.records().iter().filter(|r| r.parent == Some(current_line)) {
                if visited.insert(child.line_no) {
                    impacted.push(ImpactedRecord {
                        reg: child.reg.clone(),
                        line_no: child.line_no,
                    });
                    queue.push(child.line_no);
                }
            }
        }

        // Aggregates invalidated by business dependency.
        for target_reg in impact_targets(&current.reg) {
            for target in ctx.of_reg(target_reg) {
                if visited.contains(&target.line_no) {
                    continue;
                }
                if !is_related(ctx, target, defective) {
                    continue;
                }
                visited.insert(target.line_no);
                impacted.push(ImpactedRecord {
                    reg: target.reg.clone(),
                    line_no: target.line_no,
                });
                queue.push(target.line_no);
            }
        }
    }

    impacted
}

/// Fixed mapping from an impacted record to its user-facing description.
/// Record types outside the mapping produce no detail entry.
pub fn impact_detail(impacted: &ImpactedRecord) -> Option<ImpactDetail> {
    let (block, impact, gravity) = match impacted.reg.as_str() {
        "E110" => ("E", "Apuração de ICMS/IPI", "critical"),
        "C190" => ("C", "Totalizador por CST", "high"),
        "H010" => ("H", "Inventário", "medium"),
        "C800" => ("C", "Documentos fiscais", "high"),
        "C850" => ("C", "Documentos fiscais", "high"),
        "C170" => ("C", "Item de documento", "medium"),
        _ => return None,
    };
    Some(ImpactDetail {
        block: block.to_string(),
        reg: impacted.reg.clone(),
        impact: impact.to_string(),
        gravity: gravity.to_string(),
        message: format!(
            "Registro {} (linha {}) pode ser impactado pela correção",
            impacted.reg, impacted.line_no
        ),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sped_core::parse;

    fn ctx(text: &str) -> Context {
        Context::new(parse(text))
    }

    #[test]
    fn c100_reaches_children_totalisers_and_appraisal() {
        let c = ctx("\
|C100|0|1|P1|55|1|1|NFE1|NFE1|
|C170|1|A10|
|C170|2|B20|
|C190|0|NFE1|
|E110|100|
");
        let defective = c.get(1).unwrap().clone();
        let impacted = trace_impact(&c, &defective);
        let regs: Vec<&str> = impacted.iter().map(|i| i.reg.as_str()).collect();
        assert!(regs.contains(&"C170"));
        assert!(regs.contains(&"C190"));
        assert!(regs.contains(&"E110"));
        // Two children plus one totaliser plus one appraisal.
        assert_eq!(impacted.len(), 4);
    }

    #[test]
    fn c190_of_other_document_is_not_reached() {
        let c = ctx("\
|C100|0|1|P1|55|1|1|NFE1|NFE1|
|C190|0|OUTRA|
|E110|100|
");
        let defective = c.get(1).unwrap().clone();
        let impacted = trace_impact(&c, &defective);
        let regs: Vec<&str> = impacted.iter().map(|i| i.reg.as_str()).collect();
        assert!(!regs.contains(&"C190"));
        assert!(regs.contains(&"E110"));
    }

    #[test]
    fn c170_walks_up_to_parent_key() {
        let c = ctx("\
|C100|0|1|P1|55|1|1|NFE1|NFE1|
|C170|1|A10|
|C190|0|NFE1|
|E110|100|
");
        let defective = c.get(2).unwrap().clone();
        let impacted = trace_impact(&c, &defective);
        let regs: Vec<&str> = impacted.iter().map(|i| i.reg.as_str()).collect();
        assert!(regs.contains(&"C190"));
        assert!(regs.contains(&"E110"));
        assert!(!regs.contains(&"C170"));
    }

    #[test]
    fn h005_reaches_inventory_records() {
        let c = ctx("\
|H005|250.00|31122023|
|H010|A10|UN|1|10,00|10,00|0|
|H020|001|100,00|10,00|
");
        let defective = c.get(1).unwrap().clone();
        let impacted = trace_impact(&c, &defective);
        let regs: Vec<&str> = impacted.iter().map(|i| i.reg.as_str()).collect();
        assert_eq!(regs, vec!["H010", "H020"]);
    }

    #[test]
    fn c800_reaches_its_c850_children_only() {
        let c = ctx("\
|C800|59|00|1|123|SAT1|01012024|
|C850|01|5102|18,00|
|C800|59|00|1|456|SAT2|01012024|
|C850|01|5102|18,00|
");
        let defective = c.get(1).unwrap().clone();
        let impacted = trace_impact(&c, &defective);
        assert_eq!(impacted.len(), 1);
        assert_eq!(impacted[0].line_no, 2);
    }

    #[test]
    fn defective_record_not_in_its_own_impact() {
        let c = ctx("|C190|0|NFE1|\n|E110|100|\n");
        let defective = c.get(1).unwrap().clone();
        let impacted = trace_impact(&c, &defective);
        assert!(impacted.iter().all(|i| i.line_no != 1));
    }

    #[test]
    fn header_record_has_no_impact() {
        let c = ctx("|0000|017|\n|E110|100|\n");
        let defective = c.get(1).unwrap().clone();
        assert!(trace_impact(&c, &defective).is_empty());
    }

    #[test]
    fn detail_mapping_covers_known_regs() {
        let detail = impact_detail(&ImpactedRecord {
            reg: "E110".to_string(),
            line_no: 9,
        })
        .unwrap();
        assert_eq!(detail.block, "E");
        assert_eq!(detail.gravity, "critical");
        assert!(detail.message.contains("linha 9"));

        assert!(impact_detail(&ImpactedRecord {
            reg: "0000".to_string(),
            line_no: 1,
        })
        .is_none());
    }
}
