//! SPED flavour detection.
//!
//! A file is classified by the blocks it carries and by the tax-situation
//! codes found in its C170 items. The outcome gates which rule sets run.

use crate::context::Context;
use crate::record::SpedType;

/// Tax-situation codes that are valid for PIS/COFINS fields inside a SPED
/// Fiscal file. Anything else in a C170 betrays a Contribuições layout.
pub const FISCAL_CST_CODES: &[&str] = &[
    "50", "51", "52", "53", "54", "55", "56", "60", "61", "62", "63", "64", "65", "66", "67",
    "70", "71", "72", "73", "74", "75",
];

const PIS_COFINS_APPRAISAL_REGS: &[&str] =
    &["M100", "M200", "M500", "M600", "M110", "M210", "M510", "M610"];

const CONTRIB_OPENING_REGS: &[&str] = &["1001", "1010", "9001"];

/// True when `cst` belongs to the fiscal-valid set (empty counts as valid).
pub fn is_fiscal_cst(cst: &str) -> bool {
    cst.is_empty() || FISCAL_CST_CODES.contains(&cst)
}

/// Classify the file as fiscal, contributions, both, or unknown.
pub fn identify_sped_type(ctx: &Context) -> SpedType {
    let has_fiscal = ctx
        .records()
        .iter()
        .any(|r| r.reg.starts_with('E') || r.reg.starts_with('H'));

    let has_contrib_block = ctx
        .records()
        .iter()
        .any(|r| r.reg.starts_with('M') || r.reg.starts_with('1'));

    let has_pis_cofins_appraisal = ctx
        .records()
        .iter()
        .any(|r| PIS_COFINS_APPRAISAL_REGS.contains(&r.reg.as_str()));

    let has_contrib_opening = ctx
        .records()
        .iter()
        .any(|r| CONTRIB_OPENING_REGS.contains(&r.reg.as_str()));

    // C170 PIS/COFINS CSTs outside the fiscal range only occur in
    // Contribuições files.
    let has_invalid_fiscal_cst = ctx.of_reg("C170").any(|r| {
        !is_fiscal_cst(r.field(29)) || !is_fiscal_cst(r.field(32))
    });

    let contrib_side = has_contrib_block
        || has_pis_cofins_appraisal
        || has_contrib_opening
        || has_invalid_fiscal_cst;

    tracing::debug!(
        has_fiscal,
        has_contrib_block,
        has_pis_cofins_appraisal,
        has_contrib_opening,
        has_invalid_fiscal_cst,
        "sped type flags"
    );

    match (has_fiscal, contrib_side) {
        (true, true) => SpedType::Both,
        (true, false) => SpedType::Fiscal,
        (false, true) => SpedType::Contrib,
        (false, false) => SpedType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn ctx(text: &str) -> Context {
        Context::new(parse(text))
    }

    #[test]
    fn e_and_h_blocks_mean_fiscal() {
        let c = ctx("|0000|017|\n|E110|0|\n|H001|0|\n");
        assert_eq!(identify_sped_type(&c), SpedType::Fiscal);
    }

    #[test]
    fn m_block_means_contrib() {
        let c = ctx("|0000|017|\n|M100|01|\n");
        assert_eq!(identify_sped_type(&c), SpedType::Contrib);
    }

    #[test]
    fn contrib_opening_record_means_contrib() {
        let c = ctx("|0000|017|\n|1001|0|\n");
        assert_eq!(identify_sped_type(&c), SpedType::Contrib);
    }

    #[test]
    fn fiscal_plus_contrib_markers_mean_both() {
        let c = ctx("|0000|017|\n|E110|0|\n|M100|01|\n");
        assert_eq!(identify_sped_type(&c), SpedType::Both);
    }

    #[test]
    fn no_markers_mean_unknown() {
        let c = ctx("|0000|017|\n|C100|0|\n");
        assert_eq!(identify_sped_type(&c), SpedType::Unknown);
    }

    #[test]
    fn out_of_range_cst_in_c170_means_contrib() {
        // CST 01 at index 29 is outside the fiscal range 50-75.
        let mut fields = vec!["C170".to_string()];
        fields.extend((1..=32).map(|i| {
            if i == 29 {
                "01".to_string()
            } else {
                String::new()
            }
        }));
        let line = format!("|{}|", fields.join("|"));
        let c = ctx(&line);
        assert_eq!(identify_sped_type(&c), SpedType::Contrib);
    }

    #[test]
    fn fiscal_cst_in_c170_does_not_flip_classification() {
        let mut fields = vec!["C170".to_string()];
        fields.extend((1..=32).map(|i| {
            if i == 29 || i == 32 {
                "50".to_string()
            } else {
                String::new()
            }
        }));
        let line = format!("|{}|\n|H001|0|", fields.join("|"));
        let c = ctx(&line);
        assert_eq!(identify_sped_type(&c), SpedType::Fiscal);
    }

    #[test]
    fn empty_cst_is_fiscal_valid() {
        assert!(is_fiscal_cst(""));
        assert!(is_fiscal_cst("50"));
        assert!(is_fiscal_cst("75"));
        assert!(!is_fiscal_cst("01"));
        assert!(!is_fiscal_cst("49"));
    }
}
