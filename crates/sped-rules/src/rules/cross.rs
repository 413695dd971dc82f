//! Cross-cutting rules that look at any record type: field whitespace,
//! numeric formatting, empty block openers, and the fiscal PIS/COFINS
//! guard on C170 items.

use sped_core::identify::is_fiscal_cst;
use sped_core::numeric::{is_digits, only_digits, parse_decimal_or_zero};
use sped_core::{Context, Record, Severity};

use crate::issue::Issue;
use crate::rule::Rule;

// ---------------------------------------------------------------------------
// R006: no leading/trailing whitespace in fields
// ---------------------------------------------------------------------------

pub struct FieldWhitespace;

impl Rule for FieldWhitespace {
    fn id(&self) -> &'static str {
        "R006"
    }
    fn description(&self) -> &'static str {
        "Campos não devem ter espaços em excesso"
    }
    fn severity(&self) -> Severity {
        Severity::Warn
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.fields.iter().any(|f| f != f.trim()) {
            vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Warn,
                "Espaços extras nos campos",
            )
            .with_suggestion("Aplicar strip")]
        } else {
            vec![]
        }
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        if let Some(record) = ctx.get_mut(line_no) {
            for field in &mut record.fields {
                let trimmed = field.trim();
                if trimmed.len() != field.len() {
                    *field = trimmed.to_string();
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// R028: numeric fields at known positions must be numeric
// ---------------------------------------------------------------------------

/// Positions that must hold numeric values, per record type.
fn numeric_field_indices(reg: &str) -> &'static [usize] {
    match reg {
        "C100" => &[10, 11, 12, 13, 14],
        "C170" => &[6, 7, 8, 9, 10],
        "H020" => &[2, 3, 4],
        _ => &[],
    }
}

/// A value passes when, with the decimal and thousands separators removed,
/// only digits remain.
fn is_numeric_text(value: &str) -> bool {
    let stripped: String = value.chars().filter(|c| !matches!(c, '.' | ',')).collect();
    is_digits(&stripped)
}

pub struct NumericFieldFormat;

impl Rule for NumericFieldFormat {
    fn id(&self) -> &'static str {
        "R028"
    }
    fn description(&self) -> &'static str {
        "Corrige formatação de campos numéricos"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        let mut issues = Vec::new();
        for &idx in numeric_field_indices(&record.reg) {
            if !record.has_field(idx) {
                continue;
            }
            let value = record.field(idx);
            if !value.is_empty() && !is_numeric_text(value) {
                issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!("Campo {idx} com formato inválido: {value}"),
                    )
                    .with_suggestion("Converter para formato numérico"),
                );
            }
        }
        issues
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        for &idx in numeric_field_indices(&record.reg.clone()) {
            if !record.has_field(idx) {
                continue;
            }
            let value = record.field(idx);
            if value.is_empty() || is_numeric_text(value) {
                continue;
            }
            let digits = only_digits(value);
            record.fields[idx] = if digits.is_empty() {
                "0.00".to_string()
            } else {
                format!("{digits}.00")
            };
        }
    }
}

// ---------------------------------------------------------------------------
// R031: block opener declaring movement over an empty block
// ---------------------------------------------------------------------------

pub struct EmptyBlockOpener;

impl EmptyBlockOpener {
    fn block_is_empty(ctx: &Context, opener: &Record) -> bool {
        let Some(block) = opener.block() else {
            return false;
        };
        !ctx.records()
            .iter()
            .any(|r| r.reg.starts_with(block) && r.reg != opener.reg)
    }
}

impl Rule for EmptyBlockOpener {
    fn id(&self) -> &'static str {
        "R031"
    }
    fn description(&self) -> &'static str {
        "Remove aberturas de bloco sem movimento"
    }
    fn severity(&self) -> Severity {
        Severity::Warn
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if !matches!(record.reg.as_str(), "C001" | "D001" | "H001") {
            return vec![];
        }
        if record.field(1) == "0" && Self::block_is_empty(ctx, record) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Warn,
                format!("Bloco {} sem movimento", record.block().unwrap_or('?')),
            )
            .with_suggestion("Remover bloco")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get(line_no) else {
            return;
        };
        if !matches!(record.reg.as_str(), "C001" | "D001" | "H001") {
            return;
        }
        if record.field(1) == "0" && Self::block_is_empty(ctx, record) {
            ctx.remove(line_no);
        }
    }
}

// ---------------------------------------------------------------------------
// R110: fiscal files: C170 PIS/COFINS CSTs and credit values
// ---------------------------------------------------------------------------

/// Non-incidence tax situations: the paired credit value must be zero.
const NON_INCIDENCE_CST: &[&str] = &["50", "51", "52", "53", "54", "55", "56"];

/// (CST index, value index, tribute label) pairs checked on C170.
const PIS_COFINS_FIELDS: &[(usize, usize, &str)] = &[(25, 30, "PIS"), (31, 36, "COFINS")];

pub struct FiscalPisCofinsValues;

impl Rule for FiscalPisCofinsValues {
    fn id(&self) -> &'static str {
        "R110"
    }
    fn description(&self) -> &'static str {
        "Verifica valores de PIS/COFINS no SPED Fiscal"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if !ctx.sped_type.is_fiscal() {
            return vec![];
        }
        if record.reg != "C170" || record.fields.len() < 37 {
            return vec![];
        }

        let mut issues = Vec::new();
        for &(cst_idx, value_idx, tribute) in PIS_COFINS_FIELDS {
            let cst = record.field(cst_idx);
            if !is_fiscal_cst(cst) {
                issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!("CST {tribute} {cst} inválido para SPED Fiscal"),
                    )
                    .with_suggestion("Ajustar para CST válido (50-75)"),
                );
            }
            let value = record.field(value_idx);
            if NON_INCIDENCE_CST.contains(&cst)
                && !value.is_empty()
                && parse_decimal_or_zero(value) != 0.0
            {
                issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!(
                            "Valor do crédito de {tribute} ({value}) deve ser zero para CST {cst}"
                        ),
                    )
                    .with_suggestion("Zerar valor do crédito"),
                );
            }
        }
        issues
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        if !ctx.sped_type.is_fiscal() {
            return;
        }
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "C170" || record.fields.len() < 37 {
            return;
        }
        for &(cst_idx, value_idx, _) in PIS_COFINS_FIELDS {
            if !is_fiscal_cst(record.field(cst_idx)) {
                record.fields[cst_idx] = "50".to_string();
            }
            // Zero the paired value against the CST as it stands after the
            // coercion above, so one pass converges.
            let cst = record.field(cst_idx).to_string();
            let value = record.field(value_idx);
            if NON_INCIDENCE_CST.contains(&cst.as_str())
                && !value.is_empty()
                && parse_decimal_or_zero(value) != 0.0
            {
                record.fields[value_idx] = "0,00".to_string();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sped_core::{parse, SpedType};

    fn ctx(text: &str) -> Context {
        Context::new(parse(text))
    }

    fn fiscal_ctx(text: &str) -> Context {
        let mut c = ctx(text);
        c.sped_type = SpedType::Fiscal;
        c
    }

    /// C170 with the PIS/COFINS CST and value fields populated.
    fn c170_line(cst_pis: &str, vl_pis: &str, cst_cofins: &str, vl_cofins: &str) -> String {
        let mut fields = vec!["C170".to_string()];
        for i in 1..=36 {
            fields.push(match i {
                25 => cst_pis.to_string(),
                30 => vl_pis.to_string(),
                31 => cst_cofins.to_string(),
                36 => vl_cofins.to_string(),
                _ => String::new(),
            });
        }
        format!("|{}|", fields.join("|"))
    }

    #[test]
    fn r006_flags_and_trims_padded_fields() {
        let mut c = ctx("|0150| 123 |NOME|\n");
        let issues = FieldWhitespace.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warn);

        FieldWhitespace.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(1), "123");
        assert!(FieldWhitespace.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r006_clean_record_passes() {
        let c = ctx("|0150|123|NOME|\n");
        assert!(FieldWhitespace.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r028_flags_non_numeric_positions() {
        let c = ctx("|C100|0|1|P1|55|1|1|N1|K|CNPJ|10x.00|200,00|\n");
        let issues = NumericFieldFormat.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("Campo 10"));
    }

    #[test]
    fn r028_fix_normalises_only_flagged_fields() {
        let mut c = ctx("|C100|0|1|P1|55|1|1|N1|K|CNPJ|10x50|200,00|\n");
        NumericFieldFormat.fix(1, &mut c);
        let fixed = c.get(1).unwrap();
        assert_eq!(fixed.field(10), "1050.00");
        // The valid neighbour keeps its original notation.
        assert_eq!(fixed.field(11), "200,00");
        assert!(NumericFieldFormat.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r028_accepts_both_decimal_notations() {
        let c = ctx("|C100|0|1|P1|55|1|1|N1|K|CNPJ|1.234,56|200.00|\n");
        assert!(NumericFieldFormat.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r031_flags_movement_opener_over_empty_block() {
        let mut c = ctx("|C001|0|\n|H001|0|\n|H005|100,00|31122023|0|01|\n");
        let issues = EmptyBlockOpener.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("Bloco C"));
        // H block has content, so its opener passes.
        assert!(EmptyBlockOpener.validate(&c.records()[1], &c).is_empty());

        EmptyBlockOpener.fix(1, &mut c);
        assert!(c.get(1).is_none());
    }

    #[test]
    fn r031_keeps_declared_empty_opener() {
        let c = ctx("|C001|1|\n");
        assert!(EmptyBlockOpener.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r110_flags_invalid_cst_and_nonzero_credit() {
        let c = fiscal_ctx(&c170_line("99", "0,00", "50", "12,34"));
        let issues = FiscalPisCofinsValues.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.contains("CST PIS 99"));
        assert!(issues[1].message.contains("COFINS"));
    }

    #[test]
    fn r110_fix_converges_in_one_pass() {
        let mut c = fiscal_ctx(&c170_line("99", "12,34", "50", "56,78"));
        FiscalPisCofinsValues.fix(1, &mut c);
        let fixed = c.get(1).unwrap();
        assert_eq!(fixed.field(25), "50");
        assert_eq!(fixed.field(30), "0,00");
        assert_eq!(fixed.field(36), "0,00");
        assert!(FiscalPisCofinsValues.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r110_silent_outside_fiscal_files() {
        let mut c = ctx(&c170_line("99", "12,34", "50", "56,78"));
        c.sped_type = SpedType::Contrib;
        assert!(FiscalPisCofinsValues.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r110_zero_credit_under_non_incidence_passes() {
        let c = fiscal_ctx(&c170_line("50", "0,00", "56", ""));
        assert!(FiscalPisCofinsValues.validate(&c.records()[0], &c).is_empty());
    }
}
