//! Rules over the appraisal block (E110, E200) and the document totals they
//! aggregate.

use sped_core::numeric::{format_amount, parse_decimal_or_zero, DecimalSeparator};
use sped_core::{Context, Record, Severity};

use crate::issue::Issue;
use crate::rule::Rule;

/// Sum of ICMS over outbound documents (C100/C500 with `tp_op = 1`).
fn outbound_icms_total(ctx: &Context) -> f64 {
    ctx.records()
        .iter()
        .filter(|r| matches!(r.reg.as_str(), "C100" | "C500"))
        .filter(|r| r.fields.len() >= 15 && r.field(2) == "1")
        .map(|r| parse_decimal_or_zero(r.field(14)))
        .sum()
}

// ---------------------------------------------------------------------------
// R021: Simples Nacional must not carry ICMS credit
// ---------------------------------------------------------------------------

pub struct SimplesNacionalCredit;

impl SimplesNacionalCredit {
    fn is_simples_nacional(ctx: &Context) -> bool {
        ctx.of_reg("0000").any(|r| r.field(18) == "1")
    }
}

impl Rule for SimplesNacionalCredit {
    fn id(&self) -> &'static str {
        "R021"
    }
    fn description(&self) -> &'static str {
        "Zera crédito de ICMS para Simples Nacional"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "E110" {
            return vec![];
        }
        if record.fields.len() < 6 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro E110 incompleto (menos de 6 campos)",
            )
            .with_suggestion("Verificar estrutura do registro")];
        }
        if Self::is_simples_nacional(ctx) && parse_decimal_or_zero(record.field(5)) > 0.0 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Crédito de ICMS para empresa do Simples Nacional",
            )
            .with_suggestion("Zerar valor do crédito")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        if !Self::is_simples_nacional(ctx) {
            return;
        }
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "E110" || record.fields.len() < 6 {
            return;
        }
        if parse_decimal_or_zero(record.field(5)) > 0.0 {
            record.fields[5] = "0.00".to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// R025: E200 debit total vs outbound documents
// ---------------------------------------------------------------------------

pub struct DebitTotalMismatch;

impl Rule for DebitTotalMismatch {
    fn id(&self) -> &'static str {
        "R025"
    }
    fn description(&self) -> &'static str {
        "Ajusta total de débitos (E200) para coincidir com os documentos"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "E200" {
            return vec![];
        }
        if record.fields.len() < 3 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro E200 incompleto (menos de 3 campos)",
            )
            .with_suggestion("Verificar estrutura do registro")];
        }
        let total = parse_decimal_or_zero(record.field(2));
        let docs_sum = outbound_icms_total(ctx);
        if (total - docs_sum).abs() > 0.01 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!(
                    "Total de débitos ({total:.2}) diferente da soma dos documentos ({docs_sum:.2})"
                ),
            )
            .with_suggestion("Ajustar total de débitos")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let docs_sum = outbound_icms_total(ctx);
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "E200" || record.fields.len() < 3 {
            return;
        }
        if (parse_decimal_or_zero(record.field(2)) - docs_sum).abs() > 0.01 {
            record.fields[2] = format_amount(docs_sum, 2, DecimalSeparator::Dot);
        }
    }
}

// ---------------------------------------------------------------------------
// RE110: E110 totals vs the C190 totalisers
// ---------------------------------------------------------------------------

pub struct IcmsAppraisalConsistency;

impl Rule for IcmsAppraisalConsistency {
    fn id(&self) -> &'static str {
        "RE110"
    }
    fn description(&self) -> &'static str {
        "Valida consistência entre totais do Bloco C e do Bloco E"
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "E110" {
            return vec![];
        }
        if ctx.of_reg("C190").next().is_none() {
            return vec![];
        }
        let total_c190: f64 = ctx
            .of_reg("C190")
            .map(|r| parse_decimal_or_zero(r.field(6)))
            .sum();
        let total_e110 =
            parse_decimal_or_zero(record.field(1)) + parse_decimal_or_zero(record.field(5));
        if (total_c190 - total_e110).abs() > 0.01 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!(
                    "Divergência de ICMS: Bloco C (R$ {total_c190:.2}) vs Bloco E (R$ {total_e110:.2})"
                ),
            )
            .with_suggestion("Verificar registros C100/C170 com valores de ICMS divergentes")];
        }
        vec![]
    }
}

// ---------------------------------------------------------------------------
// RC100: C100 merchandise total vs its C170 items
// ---------------------------------------------------------------------------

pub struct DocumentItemsConsistency;

impl Rule for DocumentItemsConsistency {
    fn id(&self) -> &'static str {
        "RC100"
    }
    fn description(&self) -> &'static str {
        "Valida soma dos itens (C170) contra o total das mercadorias (C100)"
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "C100" {
            return vec![];
        }
        let children: Vec<&Record> = ctx
            .records()
            .iter()
            .filter(|r| r.reg == "C170" && r.parent == Some(record.line_no))
            .collect();
        if children.is_empty() {
            return vec![];
        }
        let items_total: f64 = children
            .iter()
            .map(|r| parse_decimal_or_zero(r.field(6)))
            .sum();
        let vl_merc = parse_decimal_or_zero(record.field(15));
        if (items_total - vl_merc).abs() > 0.01 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!(
                    "Soma dos itens (R$ {items_total:.2}) diverge do total das mercadorias \
                     (R$ {vl_merc:.2})"
                ),
            )
            .with_suggestion("Verificar itens C170 com valores incorretos")];
        }
        vec![]
    }
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

    /// 0000 header with IND_ATIV = 1 at index 18 (Simples Nacional).
    fn simples_header() -> String {
        let mut fields = vec!["0000".to_string()];
        fields.extend((1..=18).map(|i| if i == 18 { "1".into() } else { i.to_string() }));
        format!("|{}|", fields.join("|"))
    }

    #[test]
    fn r021_flags_credit_for_simples_nacional() {
        let text = format!("{}\n|E110|100,00|0|0|0|50,00|\n", simples_header());
        let c = ctx(&text);
        let issues = SimplesNacionalCredit.validate(&c.records()[1], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("Simples Nacional"));
    }

    #[test]
    fn r021_fix_zeroes_the_credit() {
        let text = format!("{}\n|E110|100,00|0|0|0|50,00|\n", simples_header());
        let mut c = ctx(&text);
        SimplesNacionalCredit.fix(2, &mut c);
        assert_eq!(c.get(2).unwrap().field(5), "0.00");
        let issues = SimplesNacionalCredit.validate(&c.records()[1], &c);
        assert!(issues.is_empty());
    }

    #[test]
    fn r021_ignores_regular_regime() {
        let c = ctx("|0000|017|0|01012024|31012024|ACME|\n|E110|100,00|0|0|0|50,00|\n");
        assert!(SimplesNacionalCredit.validate(&c.records()[1], &c).is_empty());
    }

    #[test]
    fn r025_flags_and_fixes_debit_total() {
        let mut c = ctx("\
|C100|0|1|P1|55|1|1|N1|K1|CNPJ|100,00|5102|0|0|18,00|
|C100|0|0|P1|55|1|2|N2|K2|CNPJ|200,00|1102|0|0|99,00|
|E200|x|50,00|
");
        // Only the outbound document (tp_op = 1) counts: 18,00.
        let issues = DebitTotalMismatch.validate(&c.records()[2], &c);
        assert_eq!(issues.len(), 1);
        DebitTotalMismatch.fix(3, &mut c);
        assert_eq!(c.get(3).unwrap().field(2), "18.00");
        assert!(DebitTotalMismatch.validate(&c.records()[2], &c).is_empty());
    }

    #[test]
    fn re110_flags_cross_block_divergence() {
        let c = ctx("\
|C190|0|K|x|x|x|600.00|
|C190|0|K|x|x|x|400.00|
|E110|900.00|0|0|0|99.00|
");
        let issues = IcmsAppraisalConsistency.validate(&c.records()[2], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].suggestion.contains("C100/C170"));
    }

    #[test]
    fn re110_accepts_matching_totals() {
        let c = ctx("\
|C190|0|K|x|x|x|600.00|
|C190|0|K|x|x|x|400.00|
|E110|900.00|0|0|0|100.00|
");
        assert!(IcmsAppraisalConsistency.validate(&c.records()[2], &c).is_empty());
    }

    #[test]
    fn re110_silent_without_totalisers() {
        let c = ctx("|E110|900.00|0|0|0|100.00|\n");
        assert!(IcmsAppraisalConsistency.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn rc100_flags_item_sum_divergence() {
        let c = ctx("\
|C100|0|1|P1|55|1|1|N1|K1|CNPJ|x|x|x|x|x|300,00|
|C170|1|A10|ITEM|1|UN|100,00|
|C170|2|B20|ITEM|1|UN|150,00|
");
        let issues = DocumentItemsConsistency.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("250.00"));
    }

    #[test]
    fn rc100_accepts_matching_item_sum() {
        let c = ctx("\
|C100|0|1|P1|55|1|1|N1|K1|CNPJ|x|x|x|x|x|250,00|
|C170|1|A10|ITEM|1|UN|100,00|
|C170|2|B20|ITEM|1|UN|150,00|
");
        assert!(DocumentItemsConsistency.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn rc100_silent_without_items() {
        let c = ctx("|C100|0|1|P1|55|1|1|N1|K1|CNPJ|x|x|x|x|x|300,00|\n");
        assert!(DocumentItemsConsistency.validate(&c.records()[0], &c).is_empty());
    }
}
