//! PIS/COFINS rules for SPED Contribuições: tax-situation codes per
//! operation direction, credit arithmetic, and aliquot domains.

use sped_core::identify::FISCAL_CST_CODES;
use sped_core::numeric::{format_amount, parse_decimal, DecimalSeparator};
use sped_core::{Context, Record, Severity};

use crate::issue::Issue;
use crate::rule::Rule;

/// Tax-situation codes accepted on outbound operations.
const OUTBOUND_CST_CODES: &[&str] = &["01", "02", "03", "04", "05", "06", "07", "08", "09"];

/// Parse a credit-calculation field the way the appraisal records write
/// them: empty means zero, anything else must be numeric.
fn credit_field(s: &str) -> Option<f64> {
    if s.is_empty() {
        Some(0.0)
    } else {
        parse_decimal(s)
    }
}

fn nearest(valid: &[f64], value: f64) -> f64 {
    valid
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - value)
                .abs()
                .partial_cmp(&(b - value).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0.0)
}

fn is_one_of(valid: &[f64], value: f64) -> bool {
    valid.iter().any(|v| (v - value).abs() < 1e-9)
}

// ---------------------------------------------------------------------------
// R101 / R102: CST validity per operation direction
// ---------------------------------------------------------------------------

fn validate_cst_direction(
    rule_id: &'static str,
    tribute: &str,
    cst_index: usize,
    record: &Record,
) -> Vec<Issue> {
    if !matches!(record.reg.as_str(), "C170" | "C190" | "D190") {
        return vec![];
    }
    if record.fields.len() <= cst_index {
        return vec![];
    }
    let cst = record.field(cst_index);
    let tp_op = record.field(2);
    if tp_op == "0" && !FISCAL_CST_CODES.contains(&cst) {
        return vec![Issue::new(
            record.line_no,
            &record.reg,
            rule_id,
            Severity::Error,
            format!("CST {tribute} {cst} inválido para entrada"),
        )
        .with_suggestion(format!("Ajustar CST {tribute} para entrada"))];
    }
    if tp_op == "1" && !OUTBOUND_CST_CODES.contains(&cst) {
        return vec![Issue::new(
            record.line_no,
            &record.reg,
            rule_id,
            Severity::Error,
            format!("CST {tribute} {cst} inválido para saída"),
        )
        .with_suggestion(format!("Ajustar CST {tribute} para saída"))];
    }
    vec![]
}

pub struct PisCstValidity;

impl Rule for PisCstValidity {
    fn id(&self) -> &'static str {
        "R101"
    }
    fn description(&self) -> &'static str {
        "CST de PIS inválido para a operação"
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        validate_cst_direction(self.id(), "PIS", 29, record)
    }
}

pub struct CofinsCstValidity;

impl Rule for CofinsCstValidity {
    fn id(&self) -> &'static str {
        "R102"
    }
    fn description(&self) -> &'static str {
        "CST de COFINS inválido para a operação"
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        validate_cst_direction(self.id(), "COFINS", 32, record)
    }
}

// ---------------------------------------------------------------------------
// R103 / R104: credit must equal base × aliquot
// ---------------------------------------------------------------------------

fn validate_credit(
    rule_id: &'static str,
    tribute: &str,
    reg: &str,
    record: &Record,
) -> Vec<Issue> {
    if record.reg != reg || record.fields.len() < 8 {
        return vec![];
    }
    let parsed = (
        credit_field(record.field(5)),
        credit_field(record.field(6)),
        credit_field(record.field(7)),
    );
    let (Some(base), Some(aliq), Some(credit)) = parsed else {
        return vec![Issue::new(
            record.line_no,
            &record.reg,
            rule_id,
            Severity::Error,
            format!("Valores inválidos no registro {reg}"),
        )
        .with_suggestion("Verificar valores numéricos")];
    };
    let calculated = base * (aliq / 100.0);
    if (calculated - credit).abs() > 0.01 {
        return vec![Issue::new(
            record.line_no,
            &record.reg,
            rule_id,
            Severity::Error,
            format!(
                "Valor do crédito de {tribute} ({credit:.2}) difere de base × alíquota \
                 ({calculated:.2})"
            ),
        )
        .with_suggestion("Ajustar valor do crédito")];
    }
    vec![]
}

fn fix_credit(reg: &str, line_no: usize, ctx: &mut Context) {
    let Some(record) = ctx.get_mut(line_no) else {
        return;
    };
    if record.reg != reg || record.fields.len() < 8 {
        return;
    }
    let (Some(base), Some(aliq), Some(credit)) = (
        credit_field(record.field(5)),
        credit_field(record.field(6)),
        credit_field(record.field(7)),
    ) else {
        return;
    };
    let calculated = base * (aliq / 100.0);
    if (calculated - credit).abs() > 0.01 {
        record.fields[7] = format_amount(calculated, 2, DecimalSeparator::Dot);
    }
}

pub struct PisCreditMismatch;

impl Rule for PisCreditMismatch {
    fn id(&self) -> &'static str {
        "R103"
    }
    fn description(&self) -> &'static str {
        "Valor do crédito de PIS divergente da base × alíquota"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        validate_credit(self.id(), "PIS", "M100", record)
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        fix_credit("M100", line_no, ctx);
    }
}

pub struct CofinsCreditMismatch;

impl Rule for CofinsCreditMismatch {
    fn id(&self) -> &'static str {
        "R104"
    }
    fn description(&self) -> &'static str {
        "Valor do crédito de COFINS divergente da base × alíquota"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        validate_credit(self.id(), "COFINS", "M500", record)
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        fix_credit("M500", line_no, ctx);
    }
}

// ---------------------------------------------------------------------------
// R105 / R106: aliquot domains
// ---------------------------------------------------------------------------

/// Aliquot field position per record type, for PIS (`true`) and COFINS.
fn aliquot_index(reg: &str, pis: bool) -> Option<usize> {
    match (reg, pis) {
        ("M100", true) | ("M500", false) => Some(6),
        ("C170", true) => Some(30),
        ("C170", false) => Some(33),
        ("C190", true) | ("D190", true) => Some(11),
        ("C190", false) | ("D190", false) => Some(14),
        _ => None,
    }
}

fn validate_aliquot(
    rule_id: &'static str,
    tribute: &str,
    pis: bool,
    valid: &[f64],
    valid_text: &str,
    record: &Record,
) -> Vec<Issue> {
    let Some(idx) = aliquot_index(&record.reg, pis) else {
        return vec![];
    };
    if !record.has_field(idx) {
        return vec![];
    }
    let raw = record.field(idx);
    if raw.is_empty() {
        return vec![];
    }
    let Some(aliq) = parse_decimal(raw) else {
        return vec![Issue::new(
            record.line_no,
            &record.reg,
            rule_id,
            Severity::Error,
            format!("Alíquota de {tribute} inválida"),
        )
        .with_suggestion("Verificar valor numérico")];
    };
    // Far above any legal rate: the value landed in the wrong position.
    if aliq > 10.0 {
        return vec![Issue::new(
            record.line_no,
            &record.reg,
            rule_id,
            Severity::Error,
            format!("Alíquota de {tribute} {aliq}% claramente inválida"),
        )
        .with_suggestion("Verificar se o valor está na posição correta")];
    }
    if !is_one_of(valid, aliq) {
        return vec![Issue::new(
            record.line_no,
            &record.reg,
            rule_id,
            Severity::Error,
            format!("Alíquota de {tribute} {aliq}% inválida"),
        )
        .with_suggestion(format!("Ajustar alíquota para valor válido ({valid_text})"))];
    }
    vec![]
}

fn fix_aliquot(pis: bool, valid: &[f64], comma: bool, line_no: usize, ctx: &mut Context) {
    let Some(record) = ctx.get_mut(line_no) else {
        return;
    };
    let Some(idx) = aliquot_index(&record.reg, pis) else {
        return;
    };
    if !record.has_field(idx) || record.field(idx).is_empty() {
        return;
    }
    let Some(aliq) = parse_decimal(record.field(idx)) else {
        return;
    };
    if aliq > 10.0 {
        record.fields[idx] = "0".to_string();
        return;
    }
    if !is_one_of(valid, aliq) {
        let closest = nearest(valid, aliq);
        record.fields[idx] = if comma {
            format_amount(closest, 2, DecimalSeparator::Comma)
        } else {
            format!("{closest}")
        };
    }
}

/// Legal PIS aliquots, percent.
const PIS_ALIQUOTS: &[f64] = &[0.0, 0.65, 1.65];
/// Legal COFINS aliquots, percent.
const COFINS_ALIQUOTS: &[f64] = &[0.0, 3.0, 7.6];

pub struct PisAliquotRange;

impl Rule for PisAliquotRange {
    fn id(&self) -> &'static str {
        "R105"
    }
    fn description(&self) -> &'static str {
        "Alíquota de PIS fora do intervalo permitido"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        validate_aliquot(self.id(), "PIS", true, PIS_ALIQUOTS, "0, 0.65 ou 1.65", record)
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        fix_aliquot(true, PIS_ALIQUOTS, true, line_no, ctx);
    }
}

pub struct CofinsAliquotRange;

impl Rule for CofinsAliquotRange {
    fn id(&self) -> &'static str {
        "R106"
    }
    fn description(&self) -> &'static str {
        "Alíquota de COFINS fora do intervalo permitido"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        validate_aliquot(self.id(), "COFINS", false, COFINS_ALIQUOTS, "0, 3 ou 7.6", record)
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        fix_aliquot(false, COFINS_ALIQUOTS, false, line_no, ctx);
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

    /// C170 with `tp_op`, CST PIS (29), aliq PIS (30), CST COFINS (32),
    /// aliq COFINS (33).
    fn c170_line(tp_op: &str, cst_pis: &str, aliq_pis: &str, cst_cofins: &str, aliq_cofins: &str) -> String {
        let mut fields = vec!["C170".to_string()];
        for i in 1..=33 {
            fields.push(match i {
                2 => tp_op.to_string(),
                29 => cst_pis.to_string(),
                30 => aliq_pis.to_string(),
                32 => cst_cofins.to_string(),
                33 => aliq_cofins.to_string(),
                _ => String::new(),
            });
        }
        format!("|{}|", fields.join("|"))
    }

    #[test]
    fn r101_inbound_demands_credit_range_cst() {
        let c = ctx(&c170_line("0", "01", "", "50", ""));
        let issues = PisCstValidity.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("entrada"));
    }

    #[test]
    fn r101_outbound_demands_taxed_cst() {
        let c = ctx(&c170_line("1", "50", "", "01", ""));
        let issues = PisCstValidity.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("saída"));
    }

    #[test]
    fn r101_accepts_matching_direction() {
        let c = ctx(&c170_line("0", "50", "", "50", ""));
        assert!(PisCstValidity.validate(&c.records()[0], &c).is_empty());
        let c = ctx(&c170_line("1", "01", "", "01", ""));
        assert!(PisCstValidity.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r102_checks_cofins_cst_at_its_own_index() {
        let c = ctx(&c170_line("0", "50", "", "01", ""));
        let issues = CofinsCstValidity.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("COFINS"));
    }

    #[test]
    fn r103_flags_and_fixes_credit_arithmetic() {
        // base 1000, aliquot 1.65% → credit must be 16.50.
        let mut c = ctx("|M100|01|0|0|0|1000.00|1.65|99.00|0|\n");
        let issues = PisCreditMismatch.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        PisCreditMismatch.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(7), "16.50");
        assert!(PisCreditMismatch.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r103_flags_unparseable_values() {
        let c = ctx("|M100|01|0|0|0|abc|1.65|16.50|0|\n");
        let issues = PisCreditMismatch.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("Valores inválidos"));
    }

    #[test]
    fn r104_checks_m500() {
        let mut c = ctx("|M500|01|0|0|0|1000.00|7.6|99.00|0|\n");
        assert_eq!(CofinsCreditMismatch.validate(&c.records()[0], &c).len(), 1);
        CofinsCreditMismatch.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(7), "76.00");
    }

    #[test]
    fn r105_accepts_legal_aliquots() {
        for aliq in ["0", "0,65", "1.65", ""] {
            let c = ctx(&c170_line("0", "50", aliq, "50", ""));
            assert!(
                PisAliquotRange.validate(&c.records()[0], &c).is_empty(),
                "aliquot {aliq:?} should be accepted"
            );
        }
    }

    #[test]
    fn r105_flags_positional_error_and_fix_zeroes() {
        let mut c = ctx(&c170_line("0", "50", "50", "50", ""));
        let issues = PisAliquotRange.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("claramente inválida"));
        PisAliquotRange.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(30), "0");
    }

    #[test]
    fn r105_fix_snaps_to_nearest_legal_aliquot() {
        let mut c = ctx(&c170_line("0", "50", "1,60", "50", ""));
        assert_eq!(PisAliquotRange.validate(&c.records()[0], &c).len(), 1);
        PisAliquotRange.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(30), "1,65");
        assert!(PisAliquotRange.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r105_checks_m100_at_index_six() {
        let c = ctx("|M100|01|0|0|0|1000.00|2.00|20.00|0|\n");
        let issues = PisAliquotRange.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn r106_flags_and_fixes_cofins_aliquot() {
        let mut c = ctx(&c170_line("0", "50", "", "50", "7,5"));
        let issues = CofinsAliquotRange.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        CofinsAliquotRange.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(33), "7.6");
        assert!(CofinsAliquotRange.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r106_comma_aliquot_parses() {
        let c = ctx(&c170_line("0", "50", "", "50", "7,6"));
        assert!(CofinsAliquotRange.validate(&c.records()[0], &c).is_empty());
    }
}
