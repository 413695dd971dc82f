//! Rules over the document records: duplicate documents and items, CFOP
//! direction and format, and the C800/C850 electronic-receipt family.

use sped_core::numeric::{is_digits, normalize_decimal_key, only_digits, parse_decimal_or_zero};
use sped_core::{Context, Record, Severity};

use crate::issue::Issue;
use crate::rule::Rule;

/// CFOP field position per record type.
fn cfop_index(reg: &str) -> Option<usize> {
    match reg {
        "C100" => Some(11),
        "C170" | "D100" => Some(9),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// R015: duplicate documents by access key (last occurrence survives)
// ---------------------------------------------------------------------------

pub struct DuplicateDocument;

impl DuplicateDocument {
    /// Last line carrying the same (reg, access key) pair.
    fn last_with_key(ctx: &Context, reg: &str, key: &str) -> Option<usize> {
        ctx.of_reg(reg)
            .filter(|r| r.field(8) == key)
            .map(|r| r.line_no)
            .last()
    }
}

impl Rule for DuplicateDocument {
    fn id(&self) -> &'static str {
        "R015"
    }
    fn description(&self) -> &'static str {
        "Remove documentos fiscais duplicados"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if !matches!(record.reg.as_str(), "C100" | "C500") {
            return vec![];
        }
        let key = record.field(8);
        if key.is_empty() {
            return vec![];
        }
        match Self::last_with_key(ctx, &record.reg, key) {
            Some(last) if last != record.line_no => vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("Documento {key} duplicado"),
            )
            .with_suggestion("Manter apenas última ocorrência")],
            _ => vec![],
        }
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get(line_no) else {
            return;
        };
        if !matches!(record.reg.as_str(), "C100" | "C500") {
            return;
        }
        let key = record.field(8).to_string();
        if key.is_empty() {
            return;
        }
        if Self::last_with_key(ctx, &record.reg.clone(), &key) != Some(line_no) {
            ctx.remove(line_no);
        }
    }
}

// ---------------------------------------------------------------------------
// R017: CFOP prefix must match the operation direction
// ---------------------------------------------------------------------------

pub struct CfopDirection;

impl Rule for CfopDirection {
    fn id(&self) -> &'static str {
        "R017"
    }
    fn description(&self) -> &'static str {
        "Corrige CFOP incompatível com a operação"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        let Some(idx) = cfop_index(&record.reg) else {
            return vec![];
        };
        if record.fields.len() < 3 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("Registro {} incompleto (menos de 3 campos)", record.reg),
            )
            .with_suggestion("Verificar estrutura do registro")];
        }
        if !record.has_field(idx) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("Registro {} incompleto (campo CFOP ausente)", record.reg),
            )
            .with_suggestion("Verificar estrutura do registro")];
        }
        let cfop = record.field(idx);
        let tp_op = record.field(2);
        let first = cfop.chars().next();
        if tp_op == "0" && !matches!(first, Some('1' | '2' | '3')) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("CFOP {cfop} inválido para entrada"),
            )
            .with_suggestion("Ajustar CFOP para entrada")];
        }
        if tp_op == "1" && !matches!(first, Some('5' | '6' | '7')) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("CFOP {cfop} inválido para saída"),
            )
            .with_suggestion("Ajustar CFOP para saída")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        let Some(idx) = cfop_index(&record.reg) else {
            return;
        };
        if record.fields.len() < 3 || !record.has_field(idx) {
            return;
        }
        let tp_op = record.field(2).to_string();
        let cfop = record.field(idx);
        let Some(first) = cfop.chars().next() else {
            return;
        };
        // Swap the direction digit, keeping the operation nature intact.
        let replacement = match (tp_op.as_str(), first) {
            ("0", '5') => Some('1'),
            ("0", '6') => Some('2'),
            ("0", '7') => Some('3'),
            ("1", '1') => Some('5'),
            ("1", '2') => Some('6'),
            ("1", '3') => Some('7'),
            _ => None,
        };
        if let Some(digit) = replacement {
            let mut fixed = String::with_capacity(cfop.len());
            fixed.push(digit);
            fixed.push_str(&cfop[1..]);
            record.fields[idx] = fixed;
        }
    }
}

// ---------------------------------------------------------------------------
// RC170: duplicate item within the same parent document
// ---------------------------------------------------------------------------

pub struct DuplicateDocumentItem;

impl DuplicateDocumentItem {
    /// Composite key: parent access key, item code, normalised item value.
    fn item_key(ctx: &Context, record: &Record) -> Option<String> {
        let parent = ctx.get(record.parent?)?;
        if parent.reg != "C100" {
            return None;
        }
        let doc_key = parent.field(8);
        let item_code = record.field(2);
        let item_value = record.field(6);
        if doc_key.is_empty() || item_code.is_empty() || item_value.is_empty() {
            return None;
        }
        Some(format!(
            "{doc_key}|{item_code}|{}",
            normalize_decimal_key(item_value)
        ))
    }

    fn last_with_key(ctx: &Context, key: &str) -> Option<usize> {
        ctx.of_reg("C170")
            .filter(|r| Self::item_key(ctx, r).as_deref() == Some(key))
            .map(|r| r.line_no)
            .last()
    }
}

impl Rule for DuplicateDocumentItem {
    fn id(&self) -> &'static str {
        "RC170"
    }
    fn description(&self) -> &'static str {
        "Remove itens duplicados no C170 considerando o documento pai"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "C170" {
            return vec![];
        }
        let Some(key) = Self::item_key(ctx, record) else {
            return vec![];
        };
        match Self::last_with_key(ctx, &key) {
            Some(last) if last != record.line_no => {
                let parent_key = record
                    .parent
                    .and_then(|p| ctx.get(p))
                    .map(|p| p.field(8).to_string())
                    .unwrap_or_default();
                vec![Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!(
                        "Item duplicado na nota {parent_key}: código={}, valor={}",
                        record.field(2),
                        record.field(6)
                    ),
                )
                .with_suggestion("Manter apenas última ocorrência")]
            }
            _ => vec![],
        }
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get(line_no) else {
            return;
        };
        if record.reg != "C170" {
            return;
        }
        let Some(key) = Self::item_key(ctx, record) else {
            return;
        };
        if Self::last_with_key(ctx, &key) != Some(line_no) {
            ctx.remove(line_no);
        }
    }
}

// ---------------------------------------------------------------------------
// RC850: C850 duplicates and consistency against the parent C800
// ---------------------------------------------------------------------------

pub struct DuplicateCfeItem;

impl DuplicateCfeItem {
    /// Composite key: parent document identity plus CST/CFOP/aliquot.
    fn item_key(ctx: &Context, record: &Record) -> Option<String> {
        let parent = ctx.get(record.parent?)?;
        if parent.reg != "C800" {
            return None;
        }
        Some(format!(
            "{}|{}|{}|{}|{}|{}",
            parent.field(3),
            parent.field(4),
            parent.field(5),
            record.field(1),
            record.field(2),
            record.field(3),
        ))
    }

    fn last_with_key(ctx: &Context, key: &str) -> Option<usize> {
        ctx.of_reg("C850")
            .filter(|r| Self::item_key(ctx, r).as_deref() == Some(key))
            .map(|r| r.line_no)
            .last()
    }

    fn parent_cancelled(ctx: &Context, record: &Record) -> bool {
        record
            .parent
            .and_then(|p| ctx.get(p))
            .map(|p| matches!(p.field(2), "02" | "03"))
            .unwrap_or(false)
    }
}

impl Rule for DuplicateCfeItem {
    fn id(&self) -> &'static str {
        "RC850"
    }
    fn description(&self) -> &'static str {
        "Valida duplicidade e consistência dos registros C850"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        match record.reg.as_str() {
            "C850" => self.validate_item(record, ctx),
            "C800" => self.validate_totals(record, ctx),
            _ => vec![],
        }
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get(line_no) else {
            return;
        };
        if record.reg != "C850" {
            return;
        }
        if Self::parent_cancelled(ctx, record) {
            ctx.remove(line_no);
            return;
        }
        let Some(key) = Self::item_key(ctx, record) else {
            return;
        };
        if Self::last_with_key(ctx, &key) != Some(line_no) {
            ctx.remove(line_no);
        }
    }
}

impl DuplicateCfeItem {
    fn validate_item(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        let Some(parent) = record.parent.and_then(|p| ctx.get(p)) else {
            return vec![];
        };
        if parent.reg != "C800" {
            return vec![];
        }

        // A cancelled receipt cannot carry detail lines.
        let cod_sit = parent.field(2);
        if matches!(cod_sit, "02" | "03") {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("C800 cancelado (COD_SIT={cod_sit}) não pode possuir C850"),
            )
            .with_suggestion("Remover C850 vinculado")];
        }

        let Some(key) = Self::item_key(ctx, record) else {
            return vec![];
        };
        match Self::last_with_key(ctx, &key) {
            Some(last) if last != record.line_no => vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!(
                    "Duplicidade no CF-e {}: CST={}, CFOP={}, ALIQ={}",
                    parent.field(3),
                    record.field(1),
                    record.field(2),
                    record.field(3)
                ),
            )
            .with_suggestion("Manter apenas última ocorrência")],
            _ => vec![],
        }
    }

    fn validate_totals(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        let children: Vec<&Record> = ctx
            .records()
            .iter()
            .filter(|r| r.reg == "C850" && r.parent == Some(record.line_no))
            .collect();
        if children.is_empty() {
            return vec![];
        }

        let mut issues = Vec::new();
        let soma_vl_opr: f64 = children
            .iter()
            .map(|r| parse_decimal_or_zero(r.field(4)))
            .sum();
        let soma_vl_icms: f64 = children
            .iter()
            .map(|r| parse_decimal_or_zero(r.field(6)))
            .sum();
        let vl_cfe = parse_decimal_or_zero(record.field(6));
        let vl_icms = parse_decimal_or_zero(record.field(8));

        if (soma_vl_opr - vl_cfe).abs() > 0.01 {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!(
                        "Soma VL_OPR dos C850 ({soma_vl_opr:.2}) difere do VL_CFE do C800 ({vl_cfe:.2})"
                    ),
                )
                .with_suggestion("Ajustar valores"),
            );
        }
        if (soma_vl_icms - vl_icms).abs() > 0.01 {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!(
                        "Soma VL_ICMS dos C850 ({soma_vl_icms:.2}) difere do VL_ICMS do C800 ({vl_icms:.2})"
                    ),
                )
                .with_suggestion("Ajustar valores"),
            );
        }
        issues
    }
}

// ---------------------------------------------------------------------------
// R107: CFOP must be purely numeric
// ---------------------------------------------------------------------------

pub struct CfopDigitsOnly;

impl Rule for CfopDigitsOnly {
    fn id(&self) -> &'static str {
        "R107"
    }
    fn description(&self) -> &'static str {
        "CFOP com formatação inválida"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        let Some(idx) = cfop_index(&record.reg) else {
            return vec![];
        };
        if !record.has_field(idx) {
            return vec![];
        }
        let cfop = record.field(idx);
        if !cfop.is_empty() && !is_digits(cfop) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("CFOP {cfop} com formatação inválida"),
            )
            .with_suggestion("Remover caracteres não numéricos")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        let Some(idx) = cfop_index(&record.reg) else {
            return;
        };
        if record.has_field(idx) {
            let cfop = record.field(idx);
            if !cfop.is_empty() && !is_digits(cfop) {
                record.fields[idx] = only_digits(cfop);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
