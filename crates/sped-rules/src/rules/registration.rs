//! Rules over the registration records (`0150`, `0190`): duplicate and
//! orphaned participants, state-registration hygiene.

use sped_core::numeric::{is_digits, only_digits};
use sped_core::{Context, Record, Severity};

use crate::issue::Issue;
use crate::rule::Rule;

/// Record types whose field 9 references a participant CNPJ.
const PARTICIPANT_REFERENCING_DOCS: &[&str] = &["C100", "C500", "D100"];

/// Line number of the last `0150` carrying the same normalised CNPJ.
fn last_participant_with_cnpj(ctx: &Context, cnpj: &str) -> Option<usize> {
    ctx.of_reg("0150")
        .filter(|r| only_digits(r.field(1)) == cnpj)
        .map(|r| r.line_no)
        .last()
}

fn participant_is_referenced(ctx: &Context, cnpj: &str) -> bool {
    ctx.records().iter().any(|doc| {
        PARTICIPANT_REFERENCING_DOCS.contains(&doc.reg.as_str())
            && doc.fields.len() >= 10
            && only_digits(doc.field(9)) == cnpj
    })
}

// ---------------------------------------------------------------------------
// R007: duplicate 0150 by CNPJ (last occurrence survives)
// ---------------------------------------------------------------------------

pub struct DuplicateParticipant;

impl Rule for DuplicateParticipant {
    fn id(&self) -> &'static str {
        "R007"
    }
    fn description(&self) -> &'static str {
        "Remove registros 0150 com CNPJ duplicado"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "0150" || !record.has_field(1) {
            return vec![];
        }
        let cnpj = only_digits(record.field(1));
        match last_participant_with_cnpj(ctx, &cnpj) {
            Some(last) if last != record.line_no => vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("CNPJ {cnpj} duplicado"),
            )
            .with_suggestion("Manter apenas última ocorrência")],
            _ => vec![],
        }
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get(line_no) else {
            return;
        };
        if record.reg != "0150" || !record.has_field(1) {
            return;
        }
        let cnpj = only_digits(record.field(1));
        if last_participant_with_cnpj(ctx, &cnpj) != Some(line_no) {
            ctx.remove(line_no);
        }
    }
}

// ---------------------------------------------------------------------------
// R008: 0150 not referenced by any document
// ---------------------------------------------------------------------------

pub struct OrphanedParticipant;

impl Rule for OrphanedParticipant {
    fn id(&self) -> &'static str {
        "R008"
    }
    fn description(&self) -> &'static str {
        "Remove cadastros 0150 sem referência em documentos"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "0150" {
            return vec![];
        }
        if record.fields.len() < 2 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro 0150 incompleto (menos de 2 campos)",
            )
            .with_suggestion("Verificar estrutura do registro")];
        }
        let cnpj = only_digits(record.field(1));
        if !participant_is_referenced(ctx, &cnpj) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("Cadastro 0150 CNPJ {cnpj} não referenciado"),
            )
            .with_suggestion("Remover cadastro órfão")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get(line_no) else {
            return;
        };
        if record.reg != "0150" || record.fields.len() < 2 {
            return;
        }
        let cnpj = only_digits(record.field(1));
        if !participant_is_referenced(ctx, &cnpj) {
            ctx.remove(line_no);
        }
    }
}

// ---------------------------------------------------------------------------
// R009: state registration must be digits-only
// ---------------------------------------------------------------------------

fn ie_index(reg: &str) -> Option<usize> {
    match reg {
        "0150" => Some(6),
        "0190" => Some(2),
        _ => None,
    }
}

pub struct StateRegistrationDigits;

impl Rule for StateRegistrationDigits {
    fn id(&self) -> &'static str {
        "R009"
    }
    fn description(&self) -> &'static str {
        "IE deve conter somente dígitos (quando informada)"
    }
    fn severity(&self) -> Severity {
        Severity::Warn
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        let Some(idx) = ie_index(&record.reg) else {
            return vec![];
        };
        if !record.has_field(idx) {
            return vec![];
        }
        let ie = record.field(idx);
        if !ie.is_empty() && !is_digits(ie) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Warn,
                format!("IE {ie} com caracteres inválidos"),
            )
            .with_suggestion("Remover não dígitos")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        let Some(idx) = ie_index(&record.reg) else {
            return;
        };
        if record.has_field(idx) {
            let ie = record.field(idx);
            if !ie.is_empty() && !is_digits(ie) {
                record.fields[idx] = only_digits(ie);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
