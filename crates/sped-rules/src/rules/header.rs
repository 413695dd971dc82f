//! Rules over the `0000` master record: presence, layout version, CNPJ/IE
//! hygiene, period ordering, and the mandatory-field matrix.

use sped_core::numeric::{is_digits, only_digits, parse_date};
use sped_core::{Context, Record, Severity};

use crate::issue::Issue;
use crate::rule::Rule;

/// Left-pad a digit string with zeros to the canonical CNPJ width.
fn pad_cnpj(digits: &str) -> String {
    format!("{:0>14}", &digits[..digits.len().min(14)])
}

/// True when the field reads like a name that slipped into a numeric slot.
fn looks_like_name(field: &str) -> bool {
    field.chars().any(|c| c.is_alphabetic()) && field.contains(' ')
}

// ---------------------------------------------------------------------------
// R001: first line must be the 0000 header
// ---------------------------------------------------------------------------

pub struct FirstLineHeader;

impl Rule for FirstLineHeader {
    fn id(&self) -> &'static str {
        "R001"
    }
    fn description(&self) -> &'static str {
        "Registro 0000 deve existir como primeira linha"
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.line_no == 1 && record.reg != "0000" {
            vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Primeira linha não é 0000",
            )]
        } else {
            vec![]
        }
    }
}

// ---------------------------------------------------------------------------
// R002: layout version present
// ---------------------------------------------------------------------------

pub struct LayoutVersion;

impl Rule for LayoutVersion {
    fn id(&self) -> &'static str {
        "R002"
    }
    fn description(&self) -> &'static str {
        "Campo versão do layout no 0000 deve estar presente"
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "0000" {
            return vec![];
        }
        if record.field(1).trim().is_empty() {
            vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Versão do layout ausente no 0000",
            )]
        } else {
            vec![]
        }
    }
}

// ---------------------------------------------------------------------------
// R003: CNPJ must be exactly 14 digits
// ---------------------------------------------------------------------------

pub struct CnpjNormalization;

impl Rule for CnpjNormalization {
    fn id(&self) -> &'static str {
        "R003"
    }
    fn description(&self) -> &'static str {
        "CNPJ no 0000 deve ter 14 dígitos"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "0000" {
            return vec![];
        }
        if record.fields.len() < 7 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro 0000 incompleto (menos de 7 campos)",
            )
            .with_suggestion("Verificar estrutura do registro")];
        }
        let cnpj = record.field(6);
        if cnpj.len() != 14 || !is_digits(cnpj) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("CNPJ inválido: {cnpj}"),
            )
            .with_suggestion("Normalizar para 14 dígitos")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.fields.len() < 7 {
            return;
        }
        let cnpj = record.field(6);
        if cnpj.len() != 14 || !is_digits(cnpj) {
            record.fields[6] = pad_cnpj(&only_digits(cnpj));
        }
    }
}

// ---------------------------------------------------------------------------
// R005: period start must not exceed period end
// ---------------------------------------------------------------------------

pub struct PeriodOrdering;

impl Rule for PeriodOrdering {
    fn id(&self) -> &'static str {
        "R005"
    }
    fn description(&self) -> &'static str {
        "Data de início <= data fim no 0000"
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "0000" {
            return vec![];
        }
        if record.fields.len() < 5 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro 0000 incompleto (menos de 5 campos)",
            )
            .with_suggestion("Verificar estrutura do registro")];
        }
        match (parse_date(record.field(3)), parse_date(record.field(4))) {
            (Some(start), Some(end)) if start > end => vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Data inicial maior que final",
            )],
            (Some(_), Some(_)) => vec![],
            _ => vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Datas inválidas no 0000",
            )],
        }
    }
}

// ---------------------------------------------------------------------------
// R032: CNPJ field holding a name
// ---------------------------------------------------------------------------

pub struct CnpjNameMisplacement;

impl Rule for CnpjNameMisplacement {
    fn id(&self) -> &'static str {
        "R032"
    }
    fn description(&self) -> &'static str {
        "Corrige CNPJ quando campo contém nome em vez de número"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "0000" || record.fields.len() < 7 {
            return vec![];
        }
        let cnpj = record.field(6);
        if looks_like_name(cnpj) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("CNPJ parece ser um nome: {cnpj}"),
            )
            .with_suggestion("Remover nome ou verificar CNPJ correto")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.fields.len() < 7 || !looks_like_name(record.field(6)) {
            return;
        }
        let digits = only_digits(record.field(6));
        record.fields[6] = match digits.len() {
            14 | 11 => digits,
            0 => String::new(),
            _ => pad_cnpj(&digits),
        };
    }
}

// ---------------------------------------------------------------------------
// R033: IE field holding a name
// ---------------------------------------------------------------------------

fn ie_index(reg: &str) -> Option<usize> {
    match reg {
        "0150" => Some(6),
        "0190" => Some(2),
        _ => None,
    }
}

pub struct IeNameMisplacement;

impl Rule for IeNameMisplacement {
    fn id(&self) -> &'static str {
        "R033"
    }
    fn description(&self) -> &'static str {
        "Corrige IE quando campo contém nome em vez de número"
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
        if looks_like_name(ie) {
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
        if record.has_field(idx) && looks_like_name(record.field(idx)) {
            record.fields[idx] = only_digits(record.field(idx));
        }
    }
}

// ---------------------------------------------------------------------------
// R034: empty CNPJ
// ---------------------------------------------------------------------------

pub struct EmptyCnpj;

impl Rule for EmptyCnpj {
    fn id(&self) -> &'static str {
        "R034"
    }
    fn description(&self) -> &'static str {
        "CNPJ vazio no registro 0000"
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "0000" || record.fields.len() < 7 {
            return vec![];
        }
        if record.field(6).trim().is_empty() {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "CNPJ vazio no registro 0000",
            )
            .with_suggestion("Preencher CNPJ corretamente")];
        }
        vec![]
    }
}

// ---------------------------------------------------------------------------
// R035: 0000 canonical width
// ---------------------------------------------------------------------------

/// Field count of a well-formed 0000 record, reg code included.
const HEADER_WIDTH: usize = 15;

pub struct HeaderWidth;

impl Rule for HeaderWidth {
    fn id(&self) -> &'static str {
        "R035"
    }
    fn description(&self) -> &'static str {
        "Corrige estrutura do registro 0000"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "0000" || record.fields.len() <= HEADER_WIDTH {
            return vec![];
        }
        vec![Issue::new(
            record.line_no,
            &record.reg,
            self.id(),
            Severity::Error,
            format!(
                "Registro 0000 com {} campos (deveria ter {HEADER_WIDTH})",
                record.fields.len()
            ),
        )
        .with_suggestion("Remover campos extras")]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        if let Some(record) = ctx.get_mut(line_no) {
            if record.reg == "0000" && record.fields.len() > HEADER_WIDTH {
                record.fields.truncate(HEADER_WIDTH);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// R036: mandatory fields of the 0000 record
// ---------------------------------------------------------------------------

const MANDATORY_HEADER_FIELDS: &[(usize, &str)] = &[
    (1, "COD_VER"),
    (2, "COD_FIN"),
    (3, "DT_INI"),
    (4, "DT_FIN"),
    (5, "NOME"),
    (8, "UF"),
    (9, "IE"),
    (10, "COD_MUN"),
    (13, "IND_PERFIL"),
    (14, "IND_ATIV"),
];

pub struct HeaderMandatoryFields;

impl Rule for HeaderMandatoryFields {
    fn id(&self) -> &'static str {
        "R036"
    }
    fn description(&self) -> &'static str {
        "Verifica campos obrigatórios do registro 0000"
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "0000" {
            return vec![];
        }
        let mut issues = Vec::new();
        if record.fields.len() < HEADER_WIDTH {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!(
                        "Registro 0000 incompleto ({} campos, deveria ter {HEADER_WIDTH})",
                        record.fields.len()
                    ),
                )
                .with_suggestion("Completar campos obrigatórios"),
            );
            return issues;
        }

        for &(idx, name) in MANDATORY_HEADER_FIELDS {
            if record.field(idx).trim().is_empty() {
                issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!("Campo obrigatório {name} vazio"),
                    )
                    .with_suggestion(format!("Preencher campo {name}")),
                );
            }
        }

        let cnpj = record.field(6);
        let cpf = record.field(7);
        if cnpj.is_empty() && cpf.is_empty() {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    "CNPJ e CPF vazios",
                )
                .with_suggestion("Informar CNPJ ou CPF"),
            );
        }
        if !cnpj.is_empty() && !cpf.is_empty() {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    "CNPJ e CPF preenchidos (deve ser apenas um)",
                )
                .with_suggestion("Informar apenas CNPJ ou CPF"),
            );
        }

        let ind_ativ = record.field(14);
        if !cpf.is_empty() && ind_ativ != "1" {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("IND_ATIV deve ser '1' quando CPF é informado (valor: {ind_ativ})"),
                )
                .with_suggestion("Alterar IND_ATIV para '1'"),
            );
        }

        let ind_perfil = record.field(13);
        if !matches!(ind_perfil, "A" | "B" | "C") {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("IND_PERFIL inválido: {ind_perfil} (deve ser A, B ou C)"),
                )
                .with_suggestion("Corrigir IND_PERFIL para valor válido"),
            );
        }

        let cod_fin = record.field(2);
        if !matches!(cod_fin, "0" | "1") {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("COD_FIN inválido: {cod_fin} (deve ser 0 ou 1)"),
                )
                .with_suggestion("Corrigir COD_FIN para valor válido"),
            );
        }

        issues
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
