//! Rules over the inventory block (H001–H990): item registration, totals,
//! numeric ranges, block-level structure.

use chrono::Months;

use sped_core::numeric::{
    format_amount, is_digits, parse_date, parse_decimal, parse_decimal_or_zero, DecimalSeparator,
};
use sped_core::{Context, Record, Severity};

use crate::issue::Issue;
use crate::rule::Rule;

/// Sum of `VL_ITEM` over every H010 record.
fn h010_total(ctx: &Context) -> f64 {
    ctx.of_reg("H010")
        .map(|r| parse_decimal_or_zero(r.field(5)))
        .sum()
}

fn product_registered(ctx: &Context, cod_item: &str) -> bool {
    ctx.of_reg("0200").any(|r| r.field(1) == cod_item)
}

// ---------------------------------------------------------------------------
// R013: inventory complement item must exist in 0200
// ---------------------------------------------------------------------------

pub struct InventoryItemWithoutProduct;

impl Rule for InventoryItemWithoutProduct {
    fn id(&self) -> &'static str {
        "R013"
    }
    fn description(&self) -> &'static str {
        "Remove itens de inventário sem cadastro no 0200"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "H020" || !record.has_field(1) {
            return vec![];
        }
        let cod_item = record.field(1);
        if !product_registered(ctx, cod_item) {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("Item {cod_item} sem cadastro no 0200"),
            )
            .with_suggestion("Remover item ou criar cadastro")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get(line_no) else {
            return;
        };
        if record.reg != "H020" || !record.has_field(1) {
            return;
        }
        if !product_registered(ctx, record.field(1)) {
            ctx.remove(line_no);
        }
    }
}

// ---------------------------------------------------------------------------
// R014: H005 total must equal the sum of its H010 items
// ---------------------------------------------------------------------------

pub struct InventoryValueMismatch;

impl Rule for InventoryValueMismatch {
    fn id(&self) -> &'static str {
        "R014"
    }
    fn description(&self) -> &'static str {
        "Ajusta valor total do inventário (H005)"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "H005" || !record.has_field(1) {
            return vec![];
        }
        let total = parse_decimal_or_zero(record.field(1));
        let items_sum = h010_total(ctx);
        if (total - items_sum).abs() > 0.01 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("Valor do inventário ({total:.2}) difere da soma dos itens ({items_sum:.2})"),
            )
            .with_suggestion("Ajustar valor total")];
        }
        vec![]
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let items_sum = h010_total(ctx);
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "H005" || !record.has_field(1) {
            return;
        }
        if (parse_decimal_or_zero(record.field(1)) - items_sum).abs() > 0.01 {
            record.fields[1] = format_amount(items_sum, 2, DecimalSeparator::Dot);
        }
    }
}

// ---------------------------------------------------------------------------
// RH001: block H opener
// ---------------------------------------------------------------------------

pub struct InventoryOpening;

impl Rule for InventoryOpening {
    fn id(&self) -> &'static str {
        "RH001"
    }
    fn description(&self) -> &'static str {
        "Validação do registro H001 de abertura do Bloco H"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "H001" {
            return vec![];
        }
        if record.fields.len() < 2 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro H001 com quantidade de campos inferior ao esperado",
            )
            .with_suggestion("O registro H001 deve ter pelo menos 2 campos")];
        }

        let mut issues = Vec::new();
        let ind_mov = record.field(1);
        if !matches!(ind_mov, "0" | "1") {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("Valor inválido para IND_MOV: {ind_mov}"),
                )
                .with_suggestion(
                    "O campo IND_MOV deve ser '0' (bloco com dados) ou '1' (bloco sem dados)",
                ),
            );
        }

        // A February period must carry the year-end inventory of the
        // previous year (DT_INV = 31/12, MOT_INV = 01).
        if let Some(header) = ctx.of_reg("0000").next() {
            let dt_ini = header.field(3);
            let dt_fin = header.field(4);
            if is_digits(dt_ini)
                && is_digits(dt_fin)
                && dt_ini.len() == 8
                && dt_fin.len() == 8
                && &dt_ini[2..4] == "02"
                && &dt_fin[2..4] == "02"
            {
                if let Ok(year) = dt_ini[4..8].parse::<i32>() {
                    let expected = format!("3112{:04}", year - 1);
                    let has_year_end = ctx
                        .of_reg("H005")
                        .any(|r| r.field(2) == expected && r.field(4) == "01");
                    if !has_year_end {
                        issues.push(
                            Issue::new(
                                record.line_no,
                                &record.reg,
                                self.id(),
                                Severity::Warn,
                                "Período de fevereiro não contém registro H005 com data de \
                                 31/12 do ano anterior e MOT_INV=01",
                            )
                            .with_suggestion(
                                "Incluir registro H005 com DT_INV=3112AAAA (AAAA=ano anterior) \
                                 e MOT_INV=01",
                            ),
                        );
                    }
                }
            }
        }

        issues
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let has_other_h = ctx
            .records()
            .iter()
            .any(|r| r.reg.starts_with('H') && !matches!(r.reg.as_str(), "H001" | "H990"));
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "H001" || !record.has_field(1) {
            return;
        }
        if !matches!(record.field(1), "0" | "1") {
            record.fields[1] = if has_other_h { "0" } else { "1" }.to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// RH005: inventory totals record structure
// ---------------------------------------------------------------------------

pub struct InventoryStructure;

impl Rule for InventoryStructure {
    fn id(&self) -> &'static str {
        "RH005"
    }
    fn description(&self) -> &'static str {
        "Validação estrutural do registro H005"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "H005" {
            return vec![];
        }
        if record.fields.len() < 5 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro H005 com quantidade de campos inferior ao esperado",
            )
            .with_suggestion("O registro H005 deve ter pelo menos 5 campos")];
        }

        let mut issues = Vec::new();
        let dt_inv = record.field(2);
        match parse_date(dt_inv) {
            None => issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("Formato inválido para DT_INV: {dt_inv}"),
                )
                .with_suggestion("O campo DT_INV deve ser uma data no formato ddmmaaaa"),
            ),
            Some(inv_date) => {
                if let Some(period) = ctx.period {
                    if inv_date > period.end {
                        issues.push(Issue::new(
                            record.line_no,
                            &record.reg,
                            self.id(),
                            Severity::Error,
                            format!(
                                "Data do inventário ({dt_inv}) é maior que a data final do período"
                            ),
                        ));
                    }
                    // Year-end inventories must be reported within the two
                    // months that follow the inventory date.
                    if record.field(4) == "01" {
                        if let Some(limit) = inv_date.checked_add_months(Months::new(2)) {
                            if period.start > limit {
                                issues.push(
                                    Issue::new(
                                        record.line_no,
                                        &record.reg,
                                        self.id(),
                                        Severity::Error,
                                        "Inventário com MOT_INV=01 apresentado após o 2º mês \
                                         subsequente à data do inventário",
                                    )
                                    .with_suggestion(
                                        "Apresentar o inventário até o 2º mês subsequente",
                                    ),
                                );
                            }
                        }
                    }
                }
            }
        }

        let mot_inv = record.field(4);
        if !matches!(mot_inv, "01" | "02" | "03" | "04" | "05" | "06") {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("Valor inválido para MOT_INV: {mot_inv}"),
                )
                .with_suggestion("O campo MOT_INV deve ser '01' a '06'"),
            );
        } else if mot_inv == "06" && ctx.of_reg("H030").next().is_none() {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    "Registro H005 com MOT_INV=06 não possui registro H030 associado",
                )
                .with_suggestion(
                    "Incluir registro H030 com as informações de substituição tributária",
                ),
            );
        }

        issues
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "H005" || record.fields.len() < 5 {
            return;
        }
        let mot_inv = record.field(4);
        if !matches!(mot_inv, "01" | "02" | "03" | "04" | "05" | "06") {
            record.fields[4] = "01".to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// RH010: inventory items
// ---------------------------------------------------------------------------

pub struct InventoryItem;

impl InventoryItem {
    /// Validate one numeric field: parse failure or negative value.
    fn check_amount(
        &self,
        record: &Record,
        idx: usize,
        name: &str,
        decimals: usize,
        issues: &mut Vec<Issue>,
    ) {
        let value = record.field(idx);
        match parse_decimal(value) {
            None => issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("Formato inválido para {name}: {value}"),
                )
                .with_suggestion(format!(
                    "O campo {name} deve ser um valor numérico com {decimals} casas decimais"
                )),
            ),
            Some(v) if v < 0.0 => issues.push(Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("{name} negativo: {value}"),
            )),
            Some(_) => {}
        }
    }

    /// Repair one numeric field in place: absolute value for negatives,
    /// zero for unparseable text.
    fn fix_amount(record: &mut Record, idx: usize, decimals: usize) {
        if !record.has_field(idx) {
            return;
        }
        match parse_decimal(record.field(idx)) {
            None => {
                record.fields[idx] = format_amount(0.0, decimals, DecimalSeparator::Comma);
            }
            Some(v) if v < 0.0 => {
                record.fields[idx] = format_amount(v.abs(), decimals, DecimalSeparator::Comma);
            }
            Some(_) => {}
        }
    }
}

impl Rule for InventoryItem {
    fn id(&self) -> &'static str {
        "RH010"
    }
    fn description(&self) -> &'static str {
        "Validação do registro H010 de inventário"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "H010" {
            return vec![];
        }
        if record.fields.len() < 7 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro H010 com quantidade de campos inferior ao esperado",
            )
            .with_suggestion("O registro H010 deve ter pelo menos 7 campos")];
        }

        let mut issues = Vec::new();
        let cod_item = record.field(1);
        if cod_item.is_empty() {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    "Campo COD_ITEM não informado",
                )
                .with_suggestion("O campo COD_ITEM é obrigatório"),
            );
        } else if !product_registered(ctx, cod_item) {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("Código do item {cod_item} não encontrado no registro 0200"),
                )
                .with_suggestion("Verificar se o item está cadastrado no registro 0200"),
            );
        }

        let unid = record.field(2);
        if unid.is_empty() {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    "Campo UNID não informado",
                )
                .with_suggestion("O campo UNID é obrigatório"),
            );
        } else if !cod_item.is_empty() {
            let unit_matches = ctx
                .of_reg("0200")
                .any(|r| r.field(1) == cod_item && r.field(3) == unid);
            if !unit_matches {
                issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!(
                            "Unidade {unid} não encontrada para o item {cod_item} no registro 0200"
                        ),
                    )
                    .with_suggestion("Verificar a unidade cadastrada no registro 0200"),
                );
            }
        }

        self.check_amount(record, 3, "QTD", 3, &mut issues);
        self.check_amount(record, 4, "VL_UNIT", 6, &mut issues);
        self.check_amount(record, 5, "VL_ITEM", 2, &mut issues);

        let ind_prop = record.field(6);
        if !matches!(ind_prop, "0" | "1" | "2") {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("Valor inválido para IND_PROP: {ind_prop}"),
                )
                .with_suggestion("O campo IND_PROP deve ser '0', '1' ou '2'"),
            );
        } else if matches!(ind_prop, "1" | "2") {
            let cod_part = record.field(7);
            if cod_part.is_empty() {
                issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        "Campo COD_PART não informado para IND_PROP=1 ou 2",
                    )
                    .with_suggestion("O campo COD_PART é obrigatório quando IND_PROP é '1' ou '2'"),
                );
            } else if !ctx.of_reg("0150").any(|r| r.field(2) == cod_part) {
                issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!("Código do participante {cod_part} não encontrado no registro 0150"),
                    )
                    .with_suggestion("Verificar o participante no registro 0150"),
                );
            }
        }

        issues
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "H010" || record.fields.len() < 7 {
            return;
        }
        Self::fix_amount(record, 3, 3);
        Self::fix_amount(record, 4, 6);
        Self::fix_amount(record, 5, 2);
        if !matches!(record.field(6), "0" | "1" | "2") {
            record.fields[6] = "0".to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// RH020 / RH030: complementary inventory information
// ---------------------------------------------------------------------------

pub struct InventoryIcmsInfo;

impl Rule for InventoryIcmsInfo {
    fn id(&self) -> &'static str {
        "RH020"
    }
    fn description(&self) -> &'static str {
        "Validação do registro H020 de informação complementar do inventário"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "H020" {
            return vec![];
        }
        if record.fields.len() < 5 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro H020 com quantidade de campos inferior ao esperado",
            )
            .with_suggestion("O registro H020 deve ter pelo menos 5 campos")];
        }

        let mut issues = Vec::new();
        let cst = record.field(1);
        if !(is_digits(cst) && cst.len() == 3) {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("Formato inválido para CST_ICMS: {cst}"),
                )
                .with_suggestion("O campo CST_ICMS deve ser um código numérico de 3 dígitos"),
            );
        }
        for (idx, name) in [(2, "BC_ICMS"), (3, "VL_ICMS")] {
            let value = record.field(idx);
            match parse_decimal(value) {
                None => issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!("Formato inválido para {name}: {value}"),
                    )
                    .with_suggestion(format!(
                        "O campo {name} deve ser um valor numérico com 2 casas decimais"
                    )),
                ),
                Some(v) if v < 0.0 => issues.push(Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("{name} negativo: {value}"),
                )),
                Some(_) => {}
            }
        }
        issues
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "H020" || record.fields.len() < 5 {
            return;
        }
        for idx in [2, 3] {
            match parse_decimal(record.field(idx)) {
                None => record.fields[idx] = format_amount(0.0, 2, DecimalSeparator::Comma),
                Some(v) if v < 0.0 => {
                    record.fields[idx] = format_amount(v.abs(), 2, DecimalSeparator::Comma)
                }
                Some(_) => {}
            }
        }
    }
}

pub struct InventoryStInfo;

const H030_AMOUNT_FIELDS: &[(usize, &str)] = &[
    (1, "VL_ICMS_OP"),
    (2, "VL_BC_ICMS_ST"),
    (3, "VL_ICMS_ST"),
    (4, "VL_FCP"),
];

impl Rule for InventoryStInfo {
    fn id(&self) -> &'static str {
        "RH030"
    }
    fn description(&self) -> &'static str {
        "Validação do registro H030 de substituição tributária"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, _ctx: &Context) -> Vec<Issue> {
        if record.reg != "H030" {
            return vec![];
        }
        if record.fields.len() < 6 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro H030 com quantidade de campos inferior ao esperado",
            )
            .with_suggestion("O registro H030 deve ter pelo menos 6 campos")];
        }

        let mut issues = Vec::new();
        for &(idx, name) in H030_AMOUNT_FIELDS {
            let value = record.field(idx);
            match parse_decimal(value) {
                None => issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!("Formato inválido para {name}: {value}"),
                    )
                    .with_suggestion(format!(
                        "O campo {name} deve ser um valor numérico com 6 casas decimais"
                    )),
                ),
                Some(v) if v < 0.0 => issues.push(Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    format!("{name} negativo: {value}"),
                )),
                Some(_) => {}
            }
        }
        issues
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "H030" || record.fields.len() < 6 {
            return;
        }
        for &(idx, _) in H030_AMOUNT_FIELDS {
            match parse_decimal(record.field(idx)) {
                None => record.fields[idx] = format_amount(0.0, 6, DecimalSeparator::Comma),
                Some(v) if v < 0.0 => {
                    record.fields[idx] = format_amount(v.abs(), 6, DecimalSeparator::Comma)
                }
                Some(_) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RH990: block H closer
// ---------------------------------------------------------------------------

fn count_h_records(ctx: &Context) -> usize {
    ctx.records().iter().filter(|r| r.reg.starts_with('H')).count()
}

pub struct InventoryClosing;

impl Rule for InventoryClosing {
    fn id(&self) -> &'static str {
        "RH990"
    }
    fn description(&self) -> &'static str {
        "Validação do registro H990 de encerramento do Bloco H"
    }
    fn auto_fix(&self) -> bool {
        true
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if record.reg != "H990" {
            return vec![];
        }
        if record.fields.len() < 2 {
            return vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                "Registro H990 com quantidade de campos inferior ao esperado",
            )
            .with_suggestion("O registro H990 deve ter pelo menos 2 campos")];
        }
        let declared = record.field(1);
        match declared.parse::<usize>() {
            Err(_) => vec![Issue::new(
                record.line_no,
                &record.reg,
                self.id(),
                Severity::Error,
                format!("Formato inválido para QTD_LIN_H: {declared}"),
            )
            .with_suggestion("O campo QTD_LIN_H deve ser um número inteiro")],
            Ok(n) => {
                let actual = count_h_records(ctx);
                if n != actual {
                    vec![Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        format!(
                            "Quantidade de linhas do Bloco H ({n}) não corresponde ao total \
                             de registros ({actual})"
                        ),
                    )
                    .with_suggestion(
                        "O campo QTD_LIN_H deve refletir a quantidade de registros do Bloco H",
                    )]
                } else {
                    vec![]
                }
            }
        }
    }
    fn fix(&self, line_no: usize, ctx: &mut Context) {
        let actual = count_h_records(ctx);
        let Some(record) = ctx.get_mut(line_no) else {
            return;
        };
        if record.reg != "H990" || !record.has_field(1) {
            return;
        }
        if record.field(1).parse::<usize>() != Ok(actual) {
            record.fields[1] = actual.to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// RHBLOCK: block-level invariants
// ---------------------------------------------------------------------------

pub struct InventoryBlock;

impl Rule for InventoryBlock {
    fn id(&self) -> &'static str {
        "RHBLOCK"
    }
    fn description(&self) -> &'static str {
        "Validação do Bloco H como um todo"
    }
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue> {
        if !record.reg.starts_with('H') {
            return vec![];
        }
        // Block-level checks run once, anchored on the first H record.
        let first_h = ctx
            .records()
            .iter()
            .find(|r| r.reg.starts_with('H'))
            .map(|r| r.line_no);
        if first_h != Some(record.line_no) {
            return vec![];
        }

        let mut issues = Vec::new();
        let opener = ctx.of_reg("H001").next();
        if opener.is_none() {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    "Bloco H não possui registro H001",
                )
                .with_suggestion("Incluir registro H001 de abertura do Bloco H"),
            );
            return issues;
        }
        if ctx.of_reg("H990").next().is_none() {
            issues.push(
                Issue::new(
                    record.line_no,
                    &record.reg,
                    self.id(),
                    Severity::Error,
                    "Bloco H não possui registro H990",
                )
                .with_suggestion("Incluir registro H990 de encerramento do Bloco H"),
            );
            return issues;
        }

        let total_h = count_h_records(ctx);
        match opener.map(|r| r.field(1).to_string()).as_deref() {
            Some("1") => {
                if total_h > 2 {
                    issues.push(
                        Issue::new(
                            record.line_no,
                            &record.reg,
                            self.id(),
                            Severity::Error,
                            "Bloco H com IND_MOV=1 possui registros além de H001 e H990",
                        )
                        .with_suggestion("Remover registros do Bloco H ou alterar IND_MOV para 0"),
                    );
                }
            }
            Some("0") => {
                if total_h <= 2 {
                    issues.push(
                        Issue::new(
                            record.line_no,
                            &record.reg,
                            self.id(),
                            Severity::Error,
                            "Bloco H com IND_MOV=0 não possui registros além de H001 e H990",
                        )
                        .with_suggestion("Incluir registros do Bloco H ou alterar IND_MOV para 1"),
                    );
                }
                if ctx.of_reg("H005").next().is_none() {
                    issues.push(
                        Issue::new(
                            record.line_no,
                            &record.reg,
                            self.id(),
                            Severity::Error,
                            "Bloco H com IND_MOV=0 não possui registro H005",
                        )
                        .with_suggestion("Incluir registro H005 com as informações do inventário"),
                    );
                }
            }
            _ => {}
        }

        // A declared inventory value demands item detail.
        let has_h010 = ctx.of_reg("H010").next().is_some();
        for h005 in ctx.of_reg("H005") {
            if parse_decimal_or_zero(h005.field(1)) > 0.0 && !has_h010 {
                issues.push(
                    Issue::new(
                        record.line_no,
                        &record.reg,
                        self.id(),
                        Severity::Error,
                        "Registro H005 com VL_INV > 0 não possui registros H010 associados",
                    )
                    .with_suggestion("Incluir registros H010 com o detalhamento dos itens"),
                );
                break;
            }
        }

        issues
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

    #[test]
    fn r013_removes_item_without_product() {
        let mut c = ctx("|0200|A10|PARAFUSO|UN|123|\n|H020|B99|000|10,00|1,00|\n");
        let issues = InventoryItemWithoutProduct.validate(&c.records()[1], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("B99"));
        InventoryItemWithoutProduct.fix(2, &mut c);
        assert!(c.get(2).is_none());
    }

    #[test]
    fn r013_keeps_registered_item() {
        let mut c = ctx("|0200|A10|PARAFUSO|UN|123|\n|H020|A10|000|10,00|1,00|\n");
        assert!(InventoryItemWithoutProduct.validate(&c.records()[1], &c).is_empty());
        InventoryItemWithoutProduct.fix(2, &mut c);
        assert!(c.get(2).is_some());
    }

    #[test]
    fn r014_flags_and_fixes_total_mismatch() {
        let mut c = ctx("\
|H005|500.00|31122023|0|01|
|H010|A10|UN|1,000|100,00|100.00|0|
|H010|B20|UN|1,000|150,00|150.00|0|
");
        let issues = InventoryValueMismatch.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line_no, 1);

        InventoryValueMismatch.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(1), "250.00");
        assert!(InventoryValueMismatch.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn r014_within_tolerance_passes() {
        let c = ctx("|H005|250.00|31122023|0|01|\n|H010|A10|UN|1,000|250,00|250,005|0|\n");
        assert!(InventoryValueMismatch.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn rh001_flags_invalid_ind_mov_and_fix_uses_block_content() {
        let mut c = ctx("|H001|9|\n|H005|100,00|31122023|0|01|\n|H990|3|\n");
        let issues = InventoryOpening.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("IND_MOV"));

        InventoryOpening.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(1), "0");
    }

    #[test]
    fn rh001_fix_declares_empty_block_when_alone() {
        let mut c = ctx("|H001|9|\n|H990|2|\n");
        InventoryOpening.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(1), "1");
    }

    #[test]
    fn rh001_february_requires_year_end_inventory() {
        let c = ctx("\
|0000|017|0|01022024|29022024|ACME|
|H001|0|
|H005|100,00|15012024|0|01|
");
        let issues = InventoryOpening.validate(&c.records()[1], &c);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warn);
        assert!(issues[0].message.contains("fevereiro"));
    }

    #[test]
    fn rh001_february_satisfied_by_year_end_inventory() {
        let c = ctx("\
|0000|017|0|01022024|29022024|ACME|
|H001|0|
|H005|100,00|31122023|0|01|
");
        assert!(InventoryOpening.validate(&c.records()[1], &c).is_empty());
    }

    #[test]
    fn rh005_flags_bad_date_and_motive() {
        let c = ctx("|0000|017|0|01012024|31012024|A|\n|H005|100,00|99999999|0|07|\n");
        let issues = InventoryStructure.validate(&c.records()[1], &c);
        assert!(issues.iter().any(|i| i.message.contains("DT_INV")));
        assert!(issues.iter().any(|i| i.message.contains("MOT_INV")));
    }

    #[test]
    fn rh005_fix_resets_invalid_motive_only() {
        let mut c = ctx("|H005|100,00|31122023|0|07|\n");
        InventoryStructure.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(4), "01");

        let mut c = ctx("|H005|100,00|31122023|0|03|\n");
        InventoryStructure.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(4), "03");
    }

    #[test]
    fn rh005_inventory_after_period_end_is_flagged() {
        let c = ctx("|0000|017|0|01012024|31012024|A|\n|H005|100,00|15022024|0|02|\n");
        let issues = InventoryStructure.validate(&c.records()[1], &c);
        assert!(issues.iter().any(|i| i.message.contains("maior que a data final")));
    }

    #[test]
    fn rh005_motive_06_requires_h030() {
        let c = ctx("|H005|100,00|31122023|0|06|\n");
        let issues = InventoryStructure.validate(&c.records()[0], &c);
        assert!(issues.iter().any(|i| i.message.contains("H030")));

        let c = ctx("|H005|100,00|31122023|0|06|\n|H030|1,00|1,00|1,00|0,00|x|\n");
        assert!(InventoryStructure.validate(&c.records()[0], &c).is_empty());
    }

    #[test]
    fn rh005_late_year_end_inventory_is_flagged() {
        let c = ctx("|0000|017|0|01042024|30042024|A|\n|H005|100,00|31122023|0|01|\n");
        let issues = InventoryStructure.validate(&c.records()[1], &c);
        assert!(issues.iter().any(|i| i.message.contains("2º mês")));
    }

    #[test]
    fn rh010_validates_item_against_registrations() {
        let c = ctx("\
|0150|111|FORN|PART1|
|0200|A10|PARAFUSO|UN|123|
|H010|A10|UN|1,000|2,500000|2,50|0||
");
        assert!(InventoryItem.validate(&c.records()[2], &c).is_empty());

        let c = ctx("\
|0200|A10|PARAFUSO|UN|123|
|H010|B99|KG|1,000|2,500000|2,50|0||
");
        let issues = InventoryItem.validate(&c.records()[1], &c);
        assert!(issues.iter().any(|i| i.message.contains("não encontrado no registro 0200")));
    }

    #[test]
    fn rh010_unit_must_match_registration() {
        let c = ctx("\
|0200|A10|PARAFUSO|UN|123|
|H010|A10|KG|1,000|2,500000|2,50|0||
");
        let issues = InventoryItem.validate(&c.records()[1], &c);
        assert!(issues.iter().any(|i| i.message.contains("Unidade KG")));
    }

    #[test]
    fn rh010_flags_negative_amounts_and_fix_takes_absolute() {
        let mut c = ctx("\
|0200|A10|PARAFUSO|UN|123|
|H010|A10|UN|-1,000|2,500000|-2,50|0||
");
        let issues = InventoryItem.validate(&c.records()[1], &c);
        assert!(issues.iter().any(|i| i.message.contains("QTD negativo")));
        assert!(issues.iter().any(|i| i.message.contains("VL_ITEM negativo")));

        InventoryItem.fix(2, &mut c);
        let fixed = c.get(2).unwrap();
        assert_eq!(fixed.field(3), "1,000");
        assert_eq!(fixed.field(5), "2,50");
        // Untouched valid field keeps its original text.
        assert_eq!(fixed.field(4), "2,500000");
    }

    #[test]
    fn rh010_ownership_requires_participant() {
        let c = ctx("\
|0200|A10|PARAFUSO|UN|123|
|H010|A10|UN|1,000|2,500000|2,50|1||
");
        let issues = InventoryItem.validate(&c.records()[1], &c);
        assert!(issues.iter().any(|i| i.message.contains("COD_PART não informado")));

        let c = ctx("\
|0150|111|FORN|PART1|
|0200|A10|PARAFUSO|UN|123|
|H010|A10|UN|1,000|2,500000|2,50|1|PART1|
");
        assert!(InventoryItem.validate(&c.records()[2], &c).is_empty());
    }

    #[test]
    fn rh020_validates_cst_and_amounts() {
        let mut c = ctx("|H020|00|100,00|-18,00|\n");
        // Too short (needs 5 fields).
        let issues = InventoryIcmsInfo.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);

        c = ctx("|H020|0|100,00|-18,00|x|\n");
        let issues = InventoryIcmsInfo.validate(&c.records()[0], &c);
        assert!(issues.iter().any(|i| i.message.contains("CST_ICMS")));
        assert!(issues.iter().any(|i| i.message.contains("VL_ICMS negativo")));

        InventoryIcmsInfo.fix(1, &mut c);
        assert_eq!(c.get(1).unwrap().field(3), "18,00");
    }

    #[test]
    fn rh030_fixes_negative_and_unparseable_amounts() {
        let mut c = ctx("|H030|-1,50|abc|2,00|0,00|x|\n");
        let issues = InventoryStInfo.validate(&c.records()[0], &c);
        assert!(issues.iter().any(|i| i.message.contains("VL_ICMS_OP negativo")));
        assert!(issues.iter().any(|i| i.message.contains("VL_BC_ICMS_ST")));

        InventoryStInfo.fix(1, &mut c);
        let fixed = c.get(1).unwrap();
        assert_eq!(fixed.field(1), "1,500000");
        assert_eq!(fixed.field(2), "0,000000");
        assert_eq!(fixed.field(3), "2,00");
    }

    #[test]
    fn rh990_flags_and_fixes_wrong_count() {
        let mut c = ctx("|H001|0|\n|H005|100,00|31122023|0|01|\n|H990|9|\n");
        let issues = InventoryClosing.validate(&c.records()[2], &c);
        assert_eq!(issues.len(), 1);
        InventoryClosing.fix(3, &mut c);
        assert_eq!(c.get(3).unwrap().field(1), "3");
        assert!(InventoryClosing.validate(&c.records()[2], &c).is_empty());
    }

    #[test]
    fn rh990_accepts_correct_count() {
        let c = ctx("|H001|0|\n|H990|2|\n");
        assert!(InventoryClosing.validate(&c.records()[1], &c).is_empty());
    }

    #[test]
    fn rhblock_missing_opener_or_closer() {
        let c = ctx("|H005|100,00|31122023|0|01|\n");
        let issues = InventoryBlock.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("H001"));

        let c = ctx("|H001|0|\n|H005|100,00|31122023|0|01|\n");
        let issues = InventoryBlock.validate(&c.records()[0], &c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("H990"));
    }

    #[test]
    fn rhblock_empty_marker_with_content_is_flagged() {
        let c = ctx("|H001|1|\n|H005|0,00|31122023|0|01|\n|H990|3|\n");
        let issues = InventoryBlock.validate(&c.records()[0], &c);
        assert!(issues.iter().any(|i| i.message.contains("IND_MOV=1")));
    }

    #[test]
    fn rhblock_movement_marker_demands_content() {
        let c = ctx("|H001|0|\n|H990|2|\n");
        let issues = InventoryBlock.validate(&c.records()[0], &c);
        assert!(issues.iter().any(|i| i.message.contains("não possui registros além")));
        assert!(issues.iter().any(|i| i.message.contains("não possui registro H005")));
    }

    #[test]
    fn rhblock_declared_value_requires_items() {
        let c = ctx("|H001|0|\n|H005|100,00|31122023|0|01|\n|H990|3|\n");
        let issues = InventoryBlock.validate(&c.records()[0], &c);
        assert!(issues.iter().any(|i| i.message.contains("VL_INV > 0")));
    }

    #[test]
    fn rhblock_only_fires_on_first_h_record() {
        let c = ctx("|H001|0|\n|H005|100,00|31122023|0|01|\n|H990|3|\n");
        assert!(!InventoryBlock.validate(&c.records()[0], &c).is_empty());
        assert!(InventoryBlock.validate(&c.records()[1], &c).is_empty());
        assert!(InventoryBlock.validate(&c.records()[2], &c).is_empty());
    }
}
