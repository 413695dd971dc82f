//! The rule abstraction and the per-SPED-type rule sets.

use sped_core::{Context, Record, Severity, SpedType};

use crate::issue::Issue;
use crate::rules;

/// One validation rule.
///
/// `validate` is pure inspection over a record in the context of the whole
/// file; `fix` repairs in place through the context and is only invoked by
/// the engine when `auto_fix` is true and `validate` reported at least one
/// issue. A fix must be a no-op when applied to a record it would not flag.
///
/// Rules are total: every field access is guarded, so a truncated record
/// degrades to zero issues (or an "incomplete record" issue) rather than a
/// panic.
pub trait Rule: Send + Sync {
    /// Stable identifier: `"R003"`, `"RC170"`, …
    fn id(&self) -> &'static str;

    /// Human-readable short description.
    fn description(&self) -> &'static str;

    /// Default severity for issues of this rule.
    fn severity(&self) -> Severity {
        Severity::Error
    }

    /// Whether the engine may invoke [`Rule::fix`] after a failed validate.
    fn auto_fix(&self) -> bool {
        false
    }

    /// Inspect one record; return zero or more issues.
    fn validate(&self, record: &Record, ctx: &Context) -> Vec<Issue>;

    /// Repair the record identified by `line_no` in place. Repairs may also
    /// remove records (duplicates, orphans) via [`Context::remove`].
    fn fix(&self, _line_no: usize, _ctx: &mut Context) {}
}

/// Registry holding the rules selected for one SPED type, in their fixed
/// execution order.
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Rules that apply to every SPED flavour.
    fn register_common(&mut self) {
        self.register(Box::new(rules::header::FirstLineHeader));
        self.register(Box::new(rules::header::LayoutVersion));
        self.register(Box::new(rules::registration::DuplicateParticipant));
        self.register(Box::new(rules::registration::OrphanedParticipant));
        self.register(Box::new(rules::registration::StateRegistrationDigits));
        self.register(Box::new(rules::cross::FieldWhitespace));
        self.register(Box::new(rules::cross::NumericFieldFormat));
        self.register(Box::new(rules::cross::EmptyBlockOpener));
        self.register(Box::new(rules::header::CnpjNameMisplacement));
        self.register(Box::new(rules::header::IeNameMisplacement));
        self.register(Box::new(rules::header::EmptyCnpj));
        self.register(Box::new(rules::header::HeaderWidth));
        self.register(Box::new(rules::header::HeaderMandatoryFields));
        self.register(Box::new(rules::documents::CfopDigitsOnly));
    }

    /// Rules specific to SPED Fiscal (ICMS/IPI).
    fn register_fiscal(&mut self) {
        self.register(Box::new(rules::header::CnpjNormalization));
        self.register(Box::new(rules::header::PeriodOrdering));
        self.register(Box::new(rules::inventory::InventoryItemWithoutProduct));
        self.register(Box::new(rules::inventory::InventoryValueMismatch));
        self.register(Box::new(rules::documents::DuplicateDocument));
        self.register(Box::new(rules::documents::CfopDirection));
        self.register(Box::new(rules::documents::DuplicateDocumentItem));
        self.register(Box::new(rules::documents::DuplicateCfeItem));
        self.register(Box::new(rules::appraisal::SimplesNacionalCredit));
        self.register(Box::new(rules::appraisal::DebitTotalMismatch));
        self.register(Box::new(rules::appraisal::IcmsAppraisalConsistency));
        self.register(Box::new(rules::appraisal::DocumentItemsConsistency));
        self.register(Box::new(rules::inventory::InventoryOpening));
        self.register(Box::new(rules::inventory::InventoryStructure));
        self.register(Box::new(rules::inventory::InventoryItem));
        self.register(Box::new(rules::inventory::InventoryIcmsInfo));
        self.register(Box::new(rules::inventory::InventoryStInfo));
        self.register(Box::new(rules::inventory::InventoryClosing));
        self.register(Box::new(rules::inventory::InventoryBlock));
        self.register(Box::new(rules::cross::FiscalPisCofinsValues));
    }

    /// Rules specific to SPED Contribuições (PIS/COFINS).
    fn register_contrib(&mut self) {
        self.register(Box::new(rules::contributions::PisCstValidity));
        self.register(Box::new(rules::contributions::CofinsCstValidity));
        self.register(Box::new(rules::contributions::PisCreditMismatch));
        self.register(Box::new(rules::contributions::CofinsCreditMismatch));
        self.register(Box::new(rules::contributions::PisAliquotRange));
        self.register(Box::new(rules::contributions::CofinsAliquotRange));
    }

    /// Build the rule set for one SPED flavour: common rules always run,
    /// fiscal/contrib sets are added per type, `Both` gets everything.
    pub fn for_type(sped_type: SpedType) -> Self {
        let mut registry = Self::new();
        registry.register_common();
        if sped_type.is_fiscal() {
            registry.register_fiscal();
        }
        if sped_type.is_contrib() {
            registry.register_contrib();
        }
        registry
    }

    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Get a rule by id.
    pub fn get(&self, id: &str) -> Option<&dyn Rule> {
        self.rules.iter().find(|r| r.id() == id).map(|b| &**b)
    }

    /// Iterate the rules in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|b| &**b)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
