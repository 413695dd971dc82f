//! The entry points the embedding layer (HTTP, CLI, desktop) calls into:
//! single-file validation-and-repair and cross-file comparison.
//!
//! Both operate on UTF-8 text; the `_bytes` variants reject anything else
//! up front, before parsing begins. Encoding *detection* is the caller's
//! responsibility.

pub mod report;

use std::time::Instant;

use uuid::Uuid;

use sped_core::{identify_sped_type, parse, reassemble, Context, Result, Severity, SpedError, SpedType};
use sped_compare::{ComparisonReport, KeyComparator};
use sped_rules::{CancelToken, RuleEngine};

pub use report::{ValidationReport, ValidationSummary};
pub use sped_rules::CancelToken as ValidationCancelToken;

/// Validate and repair one SPED file.
///
/// `hint` overrides the type identifier; pass `None` to classify the file
/// from its own content.
pub fn validate(input: &str, hint: Option<SpedType>) -> ValidationReport {
    run_validation(input, hint, None).expect("uncancellable validation cannot fail")
}

/// Like [`validate`], but cooperatively cancellable at rule boundaries.
/// A cancelled run returns [`SpedError::Cancelled`] and no partially
/// repaired content.
pub fn validate_cancellable(
    input: &str,
    hint: Option<SpedType>,
    token: &CancelToken,
) -> Result<ValidationReport> {
    run_validation(input, hint, Some(token))
}

/// Byte-level entry point: rejects non-UTF-8 input before parsing.
pub fn validate_bytes(input: &[u8], hint: Option<SpedType>) -> Result<ValidationReport> {
    let text = std::str::from_utf8(input)
        .map_err(|e| SpedError::InvalidInput(format!("input is not valid UTF-8: {e}")))?;
    Ok(validate(text, hint))
}

fn run_validation(
    input: &str,
    hint: Option<SpedType>,
    token: Option<&CancelToken>,
) -> Result<ValidationReport> {
    let start = Instant::now();

    let records = parse(input);
    let total_records = records.len();
    let mut ctx = Context::new(records);
    ctx.sped_type = hint.unwrap_or_else(|| identify_sped_type(&ctx));
    tracing::debug!(sped_type = %ctx.sped_type, total_records, "validation started");

    let engine = RuleEngine::for_type(ctx.sped_type);
    let issues = match token {
        Some(token) => engine.run_cancellable(&mut ctx, token)?,
        None => engine.run(&mut ctx),
    };

    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let warnings = issues.len() - errors;
    let summary = ValidationSummary {
        total_records,
        retained_records: ctx.len(),
        errors,
        warnings,
    };
    let corrected = reassemble(ctx.records());

    Ok(ValidationReport {
        run_id: Uuid::new_v4(),
        sped_type: ctx.sped_type,
        elapsed_ms: start.elapsed().as_millis() as u64,
        summary,
        issues,
        corrected,
    })
}

/// Structurally compare a reference file against an audit file.
pub fn compare(reference: &str, audit: &str) -> ComparisonReport {
    let start = Instant::now();
    let ref_records = parse(reference);
    let aud_records = parse(audit);
    let (summary, differences) = KeyComparator::new().compare(&ref_records, &aud_records);
    ComparisonReport {
        run_id: Uuid::new_v4(),
        elapsed_ms: start.elapsed().as_millis() as u64,
        summary,
        differences,
    }
}

/// Byte-level entry point: rejects non-UTF-8 input before parsing.
pub fn compare_bytes(reference: &[u8], audit: &[u8]) -> Result<ComparisonReport> {
    let reference = std::str::from_utf8(reference)
        .map_err(|e| SpedError::InvalidInput(format!("reference file is not valid UTF-8: {e}")))?;
    let audit = std::str::from_utf8(audit)
        .map_err(|e| SpedError::InvalidInput(format!("audit file is not valid UTF-8: {e}")))?;
    Ok(compare(reference, audit))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
