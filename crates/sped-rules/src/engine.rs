//! The rule engine: iterate rules × records, collect issues, enrich them
//! with the impact trace, and apply auto-fixes.
//!
//! The loop nesting is a contract: a single outer loop over the rules (in
//! their declared order) and an inner loop over a snapshot of the current
//! record line numbers. Rules that remove records (duplicate and orphan
//! cleanups) therefore see the effects of earlier rules, and removals made
//! by the rule currently running are skipped by the snapshot lookup.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sped_core::{Context, Result, SpedError, SpedType};

use crate::impact::{impact_detail, trace_impact};
use crate::issue::Issue;
use crate::rule::RuleRegistry;

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag, checked at rule boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// RuleEngine
// ---------------------------------------------------------------------------

/// Runs a rule set over a context and collects the enriched issues.
pub struct RuleEngine {
    registry: RuleRegistry,
}

impl RuleEngine {
    pub fn new(registry: RuleRegistry) -> Self {
        Self { registry }
    }

    /// Engine preloaded with the rule set for `sped_type`.
    pub fn for_type(sped_type: SpedType) -> Self {
        Self::new(RuleRegistry::for_type(sped_type))
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Run every rule over every record, applying auto-fixes.
    pub fn run(&self, ctx: &mut Context) -> Vec<Issue> {
        self.run_inner(ctx, None)
            .expect("uncancellable run cannot fail")
    }

    /// Like [`RuleEngine::run`], but stops at the next rule boundary once
    /// `token` is cancelled. A cancelled run returns [`SpedError::Cancelled`];
    /// the caller discards the partially mutated context.
    pub fn run_cancellable(&self, ctx: &mut Context, token: &CancelToken) -> Result<Vec<Issue>> {
        self.run_inner(ctx, Some(token))
    }

    fn run_inner(&self, ctx: &mut Context, token: Option<&CancelToken>) -> Result<Vec<Issue>> {
        let mut issues: Vec<Issue> = Vec::new();
        let mut seen: HashSet<(usize, String)> = HashSet::new();

        for rule in self.registry.iter() {
            if let Some(token) = token {
                if token.is_cancelled() {
                    return Err(SpedError::Cancelled);
                }
            }

            let snapshot = ctx.line_numbers();
            let mut rule_hits = 0usize;

            for line_no in snapshot {
                // Removed by an earlier fix of this same rule.
                let Some(record) = ctx.get(line_no) else {
                    continue;
                };

                let mut found = rule.validate(record, ctx);
                if found.is_empty() {
                    continue;
                }

                let impacted = trace_impact(ctx, record);
                for issue in &mut found {
                    issue.impact_details =
                        impacted.iter().filter_map(impact_detail).collect();
                    issue.impacted_records = impacted.clone();
                }

                if rule.auto_fix() {
                    rule.fix(line_no, ctx);
                }

                for issue in found {
                    if seen.insert((issue.line_no, issue.rule_id.clone())) {
                        rule_hits += 1;
                        issues.push(issue);
                    }
                }
            }

            if rule_hits > 0 {
                tracing::debug!(rule = rule.id(), issues = rule_hits, "rule pass finished");
            }
        }

        Ok(issues)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
