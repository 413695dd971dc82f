//! The mutable record collection a validation request operates on.
//!
//! A [`Context`] exclusively owns its records for the lifetime of one
//! request; it is never shared between requests. Rules read records freely
//! and mutate through the narrow API here: [`Context::get_mut`] for field
//! repairs and [`Context::remove`] for duplicate/orphan cleanups.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::numeric::parse_date;
use crate::record::{Record, SpedType};

/// Reporting period declared by the `0000` header record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Owner of the in-flight record list plus per-file metadata.
#[derive(Debug, Clone)]
pub struct Context {
    records: Vec<Record>,
    pub sped_type: SpedType,
    pub period: Option<Period>,
}

impl Context {
    /// Build a context from parsed records, extracting the period from the
    /// `0000` header when present. The SPED type starts as `Unknown` and is
    /// settled by the identifier (or a caller hint) before rules run.
    pub fn new(records: Vec<Record>) -> Self {
        let period = records
            .iter()
            .find(|r| r.reg == "0000")
            .and_then(|r| {
                let start = parse_date(r.field(3))?;
                let end = parse_date(r.field(4))?;
                Some(Period { start, end })
            });
        Self {
            records,
            sped_type: SpedType::Unknown,
            period,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in file order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterate records of one type, in file order.
    pub fn of_reg<'a>(&'a self, reg: &'a str) -> impl Iterator<Item = &'a Record> {
        self.records.iter().filter(move |r| r.reg == reg)
    }

    /// Look up a record by its line number.
    pub fn get(&self, line_no: usize) -> Option<&Record> {
        self.records.iter().find(|r| r.line_no == line_no)
    }

    /// Mutable lookup by line number, used by repair actions.
    pub fn get_mut(&mut self, line_no: usize) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.line_no == line_no)
    }

    /// Line numbers of all records, in file order. Rules and the engine
    /// iterate over this snapshot so that removals during the pass are safe.
    pub fn line_numbers(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.line_no).collect()
    }

    /// Remove a record and, transitively, every record parented on it.
    ///
    /// Cascading keeps the parent invariant: no surviving record may point
    /// at a line number that is no longer in the context.
    pub fn remove(&mut self, line_no: usize) {
        let before = self.records.len();
        self.records.retain(|r| r.line_no != line_no);
        if self.records.len() == before {
            return;
        }
        let orphans: Vec<usize> = self
            .records
            .iter()
            .filter(|r| r.parent == Some(line_no))
            .map(|r| r.line_no)
            .collect();
        for orphan in orphans {
            self.remove(orphan);
        }
    }

    /// Take the records out of the context (end of a request).
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
