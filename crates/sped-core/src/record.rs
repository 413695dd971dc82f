use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SpedType
// ---------------------------------------------------------------------------

/// Flavour of a SPED ledger file, decided by [`crate::identify_sped_type`].
///
/// Gates rule selection: fiscal rules only run on `Fiscal`/`Both` files,
/// contribution rules only on `Contrib`/`Both`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpedType {
    Fiscal,
    Contrib,
    Both,
    Unknown,
}

impl SpedType {
    /// Return the canonical snake_case string representation of this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpedType::Fiscal => "fiscal",
            SpedType::Contrib => "contrib",
            SpedType::Both => "both",
            SpedType::Unknown => "unknown",
        }
    }

    /// True for files that carry the ICMS/IPI (fiscal) side.
    pub fn is_fiscal(&self) -> bool {
        matches!(self, SpedType::Fiscal | SpedType::Both)
    }

    /// True for files that carry the PIS/COFINS (contributions) side.
    pub fn is_contrib(&self) -> bool {
        matches!(self, SpedType::Contrib | SpedType::Both)
    }
}

impl std::fmt::Display for SpedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SpedType {
    fn from(s: &str) -> Self {
        match s {
            "fiscal" => SpedType::Fiscal,
            "contrib" => SpedType::Contrib,
            "both" => SpedType::Both,
            _ => SpedType::Unknown, // graceful fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a validation issue or comparison difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warn,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warn => "warn",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One line of a SPED file.
///
/// `fields[0]` always holds the record-type code (`reg`); data fields start
/// at index 1. `line_no` is the 1-based position in the *source* text and is
/// never renumbered, even after other records are removed: it is the
/// record's identity for the lifetime of a processing request.
///
/// `parent` mirrors the hierarchical relationship implicit in the file
/// order (C170 → C100, C850 → C800) as the parent's `line_no`. It is
/// assigned once during parsing and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub line_no: usize,
    pub reg: String,
    pub fields: Vec<String>,
    pub parent: Option<usize>,
}

impl Record {
    pub fn new(line_no: usize, reg: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            line_no,
            reg: reg.into(),
            fields,
            parent: None,
        }
    }

    /// Build a record from string slices; `fields[0]` must be the reg code.
    pub fn from_fields(line_no: usize, fields: &[&str]) -> Self {
        let reg = fields.first().copied().unwrap_or_default().to_string();
        Self {
            line_no,
            reg,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            parent: None,
        }
    }

    /// Field at `idx`, or `""` when the record is too short.
    ///
    /// Rules use this accessor so that truncated records degrade to empty
    /// fields instead of panicking.
    pub fn field(&self, idx: usize) -> &str {
        self.fields.get(idx).map(String::as_str).unwrap_or("")
    }

    /// True when the record has a field at `idx`.
    pub fn has_field(&self, idx: usize) -> bool {
        idx < self.fields.len()
    }

    /// First character of the reg code, which encodes block membership.
    pub fn block(&self) -> Option<char> {
        self.reg.chars().next()
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "registro {} (linha {}): {}",
            self.reg,
            self.line_no,
            self.fields.join("|")
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
