//! Pipe-delimited SPED line parser and reassembler.
//!
//! The canonical framing is `|REG|f1|…|fN|`: splitting on `|` yields an
//! empty first and last token, which are stripped. Lines that lost the
//! leading or trailing pipe are recovered as-is (the first surviving token
//! becomes `reg`). Blank lines and lines with no tokens are skipped.
//!
//! Round-trip invariant: `reassemble(parse(text))` reproduces `text` up to
//! normalisation of the trailing newline, as long as no rule mutated the
//! records in between.

use crate::record::Record;

/// Parse SPED text into records, in file order, with parents assigned.
pub fn parse(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts: Vec<&str> = line.split('|').collect();
        if parts.first() == Some(&"") {
            parts.remove(0);
        }
        if parts.last() == Some(&"") {
            parts.pop();
        }
        if parts.is_empty() || parts[0].is_empty() {
            continue;
        }

        records.push(Record::from_fields(idx + 1, &parts));
    }
    assign_parents(&mut records);
    records
}

/// Serialise records back into pipe-delimited text, one per line,
/// LF-terminated, with a trailing LF.
pub fn reassemble(records: &[Record]) -> String {
    let mut out = String::new();
    for record in records {
        out.push('|');
        out.push_str(&record.fields.join("|"));
        out.push('|');
        out.push('\n');
    }
    out
}

/// Second parse pass: wire each item record to its container using
/// last-seen cursors (C170 → C100, C850 → C800).
fn assign_parents(records: &mut [Record]) {
    let mut last_c100: Option<usize> = None;
    let mut last_c800: Option<usize> = None;
    for record in records.iter_mut() {
        match record.reg.as_str() {
            "C100" => last_c100 = Some(record.line_no),
            "C800" => last_c800 = Some(record.line_no),
            "C170" => record.parent = last_c100,
            "C850" => record.parent = last_c800,
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_framing() {
        let records = parse("|0000|017|0|\n|C100|0|1|\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reg, "0000");
        assert_eq!(records[0].fields, vec!["0000", "017", "0"]);
        assert_eq!(records[0].line_no, 1);
        assert_eq!(records[1].line_no, 2);
    }

    #[test]
    fn skips_blank_lines_but_keeps_source_numbering() {
        let records = parse("|0000|017|\n\n|C100|0|\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].line_no, 3);
    }

    #[test]
    fn recovers_line_missing_leading_pipe() {
        let records = parse("0000|017|0|\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reg, "0000");
        assert_eq!(records[0].fields, vec!["0000", "017", "0"]);
    }

    #[test]
    fn recovers_line_missing_trailing_pipe() {
        let records = parse("|0000|017|0\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields, vec!["0000", "017", "0"]);
    }

    #[test]
    fn skips_lines_with_no_tokens() {
        let records = parse("||\n|\n|0000|x|\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reg, "0000");
    }

    #[test]
    fn empty_interior_fields_survive() {
        let records = parse("|0000|017||SP|\n");
        assert_eq!(records[0].fields, vec!["0000", "017", "", "SP"]);
    }

    #[test]
    fn parents_assigned_to_last_seen_container() {
        let text = "\
|C100|0|primeira|
|C170|1|A10|
|C170|2|B20|
|C100|0|segunda|
|C170|1|C30|
|C800|59|
|C850|01|5102|
";
        let records = parse(text);
        assert_eq!(records[1].parent, Some(1));
        assert_eq!(records[2].parent, Some(1));
        assert_eq!(records[4].parent, Some(4));
        assert_eq!(records[6].parent, Some(6));
    }

    #[test]
    fn item_before_any_container_has_no_parent() {
        let records = parse("|C170|1|A10|\n|C100|0|doc|\n");
        assert_eq!(records[0].parent, None);
    }

    #[test]
    fn round_trip_is_identity() {
        let text = "|0000|017|0|01012024|31012024|ACME|\n|C100|0|1||55|\n|C170|1|A10|\n";
        let records = parse(text);
        assert_eq!(reassemble(&records), text);
    }

    #[test]
    fn round_trip_normalises_trailing_newline() {
        let text = "|0000|017|";
        let records = parse(text);
        assert_eq!(reassemble(&records), "|0000|017|\n");
    }
}
