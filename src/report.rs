//! Annotated error report: a second pass over the input that prepends a
//! diagnostic column to every row.
//!
//! The input is first run through the collecting parse variant, then
//! rewound and re-emitted logical row by logical row. Header rows get an
//! `Error` column label, flagged rows get their quoted message, and clean
//! rows get an empty leading field so the output stays rectangular.

use std::collections::BTreeMap;
use std::io::{BufRead, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::parse::{ParseSession, RowIssue};
use crate::progress::Progress;
use crate::schema::Schema;
use crate::tokenizer::LogicalRows;

/// Quote a diagnostic message as one field, doubling embedded quotes.
fn quote_field(message: &str, quote: char) -> String {
    let mut out = String::with_capacity(message.len() + 2);
    out.push(quote);
    for c in message.chars() {
        if c == quote {
            out.push(quote);
        }
        out.push(c);
    }
    out.push(quote);
    out
}

/// Write the annotated report for one input stream. Returns the number of
/// rows that carried a diagnostic.
pub fn write_report<R, W>(
    schema: &Schema,
    name: &str,
    input: &mut R,
    output: &mut W,
    progress: &mut dyn Progress,
) -> Result<usize>
where
    R: BufRead + Seek,
    W: Write,
{
    let mut session = ParseSession::new(schema)?;
    let mut issues: Vec<RowIssue> = Vec::new();
    session.ingest_collecting(name, &mut *input, &mut issues, progress)?;

    // First message per row wins; later ones describe the same line.
    let mut by_row: BTreeMap<usize, String> = BTreeMap::new();
    for issue in issues {
        by_row.entry(issue.row).or_insert(issue.message);
    }

    input
        .seek(SeekFrom::Start(0))
        .map_err(Error::RewindFailed)?;

    let flagged = by_row.len();
    let separator = schema.separator;
    for row in LogicalRows::new(&mut *input, schema.tokenizer()) {
        let row = row?;
        if !progress.advance() {
            return Err(Error::Cancelled);
        }
        if row.index < schema.row_axes {
            write!(output, "Error{separator}{}", row.text)?;
        } else if let Some(message) = by_row.get(&row.index) {
            let field = quote_field(message, schema.quote);
            write!(output, "{field}{separator}{}", row.text)?;
        } else {
            write!(output, "{separator}{}", row.text)?;
        }
        writeln!(output)?;
    }
    output.flush()?;

    log::info!("report for {name}: {flagged} flagged row(s)");
    Ok(flagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::schema::{Dimension, DimensionType};
    use std::io::Cursor;

    fn long_schema() -> Schema {
        let mut schema = Schema::default();
        schema.row_axes = 1;
        schema.header_row = 0;
        schema.dimension_cols.extend([0, 1]);
        schema.data_cols.insert(2);
        schema
            .dimensions
            .insert(1, Dimension::new(DimensionType::Time, "%Y-Q%Q"));
        schema
    }

    fn report(schema: &Schema, data: &str) -> (usize, String) {
        let mut input = Cursor::new(data.to_string());
        let mut output = Vec::new();
        let flagged =
            write_report(schema, "input", &mut input, &mut output, &mut NoProgress).unwrap();
        (flagged, String::from_utf8(output).unwrap())
    }

    #[test]
    fn clean_input_gains_an_empty_error_column() {
        let data = "\
country,quarter,value
Australia,1967-Q4,1.0
France,1967-Q4,2.0
";
        let (flagged, text) = report(&long_schema(), data);
        assert_eq!(flagged, 0);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Error,country,quarter,value");
        assert_eq!(lines[1], ",Australia,1967-Q4,1.0");
        assert_eq!(lines[2], ",France,1967-Q4,2.0");
    }

    #[test]
    fn invalid_data_rows_carry_their_message() {
        let data = "\
country,quarter,value
Australia,1966-Q,1.0
France,1967-Q4,2.0
";
        let (flagged, text) = report(&long_schema(), data);
        assert_eq!(flagged, 1);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].contains("Invalid data"));
        assert!(lines[1].ends_with(",Australia,1966-Q,1.0"));
        assert!(lines[2].starts_with(','));
    }

    #[test]
    fn duplicate_keys_flag_both_rows() {
        let data = "\
country,quarter,value
Australia,1967-Q4,1.0
Australia,1967-Q4,1.2
France,1967-Q4,2.0
";
        let (flagged, text) = report(&long_schema(), data);
        assert_eq!(flagged, 2);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].contains("Duplicate key"));
        assert!(lines[2].contains("Duplicate key"));
        assert!(lines[3].starts_with(','));
    }

    #[test]
    fn message_quotes_are_doubled() {
        assert_eq!(quote_field("say \"hi\"", '"'), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn multiline_rows_are_annotated_once() {
        let data = "country,quarter,value\n\"New\nZealand\",1967-Q4,1.0\nFrance,1967-Q4,2.0\n";
        let (flagged, text) = report(&long_schema(), data);
        assert_eq!(flagged, 0);
        // The quoted multi-line label is re-emitted verbatim, so the report
        // has one more physical line than it has logical rows.
        assert_eq!(text.lines().count(), 4);
        assert!(text.contains(",\"New\nZealand\",1967-Q4,1.0"));
    }
}
