//! Format sniffing and structure guessing.
//!
//! [`sniff_separator`] counts candidate separators over a bounded sample of
//! leading lines. [`guess_into`] then tokenizes the sample to locate the
//! header/axis-row boundary, the axis-column count and per-dimension types,
//! or short-circuits via the embedded hypercube metadata line written by
//! [`crate::export`].

use std::io::BufRead;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::progress::{NoProgress, Progress};
use crate::schema::{Dimension, DimensionType, HorizontalDimension, Schema};
use crate::value::{guess_time_format, is_numeric_field};

/// Number of leading lines sampled for sniffing and guessing.
pub const SAMPLE_LINES: usize = 30;
/// A candidate separator must occur at least this often, relative to the
/// sampled line count, to be chosen.
const SEPARATOR_DOMINANCE: f64 = 0.9;
/// Cap on extra rows read when the sample holds no data rows.
const REMAINDER_LINES: usize = 10_000;

/// Marker prefix of the embedded hypercube metadata line.
pub const METADATA_TAG: &str = "RavelHypercube";
/// Marker prefix of the optional horizontal-dimension line.
pub const HORIZONTAL_TAG: &str = "HorizontalDimension";

static EURO_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+,\d+$").expect("invalid euro decimal pattern"));

/// One axis description inside the embedded metadata JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAxis {
    pub name: String,
    #[serde(flatten)]
    pub dimension: Dimension,
}

/// Pick the separator whose sample count dominates; fall back to
/// whitespace splitting when none does.
pub fn sniff_separator(lines: &[String]) -> (char, bool) {
    let candidates = [',', ';', '\t'];
    let mut counts = [0usize; 3];
    for line in lines {
        for (i, sep) in candidates.iter().enumerate() {
            counts[i] += line.matches(*sep).count();
        }
    }
    let threshold = (lines.len() as f64 * SEPARATOR_DOMINANCE).ceil() as usize;
    let mut best: Option<(char, usize)> = None;
    for (i, sep) in candidates.iter().enumerate() {
        if counts[i] >= threshold.max(1) && best.is_none_or(|(_, c)| counts[i] > c) {
            best = Some((*sep, counts[i]));
        }
    }
    match best {
        Some((sep, _)) => (sep, false),
        None => (' ', true),
    }
}

/// Guess a complete schema from a stream, mutating `schema` in place.
///
/// Cancellation through `progress` is converted to
/// [`Error::GuessCancelled`]; the schema keeps whatever consistent guess
/// was accumulated before the cancel.
pub fn guess_into<R: BufRead>(
    schema: &mut Schema,
    reader: R,
    progress: &mut dyn Progress,
) -> Result<()> {
    guess_with(schema, None, reader, progress)
}

/// Guess a schema with the separator forced instead of sniffed.
pub fn guess_with<R: BufRead>(
    schema: &mut Schema,
    forced_separator: Option<char>,
    mut reader: R,
    progress: &mut dyn Progress,
) -> Result<()> {
    let mut sample = Vec::new();
    while sample.len() < SAMPLE_LINES {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        trim_line_ending(&mut line);
        sample.push(line);
        if !progress.advance() {
            return Err(Error::GuessCancelled);
        }
    }

    let (separator, merge) = match forced_separator {
        Some(sep) => (sep, sep == ' '),
        None => sniff_separator(&sample),
    };
    schema.separator = separator;
    schema.merge_delimiters = merge;
    let tokenizer = schema.tokenizer();

    let rows: Vec<Vec<String>> = sample.iter().map(|l| tokenizer.tokenize(l)).collect();

    if apply_embedded_metadata(schema, &rows)? {
        log::debug!("schema reconstructed from embedded hypercube metadata");
        return Ok(());
    }

    // first_numerical per sampled row; blank rows carry no signal.
    let measured: Vec<(usize, &Vec<String>, usize)> = rows
        .iter()
        .enumerate()
        .filter(|(i, _)| !sample[*i].trim().is_empty())
        .map(|(i, tokens)| (i, tokens, first_numerical(tokens)))
        .collect();
    if measured.is_empty() {
        return Ok(());
    }

    let mean =
        measured.iter().map(|&(_, _, f)| f).sum::<usize>() as f64 / measured.len() as f64;
    let mut row_axes = 0usize;
    for &(i, _, f) in &measured {
        if (f as f64) > mean {
            row_axes = i + 1;
        }
    }
    // A boundary swallowing nearly the whole sample means the file has no
    // clear data block; keep only the first line as header.
    if sample.len() > 1 && row_axes >= sample.len() - 1 {
        row_axes = 1;
    }

    let data_rows: Vec<&(usize, &Vec<String>, usize)> =
        measured.iter().filter(|&&(i, _, _)| i >= row_axes).collect();
    let mut col_axes = data_rows.iter().map(|&&(_, _, f)| f).max().unwrap_or(0);
    let mut num_cols = data_rows
        .iter()
        .map(|&&(_, tokens, _)| tokens.len())
        .max()
        .unwrap_or(0);

    if data_rows.is_empty() {
        // Sample was all header; measure the remainder of the stream.
        let mut line = String::new();
        for _ in 0..REMAINDER_LINES {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            trim_line_ending(&mut line);
            if line.trim().is_empty() {
                continue;
            }
            let tokens = tokenizer.tokenize(&line);
            col_axes = col_axes.max(first_numerical(&tokens));
            num_cols = num_cols.max(tokens.len());
            if !progress.advance() {
                return Err(Error::GuessCancelled);
            }
        }
    }

    schema.dimension_cols = (0..col_axes).collect();
    schema.data_cols = (col_axes..num_cols).collect();

    // Without an axis row, a lone leading row is ambiguous between header
    // and data whenever several data columns remain.
    if schema.data_cols.len() > 1 && row_axes == 0 {
        row_axes = 1;
    }
    schema.row_axes = row_axes;
    schema.header_row = row_axes.saturating_sub(1);
    schema.col_axes = col_axes;

    schema.column_names = if row_axes > 0 {
        rows.get(schema.header_row)
            .map(|tokens| tokens.iter().map(|t| t.trim().to_string()).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    schema.dimensions.clear();
    for &col in &schema.dimension_cols.clone() {
        let values: Vec<&str> = data_rows
            .iter()
            .filter_map(|&&(_, tokens, _)| tokens.get(col))
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        schema.dimensions.insert(col, guess_dimension(&values));
    }

    schema.horizontal = if schema.data_cols.len() > 1 {
        let labels: Vec<&str> = schema
            .data_cols
            .iter()
            .filter_map(|&col| schema.column_names.get(col))
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        Some(HorizontalDimension::new("?", guess_dimension(&labels)))
    } else {
        None
    };

    guess_decimal_separator(schema, &data_rows);

    if !progress.fraction(1.0) {
        return Err(Error::GuessCancelled);
    }
    Ok(())
}

/// Guess a schema from scratch with no progress reporting.
pub fn guess_schema<R: BufRead>(reader: R) -> Result<Schema> {
    let mut schema = Schema::new();
    guess_into(&mut schema, reader, &mut NoProgress)?;
    Ok(schema)
}

/// Smallest trailing index such that every field at or after it is numeric
/// or empty.
fn first_numerical(tokens: &[String]) -> usize {
    let mut idx = tokens.len();
    while idx > 0 && is_numeric_field(&tokens[idx - 1]) {
        idx -= 1;
    }
    idx
}

/// Recognize the exact-schema fast path: a single-field
/// `RavelHypercube=<json>` line, optionally followed by a single-field
/// `HorizontalDimension=<name>` line. Returns true when applied.
fn apply_embedded_metadata(schema: &mut Schema, rows: &[Vec<String>]) -> Result<bool> {
    let Some((line_idx, payload)) = rows.iter().enumerate().find_map(|(i, tokens)| {
        match tokens.as_slice() {
            [only] => only
                .strip_prefix(METADATA_TAG)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|json| (i, json)),
            _ => None,
        }
    }) else {
        return Ok(false);
    };

    let axes: Vec<MetadataAxis> = serde_json::from_str(payload)?;

    let mut meta_lines = line_idx + 1;
    let horizontal_name = rows.get(meta_lines).and_then(|tokens| match tokens.as_slice() {
        [only] => only
            .strip_prefix(HORIZONTAL_TAG)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_string),
        _ => None,
    });
    if horizontal_name.is_some() {
        meta_lines += 1;
    }

    let (horizontal, vertical): (Vec<MetadataAxis>, Vec<MetadataAxis>) =
        axes.into_iter().partition(|axis| {
            horizontal_name
                .as_deref()
                .is_some_and(|name| axis.name == name)
        });

    schema.header_row = meta_lines;
    schema.row_axes = meta_lines + 1;
    schema.col_axes = vertical.len();
    schema.dimension_cols = (0..vertical.len()).collect();
    schema.dimensions = vertical
        .iter()
        .enumerate()
        .map(|(col, axis)| (col, axis.dimension.clone()))
        .collect();
    schema.column_names = vertical.iter().map(|axis| axis.name.clone()).collect();
    schema.horizontal = horizontal
        .into_iter()
        .next()
        .map(|axis| HorizontalDimension::new(axis.name, axis.dimension));

    let num_cols = rows
        .get(schema.header_row)
        .map_or(schema.col_axes + 1, Vec::len)
        .max(schema.col_axes + 1);
    schema.data_cols = (schema.col_axes..num_cols).collect();
    Ok(true)
}

fn guess_dimension(values: &[&str]) -> Dimension {
    if values.is_empty() {
        return Dimension::default();
    }
    if values.iter().all(|v| is_numeric_field(v)) {
        return Dimension::new(DimensionType::Numeric, "");
    }
    if let Some(format) = guess_time_format(values.iter().copied()) {
        return Dimension::new(DimensionType::Time, format);
    }
    Dimension::default()
}

/// Comma-decimal heuristic: when the separator cannot be a comma and the
/// sampled data cells consistently look like `12,5`, assume a localized
/// decimal separator.
fn guess_decimal_separator(schema: &mut Schema, data_rows: &[&(usize, &Vec<String>, usize)]) {
    if schema.separator == ',' {
        return;
    }
    let mut euro = 0usize;
    let mut dotted = 0usize;
    for &&(_, tokens, _) in data_rows {
        for &col in &schema.data_cols {
            let Some(cell) = tokens.get(col) else { continue };
            let cell = cell.trim();
            if EURO_DECIMAL.is_match(cell) {
                euro += 1;
            } else if cell.contains('.') {
                dotted += 1;
            }
        }
    }
    if euro > 0 && dotted == 0 {
        schema.decimal_separator = ',';
    }
}

fn trim_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
    }
    if line.ends_with('\r') {
        line.pop();
    }
}
