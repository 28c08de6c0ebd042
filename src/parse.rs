//! Row parsing: streaming logical rows through a finalized schema into an
//! accumulated key/value map, then assembling the hypercube.
//!
//! A [`ParseSession`] holds per-axis label interners and the duplicate-key
//! accumulator, so several input files can be merged into one cube by
//! calling [`ParseSession::ingest`] once per file. [`parse_reader`] is the
//! single-file convenience wrapper.

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::cube::{self, Axis, Hypercube, ParsedCube};
use crate::error::{Error, Result};
use crate::intern::LabelInterner;
use crate::progress::Progress;
use crate::schema::{Dimension, DimensionType, DuplicateKeyAction, Schema};
use crate::tokenizer::{LogicalRows, Tokenizer};
use crate::value::{self, CellParser, CellValue};

/// One row-scoped problem found by the collecting parse variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    /// 0-based logical row index within its file.
    pub row: usize,
    pub message: String,
}

/// One axis under construction: interner plus the parsed value per id,
/// kept for the final ordering pass.
#[derive(Debug)]
struct AxisSlot {
    /// Source column for dimension columns, `None` for the horizontal axis.
    column: Option<usize>,
    dimension: Dimension,
    parser: CellParser,
    interner: LabelInterner,
    parsed: Vec<CellValue>,
}

impl AxisSlot {
    fn new(column: Option<usize>, dimension: Dimension, decimal_separator: char) -> Self {
        let parser = CellParser::new(&dimension, decimal_separator);
        Self {
            column,
            dimension,
            parser,
            interner: LabelInterner::new(),
            parsed: Vec::new(),
        }
    }

    /// Intern a raw label, recording its parsed value on first sight.
    fn intern(&mut self, raw: &str) -> std::result::Result<usize, value::TypeMismatch> {
        let canonical = self.parser.canonical(raw);
        if let Some(id) = self.interner.get(&canonical) {
            return Ok(id);
        }
        let parsed = self.parser.parse(raw)?;
        let id = self.interner.intern(&canonical);
        debug_assert_eq!(id, self.parsed.len());
        self.parsed.push(parsed);
        Ok(id)
    }

    /// Intern a label that is not required to parse as the declared type,
    /// falling back to a plain string value for ordering purposes.
    fn intern_lenient(&mut self, raw: &str) -> usize {
        match self.intern(raw) {
            Ok(id) => id,
            Err(_) => {
                let canonical = raw.trim().to_string();
                let id = self.interner.intern(&canonical);
                if id == self.parsed.len() {
                    self.parsed.push(CellValue::String(canonical));
                }
                id
            }
        }
    }

    /// Permutation mapping id to axis position: time and numeric axes sort
    /// by parsed value, string axes keep first-seen order.
    fn positions(&self) -> Vec<usize> {
        let n = self.parsed.len();
        if self.dimension.kind == DimensionType::String {
            return (0..n).collect();
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| self.parsed[a].cmp_same_kind(&self.parsed[b]));
        let mut positions = vec![0usize; n];
        for (pos, &id) in order.iter().enumerate() {
            positions[id] = pos;
        }
        positions
    }

    fn sorted_labels(&self) -> Vec<String> {
        let positions = self.positions();
        let mut labels = vec![String::new(); self.interner.len()];
        for (id, label) in self.interner.labels().iter().enumerate() {
            labels[positions[id]] = label.clone();
        }
        labels
    }
}

/// Accumulated state of one composite key.
#[derive(Debug, Clone)]
struct Accum {
    value: f64,
    count: usize,
    first_row: usize,
    /// Whether the first occurrence has already been reported as part of a
    /// duplicate pair in collecting mode.
    flagged: bool,
}

/// Incremental parse over one or more input files sharing a schema.
pub struct ParseSession {
    schema: Schema,
    tokenizer: Tokenizer,
    slots: Vec<AxisSlot>,
    /// Index into `slots` of the horizontal axis, when configured.
    horizontal_slot: Option<usize>,
    /// Header fields captured from the header row of the first file.
    header: Vec<String>,
    horizontal_ready: bool,
    accum: BTreeMap<Vec<usize>, Accum>,
    /// Smallest token count a row must reach to cover every dimension column.
    key_width: usize,
    /// Data columns in ascending order.
    data_cols: Vec<usize>,
    /// Horizontal axis id per data column position, filled once the header
    /// labels are known.
    horizontal_ids: Vec<usize>,
}

impl ParseSession {
    pub fn new(schema: &Schema) -> Result<Self> {
        schema.validate()?;
        if schema.data_cols.is_empty() && !schema.counter {
            return Err(Error::NoDataColumns);
        }

        let mut slots = Vec::with_capacity(schema.rank());
        for &col in &schema.dimension_cols {
            slots.push(AxisSlot::new(
                Some(col),
                schema.dimension_for(col),
                schema.decimal_separator,
            ));
        }
        let horizontal_slot = schema.horizontal.as_ref().map(|h| {
            slots.push(AxisSlot::new(
                None,
                h.dimension.clone(),
                schema.decimal_separator,
            ));
            slots.len() - 1
        });
        let key_width = schema
            .dimension_cols
            .iter()
            .next_back()
            .map_or(0, |&col| col + 1);

        Ok(Self {
            schema: schema.clone(),
            tokenizer: schema.tokenizer(),
            slots,
            horizontal_slot,
            header: Vec::new(),
            horizontal_ready: false,
            accum: BTreeMap::new(),
            key_width,
            data_cols: schema.data_cols.iter().copied().collect(),
            horizontal_ids: Vec::new(),
        })
    }

    /// Display name of a column: schema override, captured header, or a
    /// synthesized placeholder.
    fn column_name(&self, col: usize) -> String {
        match self.schema.column_names.get(col) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => match self.header.get(col) {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => format!("column {}", col + 1),
            },
        }
    }

    /// Register one horizontal axis label per data column, using header
    /// labels when a header was seen.
    fn ensure_horizontal_labels(&mut self) {
        if self.horizontal_ready {
            return;
        }
        self.horizontal_ready = true;
        let Some(slot_idx) = self.horizontal_slot else {
            return;
        };
        let labels: Vec<String> = self
            .data_cols
            .iter()
            .map(|&col| self.column_name(col))
            .collect();
        let mut ids = Vec::with_capacity(labels.len());
        for label in &labels {
            ids.push(self.slots[slot_idx].intern_lenient(label));
        }
        self.horizontal_ids = ids;
    }

    fn key_display(&self, key: &[usize]) -> String {
        key.iter()
            .zip(&self.slots)
            .map(|(&id, slot)| slot.interner.resolve(id))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Fold `value` into the accumulator for `key`.
    fn record(&mut self, name: &str, row: usize, key: Vec<usize>, value: f64) -> Result<()> {
        if let Some(entry) = self.accum.get_mut(&key) {
            match self.schema.duplicate_key_action {
                DuplicateKeyAction::Error => {
                    // The stored value stays untouched under this policy.
                    let first_row = entry.first_row;
                    return Err(Error::DuplicateKey {
                        name: name.to_string(),
                        row,
                        first_row,
                        key: self.key_display(&key),
                    });
                }
                DuplicateKeyAction::Sum => entry.value += value,
                DuplicateKeyAction::Product => entry.value *= value,
                DuplicateKeyAction::Min => entry.value = entry.value.min(value),
                DuplicateKeyAction::Max => entry.value = entry.value.max(value),
                DuplicateKeyAction::Average => {
                    entry.value += (value - entry.value) / (entry.count as f64 + 1.0);
                }
            }
            entry.count += 1;
            return Ok(());
        }
        self.accum.insert(key, Accum {
            value,
            count: 1,
            first_row: row,
            flagged: false,
        });
        Ok(())
    }

    /// Count one occurrence of `key`, ignoring the duplicate policy.
    fn count(&mut self, row: usize, key: Vec<usize>) {
        self.accum
            .entry(key)
            .and_modify(|entry| {
                entry.value += 1.0;
                entry.count += 1;
            })
            .or_insert(Accum {
                value: 1.0,
                count: 1,
                first_row: row,
                flagged: false,
            });
    }

    /// Parse one data row. Row-level failures come back as errors; the
    /// caller decides whether to abort, skip, or collect them.
    fn data_row(&mut self, name: &str, row: usize, tokens: &[String]) -> Result<()> {
        if tokens.len() < self.key_width {
            return Err(Error::ShortLine {
                name: name.to_string(),
                row,
                got: tokens.len(),
                expected: self.key_width,
            });
        }

        let mut key = Vec::with_capacity(self.slots.len());
        for i in 0..self.slots.len() {
            let Some(col) = self.slots[i].column else {
                continue;
            };
            match self.slots[i].intern(&tokens[col]) {
                Ok(id) => key.push(id),
                Err(mismatch) => {
                    return Err(Error::InvalidData {
                        name: name.to_string(),
                        row,
                        value: tokens[col].trim().to_string(),
                        expected: mismatch.expected,
                        column: self.column_name(col),
                    });
                }
            }
        }

        if self.schema.counter {
            if self.horizontal_slot.is_some() {
                for index in 0..self.data_cols.len() {
                    let mut full = key.clone();
                    full.push(self.horizontal_ids[index]);
                    self.count(row, full);
                }
            } else {
                self.count(row, key);
            }
            return Ok(());
        }

        for index in 0..self.data_cols.len() {
            let col = self.data_cols[index];
            let raw = tokens.get(col).map_or("", String::as_str);
            let value = if value::is_null_marker(raw) {
                match self.schema.missing_value {
                    Some(missing) => missing,
                    None => continue,
                }
            } else {
                match value::parse_data_value(raw, self.schema.decimal_separator) {
                    Some(v) => v,
                    None => {
                        return Err(Error::InvalidData {
                            name: name.to_string(),
                            row,
                            value: raw.trim().to_string(),
                            expected: "numeric",
                            column: self.column_name(col),
                        });
                    }
                }
            };
            let mut full = key.clone();
            if self.horizontal_slot.is_some() {
                full.push(self.horizontal_ids[index]);
            }
            self.record(name, row, full, value)?;
        }
        Ok(())
    }

    fn is_blank(tokens: &[String]) -> bool {
        tokens.iter().all(|t| t.trim().is_empty())
    }

    /// Stream one file through the session. Row-level errors abort the
    /// parse unless `dont_fail` is set, in which case the offending row is
    /// skipped with a warning.
    pub fn ingest<R: BufRead>(
        &mut self,
        name: &str,
        reader: R,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        for row in LogicalRows::new(reader, self.tokenizer) {
            let row = row?;
            if !progress.advance() {
                return Err(Error::Cancelled);
            }
            if row.index < self.schema.row_axes {
                if row.index == self.schema.header_row && self.header.is_empty() {
                    self.header = self.tokenizer.tokenize(&row.text);
                }
                continue;
            }
            self.ensure_horizontal_labels();
            let tokens = self.tokenizer.tokenize(&row.text);
            if Self::is_blank(&tokens) {
                continue;
            }
            if let Err(err) = self.data_row(name, row.index, &tokens) {
                if err.is_row_level() && self.schema.dont_fail {
                    log::warn!("skipping row: {err}");
                    continue;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stream one file, recording every row-level problem instead of
    /// aborting. Duplicate-key pairs are reported at both rows.
    pub fn ingest_collecting<R: BufRead>(
        &mut self,
        name: &str,
        reader: R,
        issues: &mut Vec<RowIssue>,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        for row in LogicalRows::new(reader, self.tokenizer) {
            let row = row?;
            if !progress.advance() {
                return Err(Error::Cancelled);
            }
            if row.index < self.schema.row_axes {
                if row.index == self.schema.header_row && self.header.is_empty() {
                    self.header = self.tokenizer.tokenize(&row.text);
                }
                continue;
            }
            self.ensure_horizontal_labels();
            let tokens = self.tokenizer.tokenize(&row.text);
            if Self::is_blank(&tokens) {
                continue;
            }
            if let Err(err) = self.data_row(name, row.index, &tokens) {
                if !err.is_row_level() {
                    return Err(err);
                }
                if let Error::DuplicateKey { first_row, .. } = &err {
                    let first_row = *first_row;
                    let message = err.to_string();
                    if let Some(entry) = self.first_occurrence_mut(first_row)
                        && !entry.flagged
                    {
                        entry.flagged = true;
                        issues.push(RowIssue {
                            row: first_row,
                            message: message.clone(),
                        });
                    }
                    issues.push(RowIssue {
                        row: row.index,
                        message,
                    });
                } else {
                    issues.push(RowIssue {
                        row: row.index,
                        message: err.to_string(),
                    });
                }
            }
        }
        issues.sort_by_key(|issue| issue.row);
        Ok(())
    }

    fn first_occurrence_mut(&mut self, first_row: usize) -> Option<&mut Accum> {
        self.accum
            .values_mut()
            .find(|entry| entry.first_row == first_row)
    }

    /// Assemble the final hypercube: order axes, drop singleton axes, and
    /// materialize dense or sparse within the memory budget.
    pub fn finish(mut self, budget_bytes: Option<u64>) -> Result<ParsedCube> {
        self.ensure_horizontal_labels();

        let kept: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].interner.len() >= 2)
            .collect();

        let mut axes = Vec::with_capacity(kept.len());
        let mut positions = Vec::with_capacity(kept.len());
        for &i in &kept {
            let slot = &self.slots[i];
            let name = match slot.column {
                Some(col) => self.column_name(col),
                None => self
                    .schema
                    .horizontal
                    .as_ref()
                    .map_or_else(|| "?".to_string(), |h| h.name.clone()),
            };
            axes.push(Axis {
                name,
                dimension: slot.dimension.clone(),
                labels: slot.sorted_labels(),
            });
            positions.push(slot.positions());
        }
        let hypercube = Hypercube::new(axes);

        let mut entries = Vec::with_capacity(self.accum.len());
        for (key, accum) in &self.accum {
            let coords: Vec<usize> = kept
                .iter()
                .zip(&positions)
                .map(|(&slot_idx, positions)| positions[key[slot_idx]])
                .collect();
            entries.push((hypercube.flat_index(&coords), accum.value));
        }

        cube::materialize(hypercube, entries, self.schema.missing_value, budget_bytes)
    }
}

/// Parse a single input stream into a hypercube.
pub fn parse_reader<R: BufRead>(
    schema: &Schema,
    name: &str,
    reader: R,
    budget_bytes: Option<u64>,
    progress: &mut dyn Progress,
) -> Result<ParsedCube> {
    let mut session = ParseSession::new(schema)?;
    session.ingest(name, reader, progress)?;
    session.finish(budget_bytes)
}

/// Run the collecting variant over a single stream and return its issues.
pub fn collect_issues<R: BufRead>(
    schema: &Schema,
    name: &str,
    reader: R,
    progress: &mut dyn Progress,
) -> Result<Vec<RowIssue>> {
    let mut session = ParseSession::new(schema)?;
    let mut issues = Vec::new();
    session.ingest_collecting(name, reader, &mut issues, progress)?;
    Ok(issues)
}
