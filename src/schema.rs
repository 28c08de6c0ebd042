//! Schema model: the mutable configuration object shared by guessing and
//! parsing, plus its YAML persistence.
//!
//! A [`Schema`] is created empty, loaded from a persisted YAML file, or
//! filled in place by the guesser. Once finalized it is handed read-only to
//! the row parser and the error reporter.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;

/// Hard cap on addressable column indices in a schema.
pub const MAX_COLUMNS: usize = 10_000;

/// Declared type of one dimension column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DimensionType {
    #[default]
    String,
    Time,
    Numeric,
}

impl DimensionType {
    pub const fn describes(self) -> &'static str {
        match self {
            DimensionType::String => "string",
            DimensionType::Time => "time",
            DimensionType::Numeric => "numeric",
        }
    }
}

impl fmt::Display for DimensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describes())
    }
}

/// Type and format/unit annotation of one axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dimension {
    #[serde(rename = "type", default)]
    pub kind: DimensionType,
    /// Time format string (e.g. `%Y-Q%Q`) or unit label; empty means
    /// "try the built-in formats".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub units: String,
}

impl Dimension {
    pub fn new(kind: DimensionType, units: impl Into<String>) -> Self {
        Self {
            kind,
            units: units.into(),
        }
    }
}

/// Synthetic axis implied by which trailing column a value appears in
/// (wide/tabular mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizontalDimension {
    pub name: String,
    #[serde(flatten)]
    pub dimension: Dimension,
}

impl HorizontalDimension {
    pub fn new(name: impl Into<String>, dimension: Dimension) -> Self {
        Self {
            name: name.into(),
            dimension,
        }
    }
}

/// Policy for combining two rows that map to the same composite key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKeyAction {
    #[default]
    Error,
    Sum,
    Product,
    Min,
    Max,
    Average,
}

/// Configuration and guess result for one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub separator: char,
    pub quote: char,
    pub escape: char,
    pub decimal_separator: char,
    /// Collapse runs of separator characters (whitespace-separated files).
    pub merge_delimiters: bool,
    /// Value recorded for empty cells; `None` means "do not record".
    pub missing_value: Option<f64>,
    /// 0-based index of the header row carrying column names.
    pub header_row: usize,
    /// Number of leading rows that are headers/axis labels, not data.
    pub row_axes: usize,
    /// Number of leading columns that are axis labels.
    pub col_axes: usize,
    pub dimension_cols: BTreeSet<usize>,
    pub data_cols: BTreeSet<usize>,
    /// Per-dimension-column type annotations.
    pub dimensions: BTreeMap<usize, Dimension>,
    /// Display names per column, usually captured from the header row.
    pub column_names: Vec<String>,
    pub horizontal: Option<HorizontalDimension>,
    pub duplicate_key_action: DuplicateKeyAction,
    /// Count key occurrences instead of reading data values.
    pub counter: bool,
    /// Skip malformed rows silently instead of aborting.
    pub dont_fail: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            separator: ',',
            quote: '"',
            escape: '\\',
            decimal_separator: '.',
            merge_delimiters: false,
            missing_value: Some(f64::NAN),
            header_row: 0,
            row_axes: 0,
            col_axes: 0,
            dimension_cols: BTreeSet::new(),
            data_cols: BTreeSet::new(),
            dimensions: BTreeMap::new(),
            column_names: Vec::new(),
            horizontal: None,
            duplicate_key_action: DuplicateKeyAction::Error,
            counter: false,
            dont_fail: false,
        }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural invariants checked before a parse session starts.
    pub fn validate(&self) -> Result<()> {
        if let Some(col) = self.dimension_cols.intersection(&self.data_cols).next() {
            return Err(Error::InvalidSchema(format!(
                "column {col} is marked as both dimension and data"
            )));
        }
        if let Some(&col) = self
            .dimension_cols
            .iter()
            .chain(self.data_cols.iter())
            .find(|&&c| c >= MAX_COLUMNS)
        {
            return Err(Error::InvalidSchema(format!(
                "column {col} exceeds the {MAX_COLUMNS}-column cap"
            )));
        }
        if self.row_axes > 0 && self.header_row >= self.row_axes {
            return Err(Error::InvalidSchema(format!(
                "header row {} lies outside the {} leading axis row(s)",
                self.header_row, self.row_axes
            )));
        }
        Ok(())
    }

    pub fn tokenizer(&self) -> Tokenizer {
        Tokenizer::new(
            self.separator,
            self.quote,
            self.escape,
            self.merge_delimiters,
        )
    }

    /// Axis count of the resulting hypercube before singleton dropping.
    pub fn rank(&self) -> usize {
        self.dimension_cols.len() + usize::from(self.horizontal.is_some())
    }

    /// Declared dimension for a column, defaulting to a string dimension.
    pub fn dimension_for(&self, col: usize) -> Dimension {
        self.dimensions.get(&col).cloned().unwrap_or_default()
    }

    /// Display name for a column, synthesized when no header supplied one.
    pub fn column_name(&self, col: usize) -> String {
        match self.column_names.get(col) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("column {}", col + 1),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema = serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        Ok(schema)
    }
}
