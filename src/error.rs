use std::io;

use thiserror::Error;

/// Error type covering every failure mode of the ingestion pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error while reading an input stream or writing output.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// CSV serialization error while writing exported output.
    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),

    /// The schema names no data columns and counter mode is off.
    #[error("no data columns to read; enable counter mode or mark data columns")]
    NoDataColumns,

    /// A composite key was seen more than once under the `error` policy.
    #[error("{name}: row {row}: Duplicate key [{key}], first seen at row {first_row}")]
    DuplicateKey {
        name: String,
        row: usize,
        first_row: usize,
        key: String,
    },

    /// A field could not be parsed as the column's declared type.
    #[error("{name}: row {row}: Invalid data '{value}' for {expected} column '{column}'")]
    InvalidData {
        name: String,
        row: usize,
        value: String,
        expected: &'static str,
        column: String,
    },

    /// A row supplied fewer key components than the hypercube's rank.
    #[error("{name}: row {row}: row too short, got {got} of {expected} key fields")]
    ShortLine {
        name: String,
        row: usize,
        got: usize,
        expected: usize,
    },

    /// The chosen representation would exceed the caller's memory budget.
    #[error("memory budget exhausted: {required} bytes required, {budget} allowed")]
    MemoryExhausted { required: u128, budget: u128 },

    /// The hypercube element count overflows the platform index range.
    #[error("hypercube too large: element count overflows the index range")]
    DimensionTooLarge,

    /// Two axes resolved to the same display name.
    #[error("duplicate axis name '{0}'")]
    DuplicateAxisName(String),

    /// The source stream could not be rewound for the report pass.
    #[error("failed to rewind input stream: {0}")]
    RewindFailed(io::Error),

    /// The progress collaborator cancelled an in-flight parse.
    #[error("operation cancelled")]
    Cancelled,

    /// The progress collaborator cancelled guessing; the schema keeps the
    /// best-effort guess accumulated so far.
    #[error("guessing cancelled, best-effort schema retained")]
    GuessCancelled,

    /// The embedded hypercube metadata line carried unparseable JSON.
    #[error("malformed embedded metadata: {0}")]
    BadMetadata(#[from] serde_json::Error),

    /// The schema violates one of its structural invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

impl Error {
    /// True for problems scoped to a single row, which the collecting
    /// parse variant records instead of aborting.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            Error::DuplicateKey { .. } | Error::InvalidData { .. } | Error::ShortLine { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
