use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::schema::DuplicateKeyAction;

#[derive(Debug, Parser)]
#[command(author, version, about = "Ingest tabular text into hypercube datasets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sniff the format of a tabular file and write the guessed schema
    Guess(GuessArgs),
    /// Parse one or more files into a hypercube and export it as long-format CSV
    Import(ImportArgs),
    /// Annotate a file with a leading diagnostics column
    Report(ReportArgs),
}

#[derive(Debug, Args)]
pub struct GuessArgs {
    /// Input file to sniff ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination schema YAML file (stdout if omitted)
    #[arg(short = 's', long = "schema")]
    pub schema: Option<PathBuf>,
    /// Field separator (single character, 'tab', or 'space'; sniffed if omitted)
    #[arg(long, value_parser = parse_separator_arg)]
    pub separator: Option<char>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// One or more input files sharing the same layout
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// Schema YAML file (guessed from the first input if omitted)
    #[arg(short = 's', long = "schema")]
    pub schema: Option<PathBuf>,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Field separator override (single character, 'tab', or 'space')
    #[arg(long, value_parser = parse_separator_arg)]
    pub separator: Option<char>,
    /// Value recorded for empty cells: a number, 'nan', or 'none' to skip them
    #[arg(long = "missing-value")]
    pub missing_value: Option<String>,
    /// How to combine rows that share a key
    #[arg(long = "duplicates", value_enum)]
    pub duplicates: Option<DuplicatePolicy>,
    /// Count key occurrences instead of reading data values
    #[arg(long)]
    pub counter: bool,
    /// Skip malformed rows instead of aborting
    #[arg(long = "dont-fail")]
    pub dont_fail: bool,
    /// Memory budget in bytes for the materialized dataset
    #[arg(long)]
    pub budget: Option<u64>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Input file to annotate
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Schema YAML file (guessed from the input if omitted)
    #[arg(short = 's', long = "schema")]
    pub schema: Option<PathBuf>,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Field separator override (single character, 'tab', or 'space')
    #[arg(long, value_parser = parse_separator_arg)]
    pub separator: Option<char>,
    /// Value recorded for empty cells: a number, 'nan', or 'none' to skip them
    #[arg(long = "missing-value")]
    pub missing_value: Option<String>,
    /// How to combine rows that share a key
    #[arg(long = "duplicates", value_enum)]
    pub duplicates: Option<DuplicatePolicy>,
    /// Count key occurrences instead of reading data values
    #[arg(long)]
    pub counter: bool,
    /// Skip malformed rows instead of aborting
    #[arg(long = "dont-fail")]
    pub dont_fail: bool,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    Error,
    Sum,
    Product,
    Min,
    Max,
    Average,
}

impl From<DuplicatePolicy> for DuplicateKeyAction {
    fn from(policy: DuplicatePolicy) -> Self {
        match policy {
            DuplicatePolicy::Error => DuplicateKeyAction::Error,
            DuplicatePolicy::Sum => DuplicateKeyAction::Sum,
            DuplicatePolicy::Product => DuplicateKeyAction::Product,
            DuplicatePolicy::Min => DuplicateKeyAction::Min,
            DuplicatePolicy::Max => DuplicateKeyAction::Max,
            DuplicatePolicy::Average => DuplicateKeyAction::Average,
        }
    }
}

pub fn parse_separator_arg(value: &str) -> Result<char, String> {
    crate::io_utils::parse_separator(value).map_err(|err| err.to_string())
}
