pub mod cli;
pub mod cube;
pub mod error;
pub mod export;
pub mod intern;
pub mod io_utils;
pub mod parse;
pub mod progress;
pub mod report;
pub mod schema;
pub mod sniff;
pub mod tokenizer;
pub mod value;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands};
use crate::progress::LogProgress;
use crate::schema::Schema;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_cube", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Guess(args) => handle_guess(&args),
        Commands::Import(args) => handle_import(&args),
        Commands::Report(args) => handle_report(&args),
    }
}

fn handle_guess(args: &cli::GuessArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let name = io_utils::display_name(&args.input);
    info!("Guessing structure of '{name}'");

    let reader = io_utils::open_input(&args.input, encoding)?;
    let mut schema = Schema::new();
    sniff::guess_with(&mut schema, args.separator, reader, &mut LogProgress::default())
        .with_context(|| format!("Guessing schema from {:?}", args.input))?;

    info!(
        "Guessed separator '{}', {} header row(s), {} axis column(s), {} data column(s)",
        io_utils::describe_separator(schema.separator),
        schema.row_axes,
        schema.col_axes,
        schema.data_cols.len()
    );
    match &args.schema {
        Some(path) => {
            schema.save(path)?;
            info!("Schema written to {path:?}");
        }
        None => {
            let text = serde_yaml::to_string(&schema).context("Serializing schema YAML")?;
            print!("{text}");
        }
    }
    Ok(())
}

/// Load the schema from a file, or guess it from the given input.
fn load_or_guess_schema(
    schema_path: Option<&Path>,
    input: &Path,
    separator: Option<char>,
    encoding: &'static encoding_rs::Encoding,
) -> Result<Schema> {
    match schema_path {
        Some(path) => {
            let mut schema = Schema::load(path)?;
            if let Some(sep) = separator {
                schema.separator = sep;
                schema.merge_delimiters = sep == ' ';
            }
            Ok(schema)
        }
        None => {
            let reader = io_utils::open_input(input, encoding)?;
            let mut schema = Schema::new();
            sniff::guess_with(&mut schema, separator, reader, &mut LogProgress::default())
                .with_context(|| format!("Guessing schema from {input:?}"))?;
            Ok(schema)
        }
    }
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let first = args
        .inputs
        .first()
        .context("At least one input is required")?;
    if args.schema.is_none() && io_utils::is_dash(first) {
        anyhow::bail!("Reading from stdin requires --schema, guessing would consume the stream");
    }

    let mut schema = load_or_guess_schema(
        args.schema.as_deref(),
        first,
        args.separator,
        encoding,
    )?;
    if let Some(policy) = args.duplicates {
        schema.duplicate_key_action = policy.into();
    }
    if let Some(raw) = &args.missing_value {
        schema.missing_value = parse_missing_value(raw)?;
    }
    schema.counter = schema.counter || args.counter;
    schema.dont_fail = schema.dont_fail || args.dont_fail;

    let mut progress = LogProgress::default();
    let mut session = parse::ParseSession::new(&schema)?;
    for input in &args.inputs {
        let name = io_utils::display_name(input);
        info!("Parsing '{name}'");
        let reader = io_utils::open_input(input, encoding)?;
        session.ingest(&name, reader, &mut progress)?;
    }
    let cube = session.finish(args.budget)?;
    info!(
        "Assembled {}-axis hypercube, {} representation",
        cube.hypercube.rank(),
        if cube.payload.is_dense() {
            "dense"
        } else {
            "sparse"
        }
    );

    let writer = io_utils::open_output(args.output.as_deref())?;
    export::write_cube(&cube, writer)?;
    Ok(())
}

fn handle_report(args: &cli::ReportArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let mut schema = load_or_guess_schema(
        args.schema.as_deref(),
        &args.input,
        args.separator,
        encoding,
    )?;
    if let Some(policy) = args.duplicates {
        schema.duplicate_key_action = policy.into();
    }
    if let Some(raw) = &args.missing_value {
        schema.missing_value = parse_missing_value(raw)?;
    }
    schema.counter = schema.counter || args.counter;
    schema.dont_fail = schema.dont_fail || args.dont_fail;

    let name = io_utils::display_name(&args.input);
    let mut input = io_utils::read_seekable(&args.input, encoding)?;
    let mut output = io_utils::open_output(args.output.as_deref())?;
    let flagged = report::write_report(
        &schema,
        &name,
        &mut input,
        &mut output,
        &mut LogProgress::default(),
    )?;
    info!("Report for '{name}': {flagged} flagged row(s)");
    Ok(())
}

fn parse_missing_value(raw: &str) -> Result<Option<f64>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(None),
        "nan" => Ok(Some(f64::NAN)),
        other => other
            .parse::<f64>()
            .map(Some)
            .with_context(|| format!("Invalid missing value '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_spellings() {
        assert_eq!(parse_missing_value("none").unwrap(), None);
        assert!(parse_missing_value("nan").unwrap().unwrap().is_nan());
        assert_eq!(parse_missing_value("0").unwrap(), Some(0.0));
        assert!(parse_missing_value("abc").is_err());
    }
}
