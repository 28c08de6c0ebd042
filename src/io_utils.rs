//! I/O plumbing shared by the CLI commands.
//!
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8
//!   with BOM sniffing.
//! - **Reader/writer construction**: decoded buffered input streams, plus
//!   a fully buffered seekable variant for the report's second pass.
//! - **stdin/stdout**: the `-` path convention routes through standard
//!   streams.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Cursor, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Display name of an input file for diagnostics.
pub fn display_name(path: &Path) -> String {
    if is_dash(path) {
        "<stdin>".to_string()
    } else {
        path.display().to_string()
    }
}

fn decoded<R: Read + 'static>(reader: R, encoding: &'static Encoding) -> Box<dyn BufRead> {
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_sniffing(true)
        .build(reader);
    Box::new(BufReader::new(decoder))
}

/// Open a decoded input stream; `-` reads standard input.
pub fn open_input(path: &Path, encoding: &'static Encoding) -> Result<Box<dyn BufRead>> {
    if is_dash(path) {
        Ok(decoded(std::io::stdin(), encoding))
    } else {
        let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
        Ok(decoded(file, encoding))
    }
}

/// Read and decode an entire input into a seekable in-memory buffer. The
/// report command needs to rewind, which a decoding stream cannot do.
pub fn read_seekable(path: &Path, encoding: &'static Encoding) -> Result<Cursor<Vec<u8>>> {
    let mut reader = open_input(path, encoding)?;
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .with_context(|| format!("Reading input file {path:?}"))?;
    Ok(Cursor::new(bytes))
}

/// Open the output stream; `None` or `-` writes standard output.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) if !is_dash(p) => {
            let file = File::create(p).with_context(|| format!("Creating output file {p:?}"))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => Ok(Box::new(std::io::stdout())),
    }
}

/// Parse a separator argument, accepting single characters and the
/// spellings `tab` and `space`.
pub fn parse_separator(arg: &str) -> Result<char> {
    match arg {
        "tab" | "\\t" => Ok('\t'),
        "space" => Ok(' '),
        _ => {
            let mut chars = arg.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(anyhow!("Separator must be a single character, got '{arg}'")),
            }
        }
    }
}

/// Human-readable form of a separator character for log and guess output.
pub fn describe_separator(separator: char) -> String {
    match separator {
        '\t' => "tab".to_string(),
        ' ' => "space".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodings_resolve_by_label() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(
            resolve_encoding(Some("latin1")).unwrap(),
            encoding_rs::WINDOWS_1252
        );
        assert!(resolve_encoding(Some("no-such-encoding")).is_err());
    }

    #[test]
    fn separator_spellings() {
        assert_eq!(parse_separator(";").unwrap(), ';');
        assert_eq!(parse_separator("tab").unwrap(), '\t');
        assert_eq!(parse_separator("space").unwrap(), ' ');
        assert!(parse_separator("abc").is_err());
        assert_eq!(describe_separator('\t'), "tab");
        assert_eq!(describe_separator(';'), ";");
    }

    #[test]
    fn latin1_input_is_decoded() {
        let bytes = b"pa\xefs,value\n".to_vec();
        let decoder = decoded(Cursor::new(bytes), encoding_rs::WINDOWS_1252);
        let text: Vec<String> = decoder.lines().map(|l| l.unwrap()).collect();
        assert_eq!(text, vec!["pa\u{ef}s,value"]);
    }
}
