//! Cell value parsing: raw field text to a tagged [`CellValue`] per the
//! column's declared dimension type, plus the numeric normalization rules
//! (thousands separators, localized decimal separators, currency prefixes)
//! shared by dimension and data columns.

use std::cmp::Ordering;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::schema::{Dimension, DimensionType};

/// Strictly numeric field as used for structure guessing: optional sign,
/// digits with one `.` or `,` decimal point, optional exponent. Currency
/// prefixes deliberately do not match here.
static NUMERIC_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:[.,]\d*)?|[.,]\d+)(?:[eE][+-]?\d+)?$")
        .expect("invalid numeric field pattern")
});

/// Null-marker cells treated as missing data.
static NULL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:null|nil|none|na|n/a|-|\?)$").expect("invalid null marker pattern")
});

/// Tagged value of one dimension cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Time(NaiveDateTime),
    Numeric(f64),
}

impl CellValue {
    pub const fn kind(&self) -> DimensionType {
        match self {
            CellValue::String(_) => DimensionType::String,
            CellValue::Time(_) => DimensionType::Time,
            CellValue::Numeric(_) => DimensionType::Numeric,
        }
    }

    /// Ordering within one axis; variants of different kinds never meet
    /// there, so mismatches compare equal rather than panicking.
    pub fn cmp_same_kind(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::String(a), CellValue::String(b)) => a.cmp(b),
            (CellValue::Time(a), CellValue::Time(b)) => a.cmp(b),
            (CellValue::Numeric(a), CellValue::Numeric(b)) => a.total_cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Raw text failed to parse as the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatch {
    pub expected: &'static str,
}

impl TypeMismatch {
    const fn of(expected: &'static str) -> Self {
        Self { expected }
    }
}

/// Compiled per-column parser, built once per dimension and reused for
/// every row of a parse session.
#[derive(Debug, Clone)]
pub struct CellParser {
    kind: DimensionType,
    time: Option<TimeFormat>,
    decimal_separator: char,
}

impl CellParser {
    pub fn new(dimension: &Dimension, decimal_separator: char) -> Self {
        let time = match dimension.kind {
            DimensionType::Time => Some(TimeFormat::compile(&dimension.units)),
            _ => None,
        };
        Self {
            kind: dimension.kind,
            time,
            decimal_separator,
        }
    }

    pub const fn kind(&self) -> DimensionType {
        self.kind
    }

    /// One entry point from raw text to a tagged value; downstream code
    /// matches exhaustively over the three variants.
    pub fn parse(&self, raw: &str) -> Result<CellValue, TypeMismatch> {
        let trimmed = raw.trim();
        match self.kind {
            DimensionType::String => Ok(CellValue::String(trimmed.to_string())),
            DimensionType::Time => {
                let format = self.time.as_ref().expect("time parser compiled");
                Ok(CellValue::Time(format.parse(trimmed)?))
            }
            DimensionType::Numeric => {
                let normalized = normalize_numeric(trimmed, self.decimal_separator);
                normalized
                    .parse::<f64>()
                    .map(CellValue::Numeric)
                    .map_err(|_| TypeMismatch::of("numeric"))
            }
        }
    }

    /// Canonical label used for interning: trimmed raw text, with numeric
    /// labels normalized so `1 234,5` and `1234.5` share an axis value.
    pub fn canonical(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self.kind {
            DimensionType::Numeric => normalize_numeric(trimmed, self.decimal_separator),
            _ => trimmed.to_string(),
        }
    }
}

/// Format-driven time parsing. Formats containing `%Q` (quarter) or a bare
/// `%Y` are matched by a derived regex since chrono has no quarter
/// specifier; everything else goes through chrono, and an empty format
/// tries a built-in list.
#[derive(Debug, Clone)]
enum TimeFormat {
    Chrono(String),
    Pattern(Box<PatternFormat>),
    Auto,
}

const AUTO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];
const AUTO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y"];
const AUTO_PATTERN_FORMATS: &[&str] = &["%Y-Q%Q", "%YQ%Q"];

impl TimeFormat {
    fn compile(units: &str) -> Self {
        if units.is_empty() {
            TimeFormat::Auto
        } else if let Some(pattern) = PatternFormat::compile(units) {
            TimeFormat::Pattern(Box::new(pattern))
        } else {
            TimeFormat::Chrono(units.to_string())
        }
    }

    fn parse(&self, raw: &str) -> Result<NaiveDateTime, TypeMismatch> {
        match self {
            TimeFormat::Chrono(format) => parse_chrono(raw, format),
            TimeFormat::Pattern(pattern) => pattern.parse(raw),
            TimeFormat::Auto => {
                for format in AUTO_DATETIME_FORMATS.iter().chain(AUTO_DATE_FORMATS) {
                    if let Ok(parsed) = parse_chrono(raw, format) {
                        return Ok(parsed);
                    }
                }
                for format in AUTO_PATTERN_FORMATS {
                    let pattern = PatternFormat::compile(format).expect("builtin quarter format");
                    if let Ok(parsed) = pattern.parse(raw) {
                        return Ok(parsed);
                    }
                }
                Err(TypeMismatch::of("time"))
            }
        }
    }
}

fn parse_chrono(raw: &str, format: &str) -> Result<NaiveDateTime, TypeMismatch> {
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
        return Ok(parsed);
    }
    NaiveDate::parse_from_str(raw, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or(TypeMismatch::of("time"))
}

/// Regex-backed format for specifiers chrono cannot express on its own:
/// `%Q` quarters and year-only formats.
#[derive(Debug, Clone)]
struct PatternFormat {
    regex: Regex,
}

impl PatternFormat {
    fn compile(format: &str) -> Option<Self> {
        if !format.contains("%Q") && format != "%Y" {
            return None;
        }
        let mut pattern = regex::escape(format);
        for (spec, group) in [
            ("%Y", r"(?P<y>\d{1,4})"),
            ("%Q", r"(?P<q>[1-4])"),
            ("%m", r"(?P<m>\d{1,2})"),
            ("%d", r"(?P<d>\d{1,2})"),
            ("%H", r"(?P<hour>\d{1,2})"),
            ("%M", r"(?P<min>\d{1,2})"),
            ("%S", r"(?P<sec>\d{1,2})"),
        ] {
            pattern = pattern.replace(spec, group);
        }
        let regex = Regex::new(&format!("^{pattern}$")).ok()?;
        Some(Self { regex })
    }

    fn parse(&self, raw: &str) -> Result<NaiveDateTime, TypeMismatch> {
        let captures = self.regex.captures(raw).ok_or(TypeMismatch::of("time"))?;
        let group = |name: &str, default: u32| -> Option<u32> {
            match captures.name(name) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(default),
            }
        };
        let year: i32 = captures
            .name("y")
            .and_then(|m| m.as_str().parse().ok())
            .ok_or(TypeMismatch::of("time"))?;
        let month = match captures.name("q") {
            Some(q) => {
                let quarter: u32 = q.as_str().parse().map_err(|_| TypeMismatch::of("time"))?;
                (quarter - 1) * 3 + 1
            }
            None => group("m", 1).ok_or(TypeMismatch::of("time"))?,
        };
        let day = group("d", 1).ok_or(TypeMismatch::of("time"))?;
        let hour = group("hour", 0).ok_or(TypeMismatch::of("time"))?;
        let min = group("min", 0).ok_or(TypeMismatch::of("time"))?;
        let sec = group("sec", 0).ok_or(TypeMismatch::of("time"))?;
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, min, sec))
            .ok_or(TypeMismatch::of("time"))
    }
}

/// Strip thousands separators and map the configured decimal separator to
/// `.` so the result parses with `f64::from_str`.
pub fn normalize_numeric(raw: &str, decimal_separator: char) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c == decimal_separator {
            out.push('.');
        } else if matches!(c, ',' | '.' | '\'' | ' ' | '\u{a0}') {
            // Grouping separator, dropped.
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a data cell as `f64`, tolerating a leading currency-like prefix.
pub fn parse_data_value(raw: &str, decimal_separator: char) -> Option<f64> {
    let normalized = normalize_numeric(raw, decimal_separator);
    if let Ok(v) = normalized.parse::<f64>() {
        return Some(v);
    }
    let start = normalized.find(|c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))?;
    normalized[start..].parse::<f64>().ok()
}

/// True when a field looks numeric for guessing purposes. Empty fields
/// count as numeric; currency prefixes do not.
pub fn is_numeric_field(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || NUMERIC_FIELD.is_match(trimmed)
}

/// Find a built-in time format that parses every sampled value, for
/// dimension type guessing. Returns the format string for `units`.
pub fn guess_time_format<'a, I>(values: I) -> Option<&'static str>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let candidates = AUTO_DATETIME_FORMATS
        .iter()
        .chain(AUTO_DATE_FORMATS)
        .chain(AUTO_PATTERN_FORMATS);
    for format in candidates {
        let time = TimeFormat::compile(format);
        let mut any = false;
        let mut all = true;
        for value in values.clone() {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                continue;
            }
            any = true;
            if time.parse(trimmed).is_err() {
                all = false;
                break;
            }
        }
        if any && all {
            return Some(format);
        }
    }
    None
}

/// True when a data cell should be treated as missing.
pub fn is_null_marker(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || NULL_MARKER.is_match(trimmed)
}
