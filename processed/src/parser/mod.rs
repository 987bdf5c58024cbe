//! Delimited-table reader with encoding and delimiter auto-detection.
//!
//! Turns raw bytes into a [`TypedTable`]: headers plus typed cells, with a
//! type inferred for every column from its content. Nothing election-specific
//! happens here.

use crate::models::{Cell, Column, ColumnType};

/// Values read as missing, whatever the column type.
const NULL_MARKERS: &[&str] = &["", "NaN", "nan", "NA", "N/A", "n/a", "NULL", "null", "None", "#N/A"];

/// CSV parsing error with context
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: u64,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: u64, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        CsvError::new(line, err.to_string())
    }
}

/// Untyped table as read from the file.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Table with one inferred type per column.
#[derive(Debug, Clone)]
pub struct TypedTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the specified encoding.
///
/// Unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the header line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse decoded content with an explicit delimiter.
///
/// Quoted fields are supported; blank lines are skipped. Every record must
/// have as many fields as the header.
pub fn parse_table(content: &str, delimiter: char, encoding: String) -> Result<RawTable, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::new(1, "No headers found"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable {
        headers,
        rows,
        encoding,
        delimiter,
    })
}

/// Parse raw bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> Result<RawTable, CsvError> {
    if bytes.is_empty() {
        return Err(CsvError::new(1, "Empty CSV file"));
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);

    parse_table(&content, delimiter, encoding)
}

fn is_null_marker(value: &str) -> bool {
    NULL_MARKERS.contains(&value.trim())
}

fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Infer the type of one column from all of its values.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let mut kind = ColumnType::Empty;

    for value in values {
        if is_null_marker(value) {
            continue;
        }
        let trimmed = value.trim();
        kind = match kind {
            ColumnType::Empty | ColumnType::Integer if trimmed.parse::<i64>().is_ok() => ColumnType::Integer,
            ColumnType::Empty | ColumnType::Integer | ColumnType::Float if parse_float(trimmed).is_some() => {
                ColumnType::Float
            }
            _ => return ColumnType::Text,
        };
    }

    kind
}

/// Convert one raw value to a cell of the given column type.
pub fn to_cell(value: &str, kind: ColumnType) -> Cell {
    if is_null_marker(value) {
        return Cell::Null;
    }
    match kind {
        ColumnType::Integer => value.trim().parse().map(Cell::Int).unwrap_or(Cell::Null),
        ColumnType::Float => parse_float(value).map(Cell::Float).unwrap_or(Cell::Null),
        ColumnType::Text => Cell::Text(value.to_string()),
        ColumnType::Empty => Cell::Null,
    }
}

/// Infer column types and convert every value.
pub fn infer_types(raw: RawTable) -> TypedTable {
    let kinds: Vec<ColumnType> = (0..raw.headers.len())
        .map(|i| infer_column_type(raw.rows.iter().map(|row| row[i].as_str())))
        .collect();

    let columns = raw
        .headers
        .into_iter()
        .zip(&kinds)
        .map(|(name, &kind)| Column { name, kind })
        .collect();

    let rows = raw
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(&kinds)
                .map(|(value, &kind)| to_cell(value, kind))
                .collect()
        })
        .collect();

    TypedTable { columns, rows }
}
