use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bout_ledger_core::{FieldMap, LedgerError};
use encoding_rs::WINDOWS_1252;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    Utf8,
    Windows1252,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadedRows {
    pub rows: Vec<FieldMap>,
    /// `None` when the dataset file did not exist yet.
    pub encoding: Option<SourceEncoding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub sha256: String,
}

/// Decode persisted bytes: UTF-8, then Windows-1252. A leading UTF-8 BOM is
/// dropped before either attempt.
///
/// Windows-1252 as defined by the WHATWG encoding standard maps every byte, so
/// the fallback always succeeds today. The error arm is kept so the chain can
/// gain a stricter step without changing callers.
///
/// # Errors
/// Returns [`LedgerError::Decode`] when no encoding in the chain accepts the bytes.
pub fn decode_text(bytes: &[u8]) -> Result<(String, SourceEncoding), LedgerError> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(body) {
        return Ok((text.to_string(), SourceEncoding::Utf8));
    }

    WINDOWS_1252
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| (text.into_owned(), SourceEncoding::Windows1252))
        .ok_or_else(|| {
            LedgerError::Decode("bytes are neither UTF-8 nor Windows-1252".to_string())
        })
}

/// Parse CSV text into rows keyed by the raw header cells.
///
/// # Errors
/// Returns an error when the CSV structure cannot be read.
pub fn parse_rows(text: &str) -> Result<Vec<FieldMap>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    let headers = reader.headers().context("failed to read CSV header row")?.clone();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read CSV row {}", index + 2))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), cell.to_string()))
            .collect::<FieldMap>();
        rows.push(row);
    }
    Ok(rows)
}

/// Read the persisted dataset. A missing file is an empty dataset.
///
/// # Errors
/// Returns an error when the file exists but cannot be read, decoded, or parsed.
pub fn read_dataset(path: &Path) -> Result<LoadedRows> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "dataset file not found; starting empty");
        return Ok(LoadedRows { rows: Vec::new(), encoding: None });
    }

    let bytes =
        fs::read(path).with_context(|| format!("failed to read dataset {}", path.display()))?;
    let (text, encoding) =
        decode_text(&bytes).with_context(|| format!("failed to decode dataset {}", path.display()))?;
    if encoding != SourceEncoding::Utf8 {
        tracing::warn!(path = %path.display(), ?encoding, "dataset was not valid UTF-8");
    }

    let rows =
        parse_rows(&text).with_context(|| format!("failed to parse dataset {}", path.display()))?;
    tracing::debug!(path = %path.display(), rows = rows.len(), ?encoding, "read dataset");
    Ok(LoadedRows { rows, encoding: Some(encoding) })
}

/// Render rows as UTF-8 CSV with a leading BOM, in `columns` order.
///
/// Cells for columns a row does not carry are written empty.
///
/// # Errors
/// Returns an error when CSV serialization fails.
pub fn render_rows(rows: &[FieldMap], columns: &[String]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(UTF8_BOM.to_vec());
    writer.write_record(columns).context("failed to write CSV header row")?;
    for (index, row) in rows.iter().enumerate() {
        let cells = columns.iter().map(|column| row.get(column).map_or("", String::as_str));
        writer
            .write_record(cells)
            .with_context(|| format!("failed to write CSV row {}", index + 2))?;
    }
    writer.into_inner().map_err(|err| anyhow!("failed to flush CSV buffer: {}", err.error()))
}

/// Write the dataset, creating missing parent directories.
///
/// # Errors
/// Returns an error when directories or the file cannot be written.
pub fn write_dataset(path: &Path, rows: &[FieldMap], columns: &[String]) -> Result<WriteSummary> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dataset directory {}", parent.display()))?;
    }

    let bytes = render_rows(rows, columns)?;
    fs::write(path, &bytes)
        .with_context(|| format!("failed to write dataset {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let summary = WriteSummary {
        path: path.to_path_buf(),
        rows: rows.len(),
        columns: columns.len(),
        sha256: format!("{:x}", hasher.finalize()),
    };
    tracing::info!(path = %path.display(), rows = summary.rows, sha256 = %summary.sha256, "wrote dataset");
    Ok(summary)
}

fn stringify(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Read fetched observations, one JSON object per line. Scalars are stringified.
///
/// # Errors
/// Returns an error when the file cannot be read or a line is not a JSON object.
pub fn read_observations(path: &Path) -> Result<Vec<FieldMap>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open observations file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut observations = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| {
            format!("failed to read line {} from {}", index + 1, path.display())
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(trimmed).with_context(|| {
            format!("failed to parse NDJSON row {} from {}", index + 1, path.display())
        })?;
        let serde_json::Value::Object(object) = value else {
            return Err(anyhow!(
                "NDJSON row {} from {} is not a JSON object",
                index + 1,
                path.display()
            ));
        };
        observations.push(
            object.into_iter().map(|(key, value)| (key, stringify(value))).collect::<FieldMap>(),
        );
    }

    Ok(observations)
}
