//! Federal drug product file handling: hashing, extraction and parsing.
//!
//! The product file is comma separated with every field double quoted and
//! no header row. Columns, in order: drug code, product categorization,
//! class, DIN, brand name, descriptor, pediatric flag, accession number,
//! number of AIs, last update date (`DD-MON-YYYY`), AI group number.

use std::io::{Cursor, Read};

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::DrugProduct;

const MIN_COLUMNS: usize = 5;
const LAST_UPDATE_COLUMN: usize = 9;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Unpacks a download according to its shape: a zip archive (reading
/// `entry`, or the only member), a gzip stream, or plain text.
pub fn extract(bytes: &[u8], entry: Option<&str>) -> AppResult<Vec<u8>> {
    if bytes.starts_with(b"PK\x03\x04") {
        extract_zip(bytes, entry)
    } else if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut out)
            .map_err(|e| invalid("gzip", e.to_string()))?;
        Ok(out)
    } else {
        Ok(bytes.to_vec())
    }
}

fn extract_zip(bytes: &[u8], entry: Option<&str>) -> AppResult<Vec<u8>> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| invalid("zip", e.to_string()))?;

    let name = match entry {
        Some(name) => name.to_string(),
        None if archive.len() == 1 => archive
            .by_index(0)
            .map_err(|e| invalid("zip", e.to_string()))?
            .name()
            .to_string(),
        None => {
            return Err(invalid(
                "zip",
                format!("archive has {} members and no entry is configured", archive.len()),
            ));
        }
    };

    let mut file = archive
        .by_name(&name)
        .map_err(|e| invalid("zip", format!("{name}: {e}")))?;
    let mut out = Vec::new();
    file.read_to_end(&mut out)
        .map_err(|e| invalid("zip", format!("{name}: {e}")))?;
    Ok(out)
}

fn invalid(field: &str, reason: String) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        reason,
    }
}

/// Splits one quoted CSV line. `""` inside quotes is a literal quote.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn optional(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_update_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d-%b-%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Parsed products plus the 1-based line numbers that were skipped.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub products: Vec<DrugProduct>,
    pub skipped: Vec<usize>,
}

pub fn parse_products(text: &str, file_download_id: Uuid, program_code: &str) -> ParsedFile {
    let mut parsed = ParsedFile::default();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_line(line);
        let drug_code = fields.first().map(|v| v.trim()).unwrap_or_default();
        if fields.len() < MIN_COLUMNS || drug_code.is_empty() {
            tracing::warn!(line = index + 1, columns = fields.len(), "Skipping malformed drug product row");
            parsed.skipped.push(index + 1);
            continue;
        }

        parsed.products.push(DrugProduct {
            id: Uuid::new_v4(),
            file_download_id,
            program_code: program_code.to_string(),
            drug_code: drug_code.to_string(),
            product_categorization: optional(fields.get(1)),
            class: optional(fields.get(2)),
            din: fields[3].trim().to_string(),
            brand_name: fields[4].trim().to_string(),
            descriptor: optional(fields.get(5)),
            last_update: fields.get(LAST_UPDATE_COLUMN).and_then(|v| parse_update_date(v)),
        });
    }

    parsed
}
