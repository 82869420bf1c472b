//! Row types shared by the CSV loaders.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("required table '{table}' not found in {}", dir.display())]
    MissingTable { table: &'static str, dir: PathBuf },

    #[error("invalid flag '{0}'; expected true/false, yes/no or 1/0")]
    InvalidFlag(String),
}

/// Read every row of `path`, tagging errors with the table name and the
/// 1-based line number (header is line 1).
pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path, table: &str) -> Result<Vec<(usize, T)>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {table} CSV '{}'", path.display()))?;
    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        let line = i + 2;
        let record: T = result.with_context(|| format!("parsing {table} record at line {line}"))?;
        rows.push((line, record));
    }
    Ok(rows)
}

pub(crate) fn require(dir: &Path, table: &'static str) -> Result<PathBuf> {
    let path = dir.join(table);
    if !path.is_file() {
        return Err(InputError::MissingTable {
            table,
            dir: dir.to_path_buf(),
        }
        .into());
    }
    Ok(path)
}

pub(crate) fn optional(dir: &Path, table: &str) -> Option<PathBuf> {
    let path = dir.join(table);
    path.is_file().then_some(path)
}

/// Boolean column value. Empty cells count as false.
pub(crate) fn parse_flag(value: Option<&str>) -> Result<bool, InputError> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "f" | "no" | "n" => Ok(false),
        "1" | "true" | "t" | "yes" | "y" => Ok(true),
        _ => Err(InputError::InvalidFlag(raw.to_string())),
    }
}
