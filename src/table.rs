//! Flat CSV tables addressed by column name.

use crate::error::{AnalysisError, AnalysisResult};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Table {
    path: PathBuf,
    columns: HashMap<String, usize>,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn from_path(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| AnalysisError::Io {
            path: path.clone(),
            source,
        })?;

        let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = reader
            .headers()
            .map_err(|source| AnalysisError::Csv {
                path: path.clone(),
                source,
            })?
            .clone();

        let mut columns = HashMap::new();
        for (index, name) in headers.iter().enumerate() {
            // First occurrence wins for duplicated headers
            columns.entry(name.trim().to_string()).or_insert(index);
        }

        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| AnalysisError::Csv {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), rows = rows.len(), "loaded table");
        Ok(Self { path, columns, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.get(name.trim()).copied()
    }

    /// Index of a column the run cannot proceed without.
    pub fn require(&self, name: &str) -> AnalysisResult<usize> {
        self.column(name).ok_or_else(|| AnalysisError::MissingColumn {
            path: self.path.clone(),
            column: name.trim().to_string(),
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|record| Row { record })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    /// Cell text, or `None` when the cell is absent or blank.
    pub fn get(&self, column: usize) -> Option<&'a str> {
        self.record
            .get(column)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn get_opt(&self, column: Option<usize>) -> Option<&'a str> {
        column.and_then(|index| self.get(index))
    }

    pub fn get_string(&self, column: Option<usize>) -> Option<String> {
        self.get_opt(column).map(str::to_string)
    }
}

/// Write `rows` under an explicit header row, creating the parent directory.
///
/// The header is always written, so an empty result still yields a valid table.
pub fn write_table<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> AnalysisResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| AnalysisError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let csv_error = |source| AnalysisError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_error)?;
    writer.write_record(headers).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush().map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), rows = rows.len(), "wrote table");
    Ok(())
}
