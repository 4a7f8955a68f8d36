use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use dbconsole_core::query_runner::{
    CellValue, ExportFailure, ExportFormat, ResultExporter, ResultGrid,
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create export directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write export file at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize JSON export: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes a grid as CSV. NULL becomes an empty unquoted field while an empty
/// string is written as `""`, so the two stay distinguishable.
pub fn export_grid_to_csv(path: &Path, grid: &ResultGrid) -> Result<usize, ExportError> {
    let mut content = String::new();
    content.push_str(
        &grid
            .columns
            .iter()
            .map(|header| csv_escape(header))
            .collect::<Vec<_>>()
            .join(","),
    );
    content.push('\n');

    for row in &grid.rows {
        let mut values = Vec::with_capacity(grid.columns.len());
        for column_index in 0..grid.columns.len() {
            let value = match row.get(column_index) {
                None | Some(CellValue::Null) => String::new(),
                Some(CellValue::Value(text)) if text.is_empty() => "\"\"".to_string(),
                Some(CellValue::Value(text)) => csv_escape(text),
            };
            values.push(value);
        }
        content.push_str(&values.join(","));
        content.push('\n');
    }

    write_file(path, content.as_bytes())?;
    Ok(grid.rows.len())
}

/// Writes a grid as an array of objects keyed by column; NULL is JSON `null`.
pub fn export_grid_to_json(path: &Path, grid: &ResultGrid) -> Result<usize, ExportError> {
    let mut records = Vec::with_capacity(grid.rows.len());
    for row in &grid.rows {
        let mut object = Map::with_capacity(grid.columns.len());
        for (column_index, header) in grid.columns.iter().enumerate() {
            let value = match row.get(column_index) {
                Some(CellValue::Value(text)) => Value::String(text.clone()),
                None | Some(CellValue::Null) => Value::Null,
            };
            object.insert(header.clone(), value);
        }
        records.push(Value::Object(object));
    }

    let payload = serde_json::to_string_pretty(&records)?;
    write_file(path, payload.as_bytes())?;
    Ok(grid.rows.len())
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ExportError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[must_use]
pub fn results_file_name(format: ExportFormat, generated_at: DateTime<Utc>) -> String {
    format!(
        "query_results_{}.{}",
        generated_at.format("%Y-%m-%dT%H-%M-%S%.3fZ"),
        format.extension()
    )
}

/// Saves exports as files under one directory.
#[derive(Debug, Clone)]
pub struct FileResultExporter {
    dir: PathBuf,
}

impl FileResultExporter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn export_grid_at(
        &self,
        format: ExportFormat,
        grid: &ResultGrid,
        generated_at: DateTime<Utc>,
    ) -> Result<PathBuf, ExportError> {
        let path = self.dir.join(results_file_name(format, generated_at));
        match format {
            ExportFormat::Spreadsheet => export_grid_to_csv(&path, grid)?,
            ExportFormat::Json => export_grid_to_json(&path, grid)?,
        };
        Ok(path)
    }
}

impl ResultExporter for FileResultExporter {
    fn export_grid(&self, format: ExportFormat, grid: &ResultGrid) -> Result<PathBuf, ExportFailure> {
        self.export_grid_at(format, grid, Utc::now())
            .map_err(|error| ExportFailure::new(error.to_string()))
    }

    fn save_blob(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportFailure> {
        let path = self.dir.join(file_name);
        write_file(&path, bytes).map_err(|error| ExportFailure::new(error.to_string()))?;
        Ok(path)
    }
}
