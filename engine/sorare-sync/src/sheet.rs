//! Tabular sheets
//!
//! A [`Table`] is a rectangular grid with a named header row. Data rows are
//! addressed from 0 (the first row under the header) and columns by their
//! position in the header. [`CsvTable`] keeps one sheet in a CSV file and
//! rewrites the file after every mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// One data row keyed by header name
pub type Record = HashMap<String, String>;

/// Errors raised by sheet operations
#[derive(Error, Debug)]
pub enum SheetError {
    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A column outside the header was addressed
    #[error("column {column} is outside the {width} header columns of sheet {sheet}")]
    ColumnOutOfRange { sheet: String, column: usize, width: usize },

    /// A header name does not exist
    #[error("sheet {sheet} has no column named {name:?}")]
    UnknownColumn { sheet: String, name: String },
}

/// Result type alias for sheet operations
pub type Result<T> = std::result::Result<T, SheetError>;

/// A single-cell write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    /// Data row, 0 being the first row below the header
    pub row: usize,

    /// Column position in the header
    pub column: usize,

    /// New cell content
    pub value: String,
}

/// A named-column table
pub trait Table: Send + Sync {
    /// Sheet name
    fn name(&self) -> &str;

    /// Current header row
    fn headers(&self) -> &[String];

    /// Number of data rows
    fn row_count(&self) -> usize;

    /// All data rows keyed by header
    fn records(&self) -> Vec<Record>;

    /// Make the header row equal `expected`, remapping existing data by column
    /// name. Returns whether the header changed.
    fn ensure_headers(&mut self, expected: &[String]) -> Result<bool>;

    /// Overwrite whole data rows in one write, growing the table if needed
    fn write_rows(&mut self, rows: Vec<(usize, Vec<String>)>) -> Result<()>;

    /// Apply sparse cell writes
    fn batch_update(&mut self, updates: &[CellUpdate]) -> Result<()>;

    /// Add rows after the last data row
    fn append_rows(&mut self, rows: Vec<Vec<String>>) -> Result<()>;

    /// Clear the sheet and write a new header and body
    fn replace_all(&mut self, headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<()>;

    /// Position of a header
    fn column_index(&self, name: &str) -> Result<usize> {
        self.headers().iter().position(|h| h == name).ok_or_else(|| SheetError::UnknownColumn {
            sheet: self.name().to_string(),
            name: name.to_string(),
        })
    }
}

/// Sheet stored as a CSV file
#[derive(Debug, Clone)]
pub struct CsvTable {
    name: String,
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Open a sheet, starting empty when the file does not exist yet
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let name = name.into();
        let path = path.into();

        if !path.exists() {
            debug!("Sheet {} has no file at {:?} yet", name, path);
            return Ok(Self { name, path, headers: Vec::new(), rows: Vec::new() });
        }

        let mut reader =
            csv::ReaderBuilder::new().has_headers(true).flexible(true).from_path(&path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let width = headers.len();

        let mut rows = Vec::new();
        for record in reader.records() {
            let mut row: Vec<String> = record?.iter().map(str::to_string).collect();
            row.resize(width.max(row.len()), String::new());
            rows.push(row);
        }

        debug!("Loaded sheet {} with {} rows from {:?}", name, rows.len(), path);
        Ok(Self { name, path, headers, rows })
    }

    /// File backing the sheet
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw row contents
    pub fn row(&self, row: usize) -> Option<&[String]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    fn width(&self) -> usize {
        self.headers.len()
    }

    fn ensure_row(&mut self, row: usize) {
        let width = self.width();
        while self.rows.len() <= row {
            self.rows.push(vec![String::new(); width]);
        }
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("csv.tmp");

        if self.headers.is_empty() && self.rows.is_empty() {
            std::fs::write(&temp_path, "")?;
        } else {
            let mut writer = csv::WriterBuilder::new().flexible(true).from_path(&temp_path)?;
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl Table for CsvTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| self.headers.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    fn ensure_headers(&mut self, expected: &[String]) -> Result<bool> {
        if self.headers == expected {
            debug!("Sheet {} headers already match", self.name);
            return Ok(false);
        }

        if self.headers.is_empty() {
            debug!("Sheet {} has no headers, writing {} columns", self.name, expected.len());
        } else {
            warn!(
                "Sheet {} headers differ ({} columns, expected {}), rewriting header row",
                self.name,
                self.headers.len(),
                expected.len()
            );
        }

        let old_positions: HashMap<&str, usize> =
            self.headers.iter().enumerate().map(|(i, h)| (h.as_str(), i)).collect();

        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                expected
                    .iter()
                    .map(|header| {
                        old_positions
                            .get(header.as_str())
                            .and_then(|&i| row.get(i))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect::<Vec<String>>()
            })
            .collect();

        self.headers = expected.to_vec();
        self.rows = rows;
        self.persist()?;

        Ok(true)
    }

    fn write_rows(&mut self, rows: Vec<(usize, Vec<String>)>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let width = self.width();
        let count = rows.len();
        for (row, mut values) in rows {
            values.resize(width, String::new());
            self.ensure_row(row);
            self.rows[row] = values;
        }

        debug!("Rewrote {} rows of sheet {}", count, self.name);
        self.persist()
    }

    fn batch_update(&mut self, updates: &[CellUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let width = self.width();
        if let Some(bad) = updates.iter().find(|u| u.column >= width) {
            return Err(SheetError::ColumnOutOfRange {
                sheet: self.name.clone(),
                column: bad.column,
                width,
            });
        }

        for update in updates {
            self.ensure_row(update.row);
            self.rows[update.row][update.column] = update.value.clone();
        }

        debug!("Applied {} cell updates to sheet {}", updates.len(), self.name);
        self.persist()
    }

    fn append_rows(&mut self, rows: Vec<Vec<String>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let width = self.width();
        let count = rows.len();
        self.rows.extend(rows.into_iter().map(|mut row| {
            row.resize(width, String::new());
            row
        }));

        debug!("Appended {} rows to sheet {}", count, self.name);
        self.persist()
    }

    fn replace_all(&mut self, headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<()> {
        let width = headers.len();
        self.headers = headers;
        self.rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        self.persist()
    }
}
