//! Spreadsheet output.
//!
//! [`SheetSink`] is what the pipeline writes to; [`XlsxSheetWriter`] keeps
//! the workbook in memory and saves it on [`SheetSink::finish`] under the
//! first free file name.

use rust_xlsxwriter::{Format, Image, ObjectMovement, Workbook, Worksheet, XlsxError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::infrastructure::config::OutputConfig;
use crate::infrastructure::row_assembler::{ColumnSpec, SheetRow};

/// Highest numbered suffix tried before falling back to a timestamped name
const MAX_NUMBERED_SUFFIX: u32 = 99;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Worksheet error: {0}")]
    Worksheet(String),

    #[error("Failed to save workbook to {path}: {reason}")]
    Save { path: String, reason: String },

    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },
}

impl SinkError {
    /// A failed row does not prevent later rows; a failed save ends the run
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Save { .. })
    }
}

impl From<XlsxError> for SinkError {
    fn from(err: XlsxError) -> Self {
        Self::Worksheet(err.to_string())
    }
}

/// Destination for placed rows
pub trait SheetSink: Send {
    /// Header labels and widths established by the first row
    fn write_header(&mut self, columns: &[ColumnSpec]) -> Result<(), SinkError>;

    /// Columns added after the first row
    fn apply_column_plan(&mut self, columns: &[ColumnSpec]) -> Result<(), SinkError>;

    fn write_row(&mut self, row: SheetRow) -> Result<(), SinkError>;

    /// Persist; returns the path written, if any
    fn finish(&mut self) -> Result<Option<PathBuf>, SinkError>;
}

/// `<base>.xlsx`, else `<base>_2.xlsx` … `<base>_99.xlsx`, else a timestamped name
/// on the desktop (or in `dir` when there is no desktop directory).
pub fn resolve_output_path(dir: &Path, base_name: &str) -> PathBuf {
    let primary = dir.join(format!("{base_name}.xlsx"));
    if !primary.exists() {
        return primary;
    }
    for n in 2..=MAX_NUMBERED_SUFFIX {
        let candidate = dir.join(format!("{base_name}_{n}.xlsx"));
        if !candidate.exists() {
            return candidate;
        }
    }
    fallback_output_path(dir, base_name)
}

fn fallback_output_path(dir: &Path, base_name: &str) -> PathBuf {
    let desktop = dirs::desktop_dir().unwrap_or_else(|| dir.to_path_buf());
    desktop.join(format!("{}_{}.xlsx", base_name, chrono::Utc::now().timestamp()))
}

/// xlsx [`SheetSink`] backed by `rust_xlsxwriter`
pub struct XlsxSheetWriter {
    workbook: Workbook,
    header_format: Format,
    output_dir: PathBuf,
    base_name: String,
    image_export_dir: Option<PathBuf>,
}

impl XlsxSheetWriter {
    pub fn new(config: &OutputConfig) -> Result<Self, SinkError> {
        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name(&config.worksheet_name)?;

        let output_dir = config
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        if let Some(export_dir) = &config.image_export_dir {
            std::fs::create_dir_all(export_dir).map_err(|e| SinkError::Io {
                path: export_dir.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            workbook,
            header_format: Format::new().set_bold(),
            output_dir,
            base_name: config.base_name.clone(),
            image_export_dir: config.image_export_dir.clone(),
        })
    }

    fn sheet(&mut self) -> Result<&mut Worksheet, SinkError> {
        Ok(self.workbook.worksheet_from_index(0)?)
    }

    fn apply_columns(&mut self, columns: &[ColumnSpec]) -> Result<(), SinkError> {
        let format = self.header_format.clone();
        let sheet = self.sheet()?;
        for spec in columns {
            sheet.write_string_with_format(0, spec.column, &spec.header, &format)?;
            sheet.set_column_width(spec.column, spec.width)?;
        }
        Ok(())
    }

    fn export_image(&self, name: &str, bytes: &[u8]) {
        let Some(dir) = &self.image_export_dir else {
            return;
        };
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, bytes) {
            warn!("⚠️ Failed to export image {}: {}", path.display(), e);
        }
    }
}

impl SheetSink for XlsxSheetWriter {
    fn write_header(&mut self, columns: &[ColumnSpec]) -> Result<(), SinkError> {
        self.apply_columns(columns)?;
        self.sheet()?.set_freeze_panes(1, 0)?;
        Ok(())
    }

    fn apply_column_plan(&mut self, columns: &[ColumnSpec]) -> Result<(), SinkError> {
        debug!("Growing image region by {} columns", columns.len());
        self.apply_columns(columns)
    }

    fn write_row(&mut self, row: SheetRow) -> Result<(), SinkError> {
        for placed in &row.images {
            self.export_image(&placed.export_name, &placed.bytes);
        }

        let sheet = self.sheet()?;
        sheet.set_row_height(row.row, row.height_pt)?;
        for (column, value) in (0u16..).zip(&row.cells) {
            sheet.write_string(row.row, column, value)?;
        }

        for placed in &row.images {
            let image = match Image::new_from_buffer(&placed.bytes) {
                Ok(image) => image
                    .set_scale_width(placed.x_scale)
                    .set_scale_height(placed.y_scale)
                    .set_object_movement(ObjectMovement::MoveAndSizeWithCells),
                Err(e) => {
                    warn!("⚠️ Image {} not embedded: {}", placed.export_name, e);
                    continue;
                }
            };
            sheet.insert_image_with_offset(
                row.row,
                placed.column,
                &image,
                placed.x_offset,
                placed.y_offset,
            )?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<PathBuf>, SinkError> {
        let path = resolve_output_path(&self.output_dir, &self.base_name);
        match self.workbook.save(&path) {
            Ok(()) => {
                info!("💾 Workbook saved: {}", path.display());
                Ok(Some(path))
            }
            Err(first) => {
                let fallback = fallback_output_path(&self.output_dir, &self.base_name);
                warn!(
                    "⚠️ Could not save {} ({}), trying {}",
                    path.display(),
                    first,
                    fallback.display()
                );
                self.workbook.save(&fallback).map_err(|e| SinkError::Save {
                    path: fallback.display().to_string(),
                    reason: e.to_string(),
                })?;
                info!("💾 Workbook saved: {}", fallback.display());
                Ok(Some(fallback))
            }
        }
    }
}
