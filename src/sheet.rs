//! Spreadsheet output stage.
//!
//! Owns the workbook for the lifetime of one run: header row in bold, one
//! row per export record in fetch order, auto-sized columns, saved once at
//! the end (overwriting any existing file at the path).

use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ExportError, Result};
use crate::normalize::ExportRow;

/// Worksheet name in the output file.
pub const SHEET_NAME: &str = "Email Export";

/// First four column headers; the fifth differs per variant.
pub const BASE_HEADERS: [&str; 4] = ["Date Received", "From", "Subject", "Body Preview"];

/// Fifth-column header for the Graph variant.
pub const STATUS_HEADER: &str = "Status";

/// Fifth-column header for the IMAP variant.
pub const FOLDER_HEADER: &str = "Folder";

/// Columns never grow wider than this many characters.
const MAX_COLUMN_WIDTH: usize = 50;

/// Column width for a given longest cell text: the text plus a little
/// padding, capped at [`MAX_COLUMN_WIDTH`].
pub fn column_width(max_text_length: usize) -> usize {
    (max_text_length + 2).min(MAX_COLUMN_WIDTH)
}

/// Write the export rows to `path`.
///
/// `status_header` names the fifth column ("Status" or "Folder"). Column
/// sizing failures are logged and ignored; a failed save is fatal.
pub fn write_sheet(rows: &[ExportRow], status_header: &str, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(SHEET_NAME)
        .map_err(|e| ExportError::Persistence(e.to_string()))?;

    let bold = Format::new().set_bold();
    let headers: [&str; 5] = [
        BASE_HEADERS[0],
        BASE_HEADERS[1],
        BASE_HEADERS[2],
        BASE_HEADERS[3],
        status_header,
    ];
    let mut column_lengths = [0usize; 5];

    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_with_format(0, col as u16, *header, &bold)
            .map_err(|e| ExportError::Persistence(e.to_string()))?;
        column_lengths[col] = header.chars().count();
    }

    for (index, row) in rows.iter().enumerate() {
        let excel_row = (index + 1) as u32;
        for (col, value) in row.fields().iter().enumerate() {
            worksheet
                .write(excel_row, col as u16, *value)
                .map_err(|e| ExportError::Persistence(e.to_string()))?;
            column_lengths[col] = column_lengths[col].max(value.chars().count());
        }
    }

    for (col, length) in column_lengths.iter().enumerate() {
        if let Err(e) = worksheet.set_column_width(col as u16, column_width(*length) as f64) {
            warn!("Could not size column {}: {}", col, e);
        }
    }

    workbook
        .save(path)
        .map_err(|e| ExportError::Persistence(format!("{}: {}", path.display(), e)))?;

    info!("Saved {} rows to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_row(subject: &str) -> ExportRow {
        ExportRow {
            date: "2026-08-01 09:30:00".to_string(),
            sender: "alex@example.com".to_string(),
            subject: subject.to_string(),
            body_preview: "Hello".to_string(),
            status: "Read".to_string(),
        }
    }

    #[test]
    fn test_column_width_adds_padding() {
        assert_eq!(column_width(10), 12);
        assert_eq!(column_width(0), 2);
    }

    #[test]
    fn test_column_width_is_capped_at_fifty() {
        assert_eq!(column_width(48), 50);
        assert_eq!(column_width(49), 50);
        assert_eq!(column_width(500), 50);
    }

    #[test]
    fn test_write_sheet_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.xlsx");

        let rows = vec![sample_row("First"), sample_row("Second")];
        write_sheet(&rows, STATUS_HEADER, &path).unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.len() > 0);
    }

    #[test]
    fn test_write_sheet_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.xlsx");
        std::fs::write(&path, b"stale contents").unwrap();

        write_sheet(&[sample_row("Only")], FOLDER_HEADER, &path).unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert_ne!(metadata.len(), b"stale contents".len() as u64);
    }

    #[test]
    fn test_write_sheet_with_no_rows_still_writes_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.xlsx");

        write_sheet(&[], STATUS_HEADER, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_sheet_invalid_path_is_persistence_error() {
        let path = Path::new("/nonexistent-dir-for-sure/export.xlsx");
        let result = write_sheet(&[sample_row("x")], STATUS_HEADER, path);
        assert!(matches!(result, Err(ExportError::Persistence(_))));
    }
}
