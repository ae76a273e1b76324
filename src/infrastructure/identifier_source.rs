//! Identifier list input: CSV, first column, no header row.

use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::infrastructure::config::ConfigError;

/// Raw first-column cells from `reader`, in file order
pub fn read_identifier_cells<R: Read>(reader: R) -> Result<Vec<String>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut cells = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let cell = record.get(0).unwrap_or_default();
        cells.push(cell.trim_start_matches('\u{feff}').to_string());
    }
    Ok(cells)
}

/// Load the identifier list from `path`
pub fn load_identifier_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let unreadable = |reason: String| ConfigError::InputUnreadable {
        path: path.display().to_string(),
        reason,
    };
    let file = std::fs::File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let cells = read_identifier_cells(file).map_err(|e| unreadable(e.to_string()))?;
    info!("📋 Loaded {} identifiers from {}", cells.len(), path.display());
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_first_column_only() {
        let data = "B0ABC,ignored\nb0def\n  b0ghi  ,x,y\n";
        let cells = read_identifier_cells(data.as_bytes()).unwrap();
        assert_eq!(cells, vec!["B0ABC", "b0def", "  b0ghi  "]);
    }

    #[test]
    fn test_first_row_is_data() {
        let cells = read_identifier_cells("ASIN\nB0ABC\n".as_bytes()).unwrap();
        assert_eq!(cells.len(), 2);
    }

    #[test]
    fn test_blank_cells_are_kept_for_the_pipeline_to_skip() {
        let cells = read_identifier_cells("B0ABC\n,foo\nB0DEF\n".as_bytes()).unwrap();
        assert_eq!(cells, vec!["B0ABC", "", "B0DEF"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "\u{feff}B0ABC").unwrap();
        writeln!(file, "B0DEF").unwrap();
        let cells = load_identifier_list(file.path()).unwrap();
        assert_eq!(cells, vec!["B0ABC", "B0DEF"]);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_identifier_list(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, ConfigError::InputUnreadable { .. }));
    }
}
