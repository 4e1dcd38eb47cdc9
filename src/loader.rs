use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::downloader::grid_to_csv;
use crate::errors::StoreError;
use crate::store::{RawRecord, SheetBackend, records_from_grid};

/// Sheet backed by a CSV file on disk.
///
/// The first line is the header row. A missing file reads as an empty
/// sheet, so a new roster can start from nothing.
///
/// # Examples
/// ```no_run
/// use roster::loader::CsvSheet;
/// use roster::store::RecordStore;
///
/// let store = RecordStore::new(Box::new(CsvSheet::new("database/roster.csv")));
/// let table = store.load_or_empty();
/// println!("{} members", table.len());
/// ```
pub struct CsvSheet {
    path: PathBuf,
}

impl CsvSheet {
    pub fn new(path: impl AsRef<Path>) -> Self {
        CsvSheet {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_grid(&self) -> Result<Vec<Vec<String>>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse_csv(content.trim_start_matches('\u{feff}'))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_grid(&self, grid: &[Vec<String>]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, grid_to_csv(grid))?;
        debug!("wrote {} rows to {}", grid.len(), self.path.display());
        Ok(())
    }
}

impl SheetBackend for CsvSheet {
    fn get_all_records(&self) -> Result<Vec<RawRecord>, StoreError> {
        Ok(records_from_grid(&self.read_grid()?))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.write_grid(&[])
    }

    fn update(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        self.write_grid(rows)
    }
}

/// Parses CSV text into rows of fields.
///
/// Quoted fields may contain commas, doubled quotes and line breaks, which
/// visitation notes do. Line endings may be `\n` or `\r\n`; a trailing
/// newline does not produce an empty row.
pub fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut row_started = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        row_started = true;
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current_field.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                row.push(std::mem::take(&mut current_field));
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                row.push(std::mem::take(&mut current_field));
                rows.push(std::mem::take(&mut row));
                row_started = false;
            }
            _ => current_field.push(c),
        }
    }

    if row_started {
        row.push(current_field);
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;

    #[test]
    fn parses_quotes_commas_and_newlines() {
        let rows = parse_csv("a,b,c\n\"x, y\",\"say \"\"hi\"\"\",\"line1\nline2\"\r\n1,,3\n");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["a", "b", "c"]);
        assert_eq!(rows[1], vec!["x, y", "say \"hi\"", "line1\nline2"]);
        assert_eq!(rows[2], vec!["1", "", "3"]);
    }

    #[test]
    fn last_line_without_newline_is_kept() {
        assert_eq!(parse_csv("a,b\n1,2"), vec![vec!["a", "b"], vec!["1", "2"]]);
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn missing_file_is_an_empty_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = CsvSheet::new(dir.path().join("none.csv"));
        assert!(sheet.get_all_records().unwrap().is_empty());
    }

    #[test]
    fn csv_sheet_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("roster.csv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "이름,주소,심방 기록\nAlice,\"1 Main, Apt 2\",\"[2024-01-01] first\n[2024-02-01] second\"\n",
        )
        .unwrap();

        let store = RecordStore::new(Box::new(CsvSheet::new(&path)));
        let mut table = store.load().unwrap();
        assert_eq!(table.records()[0].address, "1 Main, Apt 2");
        assert_eq!(
            table.records()[0].visitation_log(),
            "[2024-01-01] first\n[2024-02-01] second"
        );

        store.save(&mut table).unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.records(), table.records());
    }
}
