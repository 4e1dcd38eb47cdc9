use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::error::Error;

use crate::member::Column;
use crate::roster::Table;

/// Convert a grid of cells to CSV text
///
/// Fields holding commas, quotes or line breaks are quoted, with inner
/// quotes doubled. Every row ends with `\n`.
pub fn grid_to_csv(grid: &[Vec<String>]) -> String {
    let mut csv_content = String::new();
    for row in grid {
        for (c, value) in row.iter().enumerate() {
            if c > 0 {
                csv_content.push(',');
            }
            if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
                let escaped = value.replace('"', "\"\"");
                csv_content.push_str(&format!("\"{}\"", escaped));
            } else {
                csv_content.push_str(value);
            }
        }
        csv_content.push('\n');
    }
    csv_content
}

/// Convert the roster to CSV format
///
/// The output uses the sheet's header labels and column order, so it can be
/// imported back through [`CsvSheet`](crate::loader::CsvSheet).
///
/// # Examples
/// ```
/// use roster::downloader::to_csv;
/// use roster::member::NewMember;
/// use roster::roster::Table;
///
/// let mut table = Table::default();
/// table.register(NewMember { name: "Alice".into(), ..Default::default() }).unwrap();
/// let csv = to_csv(&table);
/// assert!(csv.starts_with("ID,이름,"));
/// ```
pub fn to_csv(table: &Table) -> String {
    let mut grid = Vec::with_capacity(table.len() + 1);
    grid.push(Column::header_row());
    grid.extend(table.iter().map(|r| r.to_row()));
    grid_to_csv(&grid)
}

/// Columns written to spreadsheet exports. Photos are left out: they are
/// data URIs that spreadsheet programs cannot show.
const XLSX_COLUMNS: [Column; 12] = [
    Column::Id,
    Column::Name,
    Column::Role,
    Column::Status,
    Column::Phone,
    Column::BirthDate,
    Column::Email,
    Column::Address,
    Column::BusinessAddress,
    Column::FamilyNote,
    Column::MinistryHistory,
    Column::VisitationLog,
];

/// Convert the roster to XLSX format
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    let bold = Format::new().set_bold();
    let wrap = Format::new().set_text_wrap();

    for (c, column) in XLSX_COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, column.header(), &bold)?;
    }

    for (r, record) in table.iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, column) in XLSX_COLUMNS.iter().enumerate() {
            let value = record.cell(*column);
            if value.is_empty() {
                continue;
            }
            if value.contains('\n') {
                worksheet.write_string_with_format(row, c as u16, value, &wrap)?;
            } else {
                worksheet.write_string(row, c as u16, value)?;
            }
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_csv;
    use crate::member::NewMember;

    #[test]
    fn csv_escapes_special_characters() {
        let grid = vec![
            vec!["a".to_string(), "b,c".to_string()],
            vec!["say \"hi\"".to_string(), "two\nlines".to_string()],
        ];
        let csv = grid_to_csv(&grid);
        assert_eq!(csv, "a,\"b,c\"\n\"say \"\"hi\"\"\",\"two\nlines\"\n");
        assert_eq!(parse_csv(&csv), grid);
    }

    #[test]
    fn roster_csv_has_every_column() {
        let mut table = Table::default();
        table
            .register(NewMember {
                name: "Alice".to_string(),
                address: "1 Main, Apt 2".to_string(),
                ..Default::default()
            })
            .unwrap();
        let rows = parse_csv(&to_csv(&table));
        assert_eq!(rows[0], Column::header_row());
        assert_eq!(rows[1].len(), Column::ALL.len());
        assert_eq!(rows[1][7], "1 Main, Apt 2");
    }

    #[test]
    fn xlsx_export_produces_a_zip_container() {
        let mut table = Table::default();
        table
            .register(NewMember {
                name: "Alice".to_string(),
                ..Default::default()
            })
            .unwrap();
        let bytes = to_xlsx(&table).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
