//! Google Sheets backend over the v4 values API.

use log::debug;
use reqwest::Url;
use reqwest::blocking::Client;
use serde_json::{Value, json};

use crate::config::GoogleSettings;
use crate::errors::StoreError;
use crate::store::{RawRecord, SheetBackend, records_from_grid};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// One worksheet range, read and written with a bearer token.
///
/// Calls block; async callers run them on a blocking thread.
pub struct GoogleSheet {
    client: Client,
    sheet_id: String,
    range: String,
    access_token: String,
}

impl GoogleSheet {
    pub fn new(settings: &GoogleSettings) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(GoogleSheet {
            client,
            sheet_id: settings.sheet_id.clone(),
            range: settings.range.clone(),
            access_token: settings.access_token.clone(),
        })
    }

    /// `.../spreadsheets/{id}/values/{range}{suffix}` with each part escaped.
    fn values_url(&self, suffix: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(API_BASE).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable("API base cannot take a path".into()))?
            .pop_if_empty()
            .push(&self.sheet_id)
            .push("values")
            .push(&format!("{}{}", self.range, suffix));
        Ok(url)
    }
}

/// Turns a `values` array into rows of text. Numbers and booleans keep
/// their JSON spelling; missing trailing cells stay missing.
pub fn grid_from_values(body: &Value) -> Vec<Vec<String>> {
    let Some(rows) = body.get("values").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| match cell {
                            Value::String(s) => s.clone(),
                            Value::Null => String::new(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

impl SheetBackend for GoogleSheet {
    fn get_all_records(&self) -> Result<Vec<RawRecord>, StoreError> {
        let body: Value = self
            .client
            .get(self.values_url("")?)
            .bearer_auth(&self.access_token)
            .send()?
            .error_for_status()?
            .json()?;
        let grid = grid_from_values(&body);
        debug!("fetched {} rows from sheet {}", grid.len(), self.sheet_id);
        Ok(records_from_grid(&grid))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.client
            .post(self.values_url(":clear")?)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn update(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        let mut url = self.values_url("")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        self.client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "range": self.range,
                "majorDimension": "ROWS",
                "values": rows,
            }))
            .send()?
            .error_for_status()?;
        debug!("wrote {} rows to sheet {}", rows.len(), self.sheet_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sheet() -> GoogleSheet {
        GoogleSheet::new(&GoogleSettings {
            sheet_id: "abc123".into(),
            range: "교인 명단".into(),
            access_token: "token".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn urls_escape_the_range() {
        let sheet = sheet();
        let url = sheet.values_url(":clear").unwrap();
        assert!(url.as_str().starts_with("https://sheets.googleapis.com/v4/spreadsheets/abc123/values/"));
        assert!(url.as_str().ends_with(":clear"));
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn values_become_text_rows() {
        let body = json!({
            "range": "Sheet1!A1:C3",
            "values": [["ID", "이름", "전화번호"], ["1", "Alice", 4165551234u64], ["2", null]]
        });
        let grid = grid_from_values(&body);
        assert_eq!(grid[1][2], "4165551234");
        assert_eq!(grid[2], vec!["2".to_string(), String::new()]);

        let records = records_from_grid(&grid);
        assert_eq!(records[0].get("이름").map(String::as_str), Some("Alice"));
    }

    #[test]
    fn empty_sheet_has_no_values_key() {
        assert!(grid_from_values(&json!({"range": "Sheet1"})).is_empty());
    }
}
