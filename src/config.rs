//! Runtime configuration, read from `ROSTER_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::directory::LayoutOptions;
use crate::errors::ConfigError;
use crate::loader::CsvSheet;
use crate::store::{MemorySheet, RecordStore, SheetBackend};

/// Google Sheets access settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleSettings {
    pub sheet_id: String,
    /// A1 range or sheet name holding the roster.
    pub range: String,
    /// OAuth bearer token with the spreadsheets scope.
    pub access_token: String,
    pub timeout: Duration,
}

/// Where the roster lives.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Csv(PathBuf),
    Google(GoogleSettings),
    /// Starts empty and forgets everything on exit; for trying things out.
    Memory,
}

#[derive(Debug, Clone)]
pub struct RosterConfig {
    pub backend: Backend,
    /// Address the web server listens on.
    pub bind: String,
    pub layout: LayoutOptions,
}

impl RosterConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backend_name = var("ROSTER_BACKEND").unwrap_or_else(|| "csv".into());
        let backend = match backend_name.trim().to_lowercase().as_str() {
            "csv" => Backend::Csv(
                var("ROSTER_CSV_PATH")
                    .unwrap_or_else(|| "database/roster.csv".into())
                    .into(),
            ),
            "google" => {
                let required = |name: &'static str| {
                    var(name).ok_or_else(|| ConfigError::Missing {
                        name,
                        backend: backend_name.clone(),
                    })
                };
                let timeout = match var("ROSTER_HTTP_TIMEOUT_SECS") {
                    Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                        name: "ROSTER_HTTP_TIMEOUT_SECS",
                        value,
                    })?,
                    None => 10,
                };
                Backend::Google(GoogleSettings {
                    sheet_id: required("ROSTER_SHEET_ID")?,
                    range: var("ROSTER_SHEET_RANGE").unwrap_or_else(|| "Sheet1".into()),
                    access_token: required("ROSTER_ACCESS_TOKEN")?,
                    timeout: Duration::from_secs(timeout),
                })
            }
            "memory" => Backend::Memory,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "ROSTER_BACKEND",
                    value: backend_name,
                });
            }
        };

        let mut layout = LayoutOptions::default();
        if let Some(title) = var("ROSTER_TITLE") {
            layout.title = title;
        }
        if let Some(value) = var("ROSTER_PHOTO_BUDGET_MM") {
            layout.photo_budget = match value.trim().parse::<f32>() {
                Ok(mm) if mm >= 0.0 && mm.is_finite() => mm,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "ROSTER_PHOTO_BUDGET_MM",
                        value,
                    });
                }
            };
        }
        if let Some(path) = var("ROSTER_FONT_PATH") {
            layout.font_path = Some(path.into());
        }

        Ok(Self {
            backend,
            bind: var("ROSTER_BIND").unwrap_or_else(|| "127.0.0.1:3000".into()),
            layout,
        })
    }

    /// Opens the configured sheet.
    pub fn open_backend(&self) -> Result<Box<dyn SheetBackend>, ConfigError> {
        match &self.backend {
            Backend::Csv(path) => Ok(Box::new(CsvSheet::new(path))),
            Backend::Memory => Ok(Box::new(MemorySheet::new(Vec::new()))),
            #[cfg(feature = "web")]
            Backend::Google(settings) => crate::google::GoogleSheet::new(settings)
                .map(|sheet| Box::new(sheet) as Box<dyn SheetBackend>)
                .map_err(|e| ConfigError::Invalid {
                    name: "ROSTER_BACKEND",
                    value: e.to_string(),
                }),
            #[cfg(not(feature = "web"))]
            Backend::Google(_) => Err(ConfigError::Unsupported("google".into())),
        }
    }

    pub fn store(&self) -> Result<RecordStore, ConfigError> {
        Ok(RecordStore::new(self.open_backend()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<RosterConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RosterConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_use_a_local_csv_file() {
        let config = config(&[]).unwrap();
        assert_eq!(config.backend, Backend::Csv("database/roster.csv".into()));
        assert_eq!(config.bind, "127.0.0.1:3000");
        assert_eq!(config.layout.max_photos(), 3);
    }

    #[test]
    fn google_backend_requires_credentials() {
        let err = config(&[("ROSTER_BACKEND", "google"), ("ROSTER_SHEET_ID", "abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "ROSTER_ACCESS_TOKEN", .. }));

        let config = config(&[
            ("ROSTER_BACKEND", "Google"),
            ("ROSTER_SHEET_ID", "abc"),
            ("ROSTER_ACCESS_TOKEN", "token"),
            ("ROSTER_HTTP_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        match config.backend {
            Backend::Google(settings) => {
                assert_eq!(settings.range, "Sheet1");
                assert_eq!(settings.timeout, Duration::from_secs(3));
            }
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn layout_overrides_are_validated() {
        let config = config(&[("ROSTER_PHOTO_BUDGET_MM", "190"), ("ROSTER_TITLE", "교회 주소록")]).unwrap();
        assert_eq!(config.layout.max_photos(), 5);
        assert_eq!(config.layout.title, "교회 주소록");

        assert!(matches!(
            config_err(&[("ROSTER_PHOTO_BUDGET_MM", "wide")]),
            ConfigError::Invalid { name: "ROSTER_PHOTO_BUDGET_MM", .. }
        ));
        assert!(matches!(
            config_err(&[("ROSTER_BACKEND", "ftp")]),
            ConfigError::Invalid { name: "ROSTER_BACKEND", .. }
        ));
    }

    #[test]
    fn font_path_defaults_to_nanum_gothic() {
        let default = config(&[]).unwrap();
        assert_eq!(default.layout.font_path, Some(PathBuf::from("NanumGothic.ttf")));

        let custom = config(&[("ROSTER_FONT_PATH", "/usr/share/fonts/nanum/NanumGothic.ttf")]).unwrap();
        assert_eq!(
            custom.layout.font_path,
            Some(PathBuf::from("/usr/share/fonts/nanum/NanumGothic.ttf"))
        );
    }

    fn config_err(vars: &[(&str, &str)]) -> ConfigError {
        config(vars).unwrap_err()
    }

    #[test]
    fn memory_backend_opens_empty() {
        let store = config(&[("ROSTER_BACKEND", "memory")]).unwrap().store().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
