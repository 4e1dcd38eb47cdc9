use thiserror::Error;

/// Errors raised while talking to the backing spreadsheet.
///
/// Every collaborator failure (file I/O, HTTP, a response we cannot read)
/// collapses into `Unavailable`: callers only need to know the sheet could
/// not be used, and the UI shows a "try again" message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backing sheet unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[cfg(feature = "web")]
impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// User input rejected by a form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is required")]
    MissingName,
}

/// Errors from editing the in-memory table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("no member with id {0}")]
    UnknownMember(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Errors from encoding an uploaded photo.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("image processing failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("empty upload")]
    Empty,
}

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be set when ROSTER_BACKEND={backend}")]
    Missing { name: &'static str, backend: String },

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("backend {0} needs the `web` feature")]
    Unsupported(String),
}

/// Errors from loading the font embedded in printed directories.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("could not read font: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a usable TrueType font: {0}")]
    Parse(String),
}
