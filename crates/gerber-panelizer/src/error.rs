use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    /// Malformed or out-of-range directive in a drawing or drill file.
    #[error("format error: {0}")]
    Format(String),

    /// Merge or feature rewrite could not be completed.
    #[error("merge error: {0}")]
    Merge(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
