use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cascade XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("cascade JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid cascade: {0}")]
    InvalidCascade(String),

    #[error("image buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    ImageSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("empty image: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("no integral image output requested")]
    NoIntegralOutput,
}

pub type Result<T> = std::result::Result<T, Error>;
