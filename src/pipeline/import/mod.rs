pub mod extract;
pub mod format;
pub mod hash;
pub mod staging;

pub use extract::*;
pub use format::*;
pub use hash::*;
pub use staging::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type '{extension}'. Allowed types: {allowed}")]
    UnsupportedFormat { extension: String, allowed: String },

    #[error("Unsupported content type '{0}'")]
    UnsupportedMimeType(String),

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb:.1}MB limit")]
    FileTooLarge { size_mb: f64, max_mb: f64 },

    #[error("Uploaded file is empty")]
    EmptyFile,
}
