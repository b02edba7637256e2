use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("Invalid port range {start}-{end}")]
    InvalidRange { start: u16, end: u16 },

    #[error("Metadata lookup failed: {0}")]
    MetadataLookupFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
