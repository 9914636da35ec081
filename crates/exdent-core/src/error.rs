//! Error types for directory name reconstruction

use thiserror::Error;

/// Broad classification of a [`DentError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied an unusable argument (bad lengths, out-of-range slot address)
    Input,
    /// On-disk structures point outside the filesystem
    Corruption,
    /// Allocation status could not be determined
    Lookup,
    /// UTF-16 text could not be converted
    Conversion,
    /// Underlying I/O failed
    Io,
    /// Configuration could not be loaded
    Config,
}

#[derive(Debug, Error)]
pub enum DentError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Slot address {inum} in sector {sector} is out of range")]
    SlotOutOfRange { inum: u64, sector: u64 },

    #[error("Corrupt directory: {0}")]
    Corruption(String),

    #[error("Allocation lookup failed for sector {sector}: {reason}")]
    AllocationLookup { sector: u64, reason: String },

    #[error("Invalid UTF-16 in {label} at address {inum}: {reason}")]
    Conversion {
        inum: u64,
        label: String,
        reason: String,
    },

    #[error("Truncated slot: need {needed} bytes, have {actual}")]
    TruncatedSlot { needed: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl DentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DentError::InvalidArgument(_)
            | DentError::SlotOutOfRange { .. }
            | DentError::TruncatedSlot { .. } => ErrorKind::Input,
            DentError::Corruption(_) => ErrorKind::Corruption,
            DentError::AllocationLookup { .. } => ErrorKind::Lookup,
            DentError::Conversion { .. } => ErrorKind::Conversion,
            DentError::Io(_) => ErrorKind::Io,
            DentError::Config(_) => ErrorKind::Config,
        }
    }

    /// True for errors caused by damaged filesystem structures rather than the caller
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }
}

pub type DentResult<T> = std::result::Result<T, DentError>;
