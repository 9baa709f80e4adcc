//! Error types for rule scanning and export.

use thiserror::Error;

/// Errors raised while publishing or serving a rule set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScanError {
    /// A rule set was already published for this process.
    #[error("rule set for service '{service}' was already published")]
    AlreadyPublished {
        /// Service whose rules were published first.
        service: String,
    },

    /// The export endpoint could not bind or accept.
    #[error("export server error: {0}")]
    Io(#[from] std::io::Error),

    /// The rule set could not be encoded.
    #[error("failed to encode rule set: {0}")]
    Encode(#[from] bastion_core::CoreError),
}

/// Result type for scanner operations.
pub type ScanResult<T> = Result<T, ScanError>;
