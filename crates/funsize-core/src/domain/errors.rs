//! Errors and their operational classification.

use crate::config::ConfigError;
use crate::ports::{CatalogError, SubmitError};

use super::credential::CredentialError;

/// Operational classification of a failure.
///
/// Decides whether a caller retries, skips the affected unit of work, or
/// abandons the graph it was building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Upstream hiccup (5xx, timeout); retried with backoff.
    Transient,
    /// Upstream data missing an expected field or not decodable.
    Malformed,
    /// Key material or envelope problems; fatal for the affected graph.
    Credential,
    /// Invalid configuration.
    Configuration,
    /// Anything else below us (queue, scheduler, HTTP client construction).
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum FunsizeError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no update platform mapping for build platform '{0}'")]
    UnknownPlatform(String),
}

impl FunsizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FunsizeError::Catalog(e) => e.kind(),
            FunsizeError::Credential(_) => ErrorKind::Credential,
            FunsizeError::Submit(_) => ErrorKind::Infrastructure,
            FunsizeError::Config(_) | FunsizeError::UnknownPlatform(_) => {
                ErrorKind::Configuration
            }
        }
    }
}
