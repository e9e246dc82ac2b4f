//! Facade-level error wrapping every component error.

use hierarchy::{ErrorKind, HierarchyError};

use crate::config::ConfigError;
use crate::election::ElectionError;
use crate::endorsement::EndorsementError;
use crate::escalation::EscalationError;
use crate::seed::SeedError;

/// Any error a Polis operation can raise.
#[derive(Debug, thiserror::Error)]
pub enum PolisError {
    /// Hierarchy store error
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// Endorsement engine error
    #[error(transparent)]
    Endorsement(#[from] EndorsementError),

    /// Election engine error
    #[error(transparent)]
    Election(#[from] ElectionError),

    /// Escalation engine error
    #[error(transparent)]
    Escalation(#[from] EscalationError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Seed error
    #[error(transparent)]
    Seed(#[from] SeedError),
}

impl PolisError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Hierarchy(e) => e.kind(),
            Self::Endorsement(e) => e.kind(),
            Self::Election(e) => e.kind(),
            Self::Escalation(e) => e.kind(),
            Self::Config(_) => ErrorKind::Validation,
            Self::Seed(e) => e.kind(),
        }
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, PolisError>;
