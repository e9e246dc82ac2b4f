//! Polis - civic organization core
//!
//! Engines that run on top of the territorial and group hierarchy:
//!
//! - **Endorsement**: certified sponsors vouch for supporters, granting the
//!   sponsorship half of active status
//! - **Election**: scoped leadership votes with one ballot per voter and
//!   automatic promotion of a strict winner
//! - **Escalation**: SOS signals verified by local leaders and moved up one
//!   level at a time, up to media disclosure
//!
//! # Key Components
//!
//! - [`Polis`]: The assembled core, built from a [`PolisConfig`]
//! - [`EndorsementEngine`], [`ElectionEngine`], [`EscalationEngine`]: The engines
//! - [`Seed`]: Declarative bootstrap data
//!
//! # Example
//!
//! ```ignore
//! use polis::{Polis, PolisConfig};
//!
//! let polis = Polis::new(PolisConfig::default());
//! let _audit = polis.spawn_audit();
//! let sponsor = polis.hierarchy().register_person("Nino", None).await?;
//! polis.hierarchy().certify_sponsor(sponsor.id).await?;
//! ```

pub mod config;
pub mod election;
pub mod endorsement;
pub mod error;
pub mod escalation;
pub mod polis;
pub mod seed;
pub mod types;

// Re-export main types
pub use config::PolisConfig;
pub use election::{
    Candidate, Election, ElectionEngine, ElectionError, ElectionOutcome, ElectionResults,
    ElectionStatus, ElectionType, ElectionWindow, Vote,
};
pub use endorsement::{Endorsement, EndorsementEngine, EndorsementError, EndorsementStatus};
pub use error::{PolisError, Result};
pub use escalation::{
    EscalationEngine, EscalationError, EscalationLevel, EscalationRecord, SignalPriority,
    SignalStatus, SosSignal,
};
pub use polis::{Polis, PolisBuilder, PolisStatus};
pub use seed::{Seed, SeedError, SeedIndex};
pub use types::*;

// Hierarchy types callers need alongside the engines
pub use hierarchy;
pub use hierarchy::{Clock, ManualClock, SystemClock};
