//! SOS signals and their escalation up the hierarchy.
//!
//! A signal starts at the base tier and can only ever move one level up at a
//! time, computed from its persisted level. Media is the last level.

mod engine;

pub use engine::EscalationEngine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use hierarchy::{ErrorKind, HierarchyError, LockTimeout, PersonId, Tier};

use crate::types::SignalId;

/// Level of authority currently handling a signal.
///
/// Ordering is significant: a signal only moves to `self.next()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    /// Base unit leadership
    Tier1 = 1,
    /// Tier-2 leadership
    Tier2 = 2,
    /// Tier-3 leadership
    Tier3 = 3,
    /// Tier-4 leadership
    Tier4 = 4,
    /// Public disclosure (terminal)
    Media = 5,
}

impl EscalationLevel {
    /// The level immediately above, `None` at Media.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Tier1 => Some(Self::Tier2),
            Self::Tier2 => Some(Self::Tier3),
            Self::Tier3 => Some(Self::Tier4),
            Self::Tier4 => Some(Self::Media),
            Self::Media => None,
        }
    }

    /// Leadership tier responsible for signals at this level.
    pub fn handling_tier(&self) -> Tier {
        match self {
            Self::Tier1 => Tier::Tier1,
            Self::Tier2 => Tier::Tier2,
            Self::Tier3 => Tier::Tier3,
            Self::Tier4 | Self::Media => Tier::Tier4,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
            Self::Tier4 => "tier4",
            Self::Media => "media",
        }
    }
}

impl From<Tier> for EscalationLevel {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Tier1 => Self::Tier1,
            Tier::Tier2 => Self::Tier2,
            Tier::Tier3 => Self::Tier3,
            Tier::Tier4 => Self::Tier4,
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// Raised, awaiting verification
    Pending,
    /// Confirmed by a leader
    Verified,
    /// Moved up at least once
    Escalated,
    /// Dealt with (terminal)
    Resolved,
    /// Dismissed (terminal)
    Rejected,
}

impl SignalStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPriority {
    /// Low
    Low,
    /// Normal
    #[default]
    Normal,
    /// High
    High,
    /// Critical
    Critical,
}

/// One step up the ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// Level before the step
    pub from_level: EscalationLevel,
    /// Level after the step
    pub to_level: EscalationLevel,
    /// Who escalated
    pub actor: PersonId,
    /// Notes
    pub notes: Option<String>,
    /// When
    pub timestamp: DateTime<Utc>,
}

/// A member-reported problem travelling up the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SosSignal {
    /// Unique identifier
    pub id: SignalId,
    /// Who raised it
    pub reporter: PersonId,
    /// Short title
    pub title: String,
    /// Full description
    pub description: String,
    /// Where it happened
    pub location: Option<String>,
    /// Urgency
    pub priority: SignalPriority,
    /// Level currently handling it
    pub current_level: EscalationLevel,
    /// Status
    pub status: SignalStatus,
    /// Leader who verified it
    pub verifier: Option<PersonId>,
    /// When it was verified
    pub verified_at: Option<DateTime<Utc>>,
    /// Verification notes
    pub verification_notes: Option<String>,
    /// Resolution or rejection reason
    pub resolution: Option<String>,
    /// Leader who closed it
    pub closed_by: Option<PersonId>,
    /// When it was resolved or rejected
    pub resolved_at: Option<DateTime<Utc>>,
    /// When it was raised
    pub created_at: DateTime<Utc>,
    /// Escalation steps, oldest first
    pub history: Vec<EscalationRecord>,
}

/// Error types for escalation operations.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    /// Signal not found
    #[error("Signal not found: {0}")]
    NotFound(SignalId),

    /// Signal content rejected
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    /// Transition not allowed from the current status
    #[error("Cannot {action} signal {signal} in status {status}")]
    InvalidTransition {
        /// Signal
        signal: SignalId,
        /// Current status
        status: SignalStatus,
        /// Attempted action
        action: &'static str,
    },

    /// Actor does not lead at a tier able to handle the level
    #[error("Person {actor} has no authority over signals at level {level}")]
    Unauthorized {
        /// Who tried
        actor: PersonId,
        /// Signal level
        level: EscalationLevel,
    },

    /// Signal is already at the last level
    #[error("Signal {0} is already at the media level")]
    TerminalLevel(SignalId),

    /// Hierarchy lookup failed
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// Signal record unavailable
    #[error("Signal store unavailable: {0}")]
    Unavailable(#[from] LockTimeout),
}

impl EscalationError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::InvalidSignal(_) | Self::Unauthorized { .. } => {
                ErrorKind::Validation
            }
            Self::InvalidTransition { .. } | Self::TerminalLevel(_) => ErrorKind::State,
            Self::Hierarchy(e) => e.kind(),
            Self::Unavailable(_) => ErrorKind::Dependency,
        }
    }
}

/// Result type for escalation operations.
pub type Result<T> = std::result::Result<T, EscalationError>;
