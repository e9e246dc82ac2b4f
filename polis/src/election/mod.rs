//! Elections: scheduled leadership votes over a scope of the hierarchy.
//!
//! - [`ElectionEngine`]: lifecycle, candidacy, voting and closing
//! - [`tally`]: winner determination, tally verification and vote receipts

mod engine;
pub mod tally;

pub use engine::ElectionEngine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use hierarchy::{ErrorKind, HierarchyError, LockTimeout, PersonId, Scope, Tier};

use crate::types::{CandidateId, ElectionId, VoteId};

/// Kind of election and the scope it runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionType {
    /// Leader of a tier-1 node
    Tier1Leader,
    /// Leader of a tier-2 node
    Tier2Leader,
    /// Leader of a tier-3 node
    Tier3Leader,
    /// Leader of a tier-4 node
    Tier4Leader,
    /// Organization-wide list
    Parliamentary,
}

impl ElectionType {
    /// Tier of node the election must be scoped to, `None` for national scope.
    pub fn required_tier(&self) -> Option<Tier> {
        match self {
            Self::Tier1Leader => Some(Tier::Tier1),
            Self::Tier2Leader => Some(Tier::Tier2),
            Self::Tier3Leader => Some(Tier::Tier3),
            Self::Tier4Leader => Some(Tier::Tier4),
            Self::Parliamentary => None,
        }
    }

    /// Leader election for a tier.
    pub fn leader_of(tier: Tier) -> Self {
        match tier {
            Tier::Tier1 => Self::Tier1Leader,
            Tier::Tier2 => Self::Tier2Leader,
            Tier::Tier3 => Self::Tier3Leader,
            Tier::Tier4 => Self::Tier4Leader,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1Leader => "tier1_leader",
            Self::Tier2Leader => "tier2_leader",
            Self::Tier3Leader => "tier3_leader",
            Self::Tier4Leader => "tier4_leader",
            Self::Parliamentary => "parliamentary",
        }
    }
}

impl fmt::Display for ElectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    /// Created, candidates may register
    Scheduled,
    /// Voting open
    Active,
    /// Closed and decided
    Completed,
    /// Called off
    Cancelled,
}

impl ElectionStatus {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open voting window `[starts_at, ends_at)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionWindow {
    /// Voting opens
    pub starts_at: DateTime<Utc>,
    /// Voting closes
    pub ends_at: DateTime<Utc>,
}

impl ElectionWindow {
    /// Create a window.
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self { starts_at, ends_at }
    }

    /// Whether `now` falls inside the window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

impl fmt::Display for ElectionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.starts_at.to_rfc3339(), self.ends_at.to_rfc3339())
    }
}

/// A person standing in an election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique identifier
    pub id: CandidateId,
    /// The person standing
    pub person: PersonId,
    /// Campaign statement
    pub statement: String,
    /// Votes received
    pub vote_count: u64,
    /// When the candidacy was registered
    pub registered_at: DateTime<Utc>,
}

/// A cast ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// Unique identifier
    pub id: VoteId,
    /// Who voted
    pub voter: PersonId,
    /// For whom
    pub candidate: CandidateId,
    /// Hex SHA-256 receipt
    pub receipt: String,
    /// When the ballot was cast
    pub cast_at: DateTime<Utc>,
}

/// How a completed election was decided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionOutcome {
    /// Declared winner
    pub winner: Option<PersonId>,
    /// Votes of the top candidate(s)
    pub winning_votes: u64,
    /// Candidates sharing the maximum when it was not strict
    pub tied: Vec<PersonId>,
    /// Winner chosen through manual tie resolution
    pub manually_resolved: bool,
    /// When the outcome was recorded
    pub decided_at: DateTime<Utc>,
}

/// An election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    /// Unique identifier
    pub id: ElectionId,
    /// Election type
    pub election_type: ElectionType,
    /// Title
    pub title: String,
    /// Description
    pub description: Option<String>,
    /// Scope voters and candidates must belong to
    pub scope: Scope,
    /// Voting window
    pub window: ElectionWindow,
    /// Current status
    pub status: ElectionStatus,
    /// Ballots cast
    pub total_votes: u64,
    /// Outcome once completed
    pub outcome: Option<ElectionOutcome>,
    /// Tie awaiting an explicit decision
    pub needs_manual_resolution: bool,
    /// When the election was opened
    pub created_at: DateTime<Utc>,
}

/// Candidates of an election ordered by tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionResults {
    /// The election
    pub election: Election,
    /// Candidates, most votes first
    pub candidates: Vec<Candidate>,
}

/// Error types for election operations.
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// Election not found
    #[error("Election not found: {0}")]
    NotFound(ElectionId),

    /// Window does not start before it ends
    #[error("Invalid election window {0}")]
    InvalidWindow(ElectionWindow),

    /// Election type does not fit the scope
    #[error("A {election_type} election cannot run over scope {scope}")]
    ScopeMismatch {
        /// Election type
        election_type: ElectionType,
        /// Requested scope
        scope: Scope,
    },

    /// Person lies outside the election's scope
    #[error("Person {person} is outside the scope of election {election}")]
    ScopeIneligible {
        /// Election
        election: ElectionId,
        /// Person
        person: PersonId,
    },

    /// Person does not have active status
    #[error("Person {0} is not active")]
    NotActive(PersonId),

    /// Person already stands in this election
    #[error("Person {person} is already a candidate in election {election}")]
    DuplicateCandidate {
        /// Election
        election: ElectionId,
        /// Person
        person: PersonId,
    },

    /// Voter already cast a ballot
    #[error("Person {voter} already voted in election {election}")]
    DuplicateVote {
        /// Election
        election: ElectionId,
        /// Voter
        voter: PersonId,
    },

    /// Candidate does not belong to this election
    #[error("Candidate {candidate} is not registered in election {election}")]
    UnknownCandidate {
        /// Election
        election: ElectionId,
        /// Candidate
        candidate: CandidateId,
    },

    /// Voting not open
    #[error("Voting is closed for election {0}")]
    VotingClosed(ElectionId),

    /// Current time is outside the window
    #[error("Election {election} cannot start outside its window {window}")]
    OutsideWindow {
        /// Election
        election: ElectionId,
        /// Its window
        window: ElectionWindow,
    },

    /// Window still open and the caller is not an administrator
    #[error("Election {0} is still within its voting window")]
    WindowOpen(ElectionId),

    /// Transition not allowed from the current status
    #[error("Cannot {action} election {election} in status {status}")]
    InvalidTransition {
        /// Election
        election: ElectionId,
        /// Current status
        status: ElectionStatus,
        /// Attempted action
        action: &'static str,
    },

    /// No tie awaits resolution
    #[error("Election {0} has no tie awaiting resolution")]
    NoTie(ElectionId),

    /// Chosen person was not among the tied candidates
    #[error("Person {person} was not among the tied candidates of election {election}")]
    NotTied {
        /// Election
        election: ElectionId,
        /// Person
        person: PersonId,
    },

    /// Stored tallies disagree with the ballots
    #[error("Tally mismatch in election {election}: {detail}")]
    TallyMismatch {
        /// Election
        election: ElectionId,
        /// What disagreed
        detail: String,
    },

    /// Winner could not be installed as leader
    #[error("Failed to promote winner of election {election}: {source}")]
    LeaderPromotion {
        /// Election
        election: ElectionId,
        /// Hierarchy failure
        source: HierarchyError,
    },

    /// Hierarchy lookup failed
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// Election record unavailable
    #[error("Election store unavailable: {0}")]
    Unavailable(#[from] LockTimeout),
}

impl ElectionError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_)
            | Self::InvalidWindow(_)
            | Self::ScopeMismatch { .. }
            | Self::ScopeIneligible { .. }
            | Self::NotActive(_)
            | Self::UnknownCandidate { .. }
            | Self::NotTied { .. } => ErrorKind::Validation,
            Self::DuplicateCandidate { .. } | Self::DuplicateVote { .. } => ErrorKind::Conflict,
            Self::VotingClosed(_)
            | Self::OutsideWindow { .. }
            | Self::WindowOpen(_)
            | Self::InvalidTransition { .. }
            | Self::NoTie(_) => ErrorKind::State,
            Self::TallyMismatch { .. } => ErrorKind::Integrity,
            Self::LeaderPromotion { source, .. } => source.kind(),
            Self::Hierarchy(e) => e.kind(),
            Self::Unavailable(_) => ErrorKind::Dependency,
        }
    }
}

/// Result type for election operations.
pub type Result<T> = std::result::Result<T, ElectionError>;
