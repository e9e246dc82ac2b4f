//! Error taxonomy shared by every component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::{
    CountMismatch, MembershipMismatch, NodeId, PersonId, TerritoryId, TerritoryKind, Tier,
};

/// Classification every domain error maps onto.
///
/// Callers decide how to react from the kind alone: validation and state
/// errors are final for the request, conflicts may be retried as a fresh
/// operation, integrity errors are defects, dependency errors come from the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, unknown entity, ineligible participant
    Validation,
    /// Uniqueness constraint hit
    Conflict,
    /// Illegal transition for the entity's current state
    State,
    /// Stored data contradicts a structural invariant
    Integrity,
    /// Store unavailable or timed out
    Dependency,
}

/// A lock could not be acquired within the configured timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeout {
    /// Which resource was being locked
    pub resource: &'static str,
    /// How long the caller waited
    pub waited: Duration,
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out after {}ms waiting for {}",
            self.waited.as_millis(),
            self.resource
        )
    }
}

impl std::error::Error for LockTimeout {}

/// Error types for hierarchy operations.
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    /// Territory not found
    #[error("Territory not found: {0}")]
    TerritoryNotFound(TerritoryId),

    /// Tier node not found
    #[error("Tier node not found: {0}")]
    NodeNotFound(NodeId),

    /// Person not found
    #[error("Person not found: {0}")]
    PersonNotFound(PersonId),

    /// Re-parenting would create a cycle
    #[error("Cycle detected: territory {territory} cannot be placed under {parent}")]
    Cycle {
        /// Territory being moved
        territory: TerritoryId,
        /// Requested parent
        parent: TerritoryId,
    },

    /// Parent node is not exactly one tier above
    #[error("Tier mismatch: a {child} node cannot attach under a {parent} node")]
    TierMismatch {
        /// Tier of the node being attached
        child: Tier,
        /// Tier of the requested parent
        parent: Tier,
    },

    /// Tier policy forbids this tier in this kind of territory
    #[error("Tier {tier} is not permitted in a {kind} territory")]
    TierNotPermitted {
        /// Requested tier
        tier: Tier,
        /// Territory kind
        kind: TerritoryKind,
    },

    /// Person is not inside the node's subtree
    #[error("Person {person} is not a member of the subtree of node {node}")]
    Membership {
        /// Person
        person: PersonId,
        /// Node
        node: NodeId,
    },

    /// Membership can only be held in a Tier1 node
    #[error("Node {node} is a {tier} node; membership requires a tier1 node")]
    NotBaseUnit {
        /// Node
        node: NodeId,
        /// Its tier
        tier: Tier,
    },

    /// Territory code already taken
    #[error("Territory code already in use: {0}")]
    DuplicateCode(String),

    /// Stored counts disagree with the live collections
    #[error("Count integrity violated on {} node(s): {mismatches:?}", mismatches.len())]
    CountMismatch {
        /// Every offending node
        mismatches: Vec<CountMismatch>,
    },

    /// Person records and node rosters disagree on who belongs where
    #[error("Membership integrity violated for {} person(s): {mismatches:?}", mismatches.len())]
    MembershipMismatch {
        /// Every offending person
        mismatches: Vec<MembershipMismatch>,
    },

    /// Parent chain longer than the arena, the tree is already corrupt
    #[error("Corrupt territory chain starting at {0}")]
    CorruptChain(TerritoryId),

    /// Store unavailable
    #[error("Hierarchy store unavailable: {0}")]
    Unavailable(#[from] LockTimeout),
}

impl HierarchyError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TerritoryNotFound(_)
            | Self::NodeNotFound(_)
            | Self::PersonNotFound(_)
            | Self::TierMismatch { .. }
            | Self::TierNotPermitted { .. }
            | Self::Membership { .. }
            | Self::NotBaseUnit { .. } => ErrorKind::Validation,
            Self::DuplicateCode(_) => ErrorKind::Conflict,
            Self::Cycle { .. }
            | Self::CountMismatch { .. }
            | Self::MembershipMismatch { .. }
            | Self::CorruptChain(_) => ErrorKind::Integrity,
            Self::Unavailable(_) => ErrorKind::Dependency,
        }
    }
}

/// Result alias for hierarchy operations.
pub type Result<T> = std::result::Result<T, HierarchyError>;

/// Await `fut` for at most `timeout`, mapping expiry to [`LockTimeout`].
pub async fn acquire<F>(
    fut: F,
    resource: &'static str,
    timeout: Duration,
) -> std::result::Result<F::Output, LockTimeout>
where
    F: std::future::Future,
{
    tokio::time::timeout(timeout, fut).await.map_err(|_| {
        tracing::warn!(resource, waited_ms = timeout.as_millis() as u64, "Lock acquisition timed out");
        LockTimeout {
            resource,
            waited: timeout,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            HierarchyError::NodeNotFound(NodeId::new()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            HierarchyError::DuplicateCode("TB-01".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            HierarchyError::CountMismatch { mismatches: vec![] }.kind(),
            ErrorKind::Integrity
        );
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let lock = tokio::sync::Mutex::new(());
        let _held = lock.lock().await;

        let err = acquire(lock.lock(), "test", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.resource, "test");
        assert_eq!(
            HierarchyError::from(err).kind(),
            ErrorKind::Dependency
        );
    }
}
