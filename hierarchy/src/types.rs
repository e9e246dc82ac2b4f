//! Core types for the territorial and group hierarchy.
//!
//! Entities live in arenas keyed by typed identifiers. Parent and child links
//! are plain id fields; nothing here owns another entity.
//!
//! With the `typescript` feature enabled, the enumerations can be exported to
//! TypeScript using ts-rs for the frontend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Declare a UUID-backed identifier newtype.
///
/// The expansion refers to `::uuid` and `::serde`, so crates using it must
/// depend on both.
#[macro_export]
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub ::uuid::Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &::uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifier of a territory.
    TerritoryId
);
entity_id!(
    /// Identifier of a tier node (any of the four tiers).
    NodeId
);
entity_id!(
    /// Identifier of a person.
    PersonId
);

/// Group hierarchy tier.
///
/// `Tier1` is the base unit; each tier is contained by the next one up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Base unit, holds members directly
    Tier1 = 1,
    /// Groups of base units
    Tier2 = 2,
    /// Groups of tier-2 nodes
    Tier3 = 3,
    /// Top tier, never has a parent node
    Tier4 = 4,
}

impl Tier {
    /// Numeric rank (1 = base unit).
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// The tier immediately above, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Tier1 => Some(Self::Tier2),
            Self::Tier2 => Some(Self::Tier3),
            Self::Tier3 => Some(Self::Tier4),
            Self::Tier4 => None,
        }
    }

    /// The tier immediately below, if any.
    pub fn previous(&self) -> Option<Self> {
        match self {
            Self::Tier1 => None,
            Self::Tier2 => Some(Self::Tier1),
            Self::Tier3 => Some(Self::Tier2),
            Self::Tier4 => Some(Self::Tier3),
        }
    }

    /// All tiers, base unit first.
    pub fn ascending() -> [Self; 4] {
        [Self::Tier1, Self::Tier2, Self::Tier3, Self::Tier4]
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
            Self::Tier4 => "tier4",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TerritoryKind {
    /// Electoral district
    ElectoralDistrict,
    /// Region
    Region,
    /// Municipality
    Municipality,
}

impl TerritoryKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ElectoralDistrict => "electoral_district",
            Self::Region => "region",
            Self::Municipality => "municipality",
        }
    }
}

impl fmt::Display for TerritoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a tier node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Still gathering members
    #[default]
    Forming,
    /// Operating
    Active,
    /// Dormant or dissolved
    Inactive,
}

/// Verification state of a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// No verification yet
    #[default]
    Unverified,
    /// Holds an approved endorsement from a sponsor
    SponsoredSupporter,
    /// Certified sponsor, may endorse supporters
    Geder,
}

/// Derived activity status of a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// At least one gate is still closed
    Passive,
    /// Sponsorship and onboarding both completed
    Active,
}

/// A node of the territorial tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Territory {
    /// Unique identifier
    pub id: TerritoryId,
    /// Display name
    pub name: String,
    /// Optional administrative code, unique when present
    pub code: Option<String>,
    /// Territory kind
    pub kind: TerritoryKind,
    /// Parent territory (weak back-reference)
    pub parent: Option<TerritoryId>,
    /// Child territories
    pub children: Vec<TerritoryId>,
    /// When the territory was created
    pub created_at: DateTime<Utc>,
}

/// A node in the four-tier group hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierNode {
    /// Unique identifier
    pub id: NodeId,
    /// Tier of this node
    pub tier: Tier,
    /// Display name
    pub name: String,
    /// Owning territory
    pub territory: TerritoryId,
    /// Parent node one tier up (weak back-reference)
    pub parent: Option<NodeId>,
    /// Child nodes one tier down
    pub children: Vec<NodeId>,
    /// Direct members (Tier1 only)
    pub members: Vec<PersonId>,
    /// Lifecycle status
    pub status: GroupStatus,
    /// Current leader
    pub leader: Option<PersonId>,
    /// Members in this node's subtree
    pub member_count: usize,
    /// Number of immediate child nodes
    pub child_count: usize,
    /// When the node was attached
    pub created_at: DateTime<Utc>,
}

/// A person known to the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    /// Unique identifier
    pub id: PersonId,
    /// Display name
    pub display_name: String,
    /// Verification state
    pub verification: VerificationState,
    /// Sponsorship gate: an approved endorsement exists
    pub sponsorship_gate: bool,
    /// Onboarding gate: onboarding step completed
    pub onboarding_gate: bool,
    /// Territory assignment
    pub territory: Option<TerritoryId>,
    /// Tier1 membership
    pub tier1_node: Option<NodeId>,
    /// Current sponsor (weak back-reference)
    pub sponsor: Option<PersonId>,
    /// Penalties recorded against this person's standing
    pub penalties: u32,
    /// When the person was certified as a sponsor
    pub certified_at: Option<DateTime<Utc>>,
    /// When onboarding was completed
    pub onboarded_at: Option<DateTime<Utc>>,
    /// When the person was registered
    pub registered_at: DateTime<Utc>,
}

impl Person {
    /// Activity status derived from both gates.
    pub fn activity(&self) -> ActivityStatus {
        if self.sponsorship_gate && self.onboarding_gate {
            ActivityStatus::Active
        } else {
            ActivityStatus::Passive
        }
    }

    /// Whether the person currently counts as active.
    pub fn is_active(&self) -> bool {
        self.activity() == ActivityStatus::Active
    }

    /// Whether the person is a certified sponsor.
    pub fn is_geder(&self) -> bool {
        self.verification == VerificationState::Geder
    }
}

/// Scope of an election or eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "node")]
pub enum Scope {
    /// A single tier node and its subtree
    Node(NodeId),
    /// The whole organization
    National,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node:{id}"),
            Self::National => f.write_str("national"),
        }
    }
}

/// Result of moving a person's Tier1 membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipChange {
    /// The person moved
    pub person: PersonId,
    /// Previous Tier1 node
    pub from: Option<NodeId>,
    /// New Tier1 node
    pub to: NodeId,
    /// Leaderships dropped because the person left those subtrees
    pub cleared_leaderships: Vec<NodeId>,
}

/// Stored versus derived counts for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    /// Offending node
    pub node: NodeId,
    /// Its tier
    pub tier: Tier,
    /// Stored member count
    pub stored_members: usize,
    /// Member count derived from the live collections
    pub derived_members: usize,
    /// Stored child count
    pub stored_children: usize,
    /// Child count derived from the live collection
    pub derived_children: usize,
}

/// A person whose recorded membership disagrees with the node rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipMismatch {
    /// Offending person
    pub person: PersonId,
    /// Tier1 node the person record points at
    pub recorded: Option<NodeId>,
    /// Tier1 nodes whose member lists contain the person
    pub listed_in: Vec<NodeId>,
}

/// Counts of a node after recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounts {
    /// Node
    pub node: NodeId,
    /// Members in the subtree
    pub member_count: usize,
    /// Immediate children
    pub child_count: usize,
}

/// A person's place in the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// The person
    pub person: PersonId,
    /// Tier1 membership
    pub tier1_node: Option<NodeId>,
    /// Tier1 node followed by its ancestors
    pub chain: Vec<NodeId>,
    /// Nodes the person leads
    pub leads: Vec<(NodeId, Tier)>,
}

/// Per-tier summary for the overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierOverview {
    /// Tier
    pub tier: Tier,
    /// Number of nodes
    pub nodes: usize,
    /// Nodes with a leader
    pub led_nodes: usize,
    /// Nodes with status active
    pub active_nodes: usize,
    /// Members counted at this tier
    pub members: usize,
}

/// Organization-wide summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyOverview {
    /// Tier summaries, base unit first
    pub tiers: Vec<TierOverview>,
    /// Number of territories
    pub territories: usize,
    /// Registered persons
    pub persons: usize,
    /// Persons with active status
    pub active_persons: usize,
    /// Certified sponsors
    pub sponsors: usize,
}

/// Summary for one territory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerritoryStatistics {
    /// Territory
    pub territory: TerritoryId,
    /// Nodes owned by the territory, by tier
    pub nodes_by_tier: BTreeMap<Tier, usize>,
    /// Members of the territory's Tier1 nodes
    pub members: usize,
    /// Persons assigned to the territory
    pub persons: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order() {
        assert!(Tier::Tier1 < Tier::Tier2);
        assert!(Tier::Tier3 < Tier::Tier4);
        assert_eq!(Tier::Tier1.next(), Some(Tier::Tier2));
        assert_eq!(Tier::Tier4.next(), None);
        assert_eq!(Tier::Tier1.previous(), None);
        assert_eq!(Tier::Tier4.previous(), Some(Tier::Tier3));
    }

    #[test]
    fn test_activity_requires_both_gates() {
        let mut person = Person {
            id: PersonId::new(),
            display_name: "Nino".to_string(),
            verification: VerificationState::SponsoredSupporter,
            sponsorship_gate: true,
            onboarding_gate: false,
            territory: None,
            tier1_node: None,
            sponsor: None,
            penalties: 0,
            certified_at: None,
            onboarded_at: None,
            registered_at: Utc::now(),
        };
        assert_eq!(person.activity(), ActivityStatus::Passive);

        person.onboarding_gate = true;
        assert!(person.is_active());

        person.sponsorship_gate = false;
        assert!(!person.is_active());
    }

    #[test]
    fn test_id_parse_display() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_scope_serde() {
        let json = serde_json::to_string(&Scope::National).unwrap();
        assert_eq!(json, r#"{"type":"national"}"#);
    }
}
