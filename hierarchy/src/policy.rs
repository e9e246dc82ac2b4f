//! Which tiers may attach to which kind of territory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{TerritoryKind, Tier};

/// Policy table from territory kind to permitted tiers.
///
/// A kind with no entry accepts every tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    #[serde(default)]
    rules: BTreeMap<TerritoryKind, Vec<Tier>>,
}

impl TierPolicy {
    /// Policy that allows every tier everywhere.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Restrict `kind` to exactly `tiers`.
    pub fn allow(mut self, kind: TerritoryKind, tiers: impl IntoIterator<Item = Tier>) -> Self {
        let mut tiers: Vec<Tier> = tiers.into_iter().collect();
        tiers.sort();
        tiers.dedup();
        self.rules.insert(kind, tiers);
        self
    }

    /// Whether a node of `tier` may attach to a territory of `kind`.
    pub fn allows(&self, kind: TerritoryKind, tier: Tier) -> bool {
        self.rules
            .get(&kind)
            .map(|tiers| tiers.contains(&tier))
            .unwrap_or(true)
    }
}
