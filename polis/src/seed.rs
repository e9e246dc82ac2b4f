//! Declarative seed data for bootstrapping a hierarchy.
//!
//! Entities refer to each other by seed keys; parents must appear before
//! their children.
//!
//! ```yaml
//! territories:
//!   - { key: tbilisi, name: Tbilisi, kind: municipality, code: TB }
//! nodes:
//!   - { key: tb-4, tier: tier4, name: Tbilisi, territory: tbilisi }
//!   - { key: tb-3, tier: tier3, name: Vake, territory: tbilisi, parent: tb-4 }
//!   - { key: tb-2, tier: tier2, name: Vake-1, territory: tbilisi, parent: tb-3 }
//!   - { key: tb-1, tier: tier1, name: Vake-1-1, territory: tbilisi, parent: tb-2 }
//! persons:
//!   - { key: nino, name: Nino, territory: tbilisi, node: tb-1, geder: true, onboarded: true }
//!   - { key: giorgi, name: Giorgi, territory: tbilisi, node: tb-1 }
//! endorsements:
//!   - { sponsor: nino, supporter: giorgi }
//! leaders:
//!   - { node: tb-1, person: nino }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use hierarchy::{ErrorKind, GroupStatus, NodeId, PersonId, TerritoryId, TerritoryKind, Tier};

use crate::error::Result;
use crate::polis::Polis;

/// Errors raised while reading or resolving a seed.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// File could not be read
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    /// Not valid seed YAML
    #[error("Invalid seed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A key refers to nothing defined earlier
    #[error("Unknown {kind} key: {key}")]
    UnknownKey {
        /// Entity kind
        kind: &'static str,
        /// Missing key
        key: String,
    },

    /// A key is defined twice
    #[error("Duplicate {kind} key: {key}")]
    DuplicateKey {
        /// Entity kind
        kind: &'static str,
        /// Repeated key
        key: String,
    },
}

impl SeedError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateKey { .. } => ErrorKind::Conflict,
            _ => ErrorKind::Validation,
        }
    }
}

/// Seeded territory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerritorySeed {
    /// Seed key
    pub key: String,
    /// Name
    pub name: String,
    /// Kind
    pub kind: TerritoryKind,
    /// Administrative code
    #[serde(default)]
    pub code: Option<String>,
    /// Parent territory key
    #[serde(default)]
    pub parent: Option<String>,
}

/// Seeded tier node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSeed {
    /// Seed key
    pub key: String,
    /// Tier
    pub tier: Tier,
    /// Name
    pub name: String,
    /// Territory key
    pub territory: String,
    /// Parent node key
    #[serde(default)]
    pub parent: Option<String>,
    /// Initial status
    #[serde(default)]
    pub status: Option<GroupStatus>,
}

/// Seeded person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonSeed {
    /// Seed key
    pub key: String,
    /// Display name
    pub name: String,
    /// Territory key
    #[serde(default)]
    pub territory: Option<String>,
    /// Tier-1 node key
    #[serde(default)]
    pub node: Option<String>,
    /// Certified sponsor
    #[serde(default)]
    pub geder: bool,
    /// Onboarding completed
    #[serde(default)]
    pub onboarded: bool,
}

/// Seeded approved endorsement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndorsementSeed {
    /// Sponsor key
    pub sponsor: String,
    /// Supporter key
    pub supporter: String,
}

/// Seeded leadership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderSeed {
    /// Node key
    pub node: String,
    /// Person key
    pub person: String,
}

/// A complete seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    /// Territories, parents first
    pub territories: Vec<TerritorySeed>,
    /// Tier nodes, parents first
    pub nodes: Vec<NodeSeed>,
    /// Persons
    pub persons: Vec<PersonSeed>,
    /// Endorsements, requested and approved on load
    pub endorsements: Vec<EndorsementSeed>,
    /// Leaders
    pub leaders: Vec<LeaderSeed>,
}

/// Ids assigned to seed keys.
#[derive(Debug, Clone, Default)]
pub struct SeedIndex {
    /// Territory ids by key
    pub territories: HashMap<String, TerritoryId>,
    /// Node ids by key
    pub nodes: HashMap<String, NodeId>,
    /// Person ids by key
    pub persons: HashMap<String, PersonId>,
}

impl SeedIndex {
    /// Territory id for a key.
    pub fn territory(&self, key: &str) -> std::result::Result<TerritoryId, SeedError> {
        lookup(&self.territories, "territory", key)
    }

    /// Node id for a key.
    pub fn node(&self, key: &str) -> std::result::Result<NodeId, SeedError> {
        lookup(&self.nodes, "node", key)
    }

    /// Person id for a key.
    pub fn person(&self, key: &str) -> std::result::Result<PersonId, SeedError> {
        lookup(&self.persons, "person", key)
    }
}

fn lookup<T: Copy>(
    map: &HashMap<String, T>,
    kind: &'static str,
    key: &str,
) -> std::result::Result<T, SeedError> {
    map.get(key).copied().ok_or_else(|| SeedError::UnknownKey {
        kind,
        key: key.to_string(),
    })
}

fn ensure_new<T>(
    map: &HashMap<String, T>,
    kind: &'static str,
    key: &str,
) -> std::result::Result<(), SeedError> {
    if map.contains_key(key) {
        return Err(SeedError::DuplicateKey {
            kind,
            key: key.to_string(),
        });
    }
    Ok(())
}

impl Seed {
    /// Parse a seed from YAML.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, SeedError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a seed from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, SeedError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Build the seeded hierarchy inside `polis`.
    ///
    /// Endorsements go through the endorsement engine, so seeded supporters
    /// get their standing the same way live ones do.
    pub async fn apply(&self, polis: &Polis) -> Result<SeedIndex> {
        let store = polis.hierarchy();
        let mut index = SeedIndex::default();

        for t in &self.territories {
            ensure_new(&index.territories, "territory", &t.key)?;
            let parent = t.parent.as_deref().map(|k| index.territory(k)).transpose()?;
            let territory = store
                .create_territory(t.name.clone(), t.kind, parent, t.code.clone())
                .await?;
            index.territories.insert(t.key.clone(), territory.id);
        }

        for n in &self.nodes {
            ensure_new(&index.nodes, "node", &n.key)?;
            let territory = index.territory(&n.territory)?;
            let parent = n.parent.as_deref().map(|k| index.node(k)).transpose()?;
            let node = store
                .attach_tier_node(n.tier, n.name.clone(), territory, parent)
                .await?;
            if let Some(status) = n.status {
                store.set_node_status(node.id, status).await?;
            }
            index.nodes.insert(n.key.clone(), node.id);
        }

        for p in &self.persons {
            ensure_new(&index.persons, "person", &p.key)?;
            let territory = p.territory.as_deref().map(|k| index.territory(k)).transpose()?;
            let person = store.register_person(p.name.clone(), territory).await?;
            if let Some(node) = &p.node {
                store.assign_member(person.id, index.node(node)?).await?;
            }
            if p.geder {
                store.certify_sponsor(person.id).await?;
            }
            if p.onboarded {
                store.complete_onboarding(person.id).await?;
            }
            index.persons.insert(p.key.clone(), person.id);
        }

        for e in &self.endorsements {
            let sponsor = index.person(&e.sponsor)?;
            let supporter = index.person(&e.supporter)?;
            let endorsement = polis
                .endorsements()
                .request_endorsement(sponsor, supporter)
                .await?;
            polis.endorsements().approve(endorsement.id, sponsor).await?;
        }

        for l in &self.leaders {
            store
                .set_leader(index.node(&l.node)?, index.person(&l.person)?)
                .await?;
        }

        info!(
            territories = index.territories.len(),
            nodes = index.nodes.len(),
            persons = index.persons.len(),
            endorsements = self.endorsements.len(),
            "Seed applied"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolisError;
    use std::io::Write;

    const SEED: &str = r#"
territories:
  - { key: georgia, name: Georgia, kind: region }
  - { key: tbilisi, name: Tbilisi, kind: municipality, code: TB, parent: georgia }
nodes:
  - { key: t4, tier: tier4, name: Tbilisi, territory: tbilisi }
  - { key: t3, tier: tier3, name: Vake, territory: tbilisi, parent: t4 }
  - { key: t2, tier: tier2, name: Vake-1, territory: tbilisi, parent: t3 }
  - { key: t1, tier: tier1, name: Vake-1-1, territory: tbilisi, parent: t2, status: active }
persons:
  - { key: nino, name: Nino, territory: tbilisi, node: t1, geder: true, onboarded: true }
  - { key: giorgi, name: Giorgi, territory: tbilisi, node: t1, onboarded: true }
endorsements:
  - { sponsor: nino, supporter: giorgi }
leaders:
  - { node: t1, person: nino }
"#;

    #[tokio::test]
    async fn test_apply_seed() {
        let polis = Polis::default();
        let seed = Seed::from_yaml(SEED).unwrap();
        let index = seed.apply(&polis).await.unwrap();

        let giorgi = polis.hierarchy().person(index.person("giorgi").unwrap()).await.unwrap();
        assert!(giorgi.is_active());
        assert_eq!(giorgi.sponsor, Some(index.person("nino").unwrap()));

        let t1 = polis.hierarchy().node(index.node("t1").unwrap()).await.unwrap();
        assert_eq!(t1.member_count, 2);
        assert_eq!(t1.status, GroupStatus::Active);
        assert_eq!(t1.leader, Some(index.person("nino").unwrap()));

        let t4 = polis.hierarchy().node(index.node("t4").unwrap()).await.unwrap();
        assert_eq!(t4.member_count, 2);
        polis.audit_counts().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let polis = Polis::default();
        let seed = Seed::from_yaml(
            "nodes:\n  - { key: t4, tier: tier4, name: X, territory: nowhere }\n",
        )
        .unwrap();
        let err = seed.apply(&polis).await.unwrap_err();
        assert!(matches!(err, PolisError::Seed(SeedError::UnknownKey { .. })));
    }

    #[tokio::test]
    async fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();
        let seed = Seed::from_file(file.path()).unwrap();
        assert_eq!(seed.nodes.len(), 4);
        assert_eq!(seed.endorsements.len(), 1);
    }
}
