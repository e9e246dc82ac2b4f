//! Hierarchy store: territorial tree, tier nodes, persons and leadership.
//!
//! [`HierarchyState`] is the arena and holds every invariant-preserving
//! mutation as a plain synchronous method. [`HierarchyStore`] wraps it in a
//! shared `RwLock` so each mutation is one critical section, and publishes a
//! domain event after each successful change.
//!
//! Engines that must change person standing together with their own records
//! take their own lock first, then [`HierarchyStore::write`], and mutate only
//! after every check has passed.

use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{acquire, HierarchyError, Result};
use crate::events::{DomainEvent, EntityKind, EventBus};
use crate::policy::TierPolicy;
use crate::types::*;

/// Default time to wait for the hierarchy lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Arena of territories, tier nodes and persons.
#[derive(Debug)]
pub struct HierarchyState {
    territories: HashMap<TerritoryId, Territory>,
    nodes: HashMap<NodeId, TierNode>,
    persons: HashMap<PersonId, Person>,
    codes: HashMap<String, TerritoryId>,
    policy: TierPolicy,
    clock: Arc<dyn Clock>,
}

impl HierarchyState {
    /// Create an empty arena governed by `policy`, stamped by the system clock.
    pub fn new(policy: TierPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Create an empty arena whose records are stamped by `clock`.
    pub fn with_clock(policy: TierPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            territories: HashMap::new(),
            nodes: HashMap::new(),
            persons: HashMap::new(),
            codes: HashMap::new(),
            policy,
            clock,
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Get a territory.
    pub fn territory(&self, id: TerritoryId) -> Result<&Territory> {
        self.territories
            .get(&id)
            .ok_or(HierarchyError::TerritoryNotFound(id))
    }

    /// Get a tier node.
    pub fn node(&self, id: NodeId) -> Result<&TierNode> {
        self.nodes.get(&id).ok_or(HierarchyError::NodeNotFound(id))
    }

    /// Get a person.
    pub fn person(&self, id: PersonId) -> Result<&Person> {
        self.persons.get(&id).ok_or(HierarchyError::PersonNotFound(id))
    }

    pub(crate) fn person_mut(&mut self, id: PersonId) -> Result<&mut Person> {
        self.persons
            .get_mut(&id)
            .ok_or(HierarchyError::PersonNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut TierNode> {
        self.nodes.get_mut(&id).ok_or(HierarchyError::NodeNotFound(id))
    }

    /// Iterate all persons.
    pub fn persons(&self) -> impl Iterator<Item = &Person> {
        self.persons.values()
    }

    /// Iterate all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &TierNode> {
        self.nodes.values()
    }

    /// Territory followed by its ancestors, nearest first.
    pub fn territory_chain(&self, id: TerritoryId) -> Result<Vec<TerritoryId>> {
        let mut chain = vec![id];
        let mut cursor = self.territory(id)?.parent;
        while let Some(current) = cursor {
            if chain.len() > self.territories.len() {
                return Err(HierarchyError::CorruptChain(id));
            }
            chain.push(current);
            cursor = self.territory(current)?.parent;
        }
        Ok(chain)
    }

    /// Whether `territory` is `ancestor` or lies beneath it.
    pub fn territory_within(&self, territory: TerritoryId, ancestor: TerritoryId) -> Result<bool> {
        Ok(self.territory_chain(territory)?.contains(&ancestor))
    }

    /// Node followed by its ancestors, nearest first.
    pub fn node_chain(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut chain = vec![id];
        let mut cursor = self.node(id)?.parent;
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.node(current)?.parent;
        }
        Ok(chain)
    }

    /// Whether the person's Tier1 membership lies in the subtree of `node`.
    pub fn is_in_subtree(&self, person: PersonId, node: NodeId) -> Result<bool> {
        self.node(node)?;
        match self.person(person)?.tier1_node {
            Some(base) => Ok(self.node_chain(base)?.contains(&node)),
            None => Ok(false),
        }
    }

    /// Whether the person belongs to the scope.
    ///
    /// National scope covers every person holding a Tier1 membership.
    pub fn is_in_scope(&self, person: PersonId, scope: Scope) -> Result<bool> {
        match scope {
            Scope::Node(node) => self.is_in_subtree(person, node),
            Scope::National => Ok(self.person(person)?.tier1_node.is_some()),
        }
    }

    /// Highest tier at which the person currently leads a node.
    pub fn leadership_tier(&self, person: PersonId) -> Option<Tier> {
        self.nodes
            .values()
            .filter(|n| n.leader == Some(person))
            .map(|n| n.tier)
            .max()
    }

    /// Leader roster for a tier.
    pub fn leaders_at(&self, tier: Tier) -> Vec<(NodeId, PersonId)> {
        let mut roster: Vec<(NodeId, PersonId)> = self
            .nodes
            .values()
            .filter(|n| n.tier == tier)
            .filter_map(|n| n.leader.map(|leader| (n.id, leader)))
            .collect();
        roster.sort();
        roster
    }

    /// Certified sponsors, optionally restricted to a territory and its
    /// sub-territories.
    pub fn sponsors(&self, territory: Option<TerritoryId>) -> Result<Vec<Person>> {
        if let Some(t) = territory {
            self.territory(t)?;
        }
        let mut sponsors = Vec::new();
        for person in self.persons.values().filter(|p| p.is_geder()) {
            let included = match (territory, person.territory) {
                (None, _) => true,
                (Some(filter), Some(own)) => self.territory_within(own, filter)?,
                (Some(_), None) => false,
            };
            if included {
                sponsors.push(person.clone());
            }
        }
        sponsors.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(sponsors)
    }

    /// The person's place in the hierarchy.
    pub fn position(&self, person: PersonId) -> Result<Position> {
        let record = self.person(person)?;
        let chain = match record.tier1_node {
            Some(base) => self.node_chain(base)?,
            None => Vec::new(),
        };
        let mut leads: Vec<(NodeId, Tier)> = self
            .nodes
            .values()
            .filter(|n| n.leader == Some(person))
            .map(|n| (n.id, n.tier))
            .collect();
        leads.sort_by_key(|(_, tier)| *tier);

        Ok(Position {
            person,
            tier1_node: record.tier1_node,
            chain,
            leads,
        })
    }

    /// Organization-wide summary.
    pub fn overview(&self) -> HierarchyOverview {
        let tiers = Tier::ascending()
            .into_iter()
            .map(|tier| {
                let nodes: Vec<&TierNode> = self.nodes.values().filter(|n| n.tier == tier).collect();
                TierOverview {
                    tier,
                    nodes: nodes.len(),
                    led_nodes: nodes.iter().filter(|n| n.leader.is_some()).count(),
                    active_nodes: nodes
                        .iter()
                        .filter(|n| n.status == GroupStatus::Active)
                        .count(),
                    members: nodes.iter().map(|n| n.member_count).sum(),
                }
            })
            .collect();

        HierarchyOverview {
            tiers,
            territories: self.territories.len(),
            persons: self.persons.len(),
            active_persons: self.persons.values().filter(|p| p.is_active()).count(),
            sponsors: self.persons.values().filter(|p| p.is_geder()).count(),
        }
    }

    /// Summary for one territory.
    pub fn territory_statistics(&self, territory: TerritoryId) -> Result<TerritoryStatistics> {
        self.territory(territory)?;
        let mut nodes_by_tier = BTreeMap::new();
        let mut members = 0;
        for node in self.nodes.values().filter(|n| n.territory == territory) {
            *nodes_by_tier.entry(node.tier).or_insert(0) += 1;
            if node.tier == Tier::Tier1 {
                members += node.members.len();
            }
        }
        Ok(TerritoryStatistics {
            territory,
            nodes_by_tier,
            members,
            persons: self
                .persons
                .values()
                .filter(|p| p.territory == Some(territory))
                .count(),
        })
    }

    // ------------------------------------------------------------------
    // Territories
    // ------------------------------------------------------------------

    /// Create a territory, optionally beneath `parent`.
    pub fn create_territory(
        &mut self,
        name: impl Into<String>,
        kind: TerritoryKind,
        parent: Option<TerritoryId>,
        code: Option<String>,
    ) -> Result<Territory> {
        if let Some(p) = parent {
            self.territory(p)?;
        }
        if let Some(code) = &code {
            if self.codes.contains_key(code) {
                return Err(HierarchyError::DuplicateCode(code.clone()));
            }
        }

        let territory = Territory {
            id: TerritoryId::new(),
            name: name.into(),
            code: code.clone(),
            kind,
            parent,
            children: Vec::new(),
            created_at: self.clock.now(),
        };

        if let Some(p) = parent {
            self.territories
                .get_mut(&p)
                .ok_or(HierarchyError::TerritoryNotFound(p))?
                .children
                .push(territory.id);
        }
        if let Some(code) = code {
            self.codes.insert(code, territory.id);
        }
        self.territories.insert(territory.id, territory.clone());
        Ok(territory)
    }

    /// Move a territory under `new_parent` (or make it a root).
    ///
    /// The ancestors of the new parent are walked before anything changes;
    /// finding the territory among them is a cycle.
    pub fn reparent_territory(
        &mut self,
        id: TerritoryId,
        new_parent: Option<TerritoryId>,
    ) -> Result<Territory> {
        let old_parent = self.territory(id)?.parent;

        if let Some(parent) = new_parent {
            if self.territory_chain(parent)?.contains(&id) {
                error!(territory = %id, parent = %parent, "Territory re-parent would create a cycle");
                return Err(HierarchyError::Cycle {
                    territory: id,
                    parent,
                });
            }
        }

        if let Some(old) = old_parent {
            if let Some(t) = self.territories.get_mut(&old) {
                t.children.retain(|c| *c != id);
            }
        }
        if let Some(parent) = new_parent {
            self.territories
                .get_mut(&parent)
                .ok_or(HierarchyError::TerritoryNotFound(parent))?
                .children
                .push(id);
        }

        let territory = self
            .territories
            .get_mut(&id)
            .ok_or(HierarchyError::TerritoryNotFound(id))?;
        territory.parent = new_parent;
        Ok(territory.clone())
    }

    // ------------------------------------------------------------------
    // Tier nodes
    // ------------------------------------------------------------------

    fn check_parent_tier(&self, tier: Tier, parent: Option<NodeId>) -> Result<()> {
        if let Some(p) = parent {
            let parent_tier = self.node(p)?.tier;
            if tier.next() != Some(parent_tier) {
                return Err(HierarchyError::TierMismatch {
                    child: tier,
                    parent: parent_tier,
                });
            }
        }
        Ok(())
    }

    /// Attach a new tier node to a territory, optionally under a parent node.
    pub fn attach_tier_node(
        &mut self,
        tier: Tier,
        name: impl Into<String>,
        territory: TerritoryId,
        parent: Option<NodeId>,
    ) -> Result<TierNode> {
        let kind = self.territory(territory)?.kind;
        if !self.policy.allows(kind, tier) {
            return Err(HierarchyError::TierNotPermitted { tier, kind });
        }
        self.check_parent_tier(tier, parent)?;

        let node = TierNode {
            id: NodeId::new(),
            tier,
            name: name.into(),
            territory,
            parent,
            children: Vec::new(),
            members: Vec::new(),
            status: GroupStatus::Forming,
            leader: None,
            member_count: 0,
            child_count: 0,
            created_at: self.clock.now(),
        };
        let id = node.id;
        self.nodes.insert(id, node);

        if let Some(p) = parent {
            self.node_mut(p)?.children.push(id);
            self.recompute_counts(p)?;
        }
        Ok(self.node(id)?.clone())
    }

    /// Move a node under a different parent (or detach it).
    pub fn reparent_node(&mut self, id: NodeId, new_parent: Option<NodeId>) -> Result<TierNode> {
        let (tier, old_parent) = {
            let node = self.node(id)?;
            (node.tier, node.parent)
        };
        self.check_parent_tier(tier, new_parent)?;
        if old_parent == new_parent {
            return Ok(self.node(id)?.clone());
        }

        // Leaders above the old position may no longer cover the members
        // that move away with this subtree.
        let members = self.subtree_members(id)?;

        if let Some(old) = old_parent {
            self.node_mut(old)?.children.retain(|c| *c != id);
        }
        if let Some(parent) = new_parent {
            self.node_mut(parent)?.children.push(id);
        }
        self.node_mut(id)?.parent = new_parent;

        let new_chain = match new_parent {
            Some(parent) => self.node_chain(parent)?,
            None => Vec::new(),
        };
        if let Some(old) = old_parent {
            self.recompute_counts(old)?;
            for ancestor in self.node_chain(old)? {
                if new_chain.contains(&ancestor) {
                    continue;
                }
                let leader = self.node(ancestor)?.leader;
                if let Some(leader) = leader {
                    if members.contains(&leader) {
                        self.node_mut(ancestor)?.leader = None;
                    }
                }
            }
        }
        if let Some(parent) = new_parent {
            self.recompute_counts(parent)?;
        }
        Ok(self.node(id)?.clone())
    }

    /// Set a node's lifecycle status.
    pub fn set_node_status(&mut self, id: NodeId, status: GroupStatus) -> Result<TierNode> {
        let node = self.node_mut(id)?;
        node.status = status;
        Ok(node.clone())
    }

    fn subtree_members(&self, id: NodeId) -> Result<HashSet<PersonId>> {
        let node = self.node(id)?;
        if node.tier == Tier::Tier1 {
            return Ok(node.members.iter().copied().collect());
        }
        let mut members = HashSet::new();
        for child in &node.children {
            members.extend(self.subtree_members(*child)?);
        }
        Ok(members)
    }

    fn derived_member_count(&self, id: NodeId) -> Result<usize> {
        let node = self.node(id)?;
        if node.tier == Tier::Tier1 {
            return Ok(node.members.len());
        }
        node.children
            .iter()
            .map(|child| self.derived_member_count(*child))
            .sum()
    }

    /// Re-derive counts for `node` and every ancestor.
    ///
    /// Counts come from the live collections, never from increments, so
    /// running this twice without a mutation in between changes nothing.
    pub fn recompute_counts(&mut self, node: NodeId) -> Result<Vec<NodeCounts>> {
        let mut updated = Vec::new();
        for id in self.node_chain(node)? {
            let member_count = self.derived_member_count(id)?;
            let record = self.node_mut(id)?;
            record.member_count = member_count;
            record.child_count = record.children.len();
            updated.push(NodeCounts {
                node: id,
                member_count,
                child_count: record.child_count,
            });
        }
        debug!(node = %node, levels = updated.len(), "Counts recomputed");
        Ok(updated)
    }

    /// Compare every stored count against its live collection, then every
    /// person's membership against the node rosters.
    ///
    /// Mismatches are reported, never corrected.
    pub fn audit_counts(&self) -> Result<()> {
        let mut mismatches = Vec::new();
        for node in self.nodes.values() {
            let derived_members = self.derived_member_count(node.id)?;
            let derived_children = node.children.len();
            if node.member_count != derived_members || node.child_count != derived_children {
                mismatches.push(CountMismatch {
                    node: node.id,
                    tier: node.tier,
                    stored_members: node.member_count,
                    derived_members,
                    stored_children: node.child_count,
                    derived_children,
                });
            }
        }

        if mismatches.is_empty() {
            return self.audit_memberships();
        }
        mismatches.sort_by_key(|m| (m.tier, m.node));
        for m in &mismatches {
            error!(
                node = %m.node,
                tier = %m.tier,
                stored_members = m.stored_members,
                derived_members = m.derived_members,
                stored_children = m.stored_children,
                derived_children = m.derived_children,
                "Count integrity violation"
            );
        }
        Err(HierarchyError::CountMismatch { mismatches })
    }

    /// Check that each person's Tier1 pointer and the member lists agree.
    pub fn audit_memberships(&self) -> Result<()> {
        let mut listed: HashMap<PersonId, Vec<NodeId>> = HashMap::new();
        for node in self.nodes.values() {
            for member in &node.members {
                listed.entry(*member).or_default().push(node.id);
            }
        }

        let mut mismatches = Vec::new();
        for person in self.persons.values() {
            let mut listed_in = listed.remove(&person.id).unwrap_or_default();
            listed_in.sort();
            let consistent = match person.tier1_node {
                Some(node) => listed_in == [node],
                None => listed_in.is_empty(),
            };
            if !consistent {
                mismatches.push(MembershipMismatch {
                    person: person.id,
                    recorded: person.tier1_node,
                    listed_in,
                });
            }
        }
        // Rosters naming persons that do not exist
        for (person, mut listed_in) in listed {
            listed_in.sort();
            mismatches.push(MembershipMismatch {
                person,
                recorded: None,
                listed_in,
            });
        }

        if mismatches.is_empty() {
            return Ok(());
        }
        mismatches.sort_by_key(|m| m.person);
        for m in &mismatches {
            error!(
                person = %m.person,
                recorded = ?m.recorded,
                listed_in = ?m.listed_in,
                "Membership integrity violation"
            );
        }
        Err(HierarchyError::MembershipMismatch { mismatches })
    }

    // ------------------------------------------------------------------
    // Persons and membership
    // ------------------------------------------------------------------

    /// Register a person.
    pub fn register_person(
        &mut self,
        display_name: impl Into<String>,
        territory: Option<TerritoryId>,
    ) -> Result<Person> {
        if let Some(t) = territory {
            self.territory(t)?;
        }
        let person = Person {
            id: PersonId::new(),
            display_name: display_name.into(),
            verification: VerificationState::Unverified,
            sponsorship_gate: false,
            onboarding_gate: false,
            territory,
            tier1_node: None,
            sponsor: None,
            penalties: 0,
            certified_at: None,
            onboarded_at: None,
            registered_at: self.clock.now(),
        };
        self.persons.insert(person.id, person.clone());
        Ok(person)
    }

    /// Record a completed sponsor certification.
    pub fn certify_sponsor(&mut self, id: PersonId) -> Result<Person> {
        let now = self.clock.now();
        let person = self.person_mut(id)?;
        person.verification = VerificationState::Geder;
        person.certified_at.get_or_insert(now);
        Ok(person.clone())
    }

    /// Open the onboarding gate. Repeating it keeps the first timestamp.
    pub fn complete_onboarding(&mut self, id: PersonId) -> Result<Person> {
        let now = self.clock.now();
        let person = self.person_mut(id)?;
        person.onboarding_gate = true;
        person.onboarded_at.get_or_insert(now);
        Ok(person.clone())
    }

    /// Open the supporter's sponsorship gate under `sponsor`.
    ///
    /// An unverified supporter becomes a sponsored supporter; higher
    /// verification is kept.
    pub fn grant_sponsorship(&mut self, supporter: PersonId, sponsor: PersonId) -> Result<Person> {
        self.person(sponsor)?;
        let person = self.person_mut(supporter)?;
        person.sponsorship_gate = true;
        person.sponsor = Some(sponsor);
        if person.verification == VerificationState::Unverified {
            person.verification = VerificationState::SponsoredSupporter;
        }
        Ok(person.clone())
    }

    /// Close the supporter's sponsorship gate and add `penalty_points`.
    ///
    /// The sponsor pointer is cleared only while it still names `sponsor`.
    /// A sponsored supporter drops back to unverified.
    pub fn withdraw_sponsorship(
        &mut self,
        supporter: PersonId,
        sponsor: PersonId,
        penalty_points: u32,
    ) -> Result<Person> {
        let person = self.person_mut(supporter)?;
        person.sponsorship_gate = false;
        if person.sponsor == Some(sponsor) {
            person.sponsor = None;
        }
        if person.verification == VerificationState::SponsoredSupporter {
            person.verification = VerificationState::Unverified;
        }
        person.penalties = person.penalties.saturating_add(penalty_points);
        Ok(person.clone())
    }

    /// Move the person's Tier1 membership to `node`.
    pub fn assign_member(&mut self, person: PersonId, node: NodeId) -> Result<MembershipChange> {
        let tier = self.node(node)?.tier;
        if tier != Tier::Tier1 {
            return Err(HierarchyError::NotBaseUnit { node, tier });
        }
        let from = self.person(person)?.tier1_node;
        if from == Some(node) {
            return Ok(MembershipChange {
                person,
                from,
                to: node,
                cleared_leaderships: Vec::new(),
            });
        }

        let old_chain = match from {
            Some(old) => self.node_chain(old)?,
            None => Vec::new(),
        };
        let new_chain = self.node_chain(node)?;

        if let Some(old) = from {
            self.node_mut(old)?.members.retain(|m| *m != person);
        }
        self.node_mut(node)?.members.push(person);
        self.person_mut(person)?.tier1_node = Some(node);

        let mut cleared_leaderships = Vec::new();
        for id in old_chain.iter().filter(|id| !new_chain.contains(id)) {
            let record = self.node_mut(*id)?;
            if record.leader == Some(person) {
                record.leader = None;
                cleared_leaderships.push(*id);
            }
        }

        if let Some(old) = from {
            self.recompute_counts(old)?;
        }
        self.recompute_counts(node)?;

        Ok(MembershipChange {
            person,
            from,
            to: node,
            cleared_leaderships,
        })
    }

    // ------------------------------------------------------------------
    // Leadership
    // ------------------------------------------------------------------

    /// Make `person` the leader of `node`, returning the previous leader.
    pub fn set_leader(&mut self, node: NodeId, person: PersonId) -> Result<Option<PersonId>> {
        if !self.is_in_subtree(person, node)? {
            return Err(HierarchyError::Membership { person, node });
        }
        let record = self.node_mut(node)?;
        Ok(record.leader.replace(person))
    }

    /// Remove the leader of `node`, returning who it was.
    pub fn clear_leader(&mut self, node: NodeId) -> Result<Option<PersonId>> {
        Ok(self.node_mut(node)?.leader.take())
    }

    #[cfg(test)]
    pub(crate) fn corrupt_member_count(&mut self, node: NodeId, value: usize) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.member_count = value;
        }
    }
}

impl Default for HierarchyState {
    fn default() -> Self {
        Self::new(TierPolicy::default())
    }
}

/// Shared, lock-guarded hierarchy store.
#[derive(Clone)]
pub struct HierarchyStore {
    state: Arc<RwLock<HierarchyState>>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

impl HierarchyStore {
    /// Create a store with a permissive tier policy.
    pub fn new(events: EventBus) -> Self {
        Self::with_policy(TierPolicy::permissive(), events)
    }

    /// Create a store governed by `policy`.
    pub fn with_policy(policy: TierPolicy, events: EventBus) -> Self {
        Self::with_clock(policy, events, Arc::new(SystemClock))
    }

    /// Create a store whose records and events are stamped by `clock`.
    pub fn with_clock(policy: TierPolicy, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(HierarchyState::with_clock(
                policy,
                clock.clone(),
            ))),
            events,
            clock,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set how long operations wait for the lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// The bus events are published on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The clock records are stamped with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn publish(&self, event: DomainEvent) {
        self.publish(event.at(self.clock.now()));
    }

    /// Acquire shared read access.
    pub async fn read(&self) -> Result<RwLockReadGuard<'_, HierarchyState>> {
        Ok(acquire(self.state.read(), "hierarchy", self.lock_timeout).await?)
    }

    /// Acquire exclusive write access for a multi-step transaction.
    pub async fn write(&self) -> Result<RwLockWriteGuard<'_, HierarchyState>> {
        Ok(acquire(self.state.write(), "hierarchy", self.lock_timeout).await?)
    }

    /// Create a territory.
    pub async fn create_territory(
        &self,
        name: impl Into<String>,
        kind: TerritoryKind,
        parent: Option<TerritoryId>,
        code: Option<String>,
    ) -> Result<Territory> {
        let territory = self.write().await?.create_territory(name, kind, parent, code)?;
        info!(territory = %territory.id, kind = %territory.kind, "Territory created");
        self.publish(
            DomainEvent::new(EntityKind::Territory, territory.id, "created")
                .with_detail(json!({ "kind": territory.kind, "parent": territory.parent })),
        );
        Ok(territory)
    }

    /// Move a territory under a new parent.
    pub async fn reparent_territory(
        &self,
        id: TerritoryId,
        new_parent: Option<TerritoryId>,
    ) -> Result<Territory> {
        let territory = self.write().await?.reparent_territory(id, new_parent)?;
        info!(territory = %id, parent = ?new_parent, "Territory re-parented");
        self.publish(
            DomainEvent::new(EntityKind::Territory, id, "reparented")
                .with_detail(json!({ "parent": new_parent })),
        );
        Ok(territory)
    }

    /// Attach a tier node.
    pub async fn attach_tier_node(
        &self,
        tier: Tier,
        name: impl Into<String>,
        territory: TerritoryId,
        parent: Option<NodeId>,
    ) -> Result<TierNode> {
        let node = self
            .write()
            .await?
            .attach_tier_node(tier, name, territory, parent)?;
        info!(node = %node.id, tier = %tier, territory = %territory, "Tier node attached");
        self.publish(
            DomainEvent::new(EntityKind::TierNode, node.id, "attached")
                .with_detail(json!({ "tier": tier, "territory": territory, "parent": parent })),
        );
        Ok(node)
    }

    /// Move a tier node under a new parent.
    pub async fn reparent_node(&self, id: NodeId, new_parent: Option<NodeId>) -> Result<TierNode> {
        let node = self.write().await?.reparent_node(id, new_parent)?;
        info!(node = %id, parent = ?new_parent, "Tier node re-parented");
        self.publish(
            DomainEvent::new(EntityKind::TierNode, id, "reparented")
                .with_detail(json!({ "parent": new_parent })),
        );
        Ok(node)
    }

    /// Set a node's status.
    pub async fn set_node_status(&self, id: NodeId, status: GroupStatus) -> Result<TierNode> {
        let node = self.write().await?.set_node_status(id, status)?;
        self.publish(
            DomainEvent::new(EntityKind::TierNode, id, "status_changed")
                .with_detail(json!({ "status": status })),
        );
        Ok(node)
    }

    /// Register a person.
    pub async fn register_person(
        &self,
        display_name: impl Into<String>,
        territory: Option<TerritoryId>,
    ) -> Result<Person> {
        let person = self.write().await?.register_person(display_name, territory)?;
        debug!(person = %person.id, "Person registered");
        self.publish(DomainEvent::new(EntityKind::Person, person.id, "registered"));
        Ok(person)
    }

    /// Certify a person as a sponsor.
    pub async fn certify_sponsor(&self, id: PersonId) -> Result<Person> {
        let person = self.write().await?.certify_sponsor(id)?;
        info!(person = %id, "Sponsor certified");
        self.publish(DomainEvent::new(EntityKind::Person, id, "certified"));
        Ok(person)
    }

    /// Mark onboarding complete.
    pub async fn complete_onboarding(&self, id: PersonId) -> Result<Person> {
        let person = self.write().await?.complete_onboarding(id)?;
        self.publish(
            DomainEvent::new(EntityKind::Person, id, "onboarded")
                .with_detail(json!({ "active": person.is_active() })),
        );
        Ok(person)
    }

    /// Move a person's Tier1 membership.
    pub async fn assign_member(&self, person: PersonId, node: NodeId) -> Result<MembershipChange> {
        let change = self.write().await?.assign_member(person, node)?;
        info!(
            person = %person,
            from = ?change.from,
            to = %node,
            cleared = change.cleared_leaderships.len(),
            "Membership assigned"
        );
        self.publish(
            DomainEvent::new(EntityKind::Person, person, "membership_assigned")
                .with_detail(json!({ "from": change.from, "to": node })),
        );
        for cleared in &change.cleared_leaderships {
            self.publish(
                DomainEvent::new(EntityKind::TierNode, cleared, "leader_cleared")
                    .with_detail(json!({ "person": person })),
            );
        }
        Ok(change)
    }

    /// Make `person` the leader of `node`.
    pub async fn set_leader(&self, node: NodeId, person: PersonId) -> Result<Option<PersonId>> {
        let previous = self.write().await?.set_leader(node, person)?;
        info!(node = %node, leader = %person, "Leader set");
        self.publish(
            DomainEvent::new(EntityKind::TierNode, node, "leader_set")
                .with_detail(json!({ "leader": person, "previous": previous })),
        );
        Ok(previous)
    }

    /// Remove a node's leader.
    pub async fn clear_leader(&self, node: NodeId) -> Result<Option<PersonId>> {
        let previous = self.write().await?.clear_leader(node)?;
        if previous.is_some() {
            self.publish(
                DomainEvent::new(EntityKind::TierNode, node, "leader_cleared")
                    .with_detail(json!({ "person": previous })),
            );
        }
        Ok(previous)
    }

    /// Recompute counts for a node and its ancestors.
    pub async fn recompute_counts(&self, node: NodeId) -> Result<Vec<NodeCounts>> {
        self.write().await?.recompute_counts(node)
    }

    /// Audit every stored count.
    pub async fn audit_counts(&self) -> Result<()> {
        self.read().await?.audit_counts()
    }

    /// Get a territory.
    pub async fn territory(&self, id: TerritoryId) -> Result<Territory> {
        Ok(self.read().await?.territory(id)?.clone())
    }

    /// Get a node.
    pub async fn node(&self, id: NodeId) -> Result<TierNode> {
        Ok(self.read().await?.node(id)?.clone())
    }

    /// Get a person.
    pub async fn person(&self, id: PersonId) -> Result<Person> {
        Ok(self.read().await?.person(id)?.clone())
    }

    /// Node followed by its ancestors.
    pub async fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.read().await?.node_chain(id)
    }

    /// Whether the person belongs to the node's subtree.
    pub async fn is_in_subtree(&self, person: PersonId, node: NodeId) -> Result<bool> {
        self.read().await?.is_in_subtree(person, node)
    }

    /// Highest tier the person leads.
    pub async fn leadership_tier(&self, person: PersonId) -> Result<Option<Tier>> {
        Ok(self.read().await?.leadership_tier(person))
    }

    /// Leader roster for a tier.
    pub async fn leaders_at(&self, tier: Tier) -> Result<Vec<(NodeId, PersonId)>> {
        Ok(self.read().await?.leaders_at(tier))
    }

    /// The person's position.
    pub async fn position(&self, person: PersonId) -> Result<Position> {
        self.read().await?.position(person)
    }

    /// Organization-wide summary.
    pub async fn overview(&self) -> Result<HierarchyOverview> {
        Ok(self.read().await?.overview())
    }

    /// Summary for one territory.
    pub async fn territory_statistics(&self, territory: TerritoryId) -> Result<TerritoryStatistics> {
        self.read().await?.territory_statistics(territory)
    }
}
