//! Election engine.
//!
//! Each election record sits behind its own mutex in a concurrent registry,
//! so ballots in different elections never contend. Ballot insertion and both
//! tally increments happen under that one lock. Closing takes the election
//! lock first, then the hierarchy write lock for leader promotion.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use hierarchy::{
    acquire, DomainEvent, EntityKind, EventBus, HierarchyState, HierarchyStore, PersonId, Scope,
};

use super::tally::{self, Decision};
use super::{
    Candidate, Election, ElectionError, ElectionOutcome, ElectionResults, ElectionStatus,
    ElectionType, ElectionWindow, Result, Vote,
};
use hierarchy::Clock;
use crate::config::ElectionConfig;
use crate::types::{CandidateId, ElectionId, VoteId};

#[derive(Debug)]
struct ElectionRecord {
    election: Election,
    candidates: Vec<Candidate>,
    /// Ballots keyed by voter
    votes: HashMap<PersonId, Vote>,
}

impl ElectionRecord {
    fn transition_error(&self, action: &'static str) -> ElectionError {
        ElectionError::InvalidTransition {
            election: self.election.id,
            status: self.election.status,
            action,
        }
    }
}

/// Runs elections over the hierarchy.
#[derive(Clone)]
pub struct ElectionEngine {
    elections: Arc<DashMap<ElectionId, Arc<Mutex<ElectionRecord>>>>,
    hierarchy: HierarchyStore,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: ElectionConfig,
    lock_timeout: Duration,
}

impl ElectionEngine {
    /// Create an engine over `hierarchy`.
    pub fn new(
        hierarchy: HierarchyStore,
        clock: Arc<dyn Clock>,
        config: ElectionConfig,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            elections: Arc::new(DashMap::new()),
            events: hierarchy.events().clone(),
            hierarchy,
            clock,
            config,
            lock_timeout,
        }
    }

    async fn lock(&self, id: ElectionId) -> Result<OwnedMutexGuard<ElectionRecord>> {
        let entry = self
            .elections
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(ElectionError::NotFound(id))?;
        Ok(acquire(entry.lock_owned(), "election", self.lock_timeout).await?)
    }

    /// Schedule a new election.
    pub async fn open(
        &self,
        election_type: ElectionType,
        title: impl Into<String>,
        description: Option<String>,
        scope: Scope,
        window: ElectionWindow,
    ) -> Result<Election> {
        if window.starts_at >= window.ends_at {
            return Err(ElectionError::InvalidWindow(window));
        }

        {
            let state = self.hierarchy.read().await?;
            let fits = match (election_type.required_tier(), scope) {
                (Some(tier), Scope::Node(node)) => state.node(node)?.tier == tier,
                (None, Scope::National) => true,
                _ => false,
            };
            if !fits {
                return Err(ElectionError::ScopeMismatch {
                    election_type,
                    scope,
                });
            }
        }

        let election = Election {
            id: ElectionId::new(),
            election_type,
            title: title.into(),
            description,
            scope,
            window,
            status: ElectionStatus::Scheduled,
            total_votes: 0,
            outcome: None,
            needs_manual_resolution: false,
            created_at: self.clock.now(),
        };
        self.elections.insert(
            election.id,
            Arc::new(Mutex::new(ElectionRecord {
                election: election.clone(),
                candidates: Vec::new(),
                votes: HashMap::new(),
            })),
        );

        info!(
            election = %election.id,
            election_type = %election_type,
            scope = %scope,
            "Election scheduled"
        );
        self.publish(
            &election,
            "opened",
            None,
            json!({ "election_type": election_type, "scope": scope, "window": window }),
        );
        Ok(election)
    }

    /// Open voting. Only a scheduled election inside its window can start.
    pub async fn activate(&self, id: ElectionId) -> Result<Election> {
        let mut record = self.lock(id).await?;
        if record.election.status != ElectionStatus::Scheduled {
            return Err(record.transition_error("activate"));
        }
        let now = self.clock.now();
        if !record.election.window.contains(now) {
            return Err(ElectionError::OutsideWindow {
                election: id,
                window: record.election.window,
            });
        }

        record.election.status = ElectionStatus::Active;
        let election = record.election.clone();
        drop(record);

        info!(election = %id, "Election activated");
        self.publish(&election, "activated", None, serde_json::Value::Null);
        Ok(election)
    }

    /// Register `person` as a candidate.
    pub async fn register_candidate(
        &self,
        id: ElectionId,
        person: PersonId,
        statement: impl Into<String>,
    ) -> Result<Candidate> {
        let mut record = self.lock(id).await?;
        if !matches!(
            record.election.status,
            ElectionStatus::Scheduled | ElectionStatus::Active
        ) {
            return Err(record.transition_error("register a candidate in"));
        }
        if record.candidates.iter().any(|c| c.person == person) {
            return Err(ElectionError::DuplicateCandidate {
                election: id,
                person,
            });
        }
        {
            let state = self.hierarchy.read().await?;
            self.check_eligible(
                &state,
                id,
                record.election.scope,
                person,
                self.config.require_active_candidates,
            )?;
        }

        let candidate = Candidate {
            id: CandidateId::new(),
            person,
            statement: statement.into(),
            vote_count: 0,
            registered_at: self.clock.now(),
        };
        record.candidates.push(candidate.clone());
        let election = record.election.clone();
        drop(record);

        info!(election = %id, candidate = %candidate.id, person = %person, "Candidate registered");
        self.publish(
            &election,
            "candidate_registered",
            Some(person),
            json!({ "candidate": candidate.id }),
        );
        Ok(candidate)
    }

    /// Cast `voter`'s single ballot for `candidate`.
    pub async fn cast_vote(
        &self,
        id: ElectionId,
        voter: PersonId,
        candidate: CandidateId,
    ) -> Result<Vote> {
        let mut record = self.lock(id).await?;
        let now = self.clock.now();

        if record.election.status != ElectionStatus::Active
            || !record.election.window.contains(now)
        {
            return Err(ElectionError::VotingClosed(id));
        }
        if record.votes.contains_key(&voter) {
            warn!(election = %id, voter = %voter, "Repeat ballot rejected");
            return Err(ElectionError::DuplicateVote {
                election: id,
                voter,
            });
        }
        {
            let state = self.hierarchy.read().await?;
            self.check_eligible(
                &state,
                id,
                record.election.scope,
                voter,
                self.config.require_active_voters,
            )?;
        }

        let record = &mut *record;
        let chosen = record
            .candidates
            .iter_mut()
            .find(|c| c.id == candidate)
            .ok_or(ElectionError::UnknownCandidate {
                election: id,
                candidate,
            })?;

        let vote = Vote {
            id: VoteId::new(),
            voter,
            candidate,
            receipt: tally::receipt(id, voter, candidate, now),
            cast_at: now,
        };
        chosen.vote_count += 1;
        record.election.total_votes += 1;
        record.votes.insert(voter, vote.clone());
        let total_votes = record.election.total_votes;

        debug!(election = %id, total_votes, "Ballot recorded");
        self.events.publish(
            DomainEvent::new(EntityKind::Election, id, "vote_cast")
                .by(voter)
                .at(now)
                .with_detail(json!({ "total_votes": total_votes })),
        );
        Ok(vote)
    }

    /// Close the election and declare the outcome.
    ///
    /// Without `actor_is_admin` the window must have ended. A strict winner of
    /// a node-scoped election becomes that node's leader; if the promotion
    /// fails the election is left exactly as it was.
    pub async fn close(&self, id: ElectionId, actor_is_admin: bool) -> Result<Election> {
        let mut record = self.lock(id).await?;
        if !matches!(
            record.election.status,
            ElectionStatus::Scheduled | ElectionStatus::Active
        ) {
            return Err(record.transition_error("close"));
        }
        let now = self.clock.now();
        if !actor_is_admin && now < record.election.window.ends_at {
            return Err(ElectionError::WindowOpen(id));
        }

        if let Err(detail) = tally::verify(
            &record.candidates,
            record.votes.values(),
            record.election.total_votes,
        ) {
            error!(election = %id, detail = %detail, "Election tally integrity violation");
            return Err(ElectionError::TallyMismatch {
                election: id,
                detail,
            });
        }

        let decision = tally::decide(&record.candidates);
        let mut promoted = None;
        let mut hierarchy_guard = None;
        if let (Decision::Winner { person, .. }, Scope::Node(node)) =
            (&decision, record.election.scope)
        {
            let mut state = self.hierarchy.write().await?;
            let previous = state
                .set_leader(node, *person)
                .map_err(|source| ElectionError::LeaderPromotion {
                    election: id,
                    source,
                })?;
            promoted = Some((node, *person, previous));
            hierarchy_guard = Some(state);
        }

        let outcome = match &decision {
            Decision::NoContest => ElectionOutcome {
                winner: None,
                winning_votes: 0,
                tied: Vec::new(),
                manually_resolved: false,
                decided_at: now,
            },
            Decision::Winner { person, votes, .. } => ElectionOutcome {
                winner: Some(*person),
                winning_votes: *votes,
                tied: Vec::new(),
                manually_resolved: false,
                decided_at: now,
            },
            Decision::Tie { persons, votes } => ElectionOutcome {
                winner: None,
                winning_votes: *votes,
                tied: persons.clone(),
                manually_resolved: false,
                decided_at: now,
            },
        };
        record.election.needs_manual_resolution = matches!(decision, Decision::Tie { .. });
        record.election.outcome = Some(outcome);
        record.election.status = ElectionStatus::Completed;
        let election = record.election.clone();
        drop(hierarchy_guard);
        drop(record);

        match &decision {
            Decision::Winner { person, votes, .. } => {
                info!(election = %id, winner = %person, votes, "Election completed")
            }
            Decision::Tie { persons, votes } => warn!(
                election = %id,
                tied = persons.len(),
                votes,
                "Election tied, manual resolution required"
            ),
            Decision::NoContest => info!(election = %id, "Election completed without a contest"),
        }
        self.publish(
            &election,
            "completed",
            None,
            json!({
                "winner": election.outcome.as_ref().and_then(|o| o.winner),
                "needs_manual_resolution": election.needs_manual_resolution,
                "admin_close": actor_is_admin,
            }),
        );
        if let Some((node, leader, previous)) = promoted {
            self.publish_leader(node, leader, previous, id);
        }
        Ok(election)
    }

    /// Call off a scheduled or active election.
    pub async fn cancel(&self, id: ElectionId) -> Result<Election> {
        let mut record = self.lock(id).await?;
        if !matches!(
            record.election.status,
            ElectionStatus::Scheduled | ElectionStatus::Active
        ) {
            return Err(record.transition_error("cancel"));
        }
        record.election.status = ElectionStatus::Cancelled;
        let election = record.election.clone();
        drop(record);

        info!(election = %id, "Election cancelled");
        self.publish(&election, "cancelled", None, serde_json::Value::Null);
        Ok(election)
    }

    /// Settle a tie by choosing one of the tied candidates.
    pub async fn resolve_tie(&self, id: ElectionId, chosen: PersonId) -> Result<Election> {
        let mut record = self.lock(id).await?;
        if record.election.status != ElectionStatus::Completed
            || !record.election.needs_manual_resolution
        {
            return Err(ElectionError::NoTie(id));
        }
        let tied = record
            .election
            .outcome
            .as_ref()
            .map(|o| o.tied.contains(&chosen))
            .unwrap_or(false);
        if !tied {
            return Err(ElectionError::NotTied {
                election: id,
                person: chosen,
            });
        }

        let mut promoted = None;
        let mut hierarchy_guard = None;
        if let Scope::Node(node) = record.election.scope {
            let mut state = self.hierarchy.write().await?;
            let previous = state
                .set_leader(node, chosen)
                .map_err(|source| ElectionError::LeaderPromotion {
                    election: id,
                    source,
                })?;
            promoted = Some((node, previous));
            hierarchy_guard = Some(state);
        }

        if let Some(outcome) = record.election.outcome.as_mut() {
            outcome.winner = Some(chosen);
            outcome.manually_resolved = true;
        }
        record.election.needs_manual_resolution = false;
        let election = record.election.clone();
        drop(hierarchy_guard);
        drop(record);

        info!(election = %id, winner = %chosen, "Tie resolved");
        self.publish(&election, "tie_resolved", None, json!({ "winner": chosen }));
        if let Some((node, previous)) = promoted {
            self.publish_leader(node, chosen, previous, id);
        }
        Ok(election)
    }

    /// Get an election.
    pub async fn election(&self, id: ElectionId) -> Result<Election> {
        Ok(self.lock(id).await?.election.clone())
    }

    /// Candidates ordered by tally, most votes first.
    pub async fn results(&self, id: ElectionId) -> Result<ElectionResults> {
        let record = self.lock(id).await?;
        let mut candidates = record.candidates.clone();
        candidates.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then(a.registered_at.cmp(&b.registered_at))
        });
        Ok(ElectionResults {
            election: record.election.clone(),
            candidates,
        })
    }

    /// Elections, oldest first, optionally filtered by status.
    pub async fn list(&self, status: Option<ElectionStatus>) -> Result<Vec<Election>> {
        let entries: Vec<Arc<Mutex<ElectionRecord>>> =
            self.elections.iter().map(|e| e.value().clone()).collect();

        let mut elections = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = acquire(entry.lock_owned(), "election", self.lock_timeout).await?;
            if status.map_or(true, |s| s == record.election.status) {
                elections.push(record.election.clone());
            }
        }
        elections.sort_by_key(|e| e.created_at);
        Ok(elections)
    }

    /// Whether `receipt` is the receipt of `voter`'s ballot in this election.
    pub async fn verify_receipt(
        &self,
        id: ElectionId,
        voter: PersonId,
        receipt: &str,
    ) -> Result<bool> {
        let record = self.lock(id).await?;
        Ok(record.votes.get(&voter).is_some_and(|vote| {
            vote.receipt == receipt
                && tally::receipt(id, voter, vote.candidate, vote.cast_at) == vote.receipt
        }))
    }

    fn check_eligible(
        &self,
        state: &HierarchyState,
        election: ElectionId,
        scope: Scope,
        person: PersonId,
        require_active: bool,
    ) -> Result<()> {
        let record = state.person(person)?;
        if !state.is_in_scope(person, scope)? {
            return Err(ElectionError::ScopeIneligible { election, person });
        }
        if require_active && !record.is_active() {
            return Err(ElectionError::NotActive(person));
        }
        Ok(())
    }

    fn publish(
        &self,
        election: &Election,
        transition: &str,
        actor: Option<PersonId>,
        detail: serde_json::Value,
    ) {
        let mut event = DomainEvent::new(EntityKind::Election, election.id, transition)
            .at(self.clock.now())
            .with_detail(detail);
        if let Some(actor) = actor {
            event = event.by(actor);
        }
        self.events.publish(event);
    }

    fn publish_leader(
        &self,
        node: hierarchy::NodeId,
        leader: PersonId,
        previous: Option<PersonId>,
        election: ElectionId,
    ) {
        self.events.publish(
            DomainEvent::new(EntityKind::TierNode, node, "leader_set")
                .at(self.clock.now())
                .with_detail(json!({ "leader": leader, "previous": previous, "election": election })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hierarchy::ManualClock;
    use chrono::{Duration as ChronoDuration, Utc};
    use hierarchy::{ErrorKind, NodeId, TerritoryKind, Tier, TierPolicy};

    struct Fixture {
        engine: ElectionEngine,
        store: HierarchyStore,
        clock: ManualClock,
        sponsor: PersonId,
        t2: NodeId,
        t1a: NodeId,
        t1b: NodeId,
    }

    async fn fixture(config: ElectionConfig) -> Fixture {
        let clock = ManualClock::new(Utc::now());
        let store = HierarchyStore::with_clock(
            TierPolicy::permissive(),
            EventBus::default(),
            Arc::new(clock.clone()),
        )
        .with_lock_timeout(std::time::Duration::from_millis(200));
        let sponsor = store.register_person("Sponsor", None).await.unwrap().id;
        store.certify_sponsor(sponsor).await.unwrap();
        let territory = store
            .create_territory("Rustavi", TerritoryKind::Municipality, None, None)
            .await
            .unwrap()
            .id;
        let t2 = store
            .attach_tier_node(Tier::Tier2, "T2", territory, None)
            .await
            .unwrap()
            .id;
        let t1a = store
            .attach_tier_node(Tier::Tier1, "T1a", territory, Some(t2))
            .await
            .unwrap()
            .id;
        let t1b = store
            .attach_tier_node(Tier::Tier1, "T1b", territory, Some(t2))
            .await
            .unwrap()
            .id;

        let engine = ElectionEngine::new(
            store.clone(),
            Arc::new(clock.clone()),
            config,
            std::time::Duration::from_secs(1),
        );
        Fixture {
            engine,
            store,
            clock,
            sponsor,
            t2,
            t1a,
            t1b,
        }
    }

    impl Fixture {
        async fn member(&self, node: NodeId, active: bool) -> PersonId {
            let id = self.store.register_person("m", None).await.unwrap().id;
            self.store.assign_member(id, node).await.unwrap();
            if active {
                self.store.complete_onboarding(id).await.unwrap();
                let mut state = self.store.write().await.unwrap();
                state.grant_sponsorship(id, self.sponsor).unwrap();
            }
            id
        }

        fn window(&self) -> ElectionWindow {
            let now = self.clock.now();
            ElectionWindow::new(now, now + ChronoDuration::days(1))
        }

        async fn active_election(&self, node: NodeId) -> ElectionId {
            let election = self
                .engine
                .open(
                    ElectionType::Tier1Leader,
                    "Leader",
                    None,
                    Scope::Node(node),
                    self.window(),
                )
                .await
                .unwrap();
            self.engine.activate(election.id).await.unwrap();
            election.id
        }
    }

    #[tokio::test]
    async fn test_open_validation() {
        let f = fixture(ElectionConfig::default()).await;
        let now = f.clock.now();

        let err = f
            .engine
            .open(
                ElectionType::Tier1Leader,
                "bad window",
                None,
                Scope::Node(f.t1a),
                ElectionWindow::new(now, now),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ElectionError::InvalidWindow(_)));

        let err = f
            .engine
            .open(ElectionType::Tier2Leader, "x", None, Scope::Node(f.t1a), f.window())
            .await
            .unwrap_err();
        assert!(matches!(err, ElectionError::ScopeMismatch { .. }));

        let err = f
            .engine
            .open(ElectionType::Tier1Leader, "x", None, Scope::National, f.window())
            .await
            .unwrap_err();
        assert!(matches!(err, ElectionError::ScopeMismatch { .. }));

        let election = f
            .engine
            .open(ElectionType::Parliamentary, "Parliament", None, Scope::National, f.window())
            .await
            .unwrap();
        assert_eq!(election.status, ElectionStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_activate_requires_window() {
        let f = fixture(ElectionConfig::default()).await;
        let now = f.clock.now();
        let election = f
            .engine
            .open(
                ElectionType::Tier2Leader,
                "Later",
                None,
                Scope::Node(f.t2),
                ElectionWindow::new(now + ChronoDuration::hours(1), now + ChronoDuration::hours(2)),
            )
            .await
            .unwrap();

        let err = f.engine.activate(election.id).await.unwrap_err();
        assert!(matches!(err, ElectionError::OutsideWindow { .. }));

        f.clock.advance(ChronoDuration::minutes(90));
        f.engine.activate(election.id).await.unwrap();
        let err = f.engine.activate(election.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[tokio::test]
    async fn test_vote_rules() {
        let f = fixture(ElectionConfig::default()).await;
        let candidate_person = f.member(f.t1a, true).await;
        let voter = f.member(f.t1a, true).await;
        let outsider = f.member(f.t1b, true).await;
        let passive = f.member(f.t1a, false).await;

        let id = f
            .engine
            .open(ElectionType::Tier1Leader, "T1a", None, Scope::Node(f.t1a), f.window())
            .await
            .unwrap()
            .id;
        let candidate = f.engine.register_candidate(id, candidate_person, "me").await.unwrap();

        // Not yet active
        let err = f.engine.cast_vote(id, voter, candidate.id).await.unwrap_err();
        assert!(matches!(err, ElectionError::VotingClosed(_)));
        f.engine.activate(id).await.unwrap();

        let vote = f.engine.cast_vote(id, voter, candidate.id).await.unwrap();
        let err = f.engine.cast_vote(id, voter, candidate.id).await.unwrap_err();
        assert!(matches!(err, ElectionError::DuplicateVote { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = f.engine.cast_vote(id, outsider, candidate.id).await.unwrap_err();
        assert!(matches!(err, ElectionError::ScopeIneligible { .. }));

        let err = f.engine.cast_vote(id, passive, candidate.id).await.unwrap_err();
        assert!(matches!(err, ElectionError::NotActive(_)));

        let err = f
            .engine
            .cast_vote(id, candidate_person, CandidateId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ElectionError::UnknownCandidate { .. }));

        assert!(f.engine.verify_receipt(id, voter, &vote.receipt).await.unwrap());
        assert!(!f.engine.verify_receipt(id, voter, "forged").await.unwrap());
        assert!(!f.engine.verify_receipt(id, outsider, &vote.receipt).await.unwrap());

        // Window over
        f.clock.advance(ChronoDuration::days(2));
        let err = f.engine.cast_vote(id, candidate_person, candidate.id).await.unwrap_err();
        assert!(matches!(err, ElectionError::VotingClosed(_)));
    }

    #[tokio::test]
    async fn test_passive_allowed_when_configured() {
        let f = fixture(ElectionConfig {
            require_active_voters: false,
            require_active_candidates: false,
        })
        .await;
        let passive = f.member(f.t1a, false).await;
        let id = f.active_election(f.t1a).await;

        let candidate = f.engine.register_candidate(id, passive, "").await.unwrap();
        f.engine.cast_vote(id, passive, candidate.id).await.unwrap();

        let err = f.engine.register_candidate(id, passive, "").await.unwrap_err();
        assert!(matches!(err, ElectionError::DuplicateCandidate { .. }));
    }

    #[tokio::test]
    async fn test_close_promotes_winner() {
        let f = fixture(ElectionConfig::default()).await;
        let a = f.member(f.t1a, true).await;
        let b = f.member(f.t1a, true).await;
        let id = f.active_election(f.t1a).await;
        let ca = f.engine.register_candidate(id, a, "").await.unwrap();
        f.engine.register_candidate(id, b, "").await.unwrap();
        f.engine.cast_vote(id, a, ca.id).await.unwrap();

        let err = f.engine.close(id, false).await.unwrap_err();
        assert!(matches!(err, ElectionError::WindowOpen(_)));

        f.clock.advance(ChronoDuration::days(1));
        let election = f.engine.close(id, false).await.unwrap();
        assert_eq!(election.status, ElectionStatus::Completed);
        assert_eq!(election.outcome.as_ref().and_then(|o| o.winner), Some(a));
        assert!(!election.needs_manual_resolution);
        assert_eq!(f.store.node(f.t1a).await.unwrap().leader, Some(a));

        let results = f.engine.results(id).await.unwrap();
        assert_eq!(results.candidates[0].person, a);
        assert_eq!(results.candidates[1].vote_count, 0);

        let err = f.engine.close(id, true).await.unwrap_err();
        assert!(matches!(err, ElectionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_tie_then_manual_resolution() {
        let f = fixture(ElectionConfig::default()).await;
        let a = f.member(f.t1a, true).await;
        let b = f.member(f.t1a, true).await;
        let c = f.member(f.t1a, true).await;
        let id = f.active_election(f.t1a).await;
        let ca = f.engine.register_candidate(id, a, "").await.unwrap();
        let cb = f.engine.register_candidate(id, b, "").await.unwrap();
        f.engine.cast_vote(id, a, ca.id).await.unwrap();
        f.engine.cast_vote(id, b, cb.id).await.unwrap();

        let election = f.engine.close(id, true).await.unwrap();
        assert!(election.needs_manual_resolution);
        assert_eq!(election.outcome.as_ref().unwrap().tied.len(), 2);
        assert_eq!(f.store.node(f.t1a).await.unwrap().leader, None);

        let err = f.engine.resolve_tie(id, c).await.unwrap_err();
        assert!(matches!(err, ElectionError::NotTied { .. }));

        let election = f.engine.resolve_tie(id, b).await.unwrap();
        assert!(!election.needs_manual_resolution);
        assert!(election.outcome.as_ref().unwrap().manually_resolved);
        assert_eq!(f.store.node(f.t1a).await.unwrap().leader, Some(b));

        let err = f.engine.resolve_tie(id, a).await.unwrap_err();
        assert!(matches!(err, ElectionError::NoTie(_)));
    }

    #[tokio::test]
    async fn test_failed_promotion_leaves_election_unchanged() {
        let f = fixture(ElectionConfig::default()).await;
        let a = f.member(f.t1a, true).await;
        let id = f.active_election(f.t1a).await;
        let ca = f.engine.register_candidate(id, a, "").await.unwrap();
        f.engine.cast_vote(id, a, ca.id).await.unwrap();

        // Winner leaves the node before the count
        f.store.assign_member(a, f.t1b).await.unwrap();

        let err = f.engine.close(id, true).await.unwrap_err();
        assert!(matches!(err, ElectionError::LeaderPromotion { .. }));
        let election = f.engine.election(id).await.unwrap();
        assert_eq!(election.status, ElectionStatus::Active);
        assert!(election.outcome.is_none());
        assert_eq!(f.store.node(f.t1a).await.unwrap().leader, None);
    }

    #[tokio::test]
    async fn test_close_under_busy_hierarchy_changes_nothing() {
        let f = fixture(ElectionConfig::default()).await;
        let a = f.member(f.t1a, true).await;
        let id = f.active_election(f.t1a).await;
        let ca = f.engine.register_candidate(id, a, "").await.unwrap();
        f.engine.cast_vote(id, a, ca.id).await.unwrap();

        let guard = f.store.write().await.unwrap();
        let err = f.engine.close(id, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);
        drop(guard);

        let election = f.engine.election(id).await.unwrap();
        assert_eq!(election.status, ElectionStatus::Active);
        assert!(election.outcome.is_none());
        assert_eq!(f.store.node(f.t1a).await.unwrap().leader, None);

        let election = f.engine.close(id, true).await.unwrap();
        assert_eq!(election.status, ElectionStatus::Completed);
        assert_eq!(f.store.node(f.t1a).await.unwrap().leader, Some(a));
    }

    #[tokio::test]
    async fn test_no_candidates_and_cancel() {
        let f = fixture(ElectionConfig::default()).await;
        let empty = f.active_election(f.t1a).await;
        let election = f.engine.close(empty, true).await.unwrap();
        assert_eq!(election.status, ElectionStatus::Completed);
        assert!(election.outcome.unwrap().winner.is_none());
        assert!(!election.needs_manual_resolution);

        let other = f.active_election(f.t1b).await;
        f.engine.cancel(other).await.unwrap();
        let err = f.engine.cancel(other).await.unwrap_err();
        assert!(matches!(err, ElectionError::InvalidTransition { .. }));

        assert_eq!(f.engine.list(None).await.unwrap().len(), 2);
        assert_eq!(
            f.engine.list(Some(ElectionStatus::Cancelled)).await.unwrap()[0].id,
            other
        );
        assert!(matches!(
            f.engine.election(ElectionId::new()).await,
            Err(ElectionError::NotFound(_))
        ));
    }
}
