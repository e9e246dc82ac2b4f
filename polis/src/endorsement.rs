//! Endorsement engine: sponsor→supporter edges and the standing they grant.
//!
//! All edges live in one table behind a single lock, together with the index
//! of open (pending or approved) edges per supporter. Transitions that change
//! a person's standing hold the table lock and then the hierarchy write lock,
//! validate everything, and only then mutate both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use hierarchy::{
    acquire, DomainEvent, EntityKind, ErrorKind, EventBus, HierarchyError, HierarchyStore,
    LockTimeout, Person, PersonId, TerritoryId,
};

use hierarchy::Clock;
use crate::config::EndorsementConfig;
use crate::types::EndorsementId;

/// Lifecycle status of an endorsement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndorsementStatus {
    /// Awaiting the sponsor's decision
    Pending,
    /// Sponsor vouched for the supporter
    Approved,
    /// Sponsor declined (terminal)
    Rejected,
    /// Approval withdrawn (terminal)
    Revoked,
}

impl EndorsementStatus {
    /// Whether this edge still blocks a new request from the supporter.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for EndorsementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed sponsor→supporter edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endorsement {
    /// Unique identifier
    pub id: EndorsementId,
    /// Certified sponsor
    pub sponsor: PersonId,
    /// Supporter being vouched for
    pub supporter: PersonId,
    /// Current status
    pub status: EndorsementStatus,
    /// When the supporter asked
    pub requested_at: DateTime<Utc>,
    /// When the sponsor approved or rejected
    pub decided_at: Option<DateTime<Utc>>,
    /// When the approval was withdrawn
    pub revoked_at: Option<DateTime<Utc>>,
    /// Rejection or revocation reason
    pub reason: Option<String>,
    /// Whether the revocation penalty has been applied
    pub penalty_applied: bool,
}

/// Error types for endorsement operations.
#[derive(Debug, thiserror::Error)]
pub enum EndorsementError {
    /// Endorsement not found
    #[error("Endorsement not found: {0}")]
    NotFound(EndorsementId),

    /// Supporter already holds an open endorsement
    #[error("Supporter {supporter} already has an open endorsement {existing}")]
    DuplicateEndorsement {
        /// Supporter
        supporter: PersonId,
        /// The open edge
        existing: EndorsementId,
    },

    /// Sponsor is not certified
    #[error("Person {0} is not a certified sponsor")]
    NotCertified(PersonId),

    /// Sponsor and supporter are the same person
    #[error("Person {0} cannot endorse themselves")]
    SelfEndorsement(PersonId),

    /// Supporter's territory lies outside the sponsor's
    #[error("Supporter {supporter} is outside the territory of sponsor {sponsor}")]
    TerritoryScope {
        /// Sponsor
        sponsor: PersonId,
        /// Supporter
        supporter: PersonId,
    },

    /// Actor is not the endorsement's sponsor
    #[error("Person {actor} is not the sponsor of endorsement {endorsement}")]
    NotOwner {
        /// Endorsement
        endorsement: EndorsementId,
        /// Who tried
        actor: PersonId,
    },

    /// Transition not allowed from the current status
    #[error("Cannot {action} endorsement {endorsement} in status {status}")]
    InvalidTransition {
        /// Endorsement
        endorsement: EndorsementId,
        /// Current status
        status: EndorsementStatus,
        /// Attempted action
        action: &'static str,
    },

    /// An approved edge already carries a penalty
    #[error("Penalty already applied on endorsement {0}")]
    PenaltyAlreadyApplied(EndorsementId),

    /// Hierarchy lookup or update failed
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// Endorsement table unavailable
    #[error("Endorsement store unavailable: {0}")]
    Unavailable(#[from] LockTimeout),
}

impl EndorsementError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_)
            | Self::NotCertified(_)
            | Self::SelfEndorsement(_)
            | Self::TerritoryScope { .. }
            | Self::NotOwner { .. } => ErrorKind::Validation,
            Self::DuplicateEndorsement { .. } => ErrorKind::Conflict,
            Self::InvalidTransition { .. } => ErrorKind::State,
            Self::PenaltyAlreadyApplied(_) => ErrorKind::Integrity,
            Self::Hierarchy(e) => e.kind(),
            Self::Unavailable(_) => ErrorKind::Dependency,
        }
    }
}

/// Result type for endorsement operations.
pub type Result<T> = std::result::Result<T, EndorsementError>;

#[derive(Debug, Default)]
struct EndorsementTable {
    records: HashMap<EndorsementId, Endorsement>,
    /// Open edge per supporter
    open: HashMap<PersonId, EndorsementId>,
}

impl EndorsementTable {
    fn get(&self, id: EndorsementId) -> Result<&Endorsement> {
        self.records.get(&id).ok_or(EndorsementError::NotFound(id))
    }

    fn get_mut(&mut self, id: EndorsementId) -> Result<&mut Endorsement> {
        self.records
            .get_mut(&id)
            .ok_or(EndorsementError::NotFound(id))
    }

    fn sorted(&self, filter: impl Fn(&Endorsement) -> bool) -> Vec<Endorsement> {
        let mut list: Vec<Endorsement> = self
            .records
            .values()
            .filter(|e| filter(e))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        list
    }
}

/// Manages endorsement edges and the supporter standing they grant.
#[derive(Clone)]
pub struct EndorsementEngine {
    table: Arc<RwLock<EndorsementTable>>,
    hierarchy: HierarchyStore,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: EndorsementConfig,
    lock_timeout: Duration,
}

impl EndorsementEngine {
    /// Create an engine over `hierarchy`.
    pub fn new(
        hierarchy: HierarchyStore,
        clock: Arc<dyn Clock>,
        config: EndorsementConfig,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            table: Arc::new(RwLock::new(EndorsementTable::default())),
            events: hierarchy.events().clone(),
            hierarchy,
            clock,
            config,
            lock_timeout,
        }
    }

    /// Ask `sponsor` to vouch for `supporter`.
    pub async fn request_endorsement(
        &self,
        sponsor: PersonId,
        supporter: PersonId,
    ) -> Result<Endorsement> {
        if sponsor == supporter {
            warn!(person = %sponsor, "Self-endorsement attempted");
            return Err(EndorsementError::SelfEndorsement(sponsor));
        }

        let mut table = acquire(self.table.write(), "endorsements", self.lock_timeout).await?;
        {
            let state = self.hierarchy.read().await?;
            let sponsor_record = state.person(sponsor)?;
            let supporter_record = state.person(supporter)?;

            if !sponsor_record.is_geder() {
                return Err(EndorsementError::NotCertified(sponsor));
            }
            if let Some(existing) = table.open.get(&supporter) {
                return Err(EndorsementError::DuplicateEndorsement {
                    supporter,
                    existing: *existing,
                });
            }
            if self.config.require_same_territory {
                let within = match (supporter_record.territory, sponsor_record.territory) {
                    (Some(own), Some(sponsor_territory)) => {
                        state.territory_within(own, sponsor_territory)?
                    }
                    _ => false,
                };
                if !within {
                    return Err(EndorsementError::TerritoryScope { sponsor, supporter });
                }
            }
        }

        let endorsement = Endorsement {
            id: EndorsementId::new(),
            sponsor,
            supporter,
            status: EndorsementStatus::Pending,
            requested_at: self.clock.now(),
            decided_at: None,
            revoked_at: None,
            reason: None,
            penalty_applied: false,
        };
        table.open.insert(supporter, endorsement.id);
        table.records.insert(endorsement.id, endorsement.clone());
        drop(table);

        info!(
            endorsement = %endorsement.id,
            sponsor = %sponsor,
            supporter = %supporter,
            "Endorsement requested"
        );
        self.publish(&endorsement, "requested", supporter, json!({ "sponsor": sponsor }));
        Ok(endorsement)
    }

    /// Approve a pending endorsement and open the supporter's sponsorship gate.
    pub async fn approve(&self, id: EndorsementId, approver: PersonId) -> Result<Endorsement> {
        let mut table = acquire(self.table.write(), "endorsements", self.lock_timeout).await?;
        let mut state = self.hierarchy.write().await?;

        let (sponsor, supporter) = {
            let record = table.get(id)?;
            Self::check_pending(record, "approve")?;
            Self::check_owner(record, approver)?;
            (record.sponsor, record.supporter)
        };

        let now = self.clock.now();
        let active = state.grant_sponsorship(supporter, sponsor)?.is_active();

        let record = table.get_mut(id)?;
        record.status = EndorsementStatus::Approved;
        record.decided_at = Some(now);
        let endorsement = record.clone();
        drop(state);
        drop(table);

        info!(endorsement = %id, supporter = %supporter, active, "Endorsement approved");
        self.publish(&endorsement, "approved", approver, json!({ "supporter_active": active }));
        Ok(endorsement)
    }

    /// Decline a pending endorsement.
    pub async fn reject(
        &self,
        id: EndorsementId,
        approver: PersonId,
        reason: impl Into<String>,
    ) -> Result<Endorsement> {
        let mut table = acquire(self.table.write(), "endorsements", self.lock_timeout).await?;

        let supporter = {
            let record = table.get(id)?;
            Self::check_pending(record, "reject")?;
            Self::check_owner(record, approver)?;
            record.supporter
        };

        let now = self.clock.now();
        table.open.remove(&supporter);
        let record = table.get_mut(id)?;
        record.status = EndorsementStatus::Rejected;
        record.decided_at = Some(now);
        record.reason = Some(reason.into());
        let endorsement = record.clone();
        drop(table);

        info!(endorsement = %id, supporter = %supporter, "Endorsement rejected");
        self.publish(&endorsement, "rejected", approver, json!({ "reason": endorsement.reason }));
        Ok(endorsement)
    }

    /// Withdraw an approved endorsement.
    ///
    /// The supporter loses the sponsorship gate and sponsor pointer; a
    /// sponsored supporter drops back to unverified. With `apply_penalty` the
    /// supporter's standing is penalized exactly once per edge.
    pub async fn revoke(
        &self,
        id: EndorsementId,
        actor: PersonId,
        reason: impl Into<String>,
        apply_penalty: bool,
    ) -> Result<Endorsement> {
        let mut table = acquire(self.table.write(), "endorsements", self.lock_timeout).await?;
        let mut state = self.hierarchy.write().await?;

        let (sponsor, supporter) = {
            let record = table.get(id)?;
            if record.status != EndorsementStatus::Approved {
                warn!(endorsement = %id, status = %record.status, "Revoke outside approved state");
                return Err(EndorsementError::InvalidTransition {
                    endorsement: id,
                    status: record.status,
                    action: "revoke",
                });
            }
            Self::check_owner(record, actor)?;
            if apply_penalty && record.penalty_applied {
                error!(endorsement = %id, "Approved endorsement already carries a penalty");
                return Err(EndorsementError::PenaltyAlreadyApplied(id));
            }
            (record.sponsor, record.supporter)
        };

        let now = self.clock.now();
        let points = if apply_penalty { self.config.penalty_points } else { 0 };
        let penalties = state.withdraw_sponsorship(supporter, sponsor, points)?.penalties;

        table.open.remove(&supporter);
        let record = table.get_mut(id)?;
        record.status = EndorsementStatus::Revoked;
        record.revoked_at = Some(now);
        record.reason = Some(reason.into());
        if apply_penalty {
            record.penalty_applied = true;
        }
        let endorsement = record.clone();
        drop(state);
        drop(table);

        info!(
            endorsement = %id,
            supporter = %supporter,
            penalty = apply_penalty,
            penalties,
            "Endorsement revoked"
        );
        self.publish(
            &endorsement,
            "revoked",
            actor,
            json!({ "reason": endorsement.reason, "penalty_applied": endorsement.penalty_applied }),
        );
        Ok(endorsement)
    }

    /// Get an endorsement.
    pub async fn endorsement(&self, id: EndorsementId) -> Result<Endorsement> {
        let table = acquire(self.table.read(), "endorsements", self.lock_timeout).await?;
        Ok(table.get(id)?.clone())
    }

    /// Certified sponsors a supporter may ask, optionally within a territory.
    pub async fn available_sponsors(&self, territory: Option<TerritoryId>) -> Result<Vec<Person>> {
        Ok(self.hierarchy.read().await?.sponsors(territory)?)
    }

    /// Every request a supporter has made, newest first.
    pub async fn requests_by(&self, supporter: PersonId) -> Result<Vec<Endorsement>> {
        let table = acquire(self.table.read(), "endorsements", self.lock_timeout).await?;
        Ok(table.sorted(|e| e.supporter == supporter))
    }

    /// Requests awaiting a sponsor's decision, newest first.
    pub async fn pending_for(&self, sponsor: PersonId) -> Result<Vec<Endorsement>> {
        let table = acquire(self.table.read(), "endorsements", self.lock_timeout).await?;
        let pending = table.sorted(|e| e.sponsor == sponsor && e.status == EndorsementStatus::Pending);
        debug!(sponsor = %sponsor, count = pending.len(), "Pending approvals");
        Ok(pending)
    }

    /// The supporter's approved endorsement, if any.
    pub async fn active_for(&self, supporter: PersonId) -> Result<Option<Endorsement>> {
        let table = acquire(self.table.read(), "endorsements", self.lock_timeout).await?;
        Ok(table
            .open
            .get(&supporter)
            .and_then(|id| table.records.get(id))
            .filter(|e| e.status == EndorsementStatus::Approved)
            .cloned())
    }

    fn check_pending(record: &Endorsement, action: &'static str) -> Result<()> {
        if record.status != EndorsementStatus::Pending {
            return Err(EndorsementError::InvalidTransition {
                endorsement: record.id,
                status: record.status,
                action,
            });
        }
        Ok(())
    }

    fn check_owner(record: &Endorsement, actor: PersonId) -> Result<()> {
        if record.sponsor != actor {
            warn!(endorsement = %record.id, actor = %actor, "Actor is not the sponsor");
            return Err(EndorsementError::NotOwner {
                endorsement: record.id,
                actor,
            });
        }
        Ok(())
    }

    fn publish(
        &self,
        endorsement: &Endorsement,
        transition: &str,
        actor: PersonId,
        detail: serde_json::Value,
    ) {
        self.events.publish(
            DomainEvent::new(EntityKind::Endorsement, endorsement.id, transition)
                .by(actor)
                .at(self.clock.now())
                .with_detail(detail),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hierarchy::SystemClock;
    use hierarchy::{TerritoryKind, VerificationState};

    struct Fixture {
        engine: EndorsementEngine,
        store: HierarchyStore,
        sponsor: PersonId,
        supporter: PersonId,
    }

    async fn fixture(config: EndorsementConfig) -> Fixture {
        let store = HierarchyStore::new(EventBus::default())
            .with_lock_timeout(Duration::from_millis(200));
        let sponsor = store.register_person("Sponsor", None).await.unwrap().id;
        store.certify_sponsor(sponsor).await.unwrap();
        let supporter = store.register_person("Supporter", None).await.unwrap().id;
        let engine = EndorsementEngine::new(
            store.clone(),
            Arc::new(SystemClock),
            config,
            Duration::from_secs(1),
        );
        Fixture {
            engine,
            store,
            sponsor,
            supporter,
        }
    }

    #[tokio::test]
    async fn test_request_and_approve() {
        let f = fixture(EndorsementConfig::default()).await;
        let e = f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();
        assert_eq!(e.status, EndorsementStatus::Pending);
        assert_eq!(f.engine.pending_for(f.sponsor).await.unwrap().len(), 1);

        let e = f.engine.approve(e.id, f.sponsor).await.unwrap();
        assert_eq!(e.status, EndorsementStatus::Approved);
        assert!(e.decided_at.is_some());

        let person = f.store.person(f.supporter).await.unwrap();
        assert!(person.sponsorship_gate);
        assert_eq!(person.sponsor, Some(f.sponsor));
        assert_eq!(person.verification, VerificationState::SponsoredSupporter);
        assert!(!person.is_active());

        assert_eq!(f.engine.active_for(f.supporter).await.unwrap().map(|e| e.id), Some(e.id));
    }

    #[tokio::test]
    async fn test_request_validation() {
        let f = fixture(EndorsementConfig::default()).await;

        let err = f.engine.request_endorsement(f.sponsor, f.sponsor).await.unwrap_err();
        assert!(matches!(err, EndorsementError::SelfEndorsement(_)));

        let err = f.engine.request_endorsement(f.supporter, f.sponsor).await.unwrap_err();
        assert!(matches!(err, EndorsementError::NotCertified(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = f
            .engine
            .request_endorsement(f.sponsor, PersonId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EndorsementError::Hierarchy(HierarchyError::PersonNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_open_endorsement() {
        let f = fixture(EndorsementConfig::default()).await;
        let other = f.store.register_person("Other sponsor", None).await.unwrap().id;
        f.store.certify_sponsor(other).await.unwrap();

        f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();
        let err = f.engine.request_endorsement(other, f.supporter).await.unwrap_err();
        assert!(matches!(err, EndorsementError::DuplicateEndorsement { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_reject_frees_supporter() {
        let f = fixture(EndorsementConfig::default()).await;
        let e = f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();

        let err = f.engine.reject(e.id, f.supporter, "no").await.unwrap_err();
        assert!(matches!(err, EndorsementError::NotOwner { .. }));

        let e = f.engine.reject(e.id, f.sponsor, "unknown person").await.unwrap();
        assert_eq!(e.status, EndorsementStatus::Rejected);
        assert_eq!(e.reason.as_deref(), Some("unknown person"));

        let err = f.engine.approve(e.id, f.sponsor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);

        // A fresh request is allowed again
        f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();
        assert_eq!(f.engine.requests_by(f.supporter).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_revoke_penalizes_once() {
        let f = fixture(EndorsementConfig {
            penalty_points: 2,
            ..Default::default()
        })
        .await;
        let e = f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();
        f.engine.approve(e.id, f.sponsor).await.unwrap();

        let first = f.engine.revoke(e.id, f.sponsor, "moved away", false).await.unwrap();
        assert!(!first.penalty_applied);
        let err = f.engine.revoke(e.id, f.sponsor, "again", true).await.unwrap_err();
        assert!(matches!(err, EndorsementError::InvalidTransition { .. }));

        let person = f.store.person(f.supporter).await.unwrap();
        assert_eq!(person.penalties, 0);
        assert!(!person.sponsorship_gate);
        assert_eq!(person.sponsor, None);
        assert_eq!(person.verification, VerificationState::Unverified);
    }

    #[tokio::test]
    async fn test_revoke_with_penalty() {
        let f = fixture(EndorsementConfig::default()).await;
        let e = f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();

        let err = f.engine.revoke(e.id, f.sponsor, "early", true).await.unwrap_err();
        assert!(matches!(err, EndorsementError::InvalidTransition { .. }));

        f.engine.approve(e.id, f.sponsor).await.unwrap();
        let revoked = f.engine.revoke(e.id, f.sponsor, "fraud", true).await.unwrap();
        assert!(revoked.penalty_applied);
        assert!(revoked.revoked_at.is_some());

        f.engine.revoke(e.id, f.sponsor, "fraud", true).await.unwrap_err();
        assert_eq!(f.store.person(f.supporter).await.unwrap().penalties, 1);
        assert!(f.engine.active_for(f.supporter).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_approve_under_busy_hierarchy_changes_nothing() {
        let f = fixture(EndorsementConfig::default()).await;
        let e = f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();

        let guard = f.store.write().await.unwrap();
        let err = f.engine.approve(e.id, f.sponsor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);
        drop(guard);

        assert_eq!(
            f.engine.endorsement(e.id).await.unwrap().status,
            EndorsementStatus::Pending
        );
        assert!(f.engine.active_for(f.supporter).await.unwrap().is_none());
        let person = f.store.person(f.supporter).await.unwrap();
        assert!(!person.sponsorship_gate);
        assert_eq!(person.verification, VerificationState::Unverified);

        // Retrying once the lock is free succeeds
        let approved = f.engine.approve(e.id, f.sponsor).await.unwrap();
        assert_eq!(approved.status, EndorsementStatus::Approved);
        assert!(f.store.person(f.supporter).await.unwrap().sponsorship_gate);
    }

    #[tokio::test]
    async fn test_revoke_under_busy_hierarchy_changes_nothing() {
        let f = fixture(EndorsementConfig::default()).await;
        let e = f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();
        f.engine.approve(e.id, f.sponsor).await.unwrap();

        let guard = f.store.write().await.unwrap();
        let err = f.engine.revoke(e.id, f.sponsor, "fraud", true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);
        drop(guard);

        let record = f.engine.endorsement(e.id).await.unwrap();
        assert_eq!(record.status, EndorsementStatus::Approved);
        assert!(!record.penalty_applied);
        assert!(record.revoked_at.is_none());
        let person = f.store.person(f.supporter).await.unwrap();
        assert!(person.sponsorship_gate);
        assert_eq!(person.penalties, 0);

        let revoked = f.engine.revoke(e.id, f.sponsor, "fraud", true).await.unwrap();
        assert!(revoked.penalty_applied);
        assert_eq!(f.store.person(f.supporter).await.unwrap().penalties, 1);
    }

    #[tokio::test]
    async fn test_territory_scope() {
        let f = fixture(EndorsementConfig {
            require_same_territory: true,
            ..Default::default()
        })
        .await;
        let region = f
            .store
            .create_territory("Imereti", TerritoryKind::Region, None, None)
            .await
            .unwrap()
            .id;
        let city = f
            .store
            .create_territory("Kutaisi", TerritoryKind::Municipality, Some(region), None)
            .await
            .unwrap()
            .id;
        let elsewhere = f
            .store
            .create_territory("Adjara", TerritoryKind::Region, None, None)
            .await
            .unwrap()
            .id;

        let sponsor = f.store.register_person("S", Some(region)).await.unwrap().id;
        f.store.certify_sponsor(sponsor).await.unwrap();
        let local = f.store.register_person("L", Some(city)).await.unwrap().id;
        let remote = f.store.register_person("R", Some(elsewhere)).await.unwrap().id;

        f.engine.request_endorsement(sponsor, local).await.unwrap();
        let err = f.engine.request_endorsement(sponsor, remote).await.unwrap_err();
        assert!(matches!(err, EndorsementError::TerritoryScope { .. }));
        // Sponsor without a territory cannot vouch under scoping
        let err = f.engine.request_endorsement(f.sponsor, remote).await.unwrap_err();
        assert!(matches!(err, EndorsementError::TerritoryScope { .. }));

        let sponsors = f.engine.available_sponsors(Some(region)).await.unwrap();
        assert_eq!(sponsors.iter().map(|p| p.id).collect::<Vec<_>>(), vec![sponsor]);
    }

    #[tokio::test]
    async fn test_events_carry_actor() {
        let f = fixture(EndorsementConfig::default()).await;
        let mut rx = f.store.events().subscribe();
        let e = f.engine.request_endorsement(f.sponsor, f.supporter).await.unwrap();
        f.engine.approve(e.id, f.sponsor).await.unwrap();

        let requested = rx.recv().await.unwrap();
        assert_eq!(requested.transition, "requested");
        assert_eq!(requested.actor, Some(f.supporter.to_string()));
        let approved = rx.recv().await.unwrap();
        assert_eq!(approved.transition, "approved");
        assert_eq!(approved.actor, Some(f.sponsor.to_string()));
    }
}
