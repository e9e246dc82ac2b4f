//! Escalation engine.
//!
//! Handles moving SOS signals to higher levels of leadership. The next level
//! is always derived from the stored signal under its own lock, never taken
//! from the caller.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use hierarchy::{acquire, DomainEvent, EntityKind, EventBus, HierarchyStore, NodeId, PersonId};

use super::{
    EscalationError, EscalationLevel, EscalationRecord, Result, SignalPriority, SignalStatus,
    SosSignal,
};
use hierarchy::Clock;
use crate::config::EscalationConfig;
use crate::types::SignalId;

/// Manages SOS signals and their escalation.
#[derive(Clone)]
pub struct EscalationEngine {
    signals: Arc<DashMap<SignalId, Arc<Mutex<SosSignal>>>>,
    hierarchy: HierarchyStore,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: EscalationConfig,
    lock_timeout: Duration,
}

impl EscalationEngine {
    /// Create an engine over `hierarchy`.
    pub fn new(
        hierarchy: HierarchyStore,
        clock: Arc<dyn Clock>,
        config: EscalationConfig,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            signals: Arc::new(DashMap::new()),
            events: hierarchy.events().clone(),
            hierarchy,
            clock,
            config,
            lock_timeout,
        }
    }

    async fn lock(&self, id: SignalId) -> Result<OwnedMutexGuard<SosSignal>> {
        let entry = self
            .signals
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EscalationError::NotFound(id))?;
        Ok(acquire(entry.lock_owned(), "signal", self.lock_timeout).await?)
    }

    /// Raise a new signal at the configured initial level.
    pub async fn raise(
        &self,
        reporter: PersonId,
        title: impl Into<String>,
        description: impl Into<String>,
        location: Option<String>,
        priority: SignalPriority,
    ) -> Result<SosSignal> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(EscalationError::InvalidSignal("title must not be empty".to_string()));
        }
        self.hierarchy.read().await?.person(reporter)?;

        let signal = SosSignal {
            id: SignalId::new(),
            reporter,
            title,
            description: description.into(),
            location,
            priority,
            current_level: self.config.initial_level,
            status: SignalStatus::Pending,
            verifier: None,
            verified_at: None,
            verification_notes: None,
            resolution: None,
            closed_by: None,
            resolved_at: None,
            created_at: self.clock.now(),
            history: Vec::new(),
        };
        self.signals
            .insert(signal.id, Arc::new(Mutex::new(signal.clone())));

        info!(
            signal = %signal.id,
            reporter = %reporter,
            priority = ?priority,
            level = %signal.current_level,
            "SOS signal raised"
        );
        self.publish(&signal, "raised", reporter, json!({ "priority": priority }));
        Ok(signal)
    }

    /// Confirm a pending signal.
    pub async fn verify(
        &self,
        id: SignalId,
        verifier: PersonId,
        notes: Option<String>,
    ) -> Result<SosSignal> {
        let mut signal = self.lock(id).await?;
        if signal.status != SignalStatus::Pending {
            return Err(Self::transition_error(&signal, "verify"));
        }
        self.authorize(verifier, signal.reporter, signal.current_level).await?;

        signal.status = SignalStatus::Verified;
        signal.verifier = Some(verifier);
        signal.verified_at = Some(self.clock.now());
        signal.verification_notes = notes;
        let snapshot = signal.clone();
        drop(signal);

        info!(signal = %id, verifier = %verifier, "SOS signal verified");
        self.publish(&snapshot, "verified", verifier, serde_json::Value::Null);
        Ok(snapshot)
    }

    /// Move a verified signal one level up.
    pub async fn escalate(
        &self,
        id: SignalId,
        actor: PersonId,
        notes: Option<String>,
    ) -> Result<SosSignal> {
        let mut signal = self.lock(id).await?;
        if !matches!(signal.status, SignalStatus::Verified | SignalStatus::Escalated) {
            return Err(Self::transition_error(&signal, "escalate"));
        }
        let from_level = signal.current_level;
        let Some(to_level) = from_level.next() else {
            warn!(signal = %id, "Escalation past media level rejected");
            return Err(EscalationError::TerminalLevel(id));
        };
        self.authorize(actor, signal.reporter, from_level).await?;

        signal.history.push(EscalationRecord {
            from_level,
            to_level,
            actor,
            notes,
            timestamp: self.clock.now(),
        });
        signal.current_level = to_level;
        signal.status = SignalStatus::Escalated;
        let snapshot = signal.clone();
        drop(signal);

        info!(
            signal = %id,
            from = %from_level,
            to = %to_level,
            actor = %actor,
            "SOS signal escalated"
        );
        self.publish(
            &snapshot,
            "escalated",
            actor,
            json!({ "from_level": from_level, "to_level": to_level }),
        );
        Ok(snapshot)
    }

    /// Close a signal as dealt with.
    pub async fn resolve(
        &self,
        id: SignalId,
        actor: PersonId,
        resolution: impl Into<String>,
    ) -> Result<SosSignal> {
        self.close(id, actor, resolution.into(), SignalStatus::Resolved, "resolve")
            .await
    }

    /// Dismiss a signal.
    pub async fn reject(
        &self,
        id: SignalId,
        actor: PersonId,
        reason: impl Into<String>,
    ) -> Result<SosSignal> {
        self.close(id, actor, reason.into(), SignalStatus::Rejected, "reject")
            .await
    }

    async fn close(
        &self,
        id: SignalId,
        actor: PersonId,
        text: String,
        status: SignalStatus,
        action: &'static str,
    ) -> Result<SosSignal> {
        let mut signal = self.lock(id).await?;
        if !matches!(signal.status, SignalStatus::Verified | SignalStatus::Escalated) {
            return Err(Self::transition_error(&signal, action));
        }
        self.authorize(actor, signal.reporter, signal.current_level).await?;

        signal.status = status;
        signal.resolution = Some(text);
        signal.closed_by = Some(actor);
        signal.resolved_at = Some(self.clock.now());
        let snapshot = signal.clone();
        drop(signal);

        info!(signal = %id, actor = %actor, status = %status, "SOS signal closed");
        self.publish(&snapshot, status.as_str(), actor, json!({ "level": snapshot.current_level }));
        Ok(snapshot)
    }

    /// Get a signal.
    pub async fn signal(&self, id: SignalId) -> Result<SosSignal> {
        Ok(self.lock(id).await?.clone())
    }

    /// Signals, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<SignalStatus>) -> Result<Vec<SosSignal>> {
        let entries: Vec<Arc<Mutex<SosSignal>>> =
            self.signals.iter().map(|e| e.value().clone()).collect();

        let mut signals = Vec::with_capacity(entries.len());
        for entry in entries {
            let signal = acquire(entry.lock_owned(), "signal", self.lock_timeout).await?;
            if status.map_or(true, |s| s == signal.status) {
                signals.push(signal.clone());
            }
        }
        signals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(signals)
    }

    /// Leaders who should hear about the signal at its current level.
    ///
    /// Only leaders on the reporter's own chain of nodes are included.
    pub async fn handlers(&self, id: SignalId) -> Result<Vec<(NodeId, PersonId)>> {
        let (reporter, level) = {
            let signal = self.lock(id).await?;
            (signal.reporter, signal.current_level)
        };
        let tier = level.handling_tier();

        let state = self.hierarchy.read().await?;
        let Some(base) = state.person(reporter)?.tier1_node else {
            debug!(signal = %id, "Reporter has no membership, no handlers");
            return Ok(Vec::new());
        };
        let mut handlers = Vec::new();
        for node in state.node_chain(base)? {
            let record = state.node(node)?;
            if record.tier == tier {
                if let Some(leader) = record.leader {
                    handlers.push((node, leader));
                }
            }
        }
        Ok(handlers)
    }

    /// The actor must lead a node at or above the level's tier on the
    /// reporter's chain. A reporter without membership has no chain, so any
    /// leader of a high enough tier may act.
    async fn authorize(
        &self,
        actor: PersonId,
        reporter: PersonId,
        level: EscalationLevel,
    ) -> Result<()> {
        let tier = level.handling_tier();
        let state = self.hierarchy.read().await?;
        state.person(actor)?;
        let allowed = match state.person(reporter)?.tier1_node {
            Some(base) => {
                let mut allowed = false;
                for node in state.node_chain(base)? {
                    let record = state.node(node)?;
                    if record.leader == Some(actor) && record.tier >= tier {
                        allowed = true;
                        break;
                    }
                }
                allowed
            }
            None => state.leadership_tier(actor).is_some_and(|t| t >= tier),
        };
        if !allowed {
            warn!(
                actor = %actor,
                reporter = %reporter,
                level = %level,
                "Unauthorized signal handling attempt"
            );
            return Err(EscalationError::Unauthorized { actor, level });
        }
        Ok(())
    }

    fn transition_error(signal: &SosSignal, action: &'static str) -> EscalationError {
        EscalationError::InvalidTransition {
            signal: signal.id,
            status: signal.status,
            action,
        }
    }

    fn publish(
        &self,
        signal: &SosSignal,
        transition: &str,
        actor: PersonId,
        detail: serde_json::Value,
    ) {
        self.events.publish(
            DomainEvent::new(EntityKind::Signal, signal.id, transition)
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
    use hierarchy::{ErrorKind, TerritoryId, TerritoryKind, Tier};

    struct Fixture {
        engine: EscalationEngine,
        store: HierarchyStore,
        territory: TerritoryId,
        reporter: PersonId,
        chain: Vec<NodeId>,
        leaders: Vec<PersonId>,
    }

    /// One chain of four nodes, each led by a different member of the base unit.
    async fn fixture() -> Fixture {
        let store = HierarchyStore::new(EventBus::default());
        let territory = store
            .create_territory("Gori", TerritoryKind::Municipality, None, None)
            .await
            .unwrap()
            .id;
        let mut parent = None;
        let mut chain = Vec::new();
        for tier in Tier::ascending().into_iter().rev() {
            let node = store
                .attach_tier_node(tier, tier.as_str(), territory, parent)
                .await
                .unwrap()
                .id;
            chain.push(node);
            parent = Some(node);
        }
        chain.reverse();
        let base = chain[0];

        let reporter = store.register_person("reporter", None).await.unwrap().id;
        store.assign_member(reporter, base).await.unwrap();
        let mut leaders = Vec::new();
        for node in &chain {
            let leader = store.register_person("leader", None).await.unwrap().id;
            store.assign_member(leader, base).await.unwrap();
            store.set_leader(*node, leader).await.unwrap();
            leaders.push(leader);
        }

        let engine = EscalationEngine::new(
            store.clone(),
            Arc::new(SystemClock),
            EscalationConfig::default(),
            Duration::from_secs(1),
        );
        Fixture {
            engine,
            store,
            territory,
            reporter,
            chain,
            leaders,
        }
    }

    #[tokio::test]
    async fn test_raise_validation() {
        let f = fixture().await;
        let err = f
            .engine
            .raise(f.reporter, "  ", "", None, SignalPriority::High)
            .await
            .unwrap_err();
        assert!(matches!(err, EscalationError::InvalidSignal(_)));

        let err = f
            .engine
            .raise(PersonId::new(), "Flood", "", None, SignalPriority::High)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_verify_requires_authority() {
        let f = fixture().await;
        let signal = f
            .engine
            .raise(f.reporter, "Flood", "Basement flooded", Some("Gori".into()), SignalPriority::Normal)
            .await
            .unwrap();
        assert_eq!(signal.current_level, EscalationLevel::Tier1);

        let err = f.engine.verify(signal.id, f.reporter, None).await.unwrap_err();
        assert!(matches!(err, EscalationError::Unauthorized { .. }));

        // Escalation before verification is illegal
        let err = f.engine.escalate(signal.id, f.leaders[0], None).await.unwrap_err();
        assert!(matches!(err, EscalationError::InvalidTransition { .. }));

        let verified = f
            .engine
            .verify(signal.id, f.leaders[0], Some("confirmed".into()))
            .await
            .unwrap();
        assert_eq!(verified.status, SignalStatus::Verified);
        assert_eq!(verified.verifier, Some(f.leaders[0]));
    }

    #[tokio::test]
    async fn test_leader_off_the_reporter_chain_cannot_handle() {
        let f = fixture().await;
        let sibling = f
            .store
            .attach_tier_node(Tier::Tier1, "sibling", f.territory, Some(f.chain[1]))
            .await
            .unwrap()
            .id;
        let stranger = f.store.register_person("stranger", None).await.unwrap().id;
        f.store.assign_member(stranger, sibling).await.unwrap();
        f.store.set_leader(sibling, stranger).await.unwrap();

        let id = f
            .engine
            .raise(f.reporter, "Fire", "", None, SignalPriority::High)
            .await
            .unwrap()
            .id;
        let err = f.engine.verify(id, stranger, None).await.unwrap_err();
        assert!(matches!(err, EscalationError::Unauthorized { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);

        // A higher leader on the chain may still act at a lower level
        f.engine.verify(id, f.leaders[1], None).await.unwrap();
        let err = f.engine.escalate(id, stranger, None).await.unwrap_err();
        assert!(matches!(err, EscalationError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_unattached_reporter_falls_back_to_tier() {
        let f = fixture().await;
        let loner = f.store.register_person("loner", None).await.unwrap().id;
        let id = f
            .engine
            .raise(loner, "Noise", "", None, SignalPriority::Low)
            .await
            .unwrap()
            .id;
        assert!(f.engine.handlers(id).await.unwrap().is_empty());
        f.engine.verify(id, f.leaders[0], None).await.unwrap();
    }

    #[tokio::test]
    async fn test_full_ladder() {
        let f = fixture().await;
        let id = f
            .engine
            .raise(f.reporter, "Threat", "", None, SignalPriority::Critical)
            .await
            .unwrap()
            .id;
        f.engine.verify(id, f.leaders[0], None).await.unwrap();

        // A tier-1 leader cannot handle a tier-2 signal
        f.engine.escalate(id, f.leaders[0], None).await.unwrap();
        let err = f.engine.escalate(id, f.leaders[0], None).await.unwrap_err();
        assert!(matches!(err, EscalationError::Unauthorized { .. }));

        for actor in &f.leaders[1..] {
            f.engine.escalate(id, *actor, None).await.unwrap();
        }
        let signal = f.engine.signal(id).await.unwrap();
        assert_eq!(signal.current_level, EscalationLevel::Media);
        assert_eq!(signal.history.len(), 4);
        for step in &signal.history {
            assert_eq!(step.from_level.next(), Some(step.to_level));
        }

        let err = f.engine.escalate(id, f.leaders[3], None).await.unwrap_err();
        assert!(matches!(err, EscalationError::TerminalLevel(_)));
        assert_eq!(err.kind(), ErrorKind::State);

        let handlers = f.engine.handlers(id).await.unwrap();
        assert_eq!(handlers.iter().map(|(_, p)| *p).collect::<Vec<_>>(), vec![f.leaders[3]]);

        let resolved = f.engine.resolve(id, f.leaders[3], "published").await.unwrap();
        assert_eq!(resolved.status, SignalStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        let err = f.engine.reject(id, f.leaders[3], "late").await.unwrap_err();
        assert!(matches!(err, EscalationError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_reject_and_list() {
        let f = fixture().await;
        let a = f
            .engine
            .raise(f.reporter, "A", "", None, SignalPriority::Low)
            .await
            .unwrap()
            .id;
        f.engine
            .raise(f.reporter, "B", "", None, SignalPriority::Low)
            .await
            .unwrap();

        let err = f.engine.reject(a, f.leaders[0], "spam").await.unwrap_err();
        assert!(matches!(err, EscalationError::InvalidTransition { .. }));

        f.engine.verify(a, f.leaders[2], None).await.unwrap();
        let rejected = f.engine.reject(a, f.leaders[0], "duplicate").await.unwrap();
        assert_eq!(rejected.resolution.as_deref(), Some("duplicate"));

        assert_eq!(f.engine.list(None).await.unwrap().len(), 2);
        assert_eq!(f.engine.list(Some(SignalStatus::Pending)).await.unwrap().len(), 1);
        assert_eq!(
            f.engine.handlers(a).await.unwrap(),
            vec![(f.chain[0], f.leaders[0])]
        );
    }
}
