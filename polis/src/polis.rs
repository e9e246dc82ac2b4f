//! Polis - the assembled civic core.
//!
//! Wires the hierarchy store, the three engines, the event bus and the audit
//! trail together from one [`PolisConfig`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use hierarchy::{AuditTrail, DomainEvent, EventBus, HierarchyOverview, HierarchyStore};

use hierarchy::{Clock, SystemClock};
use crate::config::PolisConfig;
use crate::election::{ElectionEngine, ElectionStatus};
use crate::endorsement::EndorsementEngine;
use crate::error::Result;
use crate::escalation::{EscalationEngine, SignalStatus};

/// The civic core.
///
/// Every component shares the same hierarchy store and event bus. Cloning an
/// engine handle is cheap and refers to the same state.
pub struct Polis {
    /// Configuration
    config: PolisConfig,
    /// Territorial and group hierarchy
    hierarchy: HierarchyStore,
    /// Sponsor→supporter edges
    endorsements: EndorsementEngine,
    /// Leadership elections
    elections: ElectionEngine,
    /// SOS signals
    escalations: EscalationEngine,
    /// Recent domain events
    audit: Arc<AuditTrail>,
}

/// Snapshot of the whole core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolisStatus {
    /// Hierarchy summary
    pub hierarchy: HierarchyOverview,
    /// Elections currently accepting ballots
    pub active_elections: usize,
    /// Elections awaiting manual tie resolution
    pub ties_pending: usize,
    /// Signals not yet resolved or rejected
    pub open_signals: usize,
    /// Events held by the audit trail
    pub audit_events: usize,
}

impl Polis {
    /// Create with the system clock.
    pub fn new(config: PolisConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create with a custom clock.
    pub fn with_clock(config: PolisConfig, clock: Arc<dyn Clock>) -> Self {
        let lock_timeout = config.hierarchy.lock_timeout();
        let events = EventBus::new(config.general.event_capacity);
        let hierarchy = HierarchyStore::with_clock(
            config.hierarchy.tier_policy.clone(),
            events,
            clock.clone(),
        )
        .with_lock_timeout(lock_timeout);

        let endorsements = EndorsementEngine::new(
            hierarchy.clone(),
            clock.clone(),
            config.endorsement.clone(),
            lock_timeout,
        );
        let elections = ElectionEngine::new(
            hierarchy.clone(),
            clock.clone(),
            config.election.clone(),
            lock_timeout,
        );
        let escalations = EscalationEngine::new(
            hierarchy.clone(),
            clock,
            config.escalation.clone(),
            lock_timeout,
        );

        Self {
            audit: Arc::new(AuditTrail::with_max_entries(config.general.audit_capacity)),
            config,
            hierarchy,
            endorsements,
            elections,
            escalations,
        }
    }

    /// Configuration.
    pub fn config(&self) -> &PolisConfig {
        &self.config
    }

    /// Hierarchy store.
    pub fn hierarchy(&self) -> &HierarchyStore {
        &self.hierarchy
    }

    /// Endorsement engine.
    pub fn endorsements(&self) -> &EndorsementEngine {
        &self.endorsements
    }

    /// Election engine.
    pub fn elections(&self) -> &ElectionEngine {
        &self.elections
    }

    /// Escalation engine.
    pub fn escalations(&self) -> &EscalationEngine {
        &self.escalations
    }

    /// Event bus shared by every component.
    pub fn events(&self) -> &EventBus {
        self.hierarchy.events()
    }

    /// Audit trail fed by [`Polis::spawn_audit`].
    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }

    /// Start forwarding domain events into the audit trail.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_audit(&self) -> JoinHandle<()> {
        info!(capacity = self.config.general.audit_capacity, "Audit trail attached");
        self.events().spawn_sink(self.audit.clone())
    }

    /// Most recent audited events.
    pub async fn recent_events(&self, limit: usize) -> Vec<DomainEvent> {
        self.audit.recent(limit).await
    }

    /// Check every stored count in the hierarchy.
    pub async fn audit_counts(&self) -> Result<()> {
        Ok(self.hierarchy.audit_counts().await?)
    }

    /// Snapshot of the whole core.
    pub async fn status(&self) -> Result<PolisStatus> {
        let hierarchy = self.hierarchy.overview().await?;
        let completed = self.elections.list(Some(ElectionStatus::Completed)).await?;
        let active_elections = self.elections.list(Some(ElectionStatus::Active)).await?.len();
        let open_signals = self
            .escalations
            .list(None)
            .await?
            .iter()
            .filter(|s| !s.status.is_terminal())
            .count();

        Ok(PolisStatus {
            hierarchy,
            active_elections,
            ties_pending: completed
                .iter()
                .filter(|e| e.needs_manual_resolution)
                .count(),
            open_signals,
            audit_events: self.audit.count().await,
        })
    }

    /// Signals still pending verification.
    pub async fn pending_signals(&self) -> Result<Vec<crate::escalation::SosSignal>> {
        Ok(self.escalations.list(Some(SignalStatus::Pending)).await?)
    }
}

impl Default for Polis {
    fn default() -> Self {
        Self::new(PolisConfig::default())
    }
}

/// Builder for [`Polis`].
pub struct PolisBuilder {
    config: PolisConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl PolisBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: PolisConfig::default(),
            clock: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PolisConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set lock timeout (ms).
    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.hierarchy.lock_timeout_ms = ms;
        self
    }

    /// Require supporters to live within their sponsor's territory.
    pub fn require_same_territory(mut self, enabled: bool) -> Self {
        self.config.endorsement.require_same_territory = enabled;
        self
    }

    /// Require active status to vote and to stand.
    pub fn require_active(mut self, voters: bool, candidates: bool) -> Self {
        self.config.election.require_active_voters = voters;
        self.config.election.require_active_candidates = candidates;
        self
    }

    /// Build the core.
    pub fn build(self) -> Polis {
        match self.clock {
            Some(clock) => Polis::with_clock(self.config, clock),
            None => Polis::new(self.config),
        }
    }
}

impl Default for PolisBuilder {
    fn default() -> Self {
        Self::new()
    }
}
