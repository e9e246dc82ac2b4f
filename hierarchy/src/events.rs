//! Domain events published on every successful state transition.
//!
//! Publishing never blocks the caller. Subscribers either hold a broadcast
//! receiver or implement [`EventSink`] and get driven by a forwarder task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Maximum entries kept by an [`AuditTrail`] before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// Entity type an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Territory
    Territory,
    /// Tier node
    TierNode,
    /// Person
    Person,
    /// Endorsement edge
    Endorsement,
    /// Election
    Election,
    /// SOS signal
    Signal,
}

/// A state transition that external collaborators may react to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event ID
    pub id: uuid::Uuid,
    /// Entity type
    pub entity: EntityKind,
    /// Entity identifier
    pub entity_id: String,
    /// Transition name, e.g. `approved`
    pub transition: String,
    /// Who caused it, if a person did
    pub actor: Option<String>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Transition-specific data
    pub detail: serde_json::Value,
}

impl DomainEvent {
    /// Create a new event stamped with the current time.
    pub fn new(entity: EntityKind, entity_id: impl ToString, transition: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            entity,
            entity_id: entity_id.to_string(),
            transition: transition.into(),
            actor: None,
            timestamp: Utc::now(),
            detail: serde_json::Value::Null,
        }
    }

    /// Set the actor.
    pub fn by(mut self, actor: impl ToString) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach transition data.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Consumer of domain events (notification, audit, projections).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Handle one event. Slow sinks only delay themselves.
    async fn deliver(&self, event: DomainEvent);
}

/// Largest per-receiver buffer a bus will allocate.
pub const MAX_EVENT_CAPACITY: usize = 1 << 20;

/// Fan-out bus for domain events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` undelivered events per receiver.
    ///
    /// The capacity is clamped to `1..=MAX_EVENT_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_CAPACITY));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: DomainEvent) {
        debug!(
            entity = ?event.entity,
            entity_id = %event.entity_id,
            transition = %event.transition,
            "Domain event"
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Spawn a task that forwards every event to `sink` until the bus closes.
    pub fn spawn_sink(&self, sink: Arc<dyn EventSink>) -> JoinHandle<()> {
        let mut stream = BroadcastStream::new(self.subscribe());
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => sink.deliver(event).await,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event sink lagged, events dropped");
                    }
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// In-memory audit trail of domain events, newest first.
pub struct AuditTrail {
    entries: Arc<RwLock<VecDeque<DomainEvent>>>,
    max_entries: usize,
}

impl AuditTrail {
    /// Create a new audit trail.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: max_entries.max(1),
        }
    }

    /// Record an event.
    pub async fn record(&self, event: DomainEvent) {
        let mut entries = self.entries.write().await;
        entries.push_front(event);

        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    /// Most recent events.
    pub async fn recent(&self, limit: usize) -> Vec<DomainEvent> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Events about one entity, newest first.
    pub async fn for_entity(&self, entity_id: &str) -> Vec<DomainEvent> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect()
    }

    /// Events caused by one actor, newest first.
    pub async fn by_actor(&self, actor: &str, limit: usize) -> Vec<DomainEvent> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.actor.as_deref() == Some(actor))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for AuditTrail {
    async fn deliver(&self, event: DomainEvent) {
        self.record(event).await;
    }
}
