//! Territorial and group hierarchy for a civic organization.
//!
//! Two trees live side by side:
//!
//! - **Territories**: electoral districts, regions and municipalities, nested
//!   without cycles
//! - **Tier nodes**: four tiers of groups, where a `Tier1` node holds members
//!   directly and every other tier contains nodes exactly one tier below
//!
//! Persons hold at most one `Tier1` membership and may lead any node whose
//! subtree contains them. Counts on every node are derived from the live
//! collections and can be audited at any time.
//!
//! # Key Components
//!
//! - [`HierarchyStore`]: Shared store, one critical section per mutation
//! - [`HierarchyState`]: The arena and its invariant-preserving operations
//! - [`EventBus`]: Domain events for notification and audit collaborators
//! - [`TierPolicy`]: Which tiers may attach to which territory kinds
//!
//! # Example
//!
//! ```ignore
//! use hierarchy::{EventBus, HierarchyStore, TerritoryKind, Tier};
//!
//! let store = HierarchyStore::new(EventBus::default());
//! let city = store.create_territory("Tbilisi", TerritoryKind::Municipality, None, None).await?;
//! let top = store.attach_tier_node(Tier::Tier4, "Tbilisi", city.id, None).await?;
//! ```

pub mod clock;
pub mod error;
pub mod events;
pub mod policy;
pub mod store;
pub mod types;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{acquire, ErrorKind, HierarchyError, LockTimeout, Result};
pub use events::{AuditTrail, DomainEvent, EntityKind, EventBus, EventSink, MAX_EVENT_CAPACITY};
pub use policy::TierPolicy;
pub use store::{HierarchyState, HierarchyStore, DEFAULT_LOCK_TIMEOUT};
pub use types::*;
