//! In-memory state backing the ranking pipeline: the item catalog seam,
//! the engagement event log, long-term affinities, and velocity rollups.

pub mod affinity;
pub mod catalog;
pub mod events;
pub mod velocity;

pub use affinity::{AffinitySnapshot, AffinityStore};
pub use catalog::{CatalogError, InMemoryCatalog, ItemCatalog};
pub use events::{ActivityCounts, EventStore};
pub use velocity::VelocityStore;
