pub mod config;
pub mod engine;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::RankingConfig;
pub use engine::{EngineError, FeedEngine};
pub use models::{EventInput, EventKind, FeedResponse, Item, ItemStatus};
pub use store::{InMemoryCatalog, ItemCatalog};
