pub mod composer;
pub mod diversity;
pub mod impressions;
pub mod profile;
pub mod recall;
pub mod related;
pub mod scoring;
pub mod session;
pub mod tracking;
pub mod velocity;

pub use composer::{fallback_feed, FeedComposer};
pub use diversity::DiversityPass;
pub use impressions::ImpressionLedger;
pub use profile::ProfileService;
pub use recall::RecallLayer;
pub use related::RelatedService;
pub use scoring::Scorer;
pub use session::SessionManager;
pub use tracking::TrackingService;
pub use velocity::VelocityService;
