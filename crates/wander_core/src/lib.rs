pub mod config;
pub mod connectivity;
pub mod error;
pub mod freshness;
pub mod image_cache;
pub mod logging;
pub mod persistence;
pub mod store;
pub mod types;

pub use config::{FreshnessKind, FreshnessPolicy, WanderConfig};
pub use connectivity::{ConnectivityProbe, HttpReachability, Reachability, SimulatedConditions};
pub use error::{ErrorCategory, WanderError};
pub use freshness::FreshnessTracker;
pub use image_cache::ImageCache;
pub use persistence::Database;
pub use store::EntityStore;
pub use types::{
    ConnectivitySnapshot, Coordinates, Destination, EducationalInfo, HistoricalInfo,
    ImageCacheEntry, Provenance,
};
