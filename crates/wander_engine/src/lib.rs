pub mod destinations;
pub mod engine;
pub mod fallback;
pub mod images;

pub use destinations::DestinationResolver;
pub use engine::{EngineParts, TravelEngine};
pub use fallback::{
    FailureReason, FallbackEvent, FallbackEventReason, HealthConfig, MultiProviderResolver,
    Resolution, ResolutionTier, TierStatus,
};
pub use images::ImageResolver;
