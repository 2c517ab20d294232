//! Chat answer routing.
//!
//! Chooses between the remote chat model and the on-device model per
//! question, with rule-based classification and sentence extraction to keep
//! the on-device prompt small.

mod context_extractor;
mod hybrid_router;
mod question_classifier;
mod sanitizer;

pub use context_extractor::*;
pub use hybrid_router::*;
pub use question_classifier::*;
pub use sanitizer::*;
