//! Agent Module
//!
//! The text-generation collaborator and the guards around it.

mod cache;
mod guard;
mod provider;
mod rate_limiter;

pub use cache::{CachedProvider, GenerationCache};
pub use guard::{GuardedGenerator, GENERATION_BUCKET};
pub use provider::{
    GenerationOptions, OfflineGenerator, OllamaProvider, OpenAICompatibleProvider, TextGenerator,
};
pub use rate_limiter::RateLimiter;
