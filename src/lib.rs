//! Pet Evolution Core
//!
//! Grows persistent pets from a stream of small actions:
//! - Behavior log with retention and per-pet judgment dispatch
//! - Judgment engine with cooldown and exactly-once event accounting
//! - Length-bounded descriptor evolution backed by a text generator
//! - Trait solidification under an active-trait cap
//! - YiJing state oracle over generated text
//! - Evolution path scoring

pub mod agent;
pub mod config;
pub mod error;
pub mod evolution;
pub mod oracle;
pub mod orchestrator;
pub mod pet;
pub mod store;
pub mod utils;

// Re-exports for convenience
pub use config::{ConfigManager, PetConfig};
pub use error::{StorageError, StorageResult};
pub use evolution::{EvolutionCandidate, EvolutionPathScorer, ScoreContext};
pub use oracle::{Feedback, Layer, YiJingOracle};
pub use orchestrator::{JudgmentOutcome, PetCore};
pub use pet::{Pet, Rarity};
pub use store::{InMemoryPetStore, PetStore, SqlitePetStore};
