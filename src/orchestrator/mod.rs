//! Orchestrator Module
//!
//! The behavior → judgment → descriptor → trait pipeline and its plumbing.

pub mod behavior;
pub mod descriptor;
pub mod dispatcher;
pub mod event_bus;
pub mod judgment;
pub mod pipeline;
pub mod solidifier;

pub use behavior::BehaviorLog;
pub use descriptor::{compact_descriptor, DescriptorEvolver, EvolutionContent};
pub use dispatcher::JudgmentDispatcher;
pub use event_bus::{EventBus, PetEvent, PET_EVENT_BUS};
pub use judgment::{accumulated_weight, JudgmentEngine, JudgmentOutcome};
pub use pipeline::PetCore;
pub use solidifier::{fallback_trait, parse_traits, TraitSolidifier};
