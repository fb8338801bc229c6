//! Pet Module
//!
//! Entity model shared by every pipeline stage.

mod records;
mod types;

pub use records::{
    ActionContribution, ActionKind, BehaviorEvent, DescriptorEvolutionRecord, JudgmentDetail,
    JudgmentRecord, TriggerClauses,
};
pub use types::{Pet, PetId, PetTrait, Rarity, StatDelta, StatKind, Stats, TraitKind};
