//! Persistent Record Store
//!
//! Row access for pets, behavior events, judgments, descriptor history and
//! traits, partitioned by pet id. Multi-row mutations that must not
//! interleave are single trait methods so each backend can run them in one
//! transaction.

mod memory;
mod sqlite;

pub use memory::InMemoryPetStore;
pub use sqlite::SqlitePetStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::pet::{
    BehaviorEvent, DescriptorEvolutionRecord, JudgmentRecord, Pet, PetTrait, StatDelta,
};

#[async_trait]
pub trait PetStore: Send + Sync {
    async fn insert_pet(&self, pet: &Pet) -> StorageResult<()>;

    /// Loads a pet with its active traits attached.
    async fn get_pet(&self, pet_id: &str) -> StorageResult<Option<Pet>>;

    async fn list_pets(&self) -> StorageResult<Vec<Pet>>;

    async fn insert_event(&self, event: &BehaviorEvent) -> StorageResult<()>;

    /// Unprocessed events for a pet, oldest first.
    async fn unprocessed_events(&self, pet_id: &str) -> StorageResult<Vec<BehaviorEvent>>;

    /// Deletes processed events created before `before`. Returns the number removed.
    async fn purge_processed_events(&self, pet_id: &str, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Deletes the pet's oldest events so at most `max_events` remain,
    /// processed events before unprocessed ones. Returns the number removed.
    async fn trim_events(&self, pet_id: &str, max_events: usize) -> StorageResult<usize>;

    async fn latest_judgment(&self, pet_id: &str) -> StorageResult<Option<JudgmentRecord>>;

    /// Judgment audit trail, oldest first.
    async fn judgments(&self, pet_id: &str) -> StorageResult<Vec<JudgmentRecord>>;

    /// Writes the judgment record and flips `processed` on every listed event
    /// atomically. Fails with `Conflict` and writes nothing if any event was
    /// already processed.
    async fn complete_judgment(&self, record: &JudgmentRecord, event_ids: &[String]) -> StorageResult<()>;

    /// Stores the new descriptor, stamps the evolution time and appends the
    /// history record atomically.
    async fn apply_descriptor_evolution(&self, record: &DescriptorEvolutionRecord) -> StorageResult<()>;

    async fn descriptor_history(&self, pet_id: &str) -> StorageResult<Vec<DescriptorEvolutionRecord>>;

    /// All traits for a pet, oldest first.
    async fn traits(&self, pet_id: &str, include_inactive: bool) -> StorageResult<Vec<PetTrait>>;

    /// Deactivates the oldest active traits so that inserting `traits` keeps
    /// the active count within `max_active`, inserts them and applies
    /// `delta` to the pet's stats, atomically. Returns how many were deactivated.
    async fn solidify_traits(
        &self,
        pet_id: &str,
        traits: &[PetTrait],
        delta: &StatDelta,
        max_active: usize,
    ) -> StorageResult<usize>;
}

/// Number of active traits to retire so `active + incoming <= max_active`.
pub(crate) fn overflow(active: usize, incoming: usize, max_active: usize) -> usize {
    (active + incoming).saturating_sub(max_active).min(active)
}
