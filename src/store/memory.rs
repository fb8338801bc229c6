use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{overflow, PetStore};
use crate::error::{StorageError, StorageResult};
use crate::pet::{
    BehaviorEvent, DescriptorEvolutionRecord, JudgmentRecord, Pet, PetTrait, StatDelta,
};

#[derive(Default)]
struct Tables {
    pets: HashMap<String, Pet>,
    events: Vec<BehaviorEvent>,
    judgments: Vec<JudgmentRecord>,
    descriptor_history: Vec<DescriptorEvolutionRecord>,
    traits: Vec<PetTrait>,
}

/// Volatile store. One write lock spans each mutation, which gives the
/// same all-or-nothing behaviour as the sqlite transactions.
#[derive(Default)]
pub struct InMemoryPetStore {
    tables: RwLock<Tables>,
}

impl InMemoryPetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PetStore for InMemoryPetStore {
    async fn insert_pet(&self, pet: &Pet) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if tables.pets.contains_key(&pet.id) {
            return Err(StorageError::Conflict(format!("pet '{}' already exists", pet.id)));
        }
        let mut stored = pet.clone();
        stored.traits.clear();
        tables.pets.insert(pet.id.clone(), stored);
        Ok(())
    }

    async fn get_pet(&self, pet_id: &str) -> StorageResult<Option<Pet>> {
        let tables = self.tables.read().await;
        Ok(tables.pets.get(pet_id).map(|pet| {
            let mut pet = pet.clone();
            pet.traits = tables
                .traits
                .iter()
                .filter(|t| t.pet_id == pet_id && t.active)
                .cloned()
                .collect();
            pet
        }))
    }

    async fn list_pets(&self) -> StorageResult<Vec<Pet>> {
        let tables = self.tables.read().await;
        let mut pets: Vec<Pet> = tables.pets.values().cloned().collect();
        pets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pets)
    }

    async fn insert_event(&self, event: &BehaviorEvent) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.pets.contains_key(&event.pet_id) {
            return Err(StorageError::pet_not_found(&event.pet_id));
        }
        tables.events.push(event.clone());
        Ok(())
    }

    async fn unprocessed_events(&self, pet_id: &str) -> StorageResult<Vec<BehaviorEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<BehaviorEvent> = tables
            .events
            .iter()
            .filter(|e| e.pet_id == pet_id && !e.processed)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }

    async fn purge_processed_events(&self, pet_id: &str, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let len_before = tables.events.len();
        tables
            .events
            .retain(|e| !(e.pet_id == pet_id && e.processed && e.created_at < before));
        Ok(len_before - tables.events.len())
    }

    async fn trim_events(&self, pet_id: &str, max_events: usize) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let mut owned: Vec<(bool, DateTime<Utc>, String)> = tables
            .events
            .iter()
            .filter(|e| e.pet_id == pet_id)
            .map(|e| (!e.processed, e.created_at, e.id.clone()))
            .collect();
        let excess = owned.len().saturating_sub(max_events);
        if excess == 0 {
            return Ok(0);
        }
        // processed (false) sorts first, then oldest
        owned.sort();
        let doomed: HashSet<String> = owned.into_iter().take(excess).map(|(_, _, id)| id).collect();
        tables.events.retain(|e| !doomed.contains(&e.id));
        Ok(excess)
    }

    async fn latest_judgment(&self, pet_id: &str) -> StorageResult<Option<JudgmentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .judgments
            .iter()
            .filter(|j| j.pet_id == pet_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn judgments(&self, pet_id: &str) -> StorageResult<Vec<JudgmentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.judgments.iter().filter(|j| j.pet_id == pet_id).cloned().collect())
    }

    async fn complete_judgment(&self, record: &JudgmentRecord, event_ids: &[String]) -> StorageResult<()> {
        let mut tables = self.tables.write().await;

        for id in event_ids {
            let claimable = tables
                .events
                .iter()
                .any(|e| &e.id == id && e.pet_id == record.pet_id && !e.processed);
            if !claimable {
                return Err(StorageError::Conflict(format!("event '{}' already judged", id)));
            }
        }

        for event in tables.events.iter_mut() {
            if event_ids.contains(&event.id) {
                event.processed = true;
            }
        }
        tables.judgments.push(record.clone());
        Ok(())
    }

    async fn apply_descriptor_evolution(&self, record: &DescriptorEvolutionRecord) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let pet = tables
            .pets
            .get_mut(&record.pet_id)
            .ok_or_else(|| StorageError::pet_not_found(&record.pet_id))?;
        pet.descriptor = record.new_descriptor.clone();
        pet.last_evolved_at = Some(record.created_at);
        tables.descriptor_history.push(record.clone());
        Ok(())
    }

    async fn descriptor_history(&self, pet_id: &str) -> StorageResult<Vec<DescriptorEvolutionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .descriptor_history
            .iter()
            .filter(|r| r.pet_id == pet_id)
            .cloned()
            .collect())
    }

    async fn traits(&self, pet_id: &str, include_inactive: bool) -> StorageResult<Vec<PetTrait>> {
        let tables = self.tables.read().await;
        let mut traits: Vec<PetTrait> = tables
            .traits
            .iter()
            .filter(|t| t.pet_id == pet_id && (include_inactive || t.active))
            .cloned()
            .collect();
        traits.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(traits)
    }

    async fn solidify_traits(
        &self,
        pet_id: &str,
        traits: &[PetTrait],
        delta: &StatDelta,
        max_active: usize,
    ) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        if !tables.pets.contains_key(pet_id) {
            return Err(StorageError::pet_not_found(pet_id));
        }

        let mut active: Vec<(DateTime<Utc>, usize)> = tables
            .traits
            .iter()
            .enumerate()
            .filter(|(_, t)| t.pet_id == pet_id && t.active)
            .map(|(idx, t)| (t.created_at, idx))
            .collect();
        active.sort();

        let retire = overflow(active.len(), traits.len(), max_active);
        for (_, idx) in active.iter().take(retire) {
            tables.traits[*idx].active = false;
        }

        tables.traits.extend(traits.iter().cloned());

        if let Some(pet) = tables.pets.get_mut(pet_id) {
            pet.stats.apply(delta);
        }
        Ok(retire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pet::{ActionKind, Rarity, StatKind, TraitKind};
    use chrono::Duration;

    #[tokio::test]
    async fn test_complete_judgment_rejects_double_claim() {
        let store = InMemoryPetStore::new();
        let pet = Pet::new("Pip", "Sprout Cat", Rarity::N);
        store.insert_pet(&pet).await.unwrap();

        let event = BehaviorEvent::new(&pet.id, ActionKind::Feed, "berry", "");
        store.insert_event(&event).await.unwrap();

        let detail = crate::pet::JudgmentDetail {
            contributions: vec![],
            raw_weight: 1.2,
            rarity: Rarity::N,
            rarity_multiplier: 1.0,
            accumulated_weight: 1.2,
            distinct_actions: vec![ActionKind::Feed],
            clauses: crate::pet::TriggerClauses { weight: false, unique_actions: false, time_since_evolution: true },
            oracle_hexagram: None,
            summary: String::new(),
        };
        let first = JudgmentRecord::new(&pet.id, 1, detail.clone());
        store.complete_judgment(&first, &[event.id.clone()]).await.unwrap();

        let second = JudgmentRecord::new(&pet.id, 1, detail);
        let err = store.complete_judgment(&second, &[event.id.clone()]).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.judgments(&pet.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_solidify_retires_oldest() {
        let store = InMemoryPetStore::new();
        let pet = Pet::new("Pip", "Sprout Cat", Rarity::N);
        store.insert_pet(&pet).await.unwrap();

        let mut old = PetTrait::new(&pet.id, "Old", TraitKind::Passive, "", StatDelta::new());
        old.created_at = Utc::now() - Duration::hours(1);
        let mid = PetTrait::new(&pet.id, "Mid", TraitKind::Passive, "", StatDelta::new());
        store.solidify_traits(&pet.id, &[old, mid], &StatDelta::new(), 2).await.unwrap();

        let mut delta = StatDelta::new();
        delta.insert(StatKind::Attack, 3);
        let new = PetTrait::new(&pet.id, "New", TraitKind::Active, "", delta.clone());
        let retired = store.solidify_traits(&pet.id, &[new], &delta, 2).await.unwrap();
        assert_eq!(retired, 1);

        let active: Vec<String> = store.traits(&pet.id, false).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(active, vec!["Mid".to_string(), "New".to_string()]);
        assert_eq!(store.traits(&pet.id, true).await.unwrap().len(), 3);
        assert_eq!(store.get_pet(&pet.id).await.unwrap().unwrap().stats.attack, 13);
    }
}
