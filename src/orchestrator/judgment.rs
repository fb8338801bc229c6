//! Judgment Engine (L3a)
//!
//! Drains a pet's unprocessed behavior events, weighs them, and decides
//! whether a deeper evolution step is authorized. Judging the same pet is
//! serialized in-process, and the store's claim-and-commit rejects any
//! event already counted by another judgment.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::descriptor::DescriptorEvolver;
use crate::config::{ActionWeightTable, JudgmentConfig, PetConfig, RarityTable};
use crate::emit_event;
use crate::error::{StorageError, StorageResult};
use crate::oracle::YiJingOracle;
use crate::orchestrator::event_bus::PetEvent;
use crate::pet::{
    ActionContribution, ActionKind, BehaviorEvent, DescriptorEvolutionRecord, JudgmentDetail,
    JudgmentRecord, Pet, PetId, TriggerClauses,
};
use crate::store::PetStore;

/// Result of one `judge` call.
#[derive(Debug, Clone)]
pub enum JudgmentOutcome {
    /// A judgment record exists inside the cooldown window.
    CoolingDown { remaining: Duration },
    /// Nothing to judge.
    NoEvents,
    /// A concurrent judgment claimed some of the events first.
    Contended,
    Judged {
        record: JudgmentRecord,
        /// Present when evolution was authorized and the descriptor step succeeded.
        evolution: Option<DescriptorEvolutionRecord>,
    },
}

impl JudgmentOutcome {
    pub fn record(&self) -> Option<&JudgmentRecord> {
        match self {
            JudgmentOutcome::Judged { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn evolved(&self) -> bool {
        matches!(self, JudgmentOutcome::Judged { evolution: Some(_), .. })
    }
}

/// `Σ(base·multiplier) · rarity_multiplier` over `events`.
pub fn accumulated_weight(events: &[BehaviorEvent], weights: &ActionWeightTable, rarity_multiplier: f64) -> f64 {
    let raw: f64 = events.iter().map(|e| weights.weight_for(&e.action).value()).sum();
    raw * rarity_multiplier
}

pub struct JudgmentEngine {
    store: Arc<dyn PetStore>,
    oracle: Arc<YiJingOracle>,
    evolver: Arc<DescriptorEvolver>,
    config: JudgmentConfig,
    weights: ActionWeightTable,
    rarity: RarityTable,
    locks: Mutex<HashMap<PetId, Arc<Mutex<()>>>>,
}

impl JudgmentEngine {
    pub fn new(
        store: Arc<dyn PetStore>,
        oracle: Arc<YiJingOracle>,
        evolver: Arc<DescriptorEvolver>,
        config: &PetConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            evolver,
            config: config.judgment.clone(),
            weights: config.action_weights.clone(),
            rarity: config.rarity_multipliers,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn pet_lock(&self, pet_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(pet_id.to_string()).or_default().clone()
    }

    pub async fn judge(&self, pet_id: &str) -> StorageResult<JudgmentOutcome> {
        let lock = self.pet_lock(pet_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.judge_locked(pet_id).await
        };

        // Drop the entry once nobody else holds or waits on it.
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(pet_id);
        }
        outcome
    }

    /// Number of pets with a live judgment lock.
    pub async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn judge_locked(&self, pet_id: &str) -> StorageResult<JudgmentOutcome> {
        let now = Utc::now();

        if let Some(last) = self.store.latest_judgment(pet_id).await? {
            let elapsed = now - last.created_at;
            let cooldown = self.config.cooldown();
            if elapsed < cooldown {
                debug!("Judgment for {} cooling down ({}s left)", pet_id, (cooldown - elapsed).num_seconds());
                return Ok(JudgmentOutcome::CoolingDown { remaining: cooldown - elapsed });
            }
        }

        let mut events = self.store.unprocessed_events(pet_id).await?;
        if events.is_empty() {
            return Ok(JudgmentOutcome::NoEvents);
        }
        let cap = self.config.max_events_per_judgment.max(1);
        if events.len() > cap {
            debug!("Judging {} of {} pending events for {}", cap, events.len(), pet_id);
            events.truncate(cap);
        }

        let pet = self
            .store
            .get_pet(pet_id)
            .await?
            .ok_or_else(|| StorageError::pet_not_found(pet_id))?;
        let hexagram = self
            .oracle
            .latest(pet_id)
            .await
            .map(|feedback| feedback.hexagram.id.to_string());

        let detail = self.assess(&pet, &events, now, hexagram);
        let record = JudgmentRecord::new(pet_id, events.len(), detail);
        let event_ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();

        match self.store.complete_judgment(&record, &event_ids).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                warn!("Judgment for {} lost the claim on its events: {}", pet_id, e);
                return Ok(JudgmentOutcome::Contended);
            }
            Err(e) => return Err(e),
        }

        info!(
            "Judged {}: {} events, weight {:.2}, evolve={}",
            pet_id, record.behavior_count, record.accumulated_weight, record.should_evolve
        );
        emit_event!(PetEvent::JudgmentCompleted {
            pet_id: pet_id.to_string(),
            accumulated_weight: record.accumulated_weight,
            should_evolve: record.should_evolve,
        });

        let evolution = if record.should_evolve {
            match self.evolver.evolve(&pet, &record.detail).await {
                Ok(evolution) => Some(evolution),
                Err(e) => {
                    error!("Evolution step failed for {}: {}", pet_id, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(JudgmentOutcome::Judged { record, evolution })
    }

    /// Weighs `events` for `pet` and evaluates the three trigger clauses.
    pub fn assess(
        &self,
        pet: &Pet,
        events: &[BehaviorEvent],
        now: DateTime<Utc>,
        oracle_hexagram: Option<String>,
    ) -> JudgmentDetail {
        let mut per_action: BTreeMap<ActionKind, (usize, f64)> = BTreeMap::new();
        for event in events {
            let weight = self.weights.weight_for(&event.action).value();
            let entry = per_action.entry(event.action.clone()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += weight;
        }
        let contributions: Vec<ActionContribution> = per_action
            .into_iter()
            .map(|(action, (count, weight))| ActionContribution { action, count, weight })
            .collect();

        let raw_weight: f64 = contributions.iter().map(|c| c.weight).sum();
        let rarity_multiplier = self.rarity.get(pet.rarity);
        let accumulated_weight = raw_weight * rarity_multiplier;

        let distinct_actions: Vec<ActionKind> = events
            .iter()
            .map(|e| e.action.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let since_evolution_ok = match pet.last_evolved_at {
            Some(at) => now - at >= self.config.min_time_since_last_evolution(),
            None => true,
        };
        let clauses = TriggerClauses {
            weight: accumulated_weight >= self.config.min_weight,
            unique_actions: distinct_actions.len() >= self.config.min_unique_actions,
            time_since_evolution: since_evolution_ok,
        };

        let summary = format!(
            "weight {:.2} >= {:.2}: {}; unique actions {} >= {}: {}; time since evolution: {}",
            accumulated_weight,
            self.config.min_weight,
            yes_no(clauses.weight),
            distinct_actions.len(),
            self.config.min_unique_actions,
            yes_no(clauses.unique_actions),
            yes_no(clauses.time_since_evolution),
        );

        JudgmentDetail {
            contributions,
            raw_weight,
            rarity: pet.rarity,
            rarity_multiplier,
            accumulated_weight,
            distinct_actions,
            clauses,
            oracle_hexagram,
            summary,
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
