//! Pipeline facade
//!
//! Wires the pipeline stages together. `record_behavior` and `judge_pet`
//! are the caller-facing entry points; descriptor evolution, trait
//! solidification and oracle feedback run behind them.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::behavior::BehaviorLog;
use super::descriptor::DescriptorEvolver;
use super::dispatcher::JudgmentDispatcher;
use super::judgment::{JudgmentEngine, JudgmentOutcome};
use super::solidifier::TraitSolidifier;
use crate::agent::{GenerationOptions, GuardedGenerator, TextGenerator};
use crate::config::PetConfig;
use crate::error::{StorageError, StorageResult};
use crate::evolution::{EvolutionCandidate, EvolutionPathScorer, ScoreContext};
use crate::oracle::{StateRegister, YiJingOracle};
use crate::pet::{DescriptorEvolutionRecord, JudgmentRecord, Pet, PetTrait, Rarity};
use crate::store::PetStore;

pub struct PetCore {
    store: Arc<dyn PetStore>,
    oracle: Arc<YiJingOracle>,
    behavior: BehaviorLog,
    engine: Arc<JudgmentEngine>,
    dispatcher: Option<Arc<JudgmentDispatcher>>,
    scorer: EvolutionPathScorer,
}

impl PetCore {
    /// Core with automatic judgment after every recorded action.
    pub fn new(store: Arc<dyn PetStore>, generator: Arc<dyn TextGenerator>, config: PetConfig) -> Self {
        Self::build(store, generator, config, true)
    }

    /// Core where judgments only run through `judge_pet`.
    pub fn without_dispatch(store: Arc<dyn PetStore>, generator: Arc<dyn TextGenerator>, config: PetConfig) -> Self {
        Self::build(store, generator, config, false)
    }

    fn build(store: Arc<dyn PetStore>, generator: Arc<dyn TextGenerator>, config: PetConfig, dispatch: bool) -> Self {
        let oracle = Arc::new(YiJingOracle::new(config.oracle.clone()));
        let generator = Arc::new(GuardedGenerator::new(generator, &config.generation));
        let options = GenerationOptions {
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
        };

        let solidifier = Arc::new(TraitSolidifier::new(
            store.clone(),
            generator.clone(),
            oracle.clone(),
            config.traits.clone(),
            options,
        ));
        let evolver = Arc::new(DescriptorEvolver::new(
            store.clone(),
            generator,
            oracle.clone(),
            solidifier,
            config.descriptor.clone(),
            options,
        ));
        let engine = Arc::new(JudgmentEngine::new(store.clone(), oracle.clone(), evolver, &config));

        let mut behavior = BehaviorLog::new(store.clone(), oracle.clone(), config.judgment.event_retention())
            .with_max_events(config.judgment.max_events);
        let dispatcher = if dispatch {
            let idle = Duration::from_secs(config.judgment.dispatcher_idle_secs.max(1));
            let dispatcher = Arc::new(JudgmentDispatcher::new(engine.clone(), idle));
            behavior = behavior.with_dispatcher(dispatcher.clone());
            Some(dispatcher)
        } else {
            None
        };

        Self {
            store,
            oracle,
            behavior,
            engine,
            dispatcher,
            scorer: EvolutionPathScorer::new(config.scorer),
        }
    }

    pub async fn register_pet(&self, name: &str, species: &str, rarity: Rarity) -> StorageResult<Pet> {
        let pet = Pet::new(name, species, rarity);
        self.store.insert_pet(&pet).await?;
        info!("Registered {} ({} {}) as {}", pet.name, pet.rarity, pet.species, pet.id);
        Ok(pet)
    }

    /// Inserts a fully specified pet, e.g. one restored from elsewhere.
    pub async fn insert_pet(&self, pet: &Pet) -> StorageResult<()> {
        self.store.insert_pet(pet).await
    }

    pub async fn get_pet(&self, pet_id: &str) -> StorageResult<Pet> {
        self.store
            .get_pet(pet_id)
            .await?
            .ok_or_else(|| StorageError::pet_not_found(pet_id))
    }

    pub async fn list_pets(&self) -> StorageResult<Vec<Pet>> {
        self.store.list_pets().await
    }

    pub async fn record_behavior(&self, pet_id: &str, action: &str, target: &str, context: &str) -> StorageResult<String> {
        self.behavior.record(pet_id, action, target, context).await
    }

    pub async fn judge_pet(&self, pet_id: &str) -> StorageResult<JudgmentOutcome> {
        self.engine.judge(pet_id).await
    }

    pub async fn sweep(&self) -> StorageResult<usize> {
        self.behavior.sweep().await
    }

    pub async fn score_paths(&self, pet_id: &str, environment: &str) -> StorageResult<Vec<EvolutionCandidate>> {
        let pet = self.get_pet(pet_id).await?;
        let context = ScoreContext { environment: environment.to_string() };
        Ok(self.scorer.score(&pet, &context))
    }

    pub async fn judgments(&self, pet_id: &str) -> StorageResult<Vec<JudgmentRecord>> {
        self.store.judgments(pet_id).await
    }

    pub async fn descriptor_history(&self, pet_id: &str) -> StorageResult<Vec<DescriptorEvolutionRecord>> {
        self.store.descriptor_history(pet_id).await
    }

    /// Every trait the pet ever had, retired ones included.
    pub async fn trait_history(&self, pet_id: &str) -> StorageResult<Vec<PetTrait>> {
        self.store.traits(pet_id, true).await
    }

    pub async fn oracle_state(&self, pet_id: &str) -> Option<StateRegister> {
        self.oracle.register(pet_id).await
    }

    pub fn oracle(&self) -> &Arc<YiJingOracle> {
        &self.oracle
    }

    pub fn dispatcher(&self) -> Option<&Arc<JudgmentDispatcher>> {
        self.dispatcher.as_ref()
    }
}
