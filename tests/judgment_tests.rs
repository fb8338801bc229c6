use std::sync::Arc;
use std::time::Duration;

use pet_evolution::agent::OfflineGenerator;
use pet_evolution::pet::{ActionKind, StatKind};
use pet_evolution::{InMemoryPetStore, JudgmentOutcome, Pet, PetConfig, PetCore, PetStore, Rarity};

fn setup(config: PetConfig) -> (Arc<dyn PetStore>, PetCore) {
    let store: Arc<dyn PetStore> = Arc::new(InMemoryPetStore::new());
    let core = PetCore::without_dispatch(store.clone(), Arc::new(OfflineGenerator), config);
    (store, core)
}

fn no_cooldown() -> PetConfig {
    let mut config = PetConfig::default();
    config.judgment.cooldown_secs = 0;
    config
}

async fn record_all(core: &PetCore, pet_id: &str, actions: &[&str]) {
    for action in actions {
        core.record_behavior(pet_id, action, "", "").await.unwrap();
    }
}

#[tokio::test]
async fn test_weight_alone_never_triggers_evolution() {
    let (store, core) = setup(PetConfig::default());
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::R).await.unwrap();
    record_all(&core, &pet.id, &["battle", "battle", "explore"]).await;

    let outcome = core.judge_pet(&pet.id).await.unwrap();
    let record = outcome.record().expect("judged");

    assert!((record.detail.raw_weight - 15.0).abs() < 1e-9);
    assert!((record.accumulated_weight - 18.0).abs() < 1e-9);
    assert_eq!(record.detail.distinct_actions, vec![ActionKind::Explore, ActionKind::Battle]);
    assert!(record.detail.clauses.weight);
    assert!(!record.detail.clauses.unique_actions);
    assert!(!record.should_evolve);
    assert!(!outcome.evolved());

    assert!(store.unprocessed_events(&pet.id).await.unwrap().is_empty());
    let unchanged = core.get_pet(&pet.id).await.unwrap();
    assert_eq!(unchanged.descriptor, pet.descriptor);
}

#[tokio::test]
async fn test_cooldown_skips_without_reading_events() {
    let (store, core) = setup(PetConfig::default());
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();
    record_all(&core, &pet.id, &["feed"]).await;
    assert!(core.judge_pet(&pet.id).await.unwrap().record().is_some());

    record_all(&core, &pet.id, &["play", "train"]).await;
    match core.judge_pet(&pet.id).await.unwrap() {
        JudgmentOutcome::CoolingDown { remaining } => assert!(remaining.num_seconds() > 0),
        other => panic!("expected cooldown, got {:?}", other),
    }
    assert_eq!(store.unprocessed_events(&pet.id).await.unwrap().len(), 2);
    assert_eq!(core.judgments(&pet.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_events_is_a_noop() {
    let (_store, core) = setup(no_cooldown());
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();
    assert!(matches!(core.judge_pet(&pet.id).await.unwrap(), JudgmentOutcome::NoEvents));
    assert!(core.judgments(&pet.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_all_clauses_trigger_fallback_evolution() {
    let (_store, core) = setup(no_cooldown());
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();
    // 1.2 + 3 + 6 + 6 = 16.2 over three action types
    record_all(&core, &pet.id, &["feed", "explore", "battle", "battle"]).await;

    let outcome = core.judge_pet(&pet.id).await.unwrap();
    let record = outcome.record().unwrap();
    assert!(record.should_evolve);
    assert!(outcome.evolved());

    let evolved = core.get_pet(&pet.id).await.unwrap();
    assert!(evolved.descriptor.starts_with(&pet.descriptor));
    assert!(evolved.descriptor.contains("grows steadier"));
    assert!(evolved.last_evolved_at.is_some());
    assert_eq!(evolved.traits.len(), 1);
    assert_eq!(evolved.stats.get(StatKind::Health), pet.stats.get(StatKind::Health) + 5);

    // the recent evolution now blocks the time clause
    record_all(&core, &pet.id, &["feed", "explore", "battle", "battle"]).await;
    let second = core.judge_pet(&pet.id).await.unwrap();
    let record = second.record().unwrap();
    assert!(record.detail.clauses.weight && record.detail.clauses.unique_actions);
    assert!(!record.detail.clauses.time_since_evolution);
    assert!(!second.evolved());
}

#[tokio::test]
async fn test_unknown_pet_is_a_storage_error() {
    let (_store, core) = setup(no_cooldown());
    assert!(core.record_behavior("ghost", "feed", "", "").await.is_err());
    assert!(core.get_pet("ghost").await.is_err());
}

#[tokio::test]
async fn test_concurrent_judges_count_each_event_once() {
    let store: Arc<dyn PetStore> = Arc::new(InMemoryPetStore::new());
    let pet = Pet::new("Mochi", "Ember Fox", Rarity::N);
    store.insert_pet(&pet).await.unwrap();

    // separate cores share the store but not their in-process locks
    let cores: Vec<Arc<PetCore>> = (0..4)
        .map(|_| Arc::new(PetCore::without_dispatch(store.clone(), Arc::new(OfflineGenerator), no_cooldown())))
        .collect();
    record_all(&cores[0], &pet.id, &["feed", "play", "rest", "train", "feed"]).await;

    let mut handles = Vec::new();
    for core in &cores {
        for _ in 0..3 {
            let core = core.clone();
            let pet_id = pet.id.clone();
            handles.push(tokio::spawn(async move { core.judge_pet(&pet_id).await }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let judgments = cores[0].judgments(&pet.id).await.unwrap();
    let counted: usize = judgments.iter().map(|j| j.behavior_count).sum();
    assert_eq!(counted, 5);
    assert!(store.unprocessed_events(&pet.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatcher_judges_in_background_and_idles_out() {
    let store: Arc<dyn PetStore> = Arc::new(InMemoryPetStore::new());
    let mut config = no_cooldown();
    config.judgment.dispatcher_idle_secs = 1;
    let core = PetCore::new(store.clone(), Arc::new(OfflineGenerator), config);
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();

    record_all(&core, &pet.id, &["feed", "play", "battle"]).await;

    let mut drained = false;
    for _ in 0..50 {
        if store.unprocessed_events(&pet.id).await.unwrap().is_empty() {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(drained);
    let counted: usize = core.judgments(&pet.id).await.unwrap().iter().map(|j| j.behavior_count).sum();
    assert_eq!(counted, 3);

    let dispatcher = core.dispatcher().expect("dispatch enabled");
    let mut idle = false;
    for _ in 0..40 {
        if dispatcher.active_workers().await == 0 {
            idle = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(idle);
}

#[tokio::test]
async fn test_judgment_considers_bounded_batch() {
    let mut config = no_cooldown();
    config.judgment.max_events_per_judgment = 2;
    let (store, core) = setup(config);
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();
    record_all(&core, &pet.id, &["feed", "play", "rest", "train", "feed"]).await;

    let mut counts = Vec::new();
    while let Some(record) = core.judge_pet(&pet.id).await.unwrap().record().cloned() {
        counts.push(record.behavior_count);
    }
    assert_eq!(counts, vec![2, 2, 1]);
    assert!(store.unprocessed_events(&pet.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_behavior_log_is_bounded_by_count() {
    let mut config = PetConfig::default();
    config.judgment.max_events = 50;
    let (store, core) = setup(config);
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();

    // one judgment, then the cooldown leaves everything else pending
    record_all(&core, &pet.id, &["feed"]).await;
    assert!(core.judge_pet(&pet.id).await.unwrap().record().is_some());
    for _ in 0..500 {
        core.record_behavior(&pet.id, "feed", "", "").await.unwrap();
    }
    assert!(matches!(core.judge_pet(&pet.id).await.unwrap(), JudgmentOutcome::CoolingDown { .. }));

    let pending = store.unprocessed_events(&pet.id).await.unwrap();
    assert_eq!(pending.len(), 50);
}
