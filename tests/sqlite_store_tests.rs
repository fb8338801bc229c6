use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::tempdir;

use pet_evolution::agent::OfflineGenerator;
use pet_evolution::pet::{
    ActionKind, BehaviorEvent, DescriptorEvolutionRecord, JudgmentDetail, JudgmentRecord, PetTrait,
    StatDelta, StatKind, TraitKind, TriggerClauses,
};
use pet_evolution::{Pet, PetConfig, PetCore, PetStore, Rarity, SqlitePetStore};

fn detail() -> JudgmentDetail {
    JudgmentDetail {
        contributions: Vec::new(),
        raw_weight: 2.0,
        rarity: Rarity::N,
        rarity_multiplier: 1.0,
        accumulated_weight: 2.0,
        distinct_actions: vec![ActionKind::Feed],
        clauses: TriggerClauses { weight: false, unique_actions: false, time_since_evolution: true },
        oracle_hexagram: Some("kun".into()),
        summary: "test".into(),
    }
}

#[tokio::test]
async fn test_claim_conflict_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let store = SqlitePetStore::new(dir.path().join("pets.db")).await?;
    let pet = Pet::new("Mochi", "Ember Fox", Rarity::N);
    store.insert_pet(&pet).await?;

    let a = BehaviorEvent::new(&pet.id, ActionKind::Feed, "", "");
    let b = BehaviorEvent::new(&pet.id, ActionKind::Play, "", "");
    store.insert_event(&a).await?;
    store.insert_event(&b).await?;

    let first = JudgmentRecord::new(&pet.id, 1, detail());
    store.complete_judgment(&first, &[a.id.clone()]).await?;

    let second = JudgmentRecord::new(&pet.id, 2, detail());
    let err = store.complete_judgment(&second, &[a.id.clone(), b.id.clone()]).await.unwrap_err();
    assert!(err.is_conflict());

    // b stays claimable and only the first record exists
    let pending = store.unprocessed_events(&pet.id).await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, b.id);
    let judgments = store.judgments(&pet.id).await?;
    assert_eq!(judgments.len(), 1);
    assert_eq!(judgments[0].detail.oracle_hexagram.as_deref(), Some("kun"));
    assert_eq!(store.latest_judgment(&pet.id).await?.unwrap().id, first.id);
    Ok(())
}

#[tokio::test]
async fn test_solidify_retires_oldest_and_applies_stats() -> Result<()> {
    let dir = tempdir()?;
    let store = SqlitePetStore::new(dir.path().join("pets.db")).await?;
    let pet = Pet::new("Mochi", "Ember Fox", Rarity::N);
    store.insert_pet(&pet).await?;

    let mut effects = StatDelta::new();
    effects.insert(StatKind::Speed, 2);
    for name in ["one", "two", "three"] {
        let t = PetTrait::new(&pet.id, name, TraitKind::Passive, "", effects.clone());
        store.solidify_traits(&pet.id, &[t.clone()], &t.effects, 3).await?;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let newest = PetTrait::new(&pet.id, "four", TraitKind::Trigger, "", StatDelta::new());
    let retired = store.solidify_traits(&pet.id, &[newest], &StatDelta::new(), 3).await?;
    assert_eq!(retired, 1);

    let loaded = store.get_pet(&pet.id).await?.unwrap();
    let names: Vec<String> = loaded.traits.iter().map(|t| t.name.clone()).collect();
    assert_eq!(names, vec!["two", "three", "four"]);
    assert_eq!(loaded.stats.get(StatKind::Speed), 16);

    let all = store.traits(&pet.id, true).await?;
    assert_eq!(all.len(), 4);
    assert!(!all.iter().find(|t| t.name == "one").unwrap().active);
    Ok(())
}

#[tokio::test]
async fn test_descriptor_evolution_and_purge() -> Result<()> {
    let dir = tempdir()?;
    let store = SqlitePetStore::new(dir.path().join("pets.db")).await?;
    let pet = Pet::new("Mochi", "Ember Fox", Rarity::N);
    store.insert_pet(&pet).await?;

    let record = DescriptorEvolutionRecord {
        id: "evo-1".into(),
        pet_id: pet.id.clone(),
        old_descriptor: pet.descriptor.clone(),
        new_descriptor: format!("{}\nMochi found a friend.", pet.descriptor),
        content: "{}".into(),
        used_fallback: true,
        created_at: Utc::now(),
    };
    store.apply_descriptor_evolution(&record).await?;

    let loaded = store.get_pet(&pet.id).await?.unwrap();
    assert_eq!(loaded.descriptor, record.new_descriptor);
    assert!(loaded.last_evolved_at.is_some());
    let history = store.descriptor_history(&pet.id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
    assert_eq!(history[0].old_descriptor, pet.descriptor);
    assert!(history[0].used_fallback);

    let event = BehaviorEvent::new(&pet.id, ActionKind::Rest, "", "");
    store.insert_event(&event).await?;
    store
        .complete_judgment(&JudgmentRecord::new(&pet.id, 1, detail()), &[event.id.clone()])
        .await?;
    assert_eq!(store.purge_processed_events(&pet.id, Utc::now() - Duration::days(1)).await?, 0);
    assert_eq!(store.purge_processed_events(&pet.id, Utc::now() + Duration::seconds(1)).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_state_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("pets.db");

    let mut config = PetConfig::default();
    config.judgment.cooldown_secs = 0;
    let pet_id = {
        let store: Arc<dyn PetStore> = Arc::new(SqlitePetStore::new(&path).await?);
        let core = PetCore::without_dispatch(store, Arc::new(OfflineGenerator), config.clone());
        let pet = core.register_pet("Mochi", "Tide Turtle", Rarity::R).await?;
        for action in ["battle", "explore", "train", "feed"] {
            core.record_behavior(&pet.id, action, "reef", "a bright and happy day").await?;
        }
        assert!(core.judge_pet(&pet.id).await?.evolved());
        pet.id
    };

    let store: Arc<dyn PetStore> = Arc::new(SqlitePetStore::new(&path).await?);
    let core = PetCore::without_dispatch(store, Arc::new(OfflineGenerator), config);
    let pet = core.get_pet(&pet_id).await?;
    assert_eq!(pet.traits.len(), 1);
    assert_eq!(core.judgments(&pet_id).await?.len(), 1);
    assert_eq!(core.descriptor_history(&pet_id).await?.len(), 1);
    assert!(pet.descriptor.lines().count() >= 2);

    let candidates = core.score_paths(&pet_id, "ocean").await?;
    assert!(!candidates.is_empty() && candidates.len() <= 2);
    Ok(())
}

#[tokio::test]
async fn test_trim_drops_processed_before_pending() -> Result<()> {
    let dir = tempdir()?;
    let store = SqlitePetStore::new(dir.path().join("pets.db")).await?;
    let pet = Pet::new("Mochi", "Ember Fox", Rarity::N);
    store.insert_pet(&pet).await?;

    let mut ids = Vec::new();
    for action in [ActionKind::Feed, ActionKind::Play, ActionKind::Train, ActionKind::Rest] {
        let event = BehaviorEvent::new(&pet.id, action, "", "");
        store.insert_event(&event).await?;
        ids.push(event.id);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    // the newest event is judged, so it goes first despite its age
    store.complete_judgment(&JudgmentRecord::new(&pet.id, 1, detail()), &ids[3..]).await?;

    assert_eq!(store.trim_events(&pet.id, 10).await?, 0);
    assert_eq!(store.trim_events(&pet.id, 2).await?, 2);
    let pending: Vec<String> = store.unprocessed_events(&pet.id).await?.into_iter().map(|e| e.id).collect();
    assert_eq!(pending, vec![ids[1].clone(), ids[2].clone()]);
    Ok(())
}
