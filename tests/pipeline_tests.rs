use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pet_evolution::agent::{GenerationOptions, OfflineGenerator, TextGenerator};
use pet_evolution::oracle::Layer;
use pet_evolution::orchestrator::EvolutionContent;
use pet_evolution::pet::StatKind;
use pet_evolution::utils::char_len;
use pet_evolution::{InMemoryPetStore, PetConfig, PetCore, PetStore, Rarity};

/// Answers each pipeline stage with a fixed reply, or fails when none is set.
struct ScriptedGenerator {
    descriptor: Option<String>,
    traits: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(descriptor: Option<&str>, traits: Option<&str>) -> Self {
        Self {
            descriptor: descriptor.map(String::from),
            traits: traits.map(String::from),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: String, _options: GenerationOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = if prompt.contains("next line of this pet's story") {
            &self.descriptor
        } else if prompt.contains("traits") {
            &self.traits
        } else {
            &None
        };
        reply.clone().ok_or_else(|| anyhow!("no scripted reply"))
    }
}

fn evolving_config() -> PetConfig {
    let mut config = PetConfig::default();
    config.judgment.cooldown_secs = 0;
    config.judgment.min_weight = 5.0;
    config.judgment.min_time_since_last_evolution_secs = 0;
    config
}

async fn evolve_once(core: &PetCore, pet_id: &str) -> bool {
    for action in ["feed", "explore", "battle"] {
        core.record_behavior(pet_id, action, "arena", "").await.unwrap();
    }
    core.judge_pet(pet_id).await.unwrap().evolved()
}

#[tokio::test]
async fn test_end_to_end_with_generated_content() {
    let generator = Arc::new(ScriptedGenerator::new(
        Some(r#"Here you go: {"line": "Mochi learned to breathe sparks.", "theme": "fire", "keywords": ["spark"]}"#),
        Some(
            r#"[{"name": "Spark Breath", "kind": "active", "description": "Exhales a burst of embers.", "effects": {"atk": 4, "mp": 2}},
                {"name": "Warm Fur", "kind": "passive", "description": "Shrugs off the cold.", "effects": {"hp": 10, "def": 1}}]"#,
        ),
    ));
    let store: Arc<dyn PetStore> = Arc::new(InMemoryPetStore::new());
    let core = PetCore::without_dispatch(store.clone(), generator.clone(), evolving_config());
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();

    assert!(evolve_once(&core, &pet.id).await);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    let evolved = core.get_pet(&pet.id).await.unwrap();
    assert_eq!(evolved.descriptor, "Mochi is a young Ember Fox.\nMochi learned to breathe sparks.");
    assert_eq!(evolved.stats.get(StatKind::Attack), 14);
    assert_eq!(evolved.stats.get(StatKind::Magic), 12);
    assert_eq!(evolved.stats.get(StatKind::Health), 110);
    assert_eq!(evolved.stats.get(StatKind::Defense), 11);
    let mut names = evolved.active_trait_names();
    names.sort();
    assert_eq!(names, vec!["Spark Breath", "Warm Fur"]);

    let history = core.descriptor_history(&pet.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].used_fallback);
    assert_eq!(history[0].old_descriptor, pet.descriptor);
    assert!(history[0].content.contains("breathe sparks"));

    let feedback = core.oracle().latest(&pet.id).await.unwrap();
    assert_eq!(feedback.layer, Layer::Solidify);
}

#[tokio::test]
async fn test_descriptor_stays_within_bound() {
    let mut config = evolving_config();
    config.descriptor.max_prompt_length = 60;
    let generator = Arc::new(ScriptedGenerator::new(
        Some(r#"{"line": "Mochi wandered far beyond the last hill and came back changed in ways no one could name."}"#),
        None,
    ));
    let core = PetCore::without_dispatch(Arc::new(InMemoryPetStore::new()), generator, config);
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();

    for _ in 0..6 {
        assert!(evolve_once(&core, &pet.id).await);
        let descriptor = core.get_pet(&pet.id).await.unwrap().descriptor;
        assert!(char_len(&descriptor) <= 60, "descriptor too long: {}", descriptor);
    }
    let descriptor = core.get_pet(&pet.id).await.unwrap().descriptor;
    assert!(descriptor.starts_with("Mochi is a young Ember Fox."));
    assert!(descriptor.ends_with('…'));
}

#[tokio::test]
async fn test_active_traits_never_exceed_cap() {
    let mut config = evolving_config();
    config.traits.max_active_traits = 4;
    let generator = Arc::new(ScriptedGenerator::new(
        None,
        Some(r#"[{"name": "A", "effects": {"speed": 1}}, {"name": "B"}, {"name": "C"}, {"name": "D"}]"#),
    ));
    let store: Arc<dyn PetStore> = Arc::new(InMemoryPetStore::new());
    let core = PetCore::without_dispatch(store.clone(), generator, config);
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();

    for _ in 0..5 {
        assert!(evolve_once(&core, &pet.id).await);
        let active = store.traits(&pet.id, false).await.unwrap();
        assert!(active.len() <= 4);
    }

    // three accepted per step, oldest retired, nothing deleted
    let history = core.trait_history(&pet.id).await.unwrap();
    assert_eq!(history.len(), 15);
    assert_eq!(history.iter().filter(|t| t.active).count(), 4);
    assert_eq!(core.get_pet(&pet.id).await.unwrap().stats.get(StatKind::Speed), 15);
}

#[tokio::test]
async fn test_fallbacks_when_generator_is_offline() {
    let core = PetCore::without_dispatch(
        Arc::new(InMemoryPetStore::new()),
        Arc::new(OfflineGenerator),
        evolving_config(),
    );
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::SR).await.unwrap();
    assert!(evolve_once(&core, &pet.id).await);

    let history = core.descriptor_history(&pet.id).await.unwrap();
    assert!(history[0].used_fallback);
    let content: EvolutionContent = serde_json::from_str(&history[0].content).unwrap();
    assert!(history[0].new_descriptor.ends_with(&content.line));

    let traits = core.trait_history(&pet.id).await.unwrap();
    assert_eq!(traits.len(), 1);
    assert_eq!(traits[0].name, "Steady Growth");
}

#[tokio::test]
async fn test_unparseable_replies_use_fallbacks() {
    let generator = Arc::new(ScriptedGenerator::new(Some("I would rather not."), Some("Maybe later!")));
    let core = PetCore::without_dispatch(Arc::new(InMemoryPetStore::new()), generator, evolving_config());
    let pet = core.register_pet("Mochi", "Ember Fox", Rarity::N).await.unwrap();
    assert!(evolve_once(&core, &pet.id).await);

    let evolved = core.get_pet(&pet.id).await.unwrap();
    assert!(evolved.descriptor.contains("grows steadier"));
    assert_eq!(evolved.active_trait_names(), vec!["Steady Growth"]);
}
