//! Trait Solidifier (L3b)
//!
//! Turns evolution content into discrete trait records and applies their
//! summed stat deltas to the pet.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::descriptor::EvolutionContent;
use crate::agent::{GenerationOptions, GuardedGenerator};
use crate::config::TraitConfig;
use crate::emit_event;
use crate::error::StorageResult;
use crate::oracle::{Layer, YiJingOracle};
use crate::orchestrator::event_bus::PetEvent;
use crate::pet::{Pet, PetTrait, StatDelta, StatKind, TraitKind};
use crate::store::PetStore;
use crate::utils::{extract_json_array, take_chars};

const MAX_NAME_CHARS: usize = 40;
const MAX_DESCRIPTION_CHARS: usize = 160;

pub struct TraitSolidifier {
    store: Arc<dyn PetStore>,
    generator: Arc<GuardedGenerator>,
    oracle: Arc<YiJingOracle>,
    config: TraitConfig,
    options: GenerationOptions,
}

impl TraitSolidifier {
    pub fn new(
        store: Arc<dyn PetStore>,
        generator: Arc<GuardedGenerator>,
        oracle: Arc<YiJingOracle>,
        config: TraitConfig,
        options: GenerationOptions,
    ) -> Self {
        Self { store, generator, oracle, config, options }
    }

    /// Inserts 1..=`max_new_traits` traits, retiring the oldest active ones
    /// if the cap would be exceeded, and returns what was inserted.
    pub async fn solidify(&self, pet: &Pet, content: &EvolutionContent) -> StorageResult<Vec<PetTrait>> {
        let prompt = self.build_prompt(pet, content);
        let generated = self.generator.generate("traits", prompt, self.options).await;

        let mut traits = generated
            .as_deref()
            .map(|text| parse_traits(&pet.id, text, self.config.max_effect_magnitude))
            .unwrap_or_default();
        if traits.is_empty() {
            if generated.is_some() {
                warn!("Unparseable trait content for {}, using fallback trait", pet.id);
            }
            traits.push(fallback_trait(&pet.id));
        }

        let limit = self.config.max_new_traits.min(self.config.max_active_traits);
        if limit == 0 {
            warn!("Trait cap is zero, nothing solidified for {}", pet.id);
            return Ok(Vec::new());
        }
        traits.truncate(limit);

        let delta = sum_effects(&traits);
        let deactivated = self
            .store
            .solidify_traits(&pet.id, &traits, &delta, self.config.max_active_traits)
            .await?;

        let descriptions = traits
            .iter()
            .map(|t| format!("{}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n");
        self.oracle.evaluate(&pet.id, &descriptions, Layer::Solidify).await;

        info!(
            "Solidified {} trait(s) for {} ({} retired), delta {:?}",
            traits.len(),
            pet.id,
            deactivated,
            delta
        );
        emit_event!(PetEvent::TraitsSolidified {
            pet_id: pet.id.clone(),
            added: traits.len(),
            deactivated,
        });
        Ok(traits)
    }

    fn build_prompt(&self, pet: &Pet, content: &EvolutionContent) -> String {
        let payload = json!({
            "pet": {
                "name": pet.name,
                "species": pet.species,
                "rarity": pet.rarity.as_str(),
                "level": pet.level,
                "stats": pet.stats,
                "traits": pet.active_trait_names(),
            },
            "evolution": content,
        });
        format!(
            "Turn this pet's latest evolution into 1 to {} traits.\n\
             Reply with a JSON array only. Each item: {{\"name\": string, \"kind\": \"passive\"|\"active\"|\"trigger\", \
             \"description\": string, \"effects\": {{stat: integer}}}} using stats health, attack, defense, speed, magic. \
             Keep each effect within +/-{}.\n\n{}",
            self.config.max_new_traits.max(1),
            self.config.max_effect_magnitude,
            payload
        )
    }
}

/// Parses generator output into traits. Items without a name are skipped;
/// unknown stats are dropped and effects are clamped to `max_effect`.
pub fn parse_traits(pet_id: &str, text: &str, max_effect: i64) -> Vec<PetTrait> {
    let Some(fragment) = extract_json_array(text) else {
        return Vec::new();
    };
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(fragment) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let kind = item
                .get("kind")
                .and_then(Value::as_str)
                .map(TraitKind::parse)
                .unwrap_or(TraitKind::Passive);
            let description = item
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim();
            let effects = item
                .get("effects")
                .and_then(Value::as_object)
                .map(|map| parse_effects(map, max_effect))
                .unwrap_or_default();
            Some(PetTrait::new(
                pet_id,
                take_chars(name, MAX_NAME_CHARS),
                kind,
                take_chars(description, MAX_DESCRIPTION_CHARS),
                effects,
            ))
        })
        .collect()
}

fn parse_effects(map: &serde_json::Map<String, Value>, max_effect: i64) -> StatDelta {
    let bound = max_effect.abs();
    let mut effects = StatDelta::new();
    for (label, value) in map {
        let Some(stat) = StatKind::parse(label) else {
            debug!("Dropping unknown stat '{}'", label);
            continue;
        };
        let amount = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().trim_start_matches('+').parse::<i64>().ok(),
            _ => None,
        };
        if let Some(amount) = amount {
            let total = effects.entry(stat).or_insert(0);
            *total = total.saturating_add(amount);
        }
    }
    // aliases of one stat are summed before the bound applies
    for amount in effects.values_mut() {
        *amount = (*amount).clamp(-bound, bound);
    }
    effects
}

/// Single trait substituted when the generator is unavailable or its reply
/// cannot be parsed.
pub fn fallback_trait(pet_id: &str) -> PetTrait {
    let mut effects = StatDelta::new();
    effects.insert(StatKind::Health, 5);
    effects.insert(StatKind::Defense, 1);
    PetTrait::new(
        pet_id,
        "Steady Growth",
        TraitKind::Passive,
        "Quiet companionship hardens into resilience.",
        effects,
    )
}

pub fn sum_effects(traits: &[PetTrait]) -> StatDelta {
    let mut total = StatDelta::new();
    for t in traits {
        for (stat, amount) in &t.effects {
            *total.entry(*stat).or_insert(0) += amount;
        }
    }
    total
}
