//! Evolution Path Scorer
//!
//! Ranks the forms a pet could evolve into and projects what each would do
//! to its stats and traits. Pure computation; nothing is persisted.

mod templates;

pub use templates::{normalize_species, procedural_templates, EvolutionTemplate, SpeciesFamily};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::config::ScorerConfig;
use crate::pet::{Pet, Rarity, StatDelta, StatKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreContext {
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionCandidate {
    pub form: String,
    pub target_rarity: Rarity,
    pub tags: Vec<String>,
    pub stat_delta: StatDelta,
    pub score: f64,
    pub new_traits: Vec<String>,
}

pub struct EvolutionPathScorer {
    config: ScorerConfig,
}

impl EvolutionPathScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Built-in templates for the pet's species, or procedural ones.
    pub fn templates_for(&self, pet: &Pet, context: &ScoreContext) -> Vec<EvolutionTemplate> {
        SpeciesFamily::resolve(&pet.species)
            .templates()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| {
                debug!("No templates for species '{}', synthesizing", pet.species);
                procedural_templates(
                    &pet.species,
                    pet.level,
                    &context.environment,
                    self.config.procedural_level_offsets,
                )
            })
    }

    /// Candidates sorted by descending score, at most `max_candidates` and
    /// never empty.
    pub fn score(&self, pet: &Pet, context: &ScoreContext) -> Vec<EvolutionCandidate> {
        let mut candidates: Vec<EvolutionCandidate> = self
            .templates_for(pet, context)
            .iter()
            .map(|template| self.candidate(pet, context, template))
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(self.config.max_candidates.max(1));
        candidates
    }

    pub fn template_score(&self, pet: &Pet, context: &ScoreContext, template: &EvolutionTemplate) -> f64 {
        let level_ratio = ratio(pet.level as f64, template.required_level as f64);
        let bond_ratio = ratio(pet.bond, template.required_bond);
        let environment = if environment_matches(&context.environment, &template.environment) {
            1.0
        } else {
            0.3
        };

        let traits: HashSet<String> = pet
            .active_trait_names()
            .iter()
            .map(|n| n.trim().to_lowercase())
            .collect();
        let overlap = template
            .tags
            .iter()
            .filter(|tag| traits.contains(&tag.to_lowercase()))
            .count();

        (0.4 * level_ratio + 0.4 * bond_ratio + 0.2 * environment)
            * self.config.rarity_weight.get(pet.rarity)
            * (1.0 + 0.1 * overlap as f64)
    }

    fn candidate(&self, pet: &Pet, context: &ScoreContext, template: &EvolutionTemplate) -> EvolutionCandidate {
        let score = self.template_score(pet, context, template);
        let target_rarity = template.target_rarity(pet.rarity);
        let growth = self.config.growth_multiplier.get(target_rarity);
        let factor = growth * (0.8 + 0.4 * score.min(1.0)) - 1.0;

        let stat_delta: StatDelta = StatKind::ALL
            .iter()
            .map(|kind| (*kind, (pet.stats.get(*kind) as f64 * factor).round() as i64))
            .collect();

        let mut new_traits = Vec::new();
        let mut seen = HashSet::new();
        for name in pet.active_trait_names().into_iter().chain(template.tags.iter().cloned()) {
            if seen.insert(name.to_lowercase()) {
                new_traits.push(name);
            }
        }

        EvolutionCandidate {
            form: template.form.clone(),
            target_rarity,
            tags: template.tags.clone(),
            stat_delta,
            score,
            new_traits,
        }
    }
}

/// `min(1, value / required)`; a zero requirement is always met.
fn ratio(value: f64, required: f64) -> f64 {
    if required <= 0.0 {
        return 1.0;
    }
    (value / required).clamp(0.0, 1.0)
}

fn environment_matches(requested: &str, native: &str) -> bool {
    let requested = normalize_species(requested);
    !requested.is_empty() && requested == normalize_species(native)
}
