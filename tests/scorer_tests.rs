use pet_evolution::config::ScorerConfig;
use pet_evolution::pet::{PetTrait, StatDelta, TraitKind};
use pet_evolution::{EvolutionPathScorer, Pet, Rarity, ScoreContext};

#[test]
fn test_candidate_count_and_order_for_any_species() {
    let scorer = EvolutionPathScorer::new(ScorerConfig::default());
    let species = ["Ember Fox", "tide-turtle", "Sprout Cat", "Moss Golem", "", "???", "雷鸟"];
    let environments = ["", "volcano", "forest", "deep sea"];

    for name in species {
        for rarity in Rarity::ALL {
            for env in environments {
                for level in [1, 20, 60] {
                    let pet = Pet::new("Pip", name, rarity).with_level(level).with_bond(level as f64);
                    let context = ScoreContext { environment: env.to_string() };
                    let candidates = scorer.score(&pet, &context);

                    assert!(!candidates.is_empty() && candidates.len() <= 2, "{} {} {}", name, rarity, env);
                    assert!(candidates.windows(2).all(|w| w[0].score >= w[1].score));
                    assert!(candidates.iter().all(|c| c.target_rarity >= rarity));
                }
            }
        }
    }
}

#[test]
fn test_procedural_candidates_follow_pet() {
    let scorer = EvolutionPathScorer::new(ScorerConfig::default());
    let mut pet = Pet::new("Pip", "Storm Wyrm", Rarity::R).with_level(12).with_bond(50.0);
    pet.traits.push(PetTrait::new(&pet.id, "Sky", TraitKind::Passive, "", StatDelta::new()));

    let candidates = scorer.score(&pet, &ScoreContext { environment: "Sky".into() });
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().any(|c| c.form == "Awakened Storm Wyrm"));
    for candidate in &candidates {
        assert!(candidate.tags.contains(&"sky".to_string()));
        // current trait and template tag merge into one entry
        assert_eq!(candidate.new_traits.iter().filter(|t| t.to_lowercase() == "sky").count(), 1);
    }
}

#[test]
fn test_species_normalization_matches_templates() {
    let scorer = EvolutionPathScorer::new(ScorerConfig::default());
    let context = ScoreContext { environment: "forest".into() };
    let a = scorer.score(&Pet::new("A", "Sprout Cat", Rarity::N), &context);
    let b = scorer.score(&Pet::new("B", "  sprout_CAT!! ", Rarity::N), &context);
    let forms_a: Vec<_> = a.iter().map(|c| c.form.clone()).collect();
    let forms_b: Vec<_> = b.iter().map(|c| c.form.clone()).collect();
    assert_eq!(forms_a, forms_b);
    assert!(forms_a.contains(&"Bloom Cat".to_string()));
}
