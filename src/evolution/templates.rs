//! Species template registry.

use crate::pet::Rarity;

/// A named evolution target with its entry requirements.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionTemplate {
    pub form: String,
    /// Tiers above the pet's current rarity.
    pub rarity_shift: u8,
    pub required_level: u32,
    pub required_bond: f64,
    /// Environment tag the form is native to.
    pub environment: String,
    pub tags: Vec<String>,
}

impl EvolutionTemplate {
    fn new(form: &str, rarity_shift: u8, required_level: u32, required_bond: f64, environment: &str, tags: &[&str]) -> Self {
        Self {
            form: form.to_string(),
            rarity_shift,
            required_level,
            required_bond,
            environment: environment.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn target_rarity(&self, current: Rarity) -> Rarity {
        (0..self.rarity_shift).fold(current, |r, _| r.promoted())
    }
}

/// Species with built-in templates. Anything unrecognised is `Unknown` and
/// gets procedural templates instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeciesFamily {
    EmberFox,
    TideTurtle,
    SproutCat,
    Unknown,
}

impl SpeciesFamily {
    pub fn resolve(species: &str) -> SpeciesFamily {
        match normalize_species(species).as_str() {
            "emberfox" | "firefox" | "flamefox" | "火狐" | "焰狐" => SpeciesFamily::EmberFox,
            "tideturtle" | "seaturtle" | "wavetortoise" | "海龟" | "潮龟" => SpeciesFamily::TideTurtle,
            "sproutcat" | "leafcat" | "grasscat" | "草猫" | "芽猫" => SpeciesFamily::SproutCat,
            _ => SpeciesFamily::Unknown,
        }
    }

    pub fn templates(&self) -> Option<Vec<EvolutionTemplate>> {
        let templates = match self {
            SpeciesFamily::EmberFox => vec![
                EvolutionTemplate::new("Blaze Fox", 1, 10, 30.0, "volcano", &["fire", "agile"]),
                EvolutionTemplate::new("Ashen Fox", 1, 15, 40.0, "ruins", &["fire", "shadow"]),
                EvolutionTemplate::new("Inferno Kitsune", 2, 25, 60.0, "volcano", &["fire", "mystic", "nine-tailed"]),
            ],
            SpeciesFamily::TideTurtle => vec![
                EvolutionTemplate::new("Reef Guardian", 1, 12, 35.0, "ocean", &["water", "sturdy"]),
                EvolutionTemplate::new("Abyssal Tortoise", 2, 28, 65.0, "deep sea", &["water", "ancient"]),
            ],
            SpeciesFamily::SproutCat => vec![
                EvolutionTemplate::new("Bloom Cat", 1, 8, 25.0, "forest", &["nature", "healing"]),
                EvolutionTemplate::new("Elder Grove Cat", 2, 22, 55.0, "forest", &["nature", "ancient", "sage"]),
            ],
            SpeciesFamily::Unknown => return None,
        };
        Some(templates)
    }
}

/// Lowercases and strips punctuation and whitespace.
pub fn normalize_species(species: &str) -> String {
    species
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Two templates synthesized from the pet's own species, level and the
/// requested environment.
pub fn procedural_templates(species: &str, level: u32, environment: &str, offsets: [u32; 2]) -> Vec<EvolutionTemplate> {
    let species = species.trim();
    let species = if species.is_empty() { "Creature" } else { species };
    let environment = environment.trim();
    let environment = if environment.is_empty() { "wild" } else { environment };

    vec![
        EvolutionTemplate {
            form: format!("Awakened {}", species),
            rarity_shift: 1,
            required_level: level.saturating_add(offsets[0]),
            required_bond: 40.0,
            environment: environment.to_string(),
            tags: vec![environment.to_lowercase(), "awakened".to_string()],
        },
        EvolutionTemplate {
            form: format!("Ascendant {}", species),
            rarity_shift: 2,
            required_level: level.saturating_add(offsets[1]),
            required_bond: 70.0,
            environment: environment.to_string(),
            tags: vec![environment.to_lowercase(), "ascendant".to_string()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_species_aliases() {
        assert_eq!(SpeciesFamily::resolve("Ember-Fox"), SpeciesFamily::EmberFox);
        assert_eq!(SpeciesFamily::resolve("  sea turtle "), SpeciesFamily::TideTurtle);
        assert_eq!(SpeciesFamily::resolve("草猫"), SpeciesFamily::SproutCat);
        assert_eq!(SpeciesFamily::resolve("Moss Golem"), SpeciesFamily::Unknown);
        assert!(SpeciesFamily::Unknown.templates().is_none());
    }

    #[test]
    fn test_target_rarity_saturates() {
        let t = &procedural_templates("Golem", 3, "cave", [5, 10])[1];
        assert_eq!(t.target_rarity(Rarity::N), Rarity::SR);
        assert_eq!(t.target_rarity(Rarity::SSR), Rarity::SSS);
        assert_eq!(t.required_level, 13);
    }
}
