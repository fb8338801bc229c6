//! Descriptor Evolution Generator (L2)
//!
//! Appends one generated line to a pet's descriptor, keeps the descriptor
//! within its character budget and hands the structured content on to the
//! trait solidifier.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::solidifier::TraitSolidifier;
use crate::agent::{GenerationOptions, GuardedGenerator};
use crate::config::DescriptorConfig;
use crate::emit_event;
use crate::error::StorageResult;
use crate::oracle::{Layer, YiJingOracle};
use crate::orchestrator::event_bus::PetEvent;
use crate::pet::{DescriptorEvolutionRecord, JudgmentDetail, Pet};
use crate::store::PetStore;
use crate::utils::{char_len, extract_json_object, truncate_with_marker};

/// Structured content of one evolution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionContent {
    /// Single line appended to the descriptor.
    #[serde(alias = "evolution_line", alias = "description")]
    pub line: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl EvolutionContent {
    /// Deterministic content used when the generator is unavailable or its
    /// reply cannot be parsed.
    pub fn fallback(pet: &Pet, detail: &JudgmentDetail) -> Self {
        let actions = detail
            .distinct_actions
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>();
        let line = if actions.is_empty() {
            format!("{} grows a little steadier.", pet.name)
        } else {
            format!("{} grows steadier through {}.", pet.name, actions.join(", "))
        };
        Self {
            line,
            theme: "steady growth".to_string(),
            keywords: actions.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Parses the first JSON object in `text`. The line is flattened to a
    /// single line and must be non-empty.
    pub fn parse(text: &str) -> Option<Self> {
        let fragment = extract_json_object(text)?;
        let mut content: EvolutionContent = serde_json::from_str(fragment).ok()?;
        content.line = content.line.split_whitespace().collect::<Vec<_>>().join(" ");
        if content.line.is_empty() {
            return None;
        }
        Some(content)
    }
}

/// `old + "\n" + line`, compacted to at most `max_prompt_length` chars.
///
/// Stage one keeps the first line and the last `keep_recent_lines` lines.
/// Stage two hard-truncates and appends the marker.
pub fn compact_descriptor(old: &str, line: &str, config: &DescriptorConfig) -> String {
    let old = old.trim_end();
    let joined = if old.is_empty() {
        line.to_string()
    } else {
        format!("{}\n{}", old, line)
    };
    if char_len(&joined) <= config.max_prompt_length {
        return joined;
    }

    let lines: Vec<&str> = joined.lines().collect();
    let keep = config.keep_recent_lines;
    let compacted = if lines.len() > keep + 1 {
        let mut kept = vec![lines[0]];
        kept.extend_from_slice(&lines[lines.len() - keep..]);
        kept.join("\n")
    } else {
        joined
    };
    if char_len(&compacted) <= config.max_prompt_length {
        return compacted;
    }

    truncate_with_marker(&compacted, config.max_prompt_length, &config.truncation_marker)
}

pub struct DescriptorEvolver {
    store: Arc<dyn PetStore>,
    generator: Arc<GuardedGenerator>,
    oracle: Arc<YiJingOracle>,
    solidifier: Arc<TraitSolidifier>,
    config: DescriptorConfig,
    options: GenerationOptions,
}

impl DescriptorEvolver {
    pub fn new(
        store: Arc<dyn PetStore>,
        generator: Arc<GuardedGenerator>,
        oracle: Arc<YiJingOracle>,
        solidifier: Arc<TraitSolidifier>,
        config: DescriptorConfig,
        options: GenerationOptions,
    ) -> Self {
        Self { store, generator, oracle, solidifier, config, options }
    }

    pub async fn evolve(&self, pet: &Pet, detail: &JudgmentDetail) -> StorageResult<DescriptorEvolutionRecord> {
        let prompt = self.build_prompt(pet, detail).await;
        let generated = self.generator.generate("descriptor", prompt, self.options).await;

        let parsed = match generated {
            Some(text) => {
                let parsed = EvolutionContent::parse(&text);
                if parsed.is_none() {
                    warn!("Unparseable evolution content for {}, using fallback", pet.id);
                }
                parsed.map(|content| (content, text))
            }
            None => None,
        };
        let (content, raw, used_fallback) = match parsed {
            Some((content, raw)) => (content, raw, false),
            None => {
                let content = EvolutionContent::fallback(pet, detail);
                let raw = serde_json::to_string(&content)?;
                (content, raw, true)
            }
        };

        let new_descriptor = compact_descriptor(&pet.descriptor, &content.line, &self.config);
        let record = DescriptorEvolutionRecord {
            id: Uuid::new_v4().to_string(),
            pet_id: pet.id.clone(),
            old_descriptor: pet.descriptor.clone(),
            new_descriptor: new_descriptor.clone(),
            content: raw.clone(),
            used_fallback,
            created_at: Utc::now(),
        };
        self.store.apply_descriptor_evolution(&record).await?;

        self.oracle.evaluate(&pet.id, &raw, Layer::Descriptor).await;
        info!(
            "Descriptor evolved for {} ({} chars{})",
            pet.id,
            char_len(&new_descriptor),
            if used_fallback { ", fallback" } else { "" }
        );
        emit_event!(PetEvent::DescriptorEvolved {
            pet_id: pet.id.clone(),
            used_fallback,
        });

        let mut evolved = pet.clone();
        evolved.descriptor = new_descriptor;
        evolved.last_evolved_at = Some(record.created_at);
        self.solidifier.solidify(&evolved, &content).await?;

        Ok(record)
    }

    async fn build_prompt(&self, pet: &Pet, detail: &JudgmentDetail) -> String {
        let oracle = self.oracle.latest(&pet.id).await.map(|feedback| {
            json!({
                "hexagram": feedback.hexagram.name,
                "interpretation": feedback.hexagram.interpretation,
                "advice": feedback.advice,
            })
        });
        let payload = json!({
            "pet": {
                "name": pet.name,
                "species": pet.species,
                "rarity": pet.rarity.as_str(),
                "level": pet.level,
                "bond": pet.bond,
                "descriptor": pet.descriptor,
                "traits": pet.active_trait_names(),
            },
            "judgment": {
                "accumulated_weight": detail.accumulated_weight,
                "actions": detail.distinct_actions,
                "summary": detail.summary,
            },
            "oracle": oracle,
        });
        format!(
            "Write the next line of this pet's story after the activity below.\n\
             Reply with a JSON object only: {{\"line\": string, \"theme\": string, \"keywords\": [string]}}. \
             The line must be a single sentence under {} characters.\n\n{}",
            self.config.max_prompt_length / 2,
            payload
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize) -> DescriptorConfig {
        DescriptorConfig { max_prompt_length: max, ..DescriptorConfig::default() }
    }

    #[test]
    fn test_compact_appends_within_budget() {
        let out = compact_descriptor("Mochi is a young fox.", "Mochi learned to swim.", &config(220));
        assert_eq!(out, "Mochi is a young fox.\nMochi learned to swim.");
    }

    #[test]
    fn test_compact_empty_old_descriptor() {
        assert_eq!(compact_descriptor("  ", "First words.", &config(220)), "First words.");
    }

    #[test]
    fn test_compact_keeps_first_and_recent_lines() {
        let old = "origin\nline one\nline two\nline three\nline four";
        let out = compact_descriptor(old, "line five", &config(50));
        assert_eq!(out, "origin\nline three\nline four\nline five");
    }

    #[test]
    fn test_compact_hard_truncates_with_marker() {
        let long = "界".repeat(100);
        let out = compact_descriptor("origin", &long, &config(30));
        assert_eq!(char_len(&out), 30);
        assert!(out.ends_with('…'));
        assert!(out.starts_with("origin\n"));
    }

    #[test]
    fn test_parse_content() {
        let content = EvolutionContent::parse("ok: {\"evolution_line\": \"Mochi\\nshines.\", \"theme\": \"light\"}").unwrap();
        assert_eq!(content.line, "Mochi shines.");
        assert_eq!(content.theme, "light");
        assert!(EvolutionContent::parse("{\"line\": \"   \"}").is_none());
        assert!(EvolutionContent::parse("plain prose").is_none());
    }
}
