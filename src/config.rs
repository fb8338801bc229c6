//! Pipeline Configuration
//!
//! Every threshold, table and cap the pipeline consults is injected from
//! here. Fields default individually so partial files are valid.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;

use crate::pet::{ActionKind, Rarity};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PetConfig {
    pub judgment: JudgmentConfig,
    pub action_weights: ActionWeightTable,
    pub rarity_multipliers: RarityTable,
    pub descriptor: DescriptorConfig,
    pub traits: TraitConfig,
    pub oracle: OracleConfig,
    pub generation: GenerationConfig,
    pub scorer: ScorerConfig,
}

impl PetConfig {
    /// Rejects settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.traits.max_active_traits == 0 {
            bail!("traits.max_active_traits must be at least 1");
        }
        if self.traits.max_new_traits == 0 {
            bail!("traits.max_new_traits must be at least 1");
        }
        if self.judgment.max_events == 0 || self.judgment.max_events_per_judgment == 0 {
            bail!("judgment event caps must be at least 1");
        }
        if self.descriptor.max_prompt_length == 0 {
            bail!("descriptor.max_prompt_length must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgmentConfig {
    /// Minimum gap between two judgment records for the same pet.
    pub cooldown_secs: u64,
    pub min_weight: f64,
    pub min_unique_actions: usize,
    pub min_time_since_last_evolution_secs: u64,
    /// Processed events older than this are purged.
    pub event_retention_secs: u64,
    /// Idle time after which a per-pet dispatch worker exits.
    pub dispatcher_idle_secs: u64,
    /// Per-pet cap on stored behavior events, processed or not.
    pub max_events: usize,
    /// Unprocessed events considered by one judgment cycle; the rest wait
    /// for the next one.
    pub max_events_per_judgment: usize,
}

impl JudgmentConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn min_time_since_last_evolution(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.min_time_since_last_evolution_secs as i64)
    }

    pub fn event_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.event_retention_secs as i64)
    }
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 5 * 60,
            min_weight: 15.0,
            min_unique_actions: 3,
            min_time_since_last_evolution_secs: 60 * 60,
            event_retention_secs: 7 * 24 * 60 * 60,
            dispatcher_idle_secs: 60,
            max_events: 1000,
            max_events_per_judgment: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionWeight {
    pub base: f64,
    pub multiplier: f64,
}

impl ActionWeight {
    pub const fn new(base: f64, multiplier: f64) -> Self {
        Self { base, multiplier }
    }

    pub fn value(&self) -> f64 {
        self.base * self.multiplier
    }

    /// Built-in weights. `Other` has none and falls through to the table default.
    pub fn builtin(kind: &ActionKind) -> Option<ActionWeight> {
        match kind {
            ActionKind::Feed => Some(ActionWeight::new(1.0, 1.2)),
            ActionKind::Play => Some(ActionWeight::new(1.0, 1.3)),
            ActionKind::Train => Some(ActionWeight::new(2.0, 1.5)),
            ActionKind::Explore => Some(ActionWeight::new(2.0, 1.5)),
            ActionKind::Battle => Some(ActionWeight::new(3.0, 2.0)),
            ActionKind::Rest => Some(ActionWeight::new(0.5, 1.0)),
            ActionKind::Other(_) => None,
        }
    }
}

impl Default for ActionWeight {
    fn default() -> Self {
        ActionWeight::new(1.0, 1.0)
    }
}

/// Action weight registry with a required default entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionWeightTable {
    #[serde(default)]
    pub entries: HashMap<ActionKind, ActionWeight>,
    #[serde(default)]
    pub default: ActionWeight,
}

impl ActionWeightTable {
    pub fn empty(default: ActionWeight) -> Self {
        Self { entries: HashMap::new(), default }
    }

    pub fn with(mut self, kind: impl Into<ActionKind>, weight: ActionWeight) -> Self {
        self.entries.insert(kind.into(), weight);
        self
    }

    pub fn weight_for(&self, kind: &ActionKind) -> ActionWeight {
        self.entries.get(kind).copied().unwrap_or(self.default)
    }
}

impl Default for ActionWeightTable {
    fn default() -> Self {
        let kinds = [
            ActionKind::Feed,
            ActionKind::Play,
            ActionKind::Train,
            ActionKind::Explore,
            ActionKind::Battle,
            ActionKind::Rest,
        ];
        let entries = kinds
            .into_iter()
            .filter_map(|k| ActionWeight::builtin(&k).map(|w| (k, w)))
            .collect();
        Self { entries, default: ActionWeight::default() }
    }
}

/// One value per rarity tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RarityTable {
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "R")]
    pub r: f64,
    #[serde(rename = "SR")]
    pub sr: f64,
    #[serde(rename = "SSR")]
    pub ssr: f64,
    #[serde(rename = "SSS")]
    pub sss: f64,
}

impl RarityTable {
    pub const fn new(n: f64, r: f64, sr: f64, ssr: f64, sss: f64) -> Self {
        Self { n, r, sr, ssr, sss }
    }

    pub fn get(&self, rarity: Rarity) -> f64 {
        match rarity {
            Rarity::N => self.n,
            Rarity::R => self.r,
            Rarity::SR => self.sr,
            Rarity::SSR => self.ssr,
            Rarity::SSS => self.sss,
        }
    }
}

impl Default for RarityTable {
    fn default() -> Self {
        RarityTable::new(1.0, 1.2, 1.5, 2.0, 3.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    /// Hard bound on the descriptor, in characters.
    pub max_prompt_length: usize,
    /// Appended lines kept by the first compaction stage.
    pub keep_recent_lines: usize,
    pub truncation_marker: String,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            max_prompt_length: 220,
            keep_recent_lines: 3,
            truncation_marker: "…".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitConfig {
    pub max_active_traits: usize,
    /// Upper bound on traits accepted from one solidification.
    pub max_new_traits: usize,
    /// Generated per-stat effects are clamped to this magnitude.
    pub max_effect_magnitude: i64,
}

impl Default for TraitConfig {
    fn default() -> Self {
        Self { max_active_traits: 30, max_new_traits: 3, max_effect_magnitude: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub repetition_threshold: f64,
    pub tone_threshold: f64,
    /// Scalar magnitude at which a dimension enters its gained/lost position.
    pub position_enter: f64,
    /// How far back below `position_enter` the scalar must fall to leave it.
    pub position_band: f64,
    /// Metric delta magnitude at which a dimension turns dynamic.
    pub movement_enter: f64,
    pub movement_band: f64,
    /// Weight of the newest signal in each dimension's moving average.
    pub smoothing: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            repetition_threshold: 0.3,
            tone_threshold: 0.6,
            position_enter: 0.2,
            position_band: 0.05,
            movement_enter: 0.1,
            movement_band: 0.05,
            smoothing: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Token-bucket budget for collaborator calls.
    pub calls_per_minute: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2:3b".to_string(),
            temperature: 0.8,
            max_tokens: 256,
            timeout_secs: 20,
            calls_per_minute: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub rarity_weight: RarityTable,
    /// Stat growth multiplier keyed by a candidate's target rarity.
    pub growth_multiplier: RarityTable,
    /// Level offsets for the two procedural templates.
    pub procedural_level_offsets: [u32; 2],
    pub max_candidates: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            rarity_weight: RarityTable::new(1.0, 1.1, 1.2, 1.35, 1.5),
            growth_multiplier: RarityTable::new(1.0, 1.1, 1.25, 1.45, 1.7),
            procedural_level_offsets: [5, 10],
            max_candidates: 2,
        }
    }
}

/// Loads and persists `PetConfig` as JSON or YAML, chosen by extension.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn is_yaml(&self) -> bool {
        matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
    }

    pub async fn load(&self) -> Result<PetConfig> {
        if !self.path.exists() {
            let default = PetConfig::default();
            self.save(&default).await?;
            return Ok(default);
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading config {}", self.path.display()))?;
        let config: PetConfig = if self.is_yaml() {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config
            .validate()
            .with_context(|| format!("invalid config {}", self.path.display()))?;
        Ok(config)
    }

    pub async fn save(&self, config: &PetConfig) -> Result<()> {
        let content = if self.is_yaml() {
            serde_yaml::to_string(config)?
        } else {
            serde_json::to_string_pretty(config)?
        };
        fs::write(&self.path, content).await?;
        Ok(())
    }
}
