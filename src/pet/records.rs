use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{PetId, Rarity};

/// Action tags understood by the weight table. Anything else lands in
/// `Other` and is weighed with the table's default entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Feed,
    Play,
    Train,
    Explore,
    Battle,
    Rest,
    Other(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Feed => "feed",
            ActionKind::Play => "play",
            ActionKind::Train => "train",
            ActionKind::Explore => "explore",
            ActionKind::Battle => "battle",
            ActionKind::Rest => "rest",
            ActionKind::Other(tag) => tag.as_str(),
        }
    }
}

impl From<&str> for ActionKind {
    fn from(tag: &str) -> Self {
        let normalized = tag.trim().to_lowercase();
        match normalized.as_str() {
            "feed" => ActionKind::Feed,
            "play" => ActionKind::Play,
            "train" => ActionKind::Train,
            "explore" => ActionKind::Explore,
            "battle" => ActionKind::Battle,
            "rest" => ActionKind::Rest,
            _ => ActionKind::Other(normalized),
        }
    }
}

impl From<String> for ActionKind {
    fn from(tag: String) -> Self {
        ActionKind::from(tag.as_str())
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded action awaiting judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub id: String,
    pub pet_id: PetId,
    pub action: ActionKind,
    pub target: String,
    pub context: String,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
}

impl BehaviorEvent {
    pub fn new(pet_id: &str, action: ActionKind, target: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pet_id: pet_id.to_string(),
            action,
            target: target.into(),
            context: context.into(),
            created_at: Utc::now(),
            processed: false,
        }
    }
}

/// Contribution of one action type to a judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContribution {
    pub action: ActionKind,
    pub count: usize,
    pub weight: f64,
}

/// Which trigger clauses held during a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerClauses {
    pub weight: bool,
    pub unique_actions: bool,
    pub time_since_evolution: bool,
}

impl TriggerClauses {
    pub fn all(&self) -> bool {
        self.weight && self.unique_actions && self.time_since_evolution
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentDetail {
    pub contributions: Vec<ActionContribution>,
    pub raw_weight: f64,
    pub rarity: Rarity,
    pub rarity_multiplier: f64,
    pub accumulated_weight: f64,
    pub distinct_actions: Vec<ActionKind>,
    pub clauses: TriggerClauses,
    /// Hexagram in force for the pet when the judgment ran.
    pub oracle_hexagram: Option<String>,
    pub summary: String,
}

/// Immutable audit entry for one judgment cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentRecord {
    pub id: String,
    pub pet_id: PetId,
    pub behavior_count: usize,
    pub accumulated_weight: f64,
    pub should_evolve: bool,
    pub detail: JudgmentDetail,
    pub created_at: DateTime<Utc>,
}

impl JudgmentRecord {
    pub fn new(pet_id: &str, behavior_count: usize, detail: JudgmentDetail) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pet_id: pet_id.to_string(),
            behavior_count,
            accumulated_weight: detail.accumulated_weight,
            should_evolve: detail.clauses.all(),
            detail,
            created_at: Utc::now(),
        }
    }
}

/// One authorized descriptor change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorEvolutionRecord {
    pub id: String,
    pub pet_id: PetId,
    pub old_descriptor: String,
    pub new_descriptor: String,
    /// Raw generated content, or the fallback content serialized.
    pub content: String,
    pub used_fallback: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_normalizes() {
        assert_eq!(ActionKind::from(" Battle "), ActionKind::Battle);
        assert_eq!(ActionKind::from("Dance"), ActionKind::Other("dance".into()));
        assert_eq!(String::from(ActionKind::Explore), "explore");
    }

    #[test]
    fn test_action_kind_serde_as_string() {
        let json = serde_json::to_string(&ActionKind::Feed).unwrap();
        assert_eq!(json, "\"feed\"");
        let back: ActionKind = serde_json::from_str("\"groom\"").unwrap();
        assert_eq!(back, ActionKind::Other("groom".into()));
    }

    #[test]
    fn test_clauses_require_all() {
        let clauses = TriggerClauses { weight: true, unique_actions: false, time_since_evolution: true };
        assert!(!clauses.all());
    }
}
