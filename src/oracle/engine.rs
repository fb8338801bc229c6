use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::hexagram::{Hexagram, LinePattern, Polarity};
use super::metrics::{MetricsDelta, MetricsExtractor, MetricsSnapshot, MetricVector};
use super::register::{Dimension, Movement, Position, StateRegister};
use crate::config::OracleConfig;
use crate::emit_event;
use crate::orchestrator::event_bus::PetEvent;
use crate::pet::PetId;

const ZERO_DELTA: f64 = 1e-9;

/// Pipeline layer that produced the evaluated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// L1: behavior context supplied with a recorded action.
    Behavior,
    /// L2: generated descriptor evolution content.
    Descriptor,
    /// L3: solidified trait descriptions.
    Solidify,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub layer: Layer,
    pub metrics: MetricsSnapshot,
    pub delta: MetricsDelta,
    pub lines: LinePattern,
    pub hexagram: Hexagram,
    pub register: StateRegister,
    pub advice: Vec<String>,
}

impl Feedback {
    /// Returned when the metrics cannot be interpreted.
    pub fn neutral(layer: Layer, register: StateRegister) -> Self {
        Self {
            layer,
            metrics: MetricVector::neutral(),
            delta: MetricVector::zero(),
            lines: [Polarity::Yin; 3],
            hexagram: Hexagram::CUSTOM,
            register,
            advice: vec!["No readable signal; keep observing.".to_string()],
        }
    }
}

/// Per-key oracle memory: last snapshot, register and lines.
#[derive(Debug, Clone, Default)]
struct OracleState {
    snapshot: Option<MetricsSnapshot>,
    register: StateRegister,
    lines: Option<LinePattern>,
    last: Option<Feedback>,
}

impl OracleState {
    fn step(&mut self, metrics: MetricsSnapshot, layer: Layer, config: &OracleConfig) -> Feedback {
        let previous = self.snapshot.unwrap_or_else(MetricVector::neutral);
        let delta = metrics.delta_from(&previous);
        self.snapshot = Some(metrics);

        // A zero innovation delta carries no direction, so the first line holds.
        let first = if delta.innovation > ZERO_DELTA {
            Polarity::Yang
        } else if delta.innovation < -ZERO_DELTA {
            Polarity::Yin
        } else {
            self.lines.map(|l| l[0]).unwrap_or(Polarity::Yin)
        };
        let second = Polarity::from_bool(metrics.repetition < config.repetition_threshold);
        let third = Polarity::from_bool(metrics.tone > config.tone_threshold);
        let lines = [first, second, third];
        self.lines = Some(lines);

        let signals = [
            2.0 * metrics.innovation - 1.0,
            1.0 - 2.0 * metrics.repetition,
            2.0 * metrics.tone - 1.0,
        ];
        let changes = [delta.innovation, delta.repetition, delta.tone];
        self.register.observe(signals, changes, lines, config);

        let feedback = Feedback {
            layer,
            metrics,
            delta,
            lines,
            hexagram: Hexagram::from_lines(lines),
            register: self.register,
            advice: advise(&self.register),
        };
        self.last = Some(feedback.clone());
        feedback
    }
}

fn advise(register: &StateRegister) -> Vec<String> {
    let mut advice = Vec::new();

    match register.first.position {
        Position::Lost => advice.push("Innovation is lost: broaden input diversity with new actions and targets.".to_string()),
        Position::Gained => advice.push("Innovation is gained: keep exploring while the momentum lasts.".to_string()),
        Position::Neutral => {}
    }
    if register.second.position == Position::Lost {
        advice.push("Clarity is scattered: cut down on repeated phrasing and repeated actions.".to_string());
    }
    match register.third.position {
        Position::Lost => advice.push("Harmony is discordant: favour gentle interactions such as feeding and rest.".to_string()),
        Position::Gained => advice.push("Harmony is high: bond-building interactions will land well.".to_string()),
        Position::Neutral => {}
    }

    let all_dynamic = Dimension::ALL
        .iter()
        .all(|d| register.get(*d).movement == Movement::Dynamic);
    if all_dynamic {
        advice.push("Every dimension is shifting: let the state settle before forcing an evolution.".to_string());
    }

    if advice.is_empty() {
        advice.push("Steady state: keep the current rhythm.".to_string());
    }
    advice
}

/// Text-quality oracle with one register per pet and a system-wide aggregate.
pub struct YiJingOracle {
    config: OracleConfig,
    extractor: MetricsExtractor,
    states: Mutex<HashMap<PetId, OracleState>>,
    aggregate: Mutex<OracleState>,
}

impl YiJingOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            extractor: MetricsExtractor::new(),
            states: Mutex::new(HashMap::new()),
            aggregate: Mutex::new(OracleState::default()),
        }
    }

    /// Scores `text` against the pet's previous snapshot and folds the
    /// result into its register. Never fails.
    pub async fn evaluate(&self, pet_id: &str, text: &str, layer: Layer) -> Feedback {
        let metrics = self.extractor.extract(text);

        let mut states = self.states.lock().await;
        let state = states.entry(pet_id.to_string()).or_default();

        if !metrics.is_finite() {
            return Feedback::neutral(layer, state.register);
        }

        let feedback = state.step(metrics, layer, &self.config);
        drop(states);

        self.aggregate.lock().await.step(metrics, layer, &self.config);

        debug!(
            "Oracle {:?} for {}: {} {} [{}]",
            layer,
            pet_id,
            feedback.hexagram.symbol,
            feedback.hexagram.name,
            feedback.register.describe()
        );
        emit_event!(PetEvent::OracleFeedback {
            pet_id: pet_id.to_string(),
            layer: format!("{:?}", layer).to_lowercase(),
            hexagram: feedback.hexagram.id.to_string(),
        });
        feedback
    }

    pub async fn register(&self, pet_id: &str) -> Option<StateRegister> {
        self.states.lock().await.get(pet_id).map(|s| s.register)
    }

    /// Most recent feedback for a pet, used as bias by the generator layers.
    pub async fn latest(&self, pet_id: &str) -> Option<Feedback> {
        self.states.lock().await.get(pet_id).and_then(|s| s.last.clone())
    }

    /// Process-wide register fed by every pet.
    pub async fn aggregate(&self) -> StateRegister {
        self.aggregate.lock().await.register
    }

    /// Operator reset of one pet's register and snapshot.
    pub async fn reset(&self, pet_id: &str) -> bool {
        self.states.lock().await.remove(pet_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registers_are_isolated_per_pet() {
        let oracle = YiJingOracle::new(OracleConfig::default());
        oracle.evaluate("a", "innovation: 0.9\ntone: 0.9", Layer::Descriptor).await;
        assert!(oracle.register("a").await.is_some());
        assert!(oracle.register("b").await.is_none());

        let first_b = oracle.evaluate("b", "innovation: 0.9\ntone: 0.9", Layer::Descriptor).await;
        // b starts from the neutral snapshot, unaffected by a
        assert!((first_b.delta.innovation - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_delta_holds_first_line() {
        let oracle = YiJingOracle::new(OracleConfig::default());
        let first = oracle.evaluate("p", "innovation: 0.8", Layer::Behavior).await;
        assert_eq!(first.lines[0], Polarity::Yang);
        let second = oracle.evaluate("p", "innovation: 0.8", Layer::Behavior).await;
        assert_eq!(second.delta.innovation, 0.0);
        assert_eq!(second.lines[0], Polarity::Yang);
        let third = oracle.evaluate("p", "innovation: 0.3", Layer::Behavior).await;
        assert_eq!(third.lines[0], Polarity::Yin);
    }

    #[tokio::test]
    async fn test_reset_and_aggregate() {
        let oracle = YiJingOracle::new(OracleConfig::default());
        oracle.evaluate("p", "tone: 1.0", Layer::Solidify).await;
        oracle.evaluate("q", "tone: 1.0", Layer::Solidify).await;
        assert!(oracle.aggregate().await.third.scalar > 0.0);

        assert!(oracle.reset("p").await);
        assert!(!oracle.reset("p").await);
        assert!(oracle.latest("p").await.is_none());
        assert!(oracle.latest("q").await.is_some());
    }

    #[test]
    fn test_advice_for_lost_innovation() {
        let mut register = StateRegister::default();
        register.first.position = Position::Lost;
        let advice = advise(&register);
        assert!(advice[0].contains("broaden input diversity"));
    }
}
