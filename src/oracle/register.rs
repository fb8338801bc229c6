//! Three-dimension state register.
//!
//! Each dimension keeps a smoothed scalar in [-1, 1] plus categorical
//! position and movement. Categories change only when the value crosses an
//! enter threshold and return only after falling back past the exit
//! threshold (`enter - band`), so a value hovering at a boundary does not
//! flip the category on every evaluation.

use serde::{Deserialize, Serialize};

use super::hexagram::Polarity;
use crate::config::OracleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// First dimension, driven by innovation.
    Innovation,
    /// Second dimension, driven by (inverse) repetition.
    Clarity,
    /// Third dimension, driven by tone.
    Harmony,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Innovation, Dimension::Clarity, Dimension::Harmony];

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Innovation => "innovation",
            Dimension::Clarity => "clarity",
            Dimension::Harmony => "harmony",
        }
    }

    /// Dimension-specific vocabulary for the three positions.
    pub fn position_label(&self, position: Position) -> &'static str {
        match (self, position) {
            (Dimension::Innovation, Position::Lost) => "lost",
            (Dimension::Innovation, Position::Neutral) => "neutral",
            (Dimension::Innovation, Position::Gained) => "gained",
            (Dimension::Clarity, Position::Lost) => "scattered",
            (Dimension::Clarity, Position::Neutral) => "balanced",
            (Dimension::Clarity, Position::Gained) => "focused",
            (Dimension::Harmony, Position::Lost) => "discordant",
            (Dimension::Harmony, Position::Neutral) => "calm",
            (Dimension::Harmony, Position::Gained) => "harmonious",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Lost,
    Neutral,
    Gained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionState {
    pub scalar: f64,
    pub position: Position,
    pub movement: Movement,
    pub polarity: Polarity,
}

impl Default for DimensionState {
    fn default() -> Self {
        Self {
            scalar: 0.0,
            position: Position::Neutral,
            movement: Movement::Static,
            polarity: Polarity::Yin,
        }
    }
}

impl DimensionState {
    /// Folds one observation into the dimension.
    ///
    /// `signal` is the driving metric mapped to [-1, 1]; `change` is the
    /// magnitude of that metric's delta.
    fn observe(&mut self, signal: f64, change: f64, polarity: Polarity, config: &OracleConfig) {
        let alpha = config.smoothing.clamp(0.0, 1.0);
        self.scalar = ((1.0 - alpha) * self.scalar + alpha * signal).clamp(-1.0, 1.0);
        self.position = next_position(self.position, self.scalar, config);
        self.movement = next_movement(self.movement, change.abs(), config);
        self.polarity = polarity;
    }
}

fn next_position(current: Position, scalar: f64, config: &OracleConfig) -> Position {
    let enter = config.position_enter;
    let exit = (enter - config.position_band).max(0.0);
    let fresh = if scalar > enter {
        Position::Gained
    } else if scalar < -enter {
        Position::Lost
    } else {
        Position::Neutral
    };

    match current {
        Position::Gained if scalar >= exit => Position::Gained,
        Position::Lost if scalar <= -exit => Position::Lost,
        _ => fresh,
    }
}

fn next_movement(current: Movement, change: f64, config: &OracleConfig) -> Movement {
    let enter = config.movement_enter;
    let exit = (enter - config.movement_band).max(0.0);
    match current {
        Movement::Dynamic if change >= exit => Movement::Dynamic,
        _ if change >= enter => Movement::Dynamic,
        _ => Movement::Static,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRegister {
    pub first: DimensionState,
    pub second: DimensionState,
    pub third: DimensionState,
}

impl StateRegister {
    pub fn get(&self, dimension: Dimension) -> &DimensionState {
        match dimension {
            Dimension::Innovation => &self.first,
            Dimension::Clarity => &self.second,
            Dimension::Harmony => &self.third,
        }
    }

    fn get_mut(&mut self, dimension: Dimension) -> &mut DimensionState {
        match dimension {
            Dimension::Innovation => &mut self.first,
            Dimension::Clarity => &mut self.second,
            Dimension::Harmony => &mut self.third,
        }
    }

    /// Updates all three dimensions in place. Arrays are ordered first, second, third.
    pub fn observe(&mut self, signals: [f64; 3], changes: [f64; 3], lines: [Polarity; 3], config: &OracleConfig) {
        for (idx, dimension) in Dimension::ALL.iter().enumerate() {
            self.get_mut(*dimension).observe(signals[idx], changes[idx], lines[idx], config);
        }
    }

    pub fn describe(&self) -> String {
        Dimension::ALL
            .iter()
            .map(|d| {
                let state = self.get(*d);
                format!(
                    "{}={} ({:+.2}, {:?})",
                    d.name(),
                    d.position_label(state.position),
                    state.scalar,
                    state.movement
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
