//! Oracle Module
//!
//! Turns any generated text into quality metrics, a three-line reading and
//! a persistent per-pet state register.

mod engine;
mod hexagram;
mod metrics;
mod register;

pub use engine::{Feedback, Layer, YiJingOracle};
pub use hexagram::{Hexagram, LinePattern, Polarity};
pub use metrics::{Metric, MetricVector, MetricsDelta, MetricsExtractor, MetricsSnapshot, NEUTRAL};
pub use register::{Dimension, DimensionState, Movement, Position, StateRegister};
