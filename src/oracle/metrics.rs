//! Metrics Extractor
//!
//! Reads labelled metric markers ("innovation: 0.7", "创新: 70%") from any
//! text and infers the missing ones from surface statistics. The numbers
//! are heuristic; only their derivation is fixed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const NEUTRAL: f64 = 0.5;

const POSITIVE_MARKERS: &[&str] = &[
    "happy", "joy", "joyful", "love", "loves", "great", "good", "calm", "warm", "bright", "brave",
    "playful", "proud", "gentle", "glad", "excited", "cheerful", "kind", "friendly", "fun",
    "开心", "快乐", "喜欢", "温暖", "勇敢", "愉快",
];

const NEGATIVE_MARKERS: &[&str] = &[
    "sad", "angry", "hurt", "tired", "afraid", "scared", "bad", "lonely", "cold", "hungry",
    "sick", "weak", "lost", "bored", "upset", "fear", "pain", "grumpy",
    "难过", "生气", "害怕", "孤独", "疲惫", "伤心",
];

lazy_static::lazy_static! {
    static ref MARKER_RE: Regex = Regex::new(
        r"(?im)^[\s\-\*#>]*(innovation|repetition|tone|structure|creativity|coherence|创新度?|重复度?|语气|情感|结构|创造力?|连贯性?)\s*[:：=]\s*(-?\d+(?:\.\d+)?)\s*(%)?"
    ).expect("metric marker pattern is valid");
    static ref WORD_RE: Regex = Regex::new(r"\w+").expect("word pattern is valid");
    static ref SENTENCE_SPLIT_RE: Regex = Regex::new(r"[.!?。！？\n]+").expect("sentence pattern is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Innovation,
    Repetition,
    Tone,
    Structure,
    Creativity,
    Coherence,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Innovation,
        Metric::Repetition,
        Metric::Tone,
        Metric::Structure,
        Metric::Creativity,
        Metric::Coherence,
    ];

    fn from_label(label: &str) -> Option<Metric> {
        match label.to_lowercase().as_str() {
            "innovation" | "创新" | "创新度" => Some(Metric::Innovation),
            "repetition" | "重复" | "重复度" => Some(Metric::Repetition),
            "tone" | "语气" | "情感" => Some(Metric::Tone),
            "structure" | "结构" => Some(Metric::Structure),
            "creativity" | "创造" | "创造力" => Some(Metric::Creativity),
            "coherence" | "连贯" | "连贯性" => Some(Metric::Coherence),
            _ => None,
        }
    }
}

/// One value per metric. Used both for snapshots (in [0,1]) and for deltas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricVector {
    pub innovation: f64,
    pub repetition: f64,
    pub tone: f64,
    pub structure: f64,
    pub creativity: f64,
    pub coherence: f64,
}

pub type MetricsSnapshot = MetricVector;
pub type MetricsDelta = MetricVector;

impl MetricVector {
    pub fn splat(value: f64) -> Self {
        Self {
            innovation: value,
            repetition: value,
            tone: value,
            structure: value,
            creativity: value,
            coherence: value,
        }
    }

    pub fn neutral() -> Self {
        Self::splat(NEUTRAL)
    }

    pub fn zero() -> Self {
        Self::splat(0.0)
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Innovation => self.innovation,
            Metric::Repetition => self.repetition,
            Metric::Tone => self.tone,
            Metric::Structure => self.structure,
            Metric::Creativity => self.creativity,
            Metric::Coherence => self.coherence,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::Innovation => &mut self.innovation,
            Metric::Repetition => &mut self.repetition,
            Metric::Tone => &mut self.tone,
            Metric::Structure => &mut self.structure,
            Metric::Creativity => &mut self.creativity,
            Metric::Coherence => &mut self.coherence,
        };
        *slot = value;
    }

    /// `self - previous`, metric by metric.
    pub fn delta_from(&self, previous: &MetricVector) -> MetricVector {
        let mut delta = MetricVector::zero();
        for metric in Metric::ALL {
            delta.set(metric, self.get(metric) - previous.get(metric));
        }
        delta
    }

    pub fn is_finite(&self) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m).is_finite())
    }
}

impl Default for MetricVector {
    fn default() -> Self {
        Self::neutral()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsExtractor;

impl MetricsExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Never fails. Empty input yields the neutral vector.
    pub fn extract(&self, text: &str) -> MetricsSnapshot {
        let mut snapshot = MetricVector::neutral();
        let mut found: HashSet<Metric> = HashSet::new();

        for cap in MARKER_RE.captures_iter(text) {
            let Some(metric) = Metric::from_label(&cap[1]) else { continue };
            let Ok(mut value) = cap[2].parse::<f64>() else { continue };
            if cap.get(3).is_some() || (value > 1.0 && value <= 100.0) {
                value /= 100.0;
            }
            if found.insert(metric) {
                snapshot.set(metric, value.clamp(0.0, 1.0));
            }
        }

        if !found.contains(&Metric::Innovation) {
            snapshot.innovation = lexical_diversity(text);
        }
        if !found.contains(&Metric::Repetition) {
            snapshot.repetition = duplicate_sentence_ratio(text);
        }
        if !found.contains(&Metric::Tone) {
            snapshot.tone = tone(text);
        }

        for metric in Metric::ALL {
            let v = snapshot.get(metric);
            snapshot.set(metric, if v.is_finite() { v.clamp(0.0, 1.0) } else { NEUTRAL });
        }
        snapshot
    }
}

fn words(text: &str) -> Vec<String> {
    WORD_RE.find_iter(text).map(|m| m.as_str().to_lowercase()).collect()
}

/// Distinct-word ratio.
fn lexical_diversity(text: &str) -> f64 {
    let words = words(text);
    if words.is_empty() {
        return NEUTRAL;
    }
    let distinct: HashSet<&String> = words.iter().collect();
    distinct.len() as f64 / words.len() as f64
}

/// Share of sentences that repeat an earlier one.
fn duplicate_sentence_ratio(text: &str) -> f64 {
    let sentences: Vec<String> = SENTENCE_SPLIT_RE
        .split(text)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return NEUTRAL;
    }
    let distinct: HashSet<&String> = sentences.iter().collect();
    (sentences.len() - distinct.len()) as f64 / sentences.len() as f64
}

fn tone(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let words = words(&lower);
    let count = |markers: &[&str]| -> usize {
        markers
            .iter()
            .map(|m| {
                if m.is_ascii() {
                    words.iter().filter(|w| w.as_str() == *m).count()
                } else {
                    lower.matches(m).count()
                }
            })
            .sum()
    };

    let positive = count(POSITIVE_MARKERS);
    let negative = count(NEGATIVE_MARKERS);
    if positive > negative {
        0.8
    } else if negative > positive {
        0.2
    } else {
        NEUTRAL
    }
}
