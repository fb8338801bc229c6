use serde::{Deserialize, Serialize};

/// Two-valued line. `Yang` is the "A" polarity, `Yin` the "B" polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Yang,
    Yin,
}

impl Polarity {
    pub fn from_bool(is_yang: bool) -> Self {
        if is_yang {
            Polarity::Yang
        } else {
            Polarity::Yin
        }
    }
}

/// Three lines, bottom first.
pub type LinePattern = [Polarity; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hexagram {
    pub id: &'static str,
    pub name: &'static str,
    pub symbol: &'static str,
    pub image: &'static str,
    pub interpretation: &'static str,
}

impl Hexagram {
    /// Label used when no pattern-derived hexagram is available.
    pub const CUSTOM: Hexagram = Hexagram {
        id: "custom",
        name: "Custom State",
        symbol: "○",
        image: "unformed",
        interpretation: "The state has no settled reading yet.",
    };

    /// Fixed reading for each of the eight patterns.
    pub fn from_lines(lines: LinePattern) -> Hexagram {
        use Polarity::{Yang, Yin};
        match lines {
            [Yang, Yang, Yang] => Hexagram {
                id: "qian",
                name: "Qian",
                symbol: "☰",
                image: "heaven",
                interpretation: "Creative force. Novelty rises on varied, warm expression; press into new ground.",
            },
            [Yang, Yang, Yin] => Hexagram {
                id: "dui",
                name: "Dui",
                symbol: "☱",
                image: "lake",
                interpretation: "Open exchange. Fresh and varied expression with a cool tone; let warmth follow the novelty.",
            },
            [Yang, Yin, Yang] => Hexagram {
                id: "li",
                name: "Li",
                symbol: "☲",
                image: "fire",
                interpretation: "Clinging brightness. New and warm, yet patterns repeat; change the form, not the spirit.",
            },
            [Yang, Yin, Yin] => Hexagram {
                id: "zhen",
                name: "Zhen",
                symbol: "☳",
                image: "thunder",
                interpretation: "Arousing shock. A new impulse breaks through repetition and a flat tone.",
            },
            [Yin, Yang, Yang] => Hexagram {
                id: "xun",
                name: "Xun",
                symbol: "☴",
                image: "wind",
                interpretation: "Gentle penetration. Varied and warm without new impulses; advance by small steps.",
            },
            [Yin, Yang, Yin] => Hexagram {
                id: "kan",
                name: "Kan",
                symbol: "☵",
                image: "water",
                interpretation: "The abyss. Variety without novelty or warmth; seek a new current.",
            },
            [Yin, Yin, Yang] => Hexagram {
                id: "gen",
                name: "Gen",
                symbol: "☶",
                image: "mountain",
                interpretation: "Keeping still. Warmth remains while ideas stall in repetition; pause before pushing on.",
            },
            [Yin, Yin, Yin] => Hexagram {
                id: "kun",
                name: "Kun",
                symbol: "☷",
                image: "earth",
                interpretation: "Receptive ground. Every line is low; rest and gather strength.",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_patterns_distinct() {
        let polarities = [Polarity::Yang, Polarity::Yin];
        let mut ids = HashSet::new();
        for a in polarities {
            for b in polarities {
                for c in polarities {
                    ids.insert(Hexagram::from_lines([a, b, c]).id);
                }
            }
        }
        assert_eq!(ids.len(), 8);
        assert!(!ids.contains(Hexagram::CUSTOM.id));
    }

    #[test]
    fn test_lake_pattern() {
        let h = Hexagram::from_lines([Polarity::Yang, Polarity::Yang, Polarity::Yin]);
        assert_eq!(h.id, "dui");
        assert_eq!(h.symbol, "☱");
    }
}
