use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type PetId = String;

/// Power tier of a pet, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rarity {
    N,
    R,
    SR,
    SSR,
    SSS,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [Rarity::N, Rarity::R, Rarity::SR, Rarity::SSR, Rarity::SSS];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::N => "N",
            Rarity::R => "R",
            Rarity::SR => "SR",
            Rarity::SSR => "SSR",
            Rarity::SSS => "SSS",
        }
    }

    /// The next tier up, saturating at SSS.
    pub fn promoted(&self) -> Rarity {
        match self {
            Rarity::N => Rarity::R,
            Rarity::R => Rarity::SR,
            Rarity::SR => Rarity::SSR,
            Rarity::SSR | Rarity::SSS => Rarity::SSS,
        }
    }
}

impl std::fmt::Display for Rarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Rarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "N" => Ok(Rarity::N),
            "R" => Ok(Rarity::R),
            "SR" => Ok(Rarity::SR),
            "SSR" => Ok(Rarity::SSR),
            "SSS" => Ok(Rarity::SSS),
            other => Err(format!("unknown rarity '{}'", other)),
        }
    }
}

/// Stat names a trait may modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Health,
    Attack,
    Defense,
    Speed,
    Magic,
}

impl StatKind {
    pub const ALL: [StatKind; 5] = [
        StatKind::Health,
        StatKind::Attack,
        StatKind::Defense,
        StatKind::Speed,
        StatKind::Magic,
    ];

    /// Parses loose stat labels coming back from a text generator.
    pub fn parse(label: &str) -> Option<StatKind> {
        match label.trim().to_lowercase().as_str() {
            "health" | "hp" | "vitality" | "生命" => Some(StatKind::Health),
            "attack" | "atk" | "power" | "strength" | "攻击" => Some(StatKind::Attack),
            "defense" | "defence" | "def" | "armor" | "防御" => Some(StatKind::Defense),
            "speed" | "spd" | "agility" | "速度" => Some(StatKind::Speed),
            "magic" | "mag" | "mp" | "mana" | "魔法" => Some(StatKind::Magic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Health => "health",
            StatKind::Attack => "attack",
            StatKind::Defense => "defense",
            StatKind::Speed => "speed",
            StatKind::Magic => "magic",
        }
    }
}

/// Additive change per stat.
pub type StatDelta = BTreeMap<StatKind, i64>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub health: i64,
    pub attack: i64,
    pub defense: i64,
    pub speed: i64,
    pub magic: i64,
}

impl Stats {
    pub fn new(health: i64, attack: i64, defense: i64, speed: i64, magic: i64) -> Self {
        Self { health, attack, defense, speed, magic }
    }

    pub fn get(&self, kind: StatKind) -> i64 {
        match kind {
            StatKind::Health => self.health,
            StatKind::Attack => self.attack,
            StatKind::Defense => self.defense,
            StatKind::Speed => self.speed,
            StatKind::Magic => self.magic,
        }
    }

    fn slot(&mut self, kind: StatKind) -> &mut i64 {
        match kind {
            StatKind::Health => &mut self.health,
            StatKind::Attack => &mut self.attack,
            StatKind::Defense => &mut self.defense,
            StatKind::Speed => &mut self.speed,
            StatKind::Magic => &mut self.magic,
        }
    }

    /// Applies a delta additively. Stats never drop below zero.
    pub fn apply(&mut self, delta: &StatDelta) {
        for (kind, change) in delta {
            let slot = self.slot(*kind);
            *slot = slot.saturating_add(*change).max(0);
        }
    }
}

impl Default for Rarity {
    fn default() -> Self {
        Rarity::N
    }
}

/// How a trait fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitKind {
    Passive,
    Active,
    Trigger,
}

impl TraitKind {
    pub fn parse(label: &str) -> TraitKind {
        match label.trim().to_lowercase().as_str() {
            "active" | "skill" | "主动" => TraitKind::Active,
            "trigger" | "triggered" | "reactive" | "触发" => TraitKind::Trigger,
            _ => TraitKind::Passive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TraitKind::Passive => "passive",
            TraitKind::Active => "active",
            TraitKind::Trigger => "trigger",
        }
    }
}

/// A solidified numeric modifier. Deactivated under cap pressure, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetTrait {
    pub id: String,
    pub pet_id: PetId,
    pub name: String,
    pub kind: TraitKind,
    pub description: String,
    pub effects: StatDelta,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl PetTrait {
    pub fn new(pet_id: &str, name: impl Into<String>, kind: TraitKind, description: impl Into<String>, effects: StatDelta) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pet_id: pet_id.to_string(),
            name: name.into(),
            kind,
            description: description.into(),
            effects,
            active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: PetId,
    pub name: String,
    pub species: String,
    pub stats: Stats,
    pub rarity: Rarity,
    pub level: u32,
    pub bond: f64,
    /// Bounded narrative; first line is the original description.
    pub descriptor: String,
    /// Time of the last authorized evolution, used by the cooldown clause.
    pub last_evolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Active traits, attached by the store on load.
    #[serde(default)]
    pub traits: Vec<PetTrait>,
}

impl Pet {
    pub fn new(name: impl Into<String>, species: impl Into<String>, rarity: Rarity) -> Self {
        let name = name.into();
        let species = species.into();
        Self {
            id: Uuid::new_v4().to_string(),
            descriptor: format!("{} is a young {}.", name, species),
            name,
            species,
            stats: Stats::new(100, 10, 10, 10, 10),
            rarity,
            level: 1,
            bond: 0.0,
            last_evolved_at: None,
            created_at: Utc::now(),
            traits: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_bond(mut self, bond: f64) -> Self {
        self.bond = bond;
        self
    }

    pub fn active_trait_names(&self) -> Vec<String> {
        self.traits
            .iter()
            .filter(|t| t.active)
            .map(|t| t.name.clone())
            .collect()
    }
}
