//! SQLite-backed record store.
//!
//! Each call opens its own connection on the blocking pool. Multi-row
//! mutations run inside `BEGIN IMMEDIATE` transactions so concurrent
//! judgments for the same pet serialize on the write lock.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;
use tracing::debug;

use super::{overflow, PetStore};
use crate::error::{StorageError, StorageResult};
use crate::pet::{
    ActionKind, BehaviorEvent, DescriptorEvolutionRecord, JudgmentRecord, Pet, PetTrait, Rarity,
    StatDelta, TraitKind,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    species TEXT NOT NULL,
    stats TEXT NOT NULL,
    rarity TEXT NOT NULL,
    level INTEGER NOT NULL,
    bond REAL NOT NULL,
    descriptor TEXT NOT NULL,
    last_evolved_at TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS behavior_events (
    id TEXT PRIMARY KEY,
    pet_id TEXT NOT NULL REFERENCES pets(id),
    action TEXT NOT NULL,
    target TEXT NOT NULL,
    context TEXT NOT NULL,
    created_at TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_events_pet ON behavior_events(pet_id, processed, created_at);
CREATE TABLE IF NOT EXISTS judgments (
    id TEXT PRIMARY KEY,
    pet_id TEXT NOT NULL REFERENCES pets(id),
    behavior_count INTEGER NOT NULL,
    accumulated_weight REAL NOT NULL,
    should_evolve INTEGER NOT NULL,
    detail TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_judgments_pet ON judgments(pet_id, created_at);
CREATE TABLE IF NOT EXISTS descriptor_evolutions (
    id TEXT PRIMARY KEY,
    pet_id TEXT NOT NULL REFERENCES pets(id),
    old_descriptor TEXT NOT NULL,
    new_descriptor TEXT NOT NULL,
    content TEXT NOT NULL,
    used_fallback INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS traits (
    id TEXT PRIMARY KEY,
    pet_id TEXT NOT NULL REFERENCES pets(id),
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    description TEXT NOT NULL,
    effects TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_traits_pet ON traits(pet_id, active, created_at);
"#;

/// Fixed-width RFC 3339 so lexical order matches time order.
fn ts(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> StorageResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

struct PetRow {
    id: String,
    name: String,
    species: String,
    stats: String,
    rarity: String,
    level: i64,
    bond: f64,
    descriptor: String,
    last_evolved_at: Option<String>,
    created_at: String,
}

impl PetRow {
    const COLUMNS: &'static str =
        "id, name, species, stats, rarity, level, bond, descriptor, last_evolved_at, created_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            species: row.get(2)?,
            stats: row.get(3)?,
            rarity: row.get(4)?,
            level: row.get(5)?,
            bond: row.get(6)?,
            descriptor: row.get(7)?,
            last_evolved_at: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_pet(self) -> StorageResult<Pet> {
        let rarity: Rarity = self.rarity.parse().map_err(StorageError::Corrupt)?;
        Ok(Pet {
            id: self.id,
            name: self.name,
            species: self.species,
            stats: serde_json::from_str(&self.stats)?,
            rarity,
            level: u32::try_from(self.level).map_err(|e| StorageError::Corrupt(e.to_string()))?,
            bond: self.bond,
            descriptor: self.descriptor,
            last_evolved_at: self.last_evolved_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            traits: Vec::new(),
        })
    }
}

struct EventRow {
    id: String,
    pet_id: String,
    action: String,
    target: String,
    context: String,
    created_at: String,
    processed: bool,
}

impl EventRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pet_id: row.get(1)?,
            action: row.get(2)?,
            target: row.get(3)?,
            context: row.get(4)?,
            created_at: row.get(5)?,
            processed: row.get(6)?,
        })
    }

    fn into_event(self) -> StorageResult<BehaviorEvent> {
        Ok(BehaviorEvent {
            id: self.id,
            pet_id: self.pet_id,
            action: ActionKind::from(self.action),
            target: self.target,
            context: self.context,
            created_at: parse_ts(&self.created_at)?,
            processed: self.processed,
        })
    }
}

struct JudgmentRow {
    id: String,
    pet_id: String,
    behavior_count: i64,
    accumulated_weight: f64,
    should_evolve: bool,
    detail: String,
    created_at: String,
}

impl JudgmentRow {
    const COLUMNS: &'static str =
        "id, pet_id, behavior_count, accumulated_weight, should_evolve, detail, created_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pet_id: row.get(1)?,
            behavior_count: row.get(2)?,
            accumulated_weight: row.get(3)?,
            should_evolve: row.get(4)?,
            detail: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_record(self) -> StorageResult<JudgmentRecord> {
        Ok(JudgmentRecord {
            id: self.id,
            pet_id: self.pet_id,
            behavior_count: usize::try_from(self.behavior_count)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?,
            accumulated_weight: self.accumulated_weight,
            should_evolve: self.should_evolve,
            detail: serde_json::from_str(&self.detail)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

struct TraitRow {
    id: String,
    pet_id: String,
    name: String,
    kind: String,
    description: String,
    effects: String,
    active: bool,
    created_at: String,
}

impl TraitRow {
    const COLUMNS: &'static str = "id, pet_id, name, kind, description, effects, active, created_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pet_id: row.get(1)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            description: row.get(4)?,
            effects: row.get(5)?,
            active: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_trait(self) -> StorageResult<PetTrait> {
        Ok(PetTrait {
            id: self.id,
            pet_id: self.pet_id,
            name: self.name,
            kind: TraitKind::parse(&self.kind),
            description: self.description,
            effects: serde_json::from_str(&self.effects)?,
            active: self.active,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

fn load_traits(conn: &Connection, pet_id: &str, include_inactive: bool) -> StorageResult<Vec<PetTrait>> {
    let sql = format!(
        "SELECT {} FROM traits WHERE pet_id = ?1 AND (active = 1 OR ?2) ORDER BY created_at ASC",
        TraitRow::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![pet_id, include_inactive], TraitRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(TraitRow::into_trait).collect()
}

#[derive(Clone)]
pub struct SqlitePetStore {
    db_path: PathBuf,
}

impl SqlitePetStore {
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let path_clone = path.clone();

        task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, StorageError>(())
        })
        .await??;

        debug!("Opened pet store at {}", path.display());
        Ok(Self { db_path: path })
    }

    fn connect(path: &Path) -> StorageResult<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut conn = Self::connect(&path)?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl PetStore for SqlitePetStore {
    async fn insert_pet(&self, pet: &Pet) -> StorageResult<()> {
        let pet = pet.clone();
        self.run(move |conn| {
            let stats = serde_json::to_string(&pet.stats)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO pets (id, name, species, stats, rarity, level, bond, descriptor, last_evolved_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    &pet.id,
                    &pet.name,
                    &pet.species,
                    &stats,
                    pet.rarity.as_str(),
                    pet.level as i64,
                    pet.bond,
                    &pet.descriptor,
                    pet.last_evolved_at.as_ref().map(ts),
                    ts(&pet.created_at),
                ],
            )?;
            if inserted == 0 {
                return Err(StorageError::Conflict(format!("pet '{}' already exists", pet.id)));
            }
            Ok(())
        })
        .await
    }

    async fn get_pet(&self, pet_id: &str) -> StorageResult<Option<Pet>> {
        let id = pet_id.to_string();
        self.run(move |conn| {
            let sql = format!("SELECT {} FROM pets WHERE id = ?1", PetRow::COLUMNS);
            let row = conn.query_row(&sql, params![&id], PetRow::read).optional()?;
            match row {
                Some(row) => {
                    let mut pet = row.into_pet()?;
                    pet.traits = load_traits(conn, &id, false)?;
                    Ok(Some(pet))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_pets(&self) -> StorageResult<Vec<Pet>> {
        self.run(|conn| {
            let sql = format!("SELECT {} FROM pets ORDER BY created_at ASC", PetRow::COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], PetRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(PetRow::into_pet).collect()
        })
        .await
    }

    async fn insert_event(&self, event: &BehaviorEvent) -> StorageResult<()> {
        let event = event.clone();
        self.run(move |conn| {
            let exists: Option<String> = conn
                .query_row("SELECT id FROM pets WHERE id = ?1", params![&event.pet_id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(StorageError::pet_not_found(&event.pet_id));
            }
            conn.execute(
                "INSERT INTO behavior_events (id, pet_id, action, target, context, created_at, processed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &event.id,
                    &event.pet_id,
                    event.action.as_str(),
                    &event.target,
                    &event.context,
                    ts(&event.created_at),
                    event.processed,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn unprocessed_events(&self, pet_id: &str) -> StorageResult<Vec<BehaviorEvent>> {
        let id = pet_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, pet_id, action, target, context, created_at, processed
                 FROM behavior_events
                 WHERE pet_id = ?1 AND processed = 0
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map(params![&id], EventRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(EventRow::into_event).collect()
        })
        .await
    }

    async fn purge_processed_events(&self, pet_id: &str, before: DateTime<Utc>) -> StorageResult<usize> {
        let id = pet_id.to_string();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM behavior_events WHERE pet_id = ?1 AND processed = 1 AND created_at < ?2",
                params![&id, ts(&before)],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn trim_events(&self, pet_id: &str, max_events: usize) -> StorageResult<usize> {
        let id = pet_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let total: i64 = tx.query_row(
                "SELECT COUNT(*) FROM behavior_events WHERE pet_id = ?1",
                params![&id],
                |row| row.get(0),
            )?;
            let excess = (total.max(0) as usize).saturating_sub(max_events);
            if excess == 0 {
                return Ok(0);
            }
            let removed = tx.execute(
                "DELETE FROM behavior_events WHERE id IN (
                     SELECT id FROM behavior_events WHERE pet_id = ?1
                     ORDER BY processed DESC, created_at ASC LIMIT ?2)",
                params![&id, excess as i64],
            )?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn latest_judgment(&self, pet_id: &str) -> StorageResult<Option<JudgmentRecord>> {
        let id = pet_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM judgments WHERE pet_id = ?1 ORDER BY created_at DESC LIMIT 1",
                JudgmentRow::COLUMNS
            );
            conn.query_row(&sql, params![&id], JudgmentRow::read)
                .optional()?
                .map(JudgmentRow::into_record)
                .transpose()
        })
        .await
    }

    async fn judgments(&self, pet_id: &str) -> StorageResult<Vec<JudgmentRecord>> {
        let id = pet_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM judgments WHERE pet_id = ?1 ORDER BY created_at ASC",
                JudgmentRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![&id], JudgmentRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(JudgmentRow::into_record).collect()
        })
        .await
    }

    async fn complete_judgment(&self, record: &JudgmentRecord, event_ids: &[String]) -> StorageResult<()> {
        let record = record.clone();
        let event_ids = event_ids.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            for id in &event_ids {
                let flipped = tx.execute(
                    "UPDATE behavior_events SET processed = 1 WHERE id = ?1 AND pet_id = ?2 AND processed = 0",
                    params![id, &record.pet_id],
                )?;
                if flipped == 0 {
                    // Dropping the transaction rolls back the flags already flipped.
                    return Err(StorageError::Conflict(format!("event '{}' already judged", id)));
                }
            }

            tx.execute(
                "INSERT INTO judgments (id, pet_id, behavior_count, accumulated_weight, should_evolve, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &record.id,
                    &record.pet_id,
                    record.behavior_count as i64,
                    record.accumulated_weight,
                    record.should_evolve,
                    serde_json::to_string(&record.detail)?,
                    ts(&record.created_at),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn apply_descriptor_evolution(&self, record: &DescriptorEvolutionRecord) -> StorageResult<()> {
        let record = record.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let updated = tx.execute(
                "UPDATE pets SET descriptor = ?1, last_evolved_at = ?2 WHERE id = ?3",
                params![&record.new_descriptor, ts(&record.created_at), &record.pet_id],
            )?;
            if updated == 0 {
                return Err(StorageError::pet_not_found(&record.pet_id));
            }
            tx.execute(
                "INSERT INTO descriptor_evolutions (id, pet_id, old_descriptor, new_descriptor, content, used_fallback, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &record.id,
                    &record.pet_id,
                    &record.old_descriptor,
                    &record.new_descriptor,
                    &record.content,
                    record.used_fallback,
                    ts(&record.created_at),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn descriptor_history(&self, pet_id: &str) -> StorageResult<Vec<DescriptorEvolutionRecord>> {
        let id = pet_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, pet_id, old_descriptor, new_descriptor, content, used_fallback, created_at
                 FROM descriptor_evolutions WHERE pet_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map(params![&id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(id, pet_id, old_descriptor, new_descriptor, content, used_fallback, created_at)| {
                    Ok(DescriptorEvolutionRecord {
                        id,
                        pet_id,
                        old_descriptor,
                        new_descriptor,
                        content,
                        used_fallback,
                        created_at: parse_ts(&created_at)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn traits(&self, pet_id: &str, include_inactive: bool) -> StorageResult<Vec<PetTrait>> {
        let id = pet_id.to_string();
        self.run(move |conn| load_traits(conn, &id, include_inactive)).await
    }

    async fn solidify_traits(
        &self,
        pet_id: &str,
        traits: &[PetTrait],
        delta: &StatDelta,
        max_active: usize,
    ) -> StorageResult<usize> {
        let id = pet_id.to_string();
        let traits = traits.to_vec();
        let delta = delta.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let stats_raw: Option<String> = tx
                .query_row("SELECT stats FROM pets WHERE id = ?1", params![&id], |row| row.get(0))
                .optional()?;
            let Some(stats_raw) = stats_raw else {
                return Err(StorageError::pet_not_found(&id));
            };

            let active: i64 = tx.query_row(
                "SELECT COUNT(*) FROM traits WHERE pet_id = ?1 AND active = 1",
                params![&id],
                |row| row.get(0),
            )?;
            let retire = overflow(active as usize, traits.len(), max_active);
            if retire > 0 {
                tx.execute(
                    "UPDATE traits SET active = 0 WHERE id IN (
                         SELECT id FROM traits WHERE pet_id = ?1 AND active = 1
                         ORDER BY created_at ASC LIMIT ?2
                     )",
                    params![&id, retire as i64],
                )?;
            }

            for t in &traits {
                tx.execute(
                    "INSERT INTO traits (id, pet_id, name, kind, description, effects, active, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        &t.id,
                        &id,
                        &t.name,
                        t.kind.as_str(),
                        &t.description,
                        serde_json::to_string(&t.effects)?,
                        t.active,
                        ts(&t.created_at),
                    ],
                )?;
            }

            let mut stats: crate::pet::Stats = serde_json::from_str(&stats_raw)?;
            stats.apply(&delta);
            tx.execute(
                "UPDATE pets SET stats = ?1 WHERE id = ?2",
                params![serde_json::to_string(&stats)?, &id],
            )?;

            tx.commit()?;
            Ok(retire)
        })
        .await
    }
}
