//! Behavior Log (L1)

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::dispatcher::JudgmentDispatcher;
use crate::emit_event;
use crate::error::StorageResult;
use crate::oracle::{Layer, YiJingOracle};
use crate::orchestrator::event_bus::PetEvent;
use crate::pet::{ActionKind, BehaviorEvent};
use crate::store::PetStore;

/// Append-only action log, bounded per pet by age and count. Each append
/// cleans up the pet's old events and schedules a judgment.
pub struct BehaviorLog {
    store: Arc<dyn PetStore>,
    oracle: Arc<YiJingOracle>,
    dispatcher: Option<Arc<JudgmentDispatcher>>,
    retention: Duration,
    max_events: usize,
}

impl BehaviorLog {
    pub fn new(store: Arc<dyn PetStore>, oracle: Arc<YiJingOracle>, retention: Duration) -> Self {
        Self { store, oracle, dispatcher: None, retention, max_events: usize::MAX }
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<JudgmentDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Appends an event and returns its id. Unknown action tags are accepted.
    ///
    /// Only the insert can fail the call. Once the event is stored, cleanup
    /// errors are logged and the judgment is still scheduled.
    pub async fn record(&self, pet_id: &str, action: &str, target: &str, context: &str) -> StorageResult<String> {
        let event = BehaviorEvent::new(pet_id, ActionKind::from(action), target, context);
        self.store.insert_event(&event).await?;
        self.clean_up(pet_id).await;

        if !context.trim().is_empty() {
            self.oracle.evaluate(pet_id, context, Layer::Behavior).await;
        }

        debug!("Recorded {} for {} ({})", event.action, pet_id, event.id);
        emit_event!(PetEvent::BehaviorRecorded {
            pet_id: pet_id.to_string(),
            event_id: event.id.clone(),
            action: event.action.to_string(),
        });

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.schedule(pet_id).await;
        }
        Ok(event.id)
    }

    async fn clean_up(&self, pet_id: &str) {
        match self
            .store
            .purge_processed_events(pet_id, Utc::now() - self.retention)
            .await
        {
            Ok(0) => {}
            Ok(purged) => debug!("Purged {} processed events for {}", purged, pet_id),
            Err(e) => warn!("Retention purge failed for {}: {}", pet_id, e),
        }

        if self.max_events == usize::MAX {
            return;
        }
        match self.store.trim_events(pet_id, self.max_events).await {
            Ok(0) => {}
            Ok(trimmed) => warn!(
                "Behavior log for {} over {} events, dropped {} oldest",
                pet_id, self.max_events, trimmed
            ),
            Err(e) => warn!("Event trim failed for {}: {}", pet_id, e),
        }
    }

    /// Purges processed events past retention for every pet.
    pub async fn sweep(&self) -> StorageResult<usize> {
        let cutoff = Utc::now() - self.retention;
        let mut total = 0;
        for pet in self.store.list_pets().await? {
            total += self.store.purge_processed_events(&pet.id, cutoff).await?;
        }
        if total > 0 {
            info!("Retention sweep removed {} processed events", total);
        }
        Ok(total)
    }
}
