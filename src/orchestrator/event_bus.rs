//! Internal Event Bus for Pipeline Notifications
//!
//! Broadcast pub/sub carrying what each stage did, for logging sinks and
//! any front end that wants to observe evolutions as they happen.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PetEvent {
    /// An action was appended to a pet's behavior log
    BehaviorRecorded { pet_id: String, event_id: String, action: String },
    /// A judgment cycle wrote its record
    JudgmentCompleted { pet_id: String, accumulated_weight: f64, should_evolve: bool },
    /// The descriptor gained a new line
    DescriptorEvolved { pet_id: String, used_fallback: bool },
    /// New traits were solidified
    TraitsSolidified { pet_id: String, added: usize, deactivated: usize },
    /// The oracle produced a reading
    OracleFeedback { pet_id: String, layer: String, hexagram: String },
}

pub struct EventBus {
    tx: broadcast::Sender<PetEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: PetEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PetEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    /// Global singleton instance of the EventBus
    pub static ref PET_EVENT_BUS: Arc<EventBus> = Arc::new(EventBus::new());
}

/// Helper macro to publish events globally
#[macro_export]
macro_rules! emit_event {
    ($event:expr) => {
        $crate::orchestrator::event_bus::PET_EVENT_BUS.publish($event);
    };
}
