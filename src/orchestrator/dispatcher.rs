//! Judgment Dispatcher
//!
//! One bounded channel and one worker per pet. A trigger that arrives while
//! another is already queued is coalesced into it; the worker drains the
//! whole backlog on every judgment anyway. Workers are spawned on first
//! use and exit after sitting idle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::judgment::{JudgmentEngine, JudgmentOutcome};
use crate::pet::PetId;

type WorkerMap = Arc<Mutex<HashMap<PetId, mpsc::Sender<()>>>>;

pub struct JudgmentDispatcher {
    engine: Arc<JudgmentEngine>,
    idle: Duration,
    workers: WorkerMap,
}

impl JudgmentDispatcher {
    pub fn new(engine: Arc<JudgmentEngine>, idle: Duration) -> Self {
        Self {
            engine,
            idle,
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Requests a judgment for `pet_id` without waiting for it.
    pub async fn schedule(&self, pet_id: &str) {
        let mut workers = self.workers.lock().await;

        if let Some(tx) = workers.get(pet_id) {
            match tx.try_send(()) {
                Ok(()) => return,
                Err(TrySendError::Full(())) => {
                    debug!("Judgment already queued for {}, coalescing", pet_id);
                    return;
                }
                Err(TrySendError::Closed(())) => {
                    workers.remove(pet_id);
                }
            }
        }

        let (tx, rx) = mpsc::channel(1);
        // fresh channel with capacity 1 always has room
        let _ = tx.try_send(());
        workers.insert(pet_id.to_string(), tx);

        let worker = Worker {
            pet_id: pet_id.to_string(),
            rx,
            engine: self.engine.clone(),
            workers: self.workers.clone(),
            idle: self.idle,
        };
        tokio::spawn(worker.run());
    }

    /// Number of live per-pet workers.
    pub async fn active_workers(&self) -> usize {
        self.workers.lock().await.len()
    }
}

struct Worker {
    pet_id: PetId,
    rx: mpsc::Receiver<()>,
    engine: Arc<JudgmentEngine>,
    workers: WorkerMap,
    idle: Duration,
}

impl Worker {
    async fn run(mut self) {
        debug!("Judgment worker started for {}", self.pet_id);
        loop {
            match tokio::time::timeout(self.idle, self.rx.recv()).await {
                Ok(Some(())) => self.judge().await,
                Ok(None) => break,
                Err(_) => {
                    // Deregister under the map lock so a concurrent schedule
                    // either reaches this channel first or spawns a new worker.
                    let mut workers = self.workers.lock().await;
                    match self.rx.try_recv() {
                        Ok(()) => {
                            drop(workers);
                            self.judge().await;
                        }
                        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                            workers.remove(&self.pet_id);
                            break;
                        }
                    }
                }
            }
        }
        debug!("Judgment worker for {} exited", self.pet_id);
    }

    async fn judge(&self) {
        match self.engine.judge(&self.pet_id).await {
            Ok(JudgmentOutcome::Judged { record, evolution }) => debug!(
                "Scheduled judgment for {} done (evolve={}, evolved={})",
                self.pet_id,
                record.should_evolve,
                evolution.is_some()
            ),
            Ok(outcome) => debug!("Scheduled judgment for {} skipped: {:?}", self.pet_id, outcome),
            Err(e) => error!("Scheduled judgment for {} failed: {}", self.pet_id, e),
        }
    }
}
