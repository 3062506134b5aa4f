//! Shared admission service: the capacity ledger and the queue behind one lock

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use swarm_core::{BenchmarkRequest, RunId};

use crate::bridge::BridgeEvent;
use crate::ledger::CapacityLedger;
use crate::queue::{AdmissionQueue, QueueEntry};

#[derive(Debug)]
struct AdmissionState {
    ledger: CapacityLedger,
    queue: AdmissionQueue,
    /// Slots currently reserved by each admitted run
    held: HashMap<RunId, usize>,
}

/// Ledger and queue guarded by a single mutex, so an admission check and
/// the reservation it makes are one atomic step.
///
/// The lock is never held across an await point.
#[derive(Debug)]
pub struct AdmissionControl {
    state: Mutex<AdmissionState>,
}

impl AdmissionControl {
    pub fn new(max_slots: usize) -> Self {
        Self {
            state: Mutex::new(AdmissionState {
                ledger: CapacityLedger::new(max_slots),
                queue: AdmissionQueue::new(),
                held: HashMap::new(),
            }),
        }
    }

    pub fn max_slots(&self) -> usize {
        self.state.lock().ledger.max_slots()
    }

    /// Append a request to the queue, returning its position
    pub fn enqueue(&self, request: BenchmarkRequest) -> u64 {
        let mut state = self.state.lock();
        let position = state.queue.push(request);
        debug!(position, queued = state.queue.len(), "Request enqueued");
        position
    }

    /// Admit the queue head if its slots fit
    pub fn try_admit_next(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock();
        let AdmissionState {
            ledger,
            queue,
            held,
        } = &mut *state;

        let entry = queue.try_admit_next(ledger)?;
        held.insert(entry.request.id, entry.slots());
        info!(
            run_id = %entry.request.id,
            slots = entry.slots(),
            available = ledger.available(),
            "Admitted run"
        );
        Some(entry)
    }

    /// Admit heads until the current head no longer fits
    pub fn admit_ready(&self) -> Vec<QueueEntry> {
        std::iter::from_fn(|| self.try_admit_next()).collect()
    }

    /// Release whatever `run_id` still holds. Returns the number of slots freed.
    pub fn release_run(&self, run_id: RunId) -> usize {
        let mut state = self.state.lock();
        match state.held.remove(&run_id) {
            Some(slots) => {
                state.ledger.release(slots);
                debug!(
                    run_id = %run_id,
                    slots,
                    available = state.ledger.available(),
                    "Released run slots"
                );
                slots
            }
            None => 0,
        }
    }

    /// Whether `run_id` currently holds a reservation
    pub fn holds(&self, run_id: RunId) -> bool {
        self.state.lock().held.contains_key(&run_id)
    }

    /// Whether `run_id` is waiting in the queue
    pub fn is_queued(&self, run_id: RunId) -> bool {
        self.state
            .lock()
            .queue
            .iter()
            .any(|entry| entry.request.id == run_id)
    }

    /// Remove every waiting entry
    pub fn drain_queue(&self) -> Vec<QueueEntry> {
        self.state.lock().queue.clear()
    }

    pub fn available(&self) -> usize {
        self.state.lock().ledger.available()
    }

    pub fn reserved(&self) -> usize {
        self.state.lock().ledger.reserved()
    }

    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }
}

/// Slots held by one admitted run.
///
/// Dropping the reservation releases the slots and tells the event bridge
/// to re-check the queue, so capacity comes back even if the owning
/// lifecycle manager panics.
#[derive(Debug)]
pub struct SlotReservation {
    admission: Arc<AdmissionControl>,
    run_id: RunId,
    events: Option<mpsc::UnboundedSender<BridgeEvent>>,
    released: bool,
}

impl SlotReservation {
    pub fn new(admission: Arc<AdmissionControl>, run_id: RunId) -> Self {
        Self {
            admission,
            run_id,
            events: None,
            released: false,
        }
    }

    /// Signal `events` when the slots are released
    pub fn with_events(mut self, events: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Release the slots now. Later calls and the drop are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let slots = self.admission.release_run(self.run_id);
        if let Some(events) = &self.events {
            // The bridge may already be gone during shutdown
            let _ = events.send(BridgeEvent::SlotsReleased {
                run_id: self.run_id,
                slots,
            });
        }
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        self.release();
    }
}
