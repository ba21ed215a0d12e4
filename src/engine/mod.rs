mod analytics;
mod error;
mod import;
mod mutations;
mod overlap;
mod queries;
mod reconcile;
#[cfg(test)]
mod tests;

pub use analytics::{month_window, prorated_revenue, DashboardStats};
pub use error::EngineError;
pub use import::{BookingImport, ImportOutcome};
pub use overlap::conflicting;
pub use reconcile::ReconcileOutcome;

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedUnitState = Arc<RwLock<UnitState>>;

/// Per-company booking engine. All state lives in memory, durably backed by
/// an append-only WAL that is replayed at startup. Every write path acquires
/// the owning unit's write lock before the overlap check and holds it through
/// the commit, so no two bookings for one unit can ever race past each other.
pub struct Engine {
    pub units: DashMap<Ulid, SharedUnitState>,
    wal: Mutex<Wal>,
    /// Reverse lookup: booking/source/issue id → unit id.
    entity_to_unit: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a UnitState (no locking; caller holds the lock).
fn apply_to_unit(us: &mut UnitState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingAdded { booking } => {
            us.insert_booking(booking.clone());
            entity_map.insert(booking.id, booking.unit_id);
        }
        Event::BookingUpdated { booking } => {
            // Remove + reinsert keeps the check-in sort order intact.
            us.remove_booking(booking.id);
            us.insert_booking(booking.clone());
            entity_map.insert(booking.id, booking.unit_id);
        }
        Event::BookingRemoved { id, .. } => {
            us.remove_booking(*id);
            entity_map.remove(id);
        }
        Event::SourceUpserted { source } => {
            us.upsert_source(source.clone());
            entity_map.insert(source.id, source.unit_id);
        }
        Event::SourceSynced { id, at, .. } => {
            if let Some(source) = us.source_mut(*id) {
                source.last_synced = Some(*at);
            }
        }
        Event::SourceDeleted { id, .. } => {
            us.remove_source(*id);
            entity_map.remove(id);
        }
        Event::IssueAdded { issue } => {
            us.issues.push(issue.clone());
            entity_map.insert(issue.id, issue.unit_id);
        }
        Event::IssueRemoved { id, .. } => {
            us.remove_issue(*id);
            entity_map.remove(id);
        }
        Event::UnitUpdated { unit } => {
            us.unit = unit.clone();
        }
        // Created/Deleted are handled at the DashMap level, not here.
        Event::UnitCreated { .. } | Event::UnitDeleted { .. } => {}
    }
}

/// The unit an event belongs to (for non-Create/Delete events).
fn event_unit_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingAdded { booking } | Event::BookingUpdated { booking } => {
            Some(booking.unit_id)
        }
        Event::BookingRemoved { unit_id, .. }
        | Event::SourceSynced { unit_id, .. }
        | Event::SourceDeleted { unit_id, .. }
        | Event::IssueRemoved { unit_id, .. } => Some(*unit_id),
        Event::SourceUpserted { source } => Some(source.unit_id),
        Event::IssueAdded { issue } => Some(issue.unit_id),
        Event::UnitUpdated { unit } => Some(unit.id),
        Event::UnitCreated { .. } | Event::UnitDeleted { .. } => None,
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;

        let engine = Self {
            units: DashMap::new(),
            wal: Mutex::new(wal),
            entity_to_unit: DashMap::new(),
        };

        // Replay. We are the sole owner of these Arcs, so try_write always
        // succeeds instantly. blocking_write would panic inside an async
        // context (lazy per-company creation happens on the runtime).
        for event in &events {
            match event {
                Event::UnitCreated { unit } => {
                    let us = UnitState::new(unit.clone());
                    engine.units.insert(unit.id, Arc::new(RwLock::new(us)));
                }
                Event::UnitDeleted { id } => {
                    engine.units.remove(id);
                }
                other => {
                    if let Some(unit_id) = event_unit_id(other)
                        && let Some(entry) = engine.units.get(&unit_id)
                    {
                        let us_arc = entry.clone();
                        let mut guard = us_arc.try_write().expect("replay: uncontended write");
                        apply_to_unit(&mut guard, other, &engine.entity_to_unit);
                    }
                }
            }
        }

        Ok(engine)
    }

    pub fn unit_state(&self, id: &Ulid) -> Option<SharedUnitState> {
        self.units.get(id).map(|e| e.value().clone())
    }

    pub(super) fn require_unit(&self, id: &Ulid) -> Result<SharedUnitState, EngineError> {
        self.unit_state(id).ok_or(EngineError::NotFound(*id))
    }

    pub fn unit_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_unit.get(entity_id).map(|e| *e.value())
    }

    /// Lookup entity → unit and acquire the unit's write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<UnitState>), EngineError> {
        let unit_id = self
            .unit_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let us = self.require_unit(&unit_id)?;
        let guard = us.write_owned().await;
        Ok((unit_id, guard))
    }

    /// Durably log a batch of events with a single fsync, then apply them.
    /// The caller holds the unit write lock, so readers never observe a
    /// half-applied reconciliation pass.
    pub(super) async fn persist_batch(
        &self,
        us: &mut UnitState,
        events: &[Event],
    ) -> Result<(), EngineError> {
        if events.is_empty() {
            return Ok(());
        }
        {
            let mut wal = self.wal.lock().await;
            let flush_start = std::time::Instant::now();
            for event in events {
                wal.append_buffered(event)
                    .map_err(|e| EngineError::WalError(e.to_string()))?;
            }
            wal.flush_sync()
                .map_err(|e| EngineError::WalError(e.to_string()))?;
            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                .record(events.len() as f64);
            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                .record(flush_start.elapsed().as_secs_f64());
        }
        for event in events {
            apply_to_unit(us, event, &self.entity_to_unit);
        }
        Ok(())
    }

    /// WAL-append + apply for a single event.
    pub(super) async fn persist_and_apply(
        &self,
        us: &mut UnitState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.persist_batch(us, std::slice::from_ref(event)).await
    }

    /// Append a unit-level event (create/delete) that is not applied through
    /// a UnitState.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let mut wal = self.wal.lock().await;
        wal.append(event)
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.lock().await.appends_since_compact()
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let states: Vec<SharedUnitState> =
            self.units.iter().map(|e| e.value().clone()).collect();
        for us in states {
            let guard = us.read().await;
            events.push(Event::UnitCreated { unit: guard.unit.clone() });
            for source in &guard.sources {
                events.push(Event::SourceUpserted { source: source.clone() });
            }
            for booking in &guard.bookings {
                events.push(Event::BookingAdded { booking: booking.clone() });
            }
            for issue in &guard.issues {
                events.push(Event::IssueAdded { issue: issue.clone() });
            }
        }

        let mut wal = self.wal.lock().await;
        wal.compact(&events)
            .map_err(|e| EngineError::WalError(e.to_string()))
    }
}
