use ulid::Ulid;

use crate::model::*;

use super::overlap::conflicting;
use super::{Engine, EngineError, SharedUnitState};

impl Engine {
    /// Availability query: true iff zero bookings on the unit overlap the
    /// candidate range, excluding `exclude` when given.
    pub async fn is_available(
        &self,
        unit_id: Ulid,
        range: DateRange,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let us = self.require_unit(&unit_id)?;
        let guard = us.read().await;
        Ok(conflicting(&guard, &range, exclude).is_empty())
    }

    /// Like `is_available`, but returns the blocking bookings so callers can
    /// show the guest names and dates behind a rejection.
    pub async fn check_availability(
        &self,
        unit_id: Ulid,
        range: DateRange,
        exclude: Option<Ulid>,
    ) -> Result<Vec<ConflictingBooking>, EngineError> {
        let us = self.require_unit(&unit_id)?;
        let guard = us.read().await;
        Ok(conflicting(&guard, &range, exclude)
            .iter()
            .map(|b| ConflictingBooking::from_booking(b))
            .collect())
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let unit_id = self.unit_for_entity(&id).ok_or(EngineError::NotFound(id))?;
        let us = self.require_unit(&unit_id)?;
        let guard = us.read().await;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// All bookings on a unit, sorted by check-in date.
    pub async fn list_bookings(&self, unit_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let us = self.require_unit(&unit_id)?;
        let guard = us.read().await;
        Ok(guard.bookings.clone())
    }

    /// Find a booking by its platform confirmation code, anywhere in the
    /// company. Codes are unique per platform, so first match wins.
    pub async fn find_by_confirmation_code(&self, code: &str) -> Option<Booking> {
        let states = self.unit_states();
        for us in states {
            let guard = us.read().await;
            if let Some(b) = guard
                .bookings
                .iter()
                .find(|b| b.confirmation_code.as_deref() == Some(code))
            {
                return Some(b.clone());
            }
        }
        None
    }

    pub async fn list_units(&self) -> Vec<Unit> {
        let mut out = Vec::with_capacity(self.units.len());
        for us in self.unit_states() {
            let guard = us.read().await;
            out.push(guard.unit.clone());
        }
        out
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Calendar sources that have a feed URL, i.e. the scheduled sync set.
    pub async fn list_syncable_sources(&self) -> Vec<CalendarSource> {
        let mut out = Vec::new();
        for us in self.unit_states() {
            let guard = us.read().await;
            out.extend(guard.sources.iter().filter(|s| s.url.is_some()).cloned());
        }
        out
    }

    pub async fn list_calendar_sources(
        &self,
        unit_id: Ulid,
    ) -> Result<Vec<CalendarSource>, EngineError> {
        let us = self.require_unit(&unit_id)?;
        let guard = us.read().await;
        Ok(guard.sources.clone())
    }

    pub async fn list_issues(&self, unit_id: Ulid) -> Result<Vec<Issue>, EngineError> {
        let us = self.require_unit(&unit_id)?;
        let guard = us.read().await;
        Ok(guard.issues.clone())
    }

    /// Snapshot the unit Arcs so callers can await read locks without
    /// holding a map reference.
    pub(super) fn unit_states(&self) -> Vec<SharedUnitState> {
        self.units.iter().map(|e| e.value().clone()).collect()
    }
}
