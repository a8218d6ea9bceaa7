use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::admission::{AdmissionPolicy, day_occupancy, validate_date};
use super::{Engine, EngineError};

fn reservation_info(space_id: Ulid, r: &Reservation) -> ReservationInfo {
    ReservationInfo {
        id: r.id,
        space_id,
        date: r.date,
        quantity: r.quantity,
        event_name: r.event_name.clone(),
        about: r.about.clone(),
        requester_id: r.requester_id,
        status: r.status,
    }
}

impl Engine {
    pub async fn list_spaces(&self) -> Vec<SpaceInfo> {
        let mut out = Vec::with_capacity(self.store.space_count());
        for rs in self.store.iter_spaces() {
            let guard = rs.read().await;
            out.push(SpaceInfo {
                id: guard.id,
                name: guard.name.clone(),
                about: guard.about.clone(),
                category: guard.category,
                max_capacity: guard.max_capacity,
            });
        }
        out
    }

    pub async fn get_space(&self, id: Ulid) -> Result<SpaceInfo, EngineError> {
        let rs = self
            .get_space_state(&id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(SpaceInfo {
            id: guard.id,
            name: guard.name.clone(),
            about: guard.about.clone(),
            category: guard.category,
            max_capacity: guard.max_capacity,
        })
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<ReservationInfo, EngineError> {
        let space_id = self
            .space_of_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::NotFound(space_id))?;
        let guard = rs.read().await;
        guard
            .find_reservation(id)
            .map(|r| reservation_info(space_id, r))
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_reservations(
        &self,
        space_id: Ulid,
    ) -> Result<Vec<ReservationInfo>, EngineError> {
        let rs = match self.get_space_state(&space_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        Ok(guard
            .reservations
            .iter()
            .map(|r| reservation_info(space_id, r))
            .collect())
    }

    /// Reservations dated inside `[start, end)`, e.g. one calendar page.
    pub async fn reservations_in_window(
        &self,
        space_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<ReservationInfo>, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidInput("empty query window"));
        }
        if end - start > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let rs = match self.get_space_state(&space_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        Ok(guard
            .in_window(&Span::new(start, end))
            .map(|r| reservation_info(space_id, r))
            .collect())
    }

    /// Occupancy report for the calendar day containing `at`. Nothing is
    /// cached: headroom is recomputed from the live reservation list.
    pub async fn day_availability(
        &self,
        space_id: Ulid,
        at: Ms,
    ) -> Result<DayAvailability, EngineError> {
        validate_date(at)?;
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::NotFound(space_id))?;
        let guard = rs.read().await;

        let day = self.day_of(at);
        let occupied = day_occupancy(&guard, &day, None);
        let available = match self.policy {
            // One active reservation claims the whole day.
            AdmissionPolicy::DayExclusive if occupied > 0 => 0,
            AdmissionPolicy::DayExclusive => guard.max_capacity,
            AdmissionPolicy::SumCapacity => guard.max_capacity.saturating_sub(occupied),
        };
        Ok(DayAvailability {
            day_start: day.start,
            occupied,
            available,
        })
    }
}
