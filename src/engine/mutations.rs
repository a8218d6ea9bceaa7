use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::admission::{check_admission, validate_date, validate_event_name, validate_quantity};
use super::{AdmissionPolicy, Engine, EngineError, WalCommand};

/// Record an admission decision's outcome and latency, then pass it through.
fn track<T>(
    op: &'static str,
    start: Instant,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    let outcome = observability::outcome_label(&result.as_ref().map(|_| ()));
    metrics::counter!(observability::ADMISSIONS_TOTAL, "op" => op, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(observability::MUTATION_DURATION_SECONDS, "op" => op)
        .record(start.elapsed().as_secs_f64());
    result
}

fn validate_space_fields(
    name: &str,
    about: &Option<String>,
    max_capacity: u32,
) -> Result<String, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput("space name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("space name too long"));
    }
    if let Some(a) = about
        && a.len() > MAX_ABOUT_LEN
    {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if max_capacity < 1 {
        return Err(EngineError::InvalidInput("capacity must be at least 1"));
    }
    if max_capacity > MAX_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity too large"));
    }
    Ok(name.to_string())
}

impl Engine {
    // ── Space directory (admin only) ─────────────────────────

    pub async fn create_space(
        &self,
        id: Ulid,
        name: String,
        about: Option<String>,
        category: Category,
        max_capacity: u32,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        if actor.role != Role::Admin {
            return Err(EngineError::Forbidden("only admins manage spaces"));
        }
        let name = validate_space_fields(&name, &about, max_capacity)?;
        if self.store.space_count() >= MAX_SPACES {
            return Err(EngineError::LimitExceeded("too many spaces"));
        }
        if self.store.contains_space(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::SpaceCreated {
            id,
            name: name.clone(),
            about: about.clone(),
            category,
            max_capacity,
        };
        self.wal_append(&event).await?;
        let rs = SpaceState::new(id, name, about, category, max_capacity);
        self.store.insert_space(id, Arc::new(RwLock::new(rs)));
        metrics::gauge!(observability::SPACES_ACTIVE).set(self.store.space_count() as f64);
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn update_space(
        &self,
        id: Ulid,
        name: String,
        about: Option<String>,
        category: Category,
        max_capacity: u32,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        if actor.role != Role::Admin {
            return Err(EngineError::Forbidden("only admins manage spaces"));
        }
        let name = validate_space_fields(&name, &about, max_capacity)?;
        let rs = self
            .get_space_state(&id)
            .ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        // Shrinking capacity must not orphan an admitted headcount. An
        // exclusive day holds one active row; under the sum policy the
        // committed day total is what counts.
        let committed = match self.policy {
            AdmissionPolicy::DayExclusive => guard
                .reservations
                .iter()
                .filter(|r| r.status.is_active())
                .map(|r| r.quantity)
                .max()
                .unwrap_or(0),
            AdmissionPolicy::SumCapacity => {
                // Reservations are sorted by date, so same-day rows are adjacent
                let mut max_day = 0u32;
                let mut day_start = Ms::MIN;
                let mut day_sum = 0u32;
                for r in guard.reservations.iter().filter(|r| r.status.is_active()) {
                    let start = self.day_of(r.date).start;
                    if start != day_start {
                        day_start = start;
                        day_sum = 0;
                    }
                    day_sum = day_sum.saturating_add(r.quantity);
                    max_day = max_day.max(day_sum);
                }
                max_day
            }
        };
        if max_capacity < committed {
            return Err(EngineError::InvalidInput(
                "capacity below committed reservations",
            ));
        }

        let event = Event::SpaceUpdated {
            id,
            name,
            about,
            category,
            max_capacity,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn delete_space(&self, id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        if actor.role != Role::Admin {
            return Err(EngineError::Forbidden("only admins manage spaces"));
        }
        let rs = self
            .get_space_state(&id)
            .ok_or(EngineError::NotFound(id))?;
        // Held across the removal: a create racing for this lock must find
        // the space gone from the directory, not admit into a dead state.
        let guard = rs.write().await;
        if !guard.reservations.is_empty() {
            return Err(EngineError::HasReservations(id));
        }

        let event = Event::SpaceDeleted { id };
        self.wal_append(&event).await?;
        self.store.remove_space(&id);
        drop(guard);
        metrics::gauge!(observability::SPACES_ACTIVE).set(self.store.space_count() as f64);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(())
    }

    // ── Reservation admission ────────────────────────────────

    /// Admit or reject a new reservation. Admin/staff reservations are born
    /// `Accepted`; regular users get `Pending` until an admin decides.
    /// Returns the admitted status.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_reservation(
        &self,
        id: Ulid,
        space_id: Ulid,
        date: Ms,
        quantity: u32,
        event_name: String,
        about: Option<String>,
        actor: &Actor,
    ) -> Result<ReservationStatus, EngineError> {
        let start = Instant::now();
        let result = self
            .admit_create(id, space_id, date, quantity, event_name, about, actor)
            .await;
        track("create_reservation", start, result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn admit_create(
        &self,
        id: Ulid,
        space_id: Ulid,
        date: Ms,
        quantity: u32,
        event_name: String,
        about: Option<String>,
        actor: &Actor,
    ) -> Result<ReservationStatus, EngineError> {
        validate_date(date)?;
        validate_quantity(quantity)?;
        let event_name = validate_event_name(&event_name)?;
        if let Some(ref a) = about
            && a.len() > MAX_ABOUT_LEN
        {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if self.space_of_reservation(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::NotFound(space_id))?;
        let mut guard = rs.write().await;
        // The space may have been deleted while we waited for the lock
        if !self.store.contains_space(&space_id) {
            return Err(EngineError::NotFound(space_id));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_SPACE {
            return Err(EngineError::LimitExceeded("too many reservations on space"));
        }

        check_admission(&guard, &self.day_of(date), quantity, None, self.policy)?;

        let status = if actor.role.is_privileged() {
            ReservationStatus::Accepted
        } else {
            ReservationStatus::Pending
        };
        let event = Event::ReservationCreated {
            id,
            space_id,
            date,
            quantity,
            event_name,
            about,
            requester_id: actor.id,
            status,
        };
        self.persist_and_apply(space_id, &mut guard, &event).await?;
        Ok(status)
    }

    /// Edit quantity, event name and/or description. Only supplied fields
    /// are persisted; the rest stay untouched.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        actor: &Actor,
        new_quantity: Option<u32>,
        new_event_name: Option<String>,
        new_about: Option<String>,
    ) -> Result<(), EngineError> {
        let start = Instant::now();
        let result = self
            .admit_update(id, actor, new_quantity, new_event_name, new_about)
            .await;
        track("update_reservation", start, result)
    }

    async fn admit_update(
        &self,
        id: Ulid,
        actor: &Actor,
        new_quantity: Option<u32>,
        new_event_name: Option<String>,
        new_about: Option<String>,
    ) -> Result<(), EngineError> {
        if new_quantity.is_none() && new_event_name.is_none() && new_about.is_none() {
            return Err(EngineError::InvalidInput("no fields supplied"));
        }
        let (space_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard
            .find_reservation(id)
            .ok_or(EngineError::NotFound(id))?;
        if reservation.requester_id != actor.id && !actor.role.is_privileged() {
            return Err(EngineError::Forbidden("not the reservation owner"));
        }
        let date = reservation.date;

        if let Some(q) = new_quantity {
            validate_quantity(q)?;
            check_admission(&guard, &self.day_of(date), q, Some(id), self.policy)?;
        }
        let new_event_name = new_event_name
            .map(|n| validate_event_name(&n))
            .transpose()?;
        if let Some(ref a) = new_about
            && a.len() > MAX_ABOUT_LEN
        {
            return Err(EngineError::LimitExceeded("description too long"));
        }

        let event = Event::ReservationUpdated {
            id,
            space_id,
            quantity: new_quantity,
            event_name: new_event_name,
            about: new_about,
        };
        self.persist_and_apply(space_id, &mut guard, &event).await
    }

    pub async fn delete_reservation(&self, id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        let start = Instant::now();
        let result = self.admit_delete(id, actor).await;
        track("delete_reservation", start, result)
    }

    async fn admit_delete(&self, id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        let (space_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard
            .find_reservation(id)
            .ok_or(EngineError::NotFound(id))?;
        if reservation.requester_id != actor.id && !actor.role.is_privileged() {
            return Err(EngineError::Forbidden("not the reservation owner"));
        }

        let event = Event::ReservationDeleted { id, space_id };
        self.persist_and_apply(space_id, &mut guard, &event).await
    }

    /// Admin approval workflow: accept or reject a reservation. Activating
    /// a previously rejected reservation re-runs the admission check, since
    /// rejected rows do not occupy their day.
    pub async fn set_reservation_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        let start = Instant::now();
        let result = self.admit_status_change(id, status, actor).await;
        track("set_reservation_status", start, result)
    }

    async fn admit_status_change(
        &self,
        id: Ulid,
        status: ReservationStatus,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        if actor.role != Role::Admin {
            return Err(EngineError::Forbidden(
                "only admins change reservation status",
            ));
        }
        let (space_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard
            .find_reservation(id)
            .ok_or(EngineError::NotFound(id))?;

        if status.is_active() && !reservation.status.is_active() {
            let (date, quantity) = (reservation.date, reservation.quantity);
            check_admission(&guard, &self.day_of(date), quantity, Some(id), self.policy)?;
        }

        let event = Event::ReservationStatusChanged {
            id,
            space_id,
            status,
        };
        self.persist_and_apply(space_id, &mut guard, &event).await
    }

    /// Pending reservations whose calendar day has fully passed.
    /// Returns `(reservation_id, space_id)` pairs for the reaper.
    pub fn collect_stale_pending(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut stale = Vec::new();
        for rs in self.store.iter_spaces() {
            if let Ok(guard) = rs.try_read() {
                for r in &guard.reservations {
                    if r.status == ReservationStatus::Pending
                        && self.day_of(r.date).end <= now
                    {
                        stale.push((r.id, guard.id));
                    }
                }
            }
        }
        stale
    }

    /// Used by the reaper: reject without the admin gate.
    pub(crate) async fn reject_stale_pending(&self, id: Ulid) -> Result<(), EngineError> {
        let (space_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard
            .find_reservation(id)
            .ok_or(EngineError::NotFound(id))?;
        if reservation.status != ReservationStatus::Pending {
            return Ok(()); // decided in the meantime
        }
        let event = Event::ReservationStatusChanged {
            id,
            space_id,
            status: ReservationStatus::Rejected,
        };
        self.persist_and_apply(space_id, &mut guard, &event).await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        for id in self.store.space_ids() {
            let Some(rs) = self.store.get_space(&id) else {
                continue;
            };
            let guard = rs.read().await;
            events.push(Event::SpaceCreated {
                id: guard.id,
                name: guard.name.clone(),
                about: guard.about.clone(),
                category: guard.category,
                max_capacity: guard.max_capacity,
            });
            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    id: r.id,
                    space_id: guard.id,
                    date: r.date,
                    quantity: r.quantity,
                    event_name: r.event_name.clone(),
                    about: r.about.clone(),
                    requester_id: r.requester_id,
                    status: r.status,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
