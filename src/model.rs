use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const MS_PER_DAY: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Start of the calendar day containing `at`, in a timezone `tz_offset_ms`
/// ahead of UTC. Half-open day windows mean an instant exactly at midnight
/// belongs to the starting day, never the previous one.
pub fn day_start(at: Ms, tz_offset_ms: Ms) -> Ms {
    let local = at + tz_offset_ms;
    local.div_euclid(MS_PER_DAY) * MS_PER_DAY - tz_offset_ms
}

/// The full calendar-day window containing `at`.
pub fn day_span(at: Ms, tz_offset_ms: Ms) -> Span {
    let start = day_start(at, tz_offset_ms);
    Span::new(start, start + MS_PER_DAY)
}

/// Caller roles, resolved by the identity provider in front of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
    User,
}

impl Role {
    /// Admin and staff may act on any reservation; users only on their own.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }
}

/// Request-scoped identity. Passed explicitly into every operation —
/// the engine holds no ambient notion of "the current user".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Room,
    Sports,
    Lecture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ReservationStatus {
    /// Active reservations occupy their day; rejected ones are invisible
    /// to admission.
    pub fn is_active(&self) -> bool {
        !matches!(self, ReservationStatus::Rejected)
    }
}

/// A reservation as held inside its space's state. The owning space id is
/// implied by the containing `SpaceState`; events carry it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Ulid,
    pub date: Ms,
    pub quantity: u32,
    pub event_name: String,
    pub about: Option<String>,
    pub requester_id: Ulid,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone)]
pub struct SpaceState {
    pub id: Ulid,
    pub name: String,
    pub about: Option<String>,
    pub category: Category,
    pub max_capacity: u32,
    /// All reservations on this space, sorted by `date`.
    pub reservations: Vec<Reservation>,
}

impl SpaceState {
    pub fn new(
        id: Ulid,
        name: String,
        about: Option<String>,
        category: Category,
        max_capacity: u32,
    ) -> Self {
        Self {
            id,
            name,
            about,
            category,
            max_capacity,
            reservations: Vec::new(),
        }
    }

    /// Insert a reservation maintaining sort order by date.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.date, |r| r.date)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn find_reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn find_reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations dated inside the query window.
    /// Binary search skips everything dated at or after `query.end`.
    pub fn in_window(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self.reservations.partition_point(|r| r.date < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.date >= query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SpaceCreated {
        id: Ulid,
        name: String,
        about: Option<String>,
        category: Category,
        max_capacity: u32,
    },
    SpaceUpdated {
        id: Ulid,
        name: String,
        about: Option<String>,
        category: Category,
        max_capacity: u32,
    },
    SpaceDeleted {
        id: Ulid,
    },
    ReservationCreated {
        id: Ulid,
        space_id: Ulid,
        date: Ms,
        quantity: u32,
        event_name: String,
        about: Option<String>,
        requester_id: Ulid,
        status: ReservationStatus,
    },
    /// Partial edit: only the `Some` fields were supplied.
    ReservationUpdated {
        id: Ulid,
        space_id: Ulid,
        quantity: Option<u32>,
        event_name: Option<String>,
        about: Option<String>,
    },
    ReservationStatusChanged {
        id: Ulid,
        space_id: Ulid,
        status: ReservationStatus,
    },
    ReservationDeleted {
        id: Ulid,
        space_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceInfo {
    pub id: Ulid,
    pub name: String,
    pub about: Option<String>,
    pub category: Category,
    pub max_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub space_id: Ulid,
    pub date: Ms,
    pub quantity: u32,
    pub event_name: String,
    pub about: Option<String>,
    pub requester_id: Ulid,
    pub status: ReservationStatus,
}

/// What a Conflict rejection reports back for user display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    pub id: Ulid,
    pub event_name: String,
    pub date: Ms,
    pub quantity: u32,
}

/// Occupancy report for one space on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayAvailability {
    pub day_start: Ms,
    pub occupied: u32,
    pub available: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(id: Ulid, date: Ms) -> Reservation {
        Reservation {
            id,
            date,
            quantity: 1,
            event_name: "Event".into(),
            about: None,
            requester_id: Ulid::new(),
            status: ReservationStatus::Accepted,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn day_start_floors_to_midnight() {
        let noon = 3 * MS_PER_DAY + 12 * 3_600_000;
        assert_eq!(day_start(noon, 0), 3 * MS_PER_DAY);
        assert_eq!(day_start(3 * MS_PER_DAY, 0), 3 * MS_PER_DAY);
    }

    #[test]
    fn day_span_midnight_belongs_to_new_day() {
        let midnight = 5 * MS_PER_DAY;
        let last_ms = midnight - 1; // 23:59:59.999 of day 4

        let day4 = day_span(last_ms, 0);
        let day5 = day_span(midnight, 0);
        assert_eq!(day4, Span::new(4 * MS_PER_DAY, 5 * MS_PER_DAY));
        assert_eq!(day5, Span::new(5 * MS_PER_DAY, 6 * MS_PER_DAY));
        assert!(day5.contains_instant(midnight));
        assert!(!day4.contains_instant(midnight));
    }

    #[test]
    fn day_start_respects_tz_offset() {
        // UTC-3: local midnight is 03:00 UTC, so 02:00 UTC still belongs
        // to the previous local day.
        let tz = -3 * 3_600_000;
        let two_am_utc = 10 * MS_PER_DAY + 2 * 3_600_000;
        let four_am_utc = 10 * MS_PER_DAY + 4 * 3_600_000;
        assert_ne!(day_start(two_am_utc, tz), day_start(four_am_utc, tz));
        assert_eq!(day_start(four_am_utc, tz), 10 * MS_PER_DAY + 3 * 3_600_000);
    }

    #[test]
    fn reservations_stay_sorted() {
        let mut rs = SpaceState::new(Ulid::new(), "A".into(), None, Category::Room, 10);
        rs.insert_reservation(reservation(Ulid::new(), 300));
        rs.insert_reservation(reservation(Ulid::new(), 100));
        rs.insert_reservation(reservation(Ulid::new(), 200));
        let dates: Vec<Ms> = rs.reservations.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![100, 200, 300]);
    }

    #[test]
    fn remove_reservation_by_id() {
        let mut rs = SpaceState::new(Ulid::new(), "A".into(), None, Category::Room, 10);
        let id = Ulid::new();
        rs.insert_reservation(reservation(id, 100));
        assert!(rs.remove_reservation(id).is_some());
        assert!(rs.reservations.is_empty());
        assert!(rs.remove_reservation(id).is_none());
    }

    #[test]
    fn in_window_filters_by_date() {
        let mut rs = SpaceState::new(Ulid::new(), "A".into(), None, Category::Room, 10);
        rs.insert_reservation(reservation(Ulid::new(), 50)); // before
        rs.insert_reservation(reservation(Ulid::new(), 150)); // inside
        rs.insert_reservation(reservation(Ulid::new(), 200)); // at end — excluded
        rs.insert_reservation(reservation(Ulid::new(), 500)); // after

        let hits: Vec<_> = rs.in_window(&Span::new(100, 200)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].date, 150);
    }

    #[test]
    fn in_window_includes_start_instant() {
        let mut rs = SpaceState::new(Ulid::new(), "A".into(), None, Category::Room, 10);
        rs.insert_reservation(reservation(Ulid::new(), 100));
        let hits: Vec<_> = rs.in_window(&Span::new(100, 200)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn rejected_is_not_active() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Accepted.is_active());
        assert!(!ReservationStatus::Rejected.is_active());
    }

    #[test]
    fn role_privilege() {
        assert!(Role::Admin.is_privileged());
        assert!(Role::Staff.is_privileged());
        assert!(!Role::User.is_privileged());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCreated {
            id: Ulid::new(),
            space_id: Ulid::new(),
            date: 1_700_000_000_000,
            quantity: 15,
            event_name: "Planning meeting".into(),
            about: None,
            requester_id: Ulid::new(),
            status: ReservationStatus::Accepted,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
