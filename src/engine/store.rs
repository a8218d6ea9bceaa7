use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::SharedSpaceState;

/// In-memory backing store: the space directory plus the reservation index.
/// Mutation of a space's contents goes through its own `RwLock`; the maps
/// here only track existence and cross-references.
pub struct InMemoryStore {
    spaces: DashMap<Ulid, SharedSpaceState>,
    /// Reverse lookup: reservation id → owning space id.
    reservation_to_space: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            spaces: DashMap::new(),
            reservation_to_space: DashMap::new(),
        }
    }

    // ── Space directory ──────────────────────────────────────

    pub fn space_count(&self) -> usize {
        self.spaces.len()
    }

    pub fn contains_space(&self, id: &Ulid) -> bool {
        self.spaces.contains_key(id)
    }

    pub fn get_space(&self, id: &Ulid) -> Option<SharedSpaceState> {
        self.spaces.get(id).map(|e| e.value().clone())
    }

    pub fn insert_space(&self, id: Ulid, state: SharedSpaceState) {
        self.spaces.insert(id, state);
    }

    pub fn remove_space(&self, id: &Ulid) -> Option<(Ulid, SharedSpaceState)> {
        self.spaces.remove(id)
    }

    pub fn space_ids(&self) -> Vec<Ulid> {
        self.spaces.iter().map(|e| *e.key()).collect()
    }

    pub fn iter_spaces(&self) -> impl Iterator<Item = SharedSpaceState> + '_ {
        self.spaces.iter().map(|e| e.value().clone())
    }

    // ── Reservation index ────────────────────────────────────

    pub fn space_of_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_space
            .get(reservation_id)
            .map(|e| *e.value())
    }

    pub fn index_reservation(&self, reservation_id: Ulid, space_id: Ulid) {
        self.reservation_to_space.insert(reservation_id, space_id);
    }

    pub fn unindex_reservation(&self, reservation_id: &Ulid) {
        self.reservation_to_space.remove(reservation_id);
    }

    // ── Event application ────────────────────────────────────

    /// Apply a non-create/delete-space event to a locked space state.
    /// The caller holds the write lock; this never blocks.
    pub fn apply_event(&self, rs: &mut SpaceState, event: &Event) {
        match event {
            Event::SpaceUpdated {
                name,
                about,
                category,
                max_capacity,
                ..
            } => {
                rs.name = name.clone();
                rs.about = about.clone();
                rs.category = *category;
                rs.max_capacity = *max_capacity;
            }
            Event::ReservationCreated {
                id,
                space_id,
                date,
                quantity,
                event_name,
                about,
                requester_id,
                status,
            } => {
                rs.insert_reservation(Reservation {
                    id: *id,
                    date: *date,
                    quantity: *quantity,
                    event_name: event_name.clone(),
                    about: about.clone(),
                    requester_id: *requester_id,
                    status: *status,
                });
                self.index_reservation(*id, *space_id);
            }
            Event::ReservationUpdated {
                id,
                quantity,
                event_name,
                about,
                ..
            } => {
                if let Some(r) = rs.find_reservation_mut(*id) {
                    if let Some(q) = quantity {
                        r.quantity = *q;
                    }
                    if let Some(n) = event_name {
                        r.event_name = n.clone();
                    }
                    if let Some(a) = about {
                        r.about = Some(a.clone());
                    }
                }
            }
            Event::ReservationStatusChanged { id, status, .. } => {
                if let Some(r) = rs.find_reservation_mut(*id) {
                    r.status = *status;
                }
            }
            Event::ReservationDeleted { id, .. } => {
                rs.remove_reservation(*id);
                self.unindex_reservation(id);
            }
            // Handled at the map level, not against a locked state
            Event::SpaceCreated { .. } | Event::SpaceDeleted { .. } => {}
        }
    }
}
