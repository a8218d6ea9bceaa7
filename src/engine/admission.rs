use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// How same-day reservations on one space are admitted. Chosen once at
/// engine construction; the two rules are distinct code paths and are
/// never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// At most one active reservation per space per calendar day,
    /// regardless of quantity headroom.
    #[default]
    DayExclusive,
    /// Multiple same-day reservations are fine while their summed
    /// quantities stay within the space's capacity.
    SumCapacity,
}

pub(crate) fn validate_date(date: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&date) {
        return Err(EngineError::InvalidInput("date out of range"));
    }
    Ok(())
}

pub(crate) fn validate_quantity(quantity: u32) -> Result<(), EngineError> {
    if quantity < 1 {
        return Err(EngineError::InvalidInput("quantity must be at least 1"));
    }
    Ok(())
}

/// Event names must be non-empty after trimming. Returns the trimmed name —
/// what gets persisted.
pub(crate) fn validate_event_name(name: &str) -> Result<String, EngineError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput("event name must not be empty"));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("event name too long"));
    }
    Ok(trimmed.to_string())
}

/// Active reservations on the day, minus the one being edited.
fn active_on_day<'a>(
    rs: &'a SpaceState,
    day: &Span,
    exclude: Option<Ulid>,
) -> impl Iterator<Item = &'a Reservation> {
    rs.in_window(day)
        .filter(move |r| r.status.is_active() && Some(r.id) != exclude)
}

/// Summed active quantity for the day (for reporting and the sum policy).
/// Saturating: a day total beyond u32 must still reject, never wrap.
pub(crate) fn day_occupancy(rs: &SpaceState, day: &Span, exclude: Option<Ulid>) -> u32 {
    active_on_day(rs, day, exclude).fold(0u32, |total, r| total.saturating_add(r.quantity))
}

/// The admission decision: may `quantity` people occupy this space on the
/// day window `day`? `exclude` names a reservation being edited so it does
/// not collide with itself. Pure — evaluating twice against the same state
/// yields the same decision.
pub(crate) fn check_admission(
    rs: &SpaceState,
    day: &Span,
    quantity: u32,
    exclude: Option<Ulid>,
    policy: AdmissionPolicy,
) -> Result<(), EngineError> {
    match policy {
        AdmissionPolicy::DayExclusive => {
            let occupying: Vec<ConflictInfo> = active_on_day(rs, day, exclude)
                .map(|r| ConflictInfo {
                    id: r.id,
                    event_name: r.event_name.clone(),
                    date: r.date,
                    quantity: r.quantity,
                })
                .collect();
            if !occupying.is_empty() {
                return Err(EngineError::Conflict(occupying));
            }
            if quantity > rs.max_capacity {
                return Err(EngineError::CapacityExceeded {
                    available: rs.max_capacity,
                });
            }
        }
        AdmissionPolicy::SumCapacity => {
            let total = day_occupancy(rs, day, exclude);
            // Saturating: quantity is caller-supplied and may be near u32::MAX
            if total.saturating_add(quantity) > rs.max_capacity {
                return Err(EngineError::CapacityExceeded {
                    available: rs.max_capacity.saturating_sub(total),
                });
            }
        }
    }
    Ok(())
}
