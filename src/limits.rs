//! Hard bounds on engine inputs. Violations surface as
//! `EngineError::LimitExceeded` and are terminal like every other rejection.

use crate::model::Ms;

/// Earliest accepted reservation timestamp: 2000-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;

/// Latest accepted reservation timestamp: 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Widest window a reservation listing query may cover (366 days).
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_NAME_LEN: usize = 256;

pub const MAX_ABOUT_LEN: usize = 2048;

pub const MAX_SPACES: usize = 10_000;

pub const MAX_RESERVATIONS_PER_SPACE: usize = 50_000;

/// Upper bound on a space's declared capacity.
pub const MAX_CAPACITY: u32 = 1_000_000;
