pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod wal;

pub use engine::{AdmissionPolicy, Engine, EngineError};
pub use model::{Actor, Category, ReservationStatus, Role};
