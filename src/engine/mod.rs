mod admission;
mod error;
mod mutations;
mod queries;
mod store;

pub use admission::AdmissionPolicy;
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;
use store::InMemoryStore;

pub type SharedSpaceState = Arc<RwLock<SpaceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The reservation admission engine. Holds the space directory and decides
/// whether reservations may be created, edited or removed.
///
/// Every evaluate-then-persist sequence runs under the target space's write
/// lock, so two concurrent requests for the same space and day can never
/// both observe "no conflict" and both insert.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) policy: AdmissionPolicy,
    /// Server-local timezone as an offset from UTC; calendar days are cut
    /// at local midnight.
    pub(super) tz_offset_ms: Ms,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        policy: AdmissionPolicy,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            notify,
            policy,
            tz_offset_ms: 0,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::SpaceCreated {
                    id,
                    name,
                    about,
                    category,
                    max_capacity,
                } => {
                    let rs = SpaceState::new(
                        *id,
                        name.clone(),
                        about.clone(),
                        *category,
                        *max_capacity,
                    );
                    engine.store.insert_space(*id, Arc::new(RwLock::new(rs)));
                }
                Event::SpaceDeleted { id } => {
                    engine.store.remove_space(id);
                }
                other => {
                    if let Some(space_id) = event_space_id(other)
                        && let Some(rs) = engine.store.get_space(&space_id)
                    {
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        engine.store.apply_event(&mut guard, other);
                    }
                }
            }
        }
        metrics::gauge!(crate::observability::SPACES_ACTIVE)
            .set(engine.store.space_count() as f64);

        Ok(engine)
    }

    /// Cut calendar days at a local midnight `tz_offset_ms` ahead of UTC.
    pub fn with_tz_offset(mut self, tz_offset_ms: Ms) -> Self {
        self.tz_offset_ms = tz_offset_ms;
        self
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// The calendar-day window containing `at`, in engine-local time.
    pub(super) fn day_of(&self, at: Ms) -> Span {
        day_span(at, self.tz_offset_ms)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_space_state(&self, id: &Ulid) -> Option<SharedSpaceState> {
        self.store.get_space(id)
    }

    pub fn space_of_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.store.space_of_reservation(reservation_id)
    }

    /// WAL-append + apply + notify in one call, under the caller's lock.
    pub(super) async fn persist_and_apply(
        &self,
        space_id: Ulid,
        rs: &mut SpaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(rs, event);
        self.notify.send(space_id, event);
        Ok(())
    }

    /// Lookup reservation → space, then take the space's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<SpaceState>), EngineError> {
        let space_id = self
            .space_of_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let rs = self
            .get_space_state(&space_id)
            .ok_or(EngineError::NotFound(space_id))?;
        let guard = rs.write_owned().await;
        Ok((space_id, guard))
    }
}

/// Extract the space id from an event (for non-space-create/delete events).
fn event_space_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ReservationCreated { space_id, .. }
        | Event::ReservationUpdated { space_id, .. }
        | Event::ReservationStatusChanged { space_id, .. }
        | Event::ReservationDeleted { space_id, .. } => Some(*space_id),
        Event::SpaceUpdated { id, .. } => Some(*id),
        Event::SpaceCreated { .. } | Event::SpaceDeleted { .. } => None,
    }
}
