mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use conflict::{validate_for_create, validate_for_update, SlotQuery};
pub use error::{EngineError, EntityRef, ValidationError};
pub use store::{AssignmentRepository, EntityDirectory, InMemoryStore};

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use crate::config::Config;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

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
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-written bytes don't leak into
    // the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
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

/// The schedule allocation engine: validator, store, WAL and notifications
/// behind one write lock.
pub struct Engine {
    pub store: InMemoryStore,
    pub notify: Arc<NotifyHub>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Serializes check-then-write so two mutations never validate against
    /// the same snapshot.
    pub(super) write_lock: Mutex<()>,
    pub(super) next_id: AtomicI64,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called from within a tokio runtime.
    pub fn open(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        let mut sequence: ScheduleId = 1;
        for event in &events {
            match event {
                Event::SequenceAdvanced { next_id } => sequence = sequence.max(*next_id),
                Event::ScheduleCreated { id, .. } => sequence = sequence.max(id + 1),
                _ => {}
            }
            store.apply_event(event);
        }

        let engine = Self {
            store,
            notify,
            wal_tx,
            write_lock: Mutex::new(()),
            next_id: AtomicI64::new(sequence),
        };

        info!(
            "replayed {} events from {}: {} schedules, {} courses, {} instructors",
            events.len(),
            wal_path.display(),
            engine.store.schedule_count(),
            engine.store.course_count(),
            engine.store.instructor_count()
        );
        for v in engine.find_violations() {
            warn!("replayed state breaks {:?}: schedules {} and {}", v.kind, v.first, v.second);
        }
        metrics::gauge!(crate::observability::SCHEDULES_ACTIVE)
            .set(engine.store.schedule_count() as f64);

        Ok(engine)
    }

    /// Open the engine under `config.data_dir`, install the metrics exporter
    /// if a port is configured, and spawn the compactor.
    pub fn start(config: &Config) -> io::Result<Arc<Engine>> {
        crate::observability::init(config.metrics_port)
            .map_err(|e| io::Error::other(e.to_string()))?;
        std::fs::create_dir_all(&config.data_dir)?;
        let engine = Arc::new(Engine::open(config.wal_path(), Arc::new(NotifyHub::new()))?);

        let compactor_engine = engine.clone();
        let threshold = config.compact_threshold;
        let interval = config.compact_interval;
        tokio::spawn(async move {
            crate::compactor::run_compactor(compactor_engine, threshold, interval).await;
        });

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
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

    /// WAL-append + apply in one call. Callers hold `write_lock`.
    pub(super) async fn persist_and_apply(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(event);
        Ok(())
    }

    pub(super) fn allocate_id(&self) -> ScheduleId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(super) fn peek_next_id(&self) -> ScheduleId {
        self.next_id.load(Ordering::SeqCst)
    }
}
