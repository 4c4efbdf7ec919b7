use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::engine::EngineError;
use crate::model::Event;
use crate::observability::{JOURNAL_FLUSH_BATCH_SIZE, JOURNAL_FLUSH_DURATION_SECONDS};
use crate::store::{StoreOfRecord, StoreSnapshot};
use crate::wal::Wal;

enum JournalCommand {
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        revision: u64,
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { events, response }) => {
                            batch.push((events, response));
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
    debug!("journal writer for {} stopped", wal.path().display());
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(JOURNAL_FLUSH_DURATION_SECONDS).record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    'outer: for (events, _) in batch {
        for event in events {
            if let Err(e) = wal.append_buffered(event) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact {
            revision,
            events,
            response,
        } => {
            let _ = response.send(compact(wal, revision, events));
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        JournalCommand::Append { .. } => {}
    }
}

/// Rewrite the log as `checkpoint` followed by every record newer than it,
/// so commits decided after the snapshot but written before compaction survive.
fn compact(wal: &mut Wal, revision: u64, mut checkpoint: Vec<Event>) -> io::Result<()> {
    wal.flush_sync()?;
    let tail = Wal::replay(wal.path())?
        .into_iter()
        .filter(|e| !matches!(e, Event::Checkpoint { .. }) && e.revision() > revision);
    let before = checkpoint.len();
    checkpoint.extend(tail);
    let carried = checkpoint.len() - before;
    wal.rewrite(&checkpoint)?;
    info!(
        "compacted journal {} at revision {revision} ({carried} newer record(s) carried)",
        wal.path().display()
    );
    Ok(())
}

/// Durable journal of engine decisions. Cheap to clone; all clones feed one
/// writer task. Must be opened inside a tokio runtime.
#[derive(Clone)]
pub struct Journal {
    tx: mpsc::Sender<JournalCommand>,
    path: PathBuf,
}

impl Journal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_loop(wal, rx));
        Ok(Self {
            tx,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably write an outcome's events. Returns once they are fsynced.
    pub async fn append(&self, events: &[Event]) -> Result<(), EngineError> {
        if events.is_empty() {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Append {
                events: events.to_vec(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Replace the log with `snapshot` plus anything journaled after it.
    pub async fn compact(&self, snapshot: StoreSnapshot) -> Result<(), EngineError> {
        let revision = snapshot.revision;
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Compact {
                revision,
                events: snapshot.into_events(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Every intact record on disk, oldest first. Empty only for a journal
    /// that has never been written.
    pub fn replay(&self) -> Result<Vec<Event>, EngineError> {
        Wal::replay(&self.path).map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl StoreOfRecord for Journal {
    async fn load(&self) -> Result<StoreSnapshot, EngineError> {
        Ok(StoreSnapshot::from_events(&self.replay()?))
    }
}
