use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::compactor;
use crate::config::Config;
use crate::engine::{Engine, EngineError, ReconcileReport};
use crate::journal::Journal;
use crate::model::Event;
use crate::notify::NotifyHub;
use crate::observability;
use crate::store::{JsonExport, StoreOfRecord, StoreSnapshot};

/// A loaded engine wired to its journal and compactor.
pub struct Runtime {
    pub engine: Arc<Engine>,
    pub journal: Journal,
    /// What reconciliation had to adjust at startup.
    pub report: ReconcileReport,
    compactor: JoinHandle<()>,
}

impl Runtime {
    /// Bootstrap: journal (or seed export) → reconcile → rebalance → checkpoint.
    pub async fn open(config: &Config) -> Result<Self, EngineError> {
        observability::init_tracing();
        observability::init_metrics(config.metrics_port);

        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| EngineError::WalError(format!("{}: {e}", config.data_dir.display())))?;
        let journal_path = config.journal_path();
        let journal = Journal::open(&journal_path)
            .map_err(|e| EngineError::WalError(format!("{}: {e}", journal_path.display())))?;

        // Seed only a journal that was never written. One that folds to an
        // empty state is still authoritative.
        let records = journal.replay()?;
        let seed = config.seed_path.as_ref().filter(|_| records.is_empty());
        let snapshot = match seed {
            Some(seed) => {
                info!("seeding from {}", seed.display());
                JsonExport::new(seed).load().await?
            }
            None => StoreSnapshot::from_events(&records),
        };

        let (engine, report) = Engine::load(snapshot, Arc::new(NotifyHub::new()));
        let engine = Arc::new(engine);
        let rebalanced = engine.rebalance().await?;

        if seed.is_some() || !report.is_clean() || !rebalanced.is_empty() {
            journal.compact(engine.snapshot().await).await?;
        }
        info!(
            "bedq ready: {} beds, {} waiting ({})",
            report.beds,
            engine.queue_len().await,
            journal_path.display()
        );

        let compactor = tokio::spawn(compactor::run_compactor(
            engine.clone(),
            journal.clone(),
            config.compact_threshold,
            config.compact_interval,
        ));

        Ok(Self {
            engine,
            journal,
            report,
            compactor,
        })
    }

    /// Write-through for an outcome's events. Call after each engine decision.
    pub async fn commit(&self, events: &[Event]) -> Result<(), EngineError> {
        self.journal.append(events).await
    }

    /// Checkpoint the journal now.
    pub async fn compact(&self) -> Result<(), EngineError> {
        self.journal.compact(self.engine.snapshot().await).await
    }

    /// Stop the compactor. Pending commits already returned are durable.
    pub fn shutdown(self) {
        self.compactor.abort();
    }
}
