use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Engine;
use crate::journal::Journal;
use crate::observability::JOURNAL_COMPACTIONS_TOTAL;

/// Compact once `threshold` appends have accumulated. Returns whether it ran.
pub async fn compact_if_due(engine: &Engine, journal: &Journal, threshold: u64) -> bool {
    let appends = journal.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match journal.compact(engine.snapshot().await).await {
        Ok(()) => {
            metrics::counter!(JOURNAL_COMPACTIONS_TOTAL).increment(1);
            debug!("compacted after {appends} appends");
            true
        }
        Err(e) => {
            warn!("journal compaction failed: {e}");
            false
        }
    }
}

/// Background task that keeps the journal short.
pub async fn run_compactor(engine: Arc<Engine>, journal: Journal, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        compact_if_due(&engine, &journal, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::store::StoreOfRecord;
    use crate::wal::Wal;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bedq_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let journal = Journal::open(&path).unwrap();
        let engine = Engine::new(Arc::new(NotifyHub::new()));

        for i in 0..3 {
            let out = engine
                .on_bed_available(Bed::new(format!("B-{i}"), "1", "General"))
                .await
                .unwrap();
            journal.append(&out.events).await.unwrap();
        }
        for _ in 0..4 {
            let out = engine.on_bed_released("B-0").await.unwrap();
            journal.append(&out.events).await.unwrap();
        }
        assert_eq!(journal.appends_since_compact().await, 7);

        assert!(!compact_if_due(&engine, &journal, 100).await);
        assert!(compact_if_due(&engine, &journal, 5).await);
        assert_eq!(journal.appends_since_compact().await, 0);

        // Three beds plus the checkpoint marker.
        assert_eq!(Wal::replay(&path).unwrap().len(), 4);
        let snap = journal.load().await.unwrap();
        assert_eq!(snap, engine.snapshot().await);
    }

    #[tokio::test]
    async fn background_task_compacts() {
        let path = test_wal_path("background.wal");
        let journal = Journal::open(&path).unwrap();
        let engine = Arc::new(Engine::new(Arc::new(NotifyHub::new())));
        for _ in 0..10 {
            let out = engine
                .on_bed_available(Bed::new("B-1", "1", "General"))
                .await
                .unwrap();
            journal.append(&out.events).await.unwrap();
        }

        let task = tokio::spawn(run_compactor(
            engine.clone(),
            journal.clone(),
            5,
            Duration::from_secs(30),
        ));
        for _ in 0..100 {
            if journal.appends_since_compact().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();
        assert_eq!(journal.appends_since_compact().await, 0);
    }
}
