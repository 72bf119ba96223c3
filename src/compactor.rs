use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::{Engine, EngineError};

/// Compact the WAL if at least `threshold` events were appended since the
/// last compaction. Returns whether it compacted.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appended = engine.wal_appends_since_compact().await;
    if appended < threshold {
        debug!("compactor: {appended} appends, below threshold {threshold}");
        return Ok(false);
    }
    engine.compact_wal().await?;
    Ok(true)
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            warn!("compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::wal::Wal;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("classgrid_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::open(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        engine.register_course(5, "Compilers").await.unwrap();
        engine.register_instructor(7, "Grace", "Hopper").await.unwrap();

        assert!(!compact_if_due(&engine, 10).await.unwrap());

        for _ in 0..5 {
            let a = engine
                .create_schedule(NewSchedule::parse("Fall", "09:00 - 10:00", "Room 101", 5, 7).unwrap())
                .await
                .unwrap();
            engine.delete_schedule(a.id).await.unwrap();
        }
        assert!(compact_if_due(&engine, 10).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        // Sequence marker + course + instructor; every schedule was deleted.
        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed[0], Event::SequenceAdvanced { next_id: 6 });
    }
}
