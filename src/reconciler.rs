use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::engine::Engine;

/// Background task that checks cached student counts against enrollment rows.
pub async fn run_reconciler(engine: Arc<Engine>, every: Duration, repair: bool) {
    let mut interval = tokio::time::interval(every);
    // The first tick fires immediately; startup replay already rebuilt state.
    interval.tick().await;
    loop {
        interval.tick().await;
        reconcile_once(&engine, repair).await;
    }
}

/// One reconciliation pass. Returns the number of drifted coaches.
pub async fn reconcile_once(engine: &Engine, repair: bool) -> usize {
    match engine.reconcile_student_counts(repair).await {
        Ok(reports) => {
            let drifted = reports.iter().filter(|r| r.drifted()).count();
            if drifted == 0 {
                debug!("reconciliation: {} coaches consistent", reports.len());
            } else if repair {
                info!("reconciliation: repaired {drifted} of {} coaches", reports.len());
            } else {
                warn!("reconciliation: {drifted} of {} coaches drifted", reports.len());
            }
            drifted
        }
        Err(e) => {
            error!("reconciliation failed: {e}");
            0
        }
    }
}

/// Background task that compacts the WAL once enough records accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "ok").increment(1);
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "error").increment(1);
            error!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::engine::EngineSettings;
    use crate::model::*;
    use chrono::NaiveDateTime;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("coachbook_test_reconciler");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn engine(path: PathBuf) -> Engine {
        let now = NaiveDateTime::parse_from_str("2026-03-02 09:00", "%Y-%m-%d %H:%M").unwrap();
        Engine::new(path, Arc::new(FixedClock::new(now)), EngineSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn reconcile_once_counts_drift() {
        let engine = engine(test_wal_path("reconcile_once.wal"));
        let admin = Principal::new(1, Role::Admin);
        engine.create_coach(Some(&admin), 5, None, None, None).await.unwrap();
        assert_eq!(reconcile_once(&engine, false).await, 0);

        engine.get_coach(5).unwrap().write().await.coach.students_count = 4;
        assert_eq!(reconcile_once(&engine, false).await, 1);
        assert_eq!(reconcile_once(&engine, true).await, 1);
        assert_eq!(reconcile_once(&engine, false).await, 0);
    }

    #[tokio::test]
    async fn compactor_respects_threshold() {
        let engine = engine(test_wal_path("compact_threshold.wal"));
        let admin = Principal::new(1, Role::Admin);
        for id in 1..=3 {
            engine.create_coach(Some(&admin), id, None, None, None).await.unwrap();
        }
        assert!(!compact_if_needed(&engine, 10).await);
        assert!(compact_if_needed(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
