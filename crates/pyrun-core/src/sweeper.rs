//! Periodic reclamation, decoupled from request handling

use chrono::Utc;
use pyrun_store::ArtifactStore;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle to a running sweeper task
#[derive(Debug)]
pub struct Sweeper {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Stop after the sweep in progress (if any) completes
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sweeper task ended abnormally");
        }
    }
}

/// Sweep `store` every `interval`, starting immediately
pub fn spawn(store: ArtifactStore, interval: Duration) -> Sweeper {
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let store = store.clone();
                    match tokio::task::spawn_blocking(move || store.sweep(Utc::now())).await {
                        Ok(report) => debug!(removed = report.removed.len(), "sweep tick"),
                        Err(e) => warn!(error = %e, "sweep panicked"),
                    }
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        info!("sweeper stopped");
    });

    Sweeper { stop, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweeper_reclaims_and_stops() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path(), chrono::Duration::zero()).unwrap();
        let unit = store.materialize("print(1)\n").unwrap();

        let sweeper = spawn(store.clone(), Duration::from_millis(50));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while unit.path().exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        sweeper.shutdown().await;
        assert!(!unit.path().exists());

        // nothing sweeps after shutdown
        let survivor = store.materialize("print(2)\n").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(survivor.path().exists());
    }

    #[tokio::test]
    async fn test_sweeper_skips_leased_units() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path(), chrono::Duration::zero()).unwrap();
        let unit = store.materialize("print(1)\n").unwrap();
        let lease = store.lease(&unit.id()).unwrap();

        let sweeper = spawn(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(unit.path().exists());

        drop(lease);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while unit.path().exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        sweeper.shutdown().await;
        assert!(!unit.path().exists());
    }
}
