//! Daemon lifecycle: open stores, verify storage, sweep on a timer

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zkshare_core::config::ZkConfig;
use zkshare_storage::ObjectStore;
use zkshare_store::{open_record_store, LifecycleStore, PurgeReport};

use crate::metrics::{HealthState, SweepMetrics};

pub async fn run(config: ZkConfig, cancel: CancellationToken) -> Result<()> {
    info!("daemon starting");

    let (store, operator) = open(&config).await?;

    let mut registry = Registry::default();
    let metrics = SweepMetrics::register(&mut registry);

    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let state = HealthState {
            registry: Arc::new(registry),
            operator,
        };
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, state, cancel).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    let period = Duration::from_secs(config.daemon.purge_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "expiry sweeper running");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = sweep(&store, &metrics).await {
                    warn!(error = %e, "expiry sweep failed");
                }
            }
        }
    }

    store.records().flush().context("flushing record store")?;
    info!("daemon stopped");
    Ok(())
}

/// Single sweep for cron-style deployments
pub async fn purge_once(config: ZkConfig) -> Result<()> {
    let (store, _) = open(&config).await?;
    let report = store.purge().await.context("expiry sweep")?;
    store.records().flush().context("flushing record store")?;
    info!(
        shares = report.shares,
        handshakes = report.handshakes,
        "purge complete"
    );
    Ok(())
}

async fn open(config: &ZkConfig) -> Result<(LifecycleStore, opendal::Operator)> {
    let records = open_record_store(&config.store).with_context(|| {
        format!("opening record store {}", config.store.path.display())
    })?;
    info!(backend = ?config.store.backend, path = %config.store.path.display(), "record store opened");

    let operator = zkshare_storage::build_operator(&config.storage)?;
    match zkshare_storage::check_health(&operator).await {
        Ok(()) => info!(backend = ?config.storage.backend, "object storage: connected"),
        // sweeps retry on every tick
        Err(e) => warn!(backend = ?config.storage.backend, "object storage: {e}"),
    }

    let store = LifecycleStore::new(records, ObjectStore::new(operator.clone()));
    Ok((store, operator))
}

pub(crate) async fn sweep(store: &LifecycleStore, metrics: &SweepMetrics) -> Result<PurgeReport> {
    let report = store.purge().await?;
    let active = store.list_active_shares()?.len();
    metrics.record(&report, active);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkshare_core::config::{ObjectBackend, StoreBackend};
    use zkshare_store::{NewHandshake, NewShare};

    fn config(dir: &tempfile::TempDir) -> ZkConfig {
        let mut config = ZkConfig::default();
        config.store.backend = StoreBackend::Json;
        config.store.path = dir.path().join("records.json");
        config.storage.backend = ObjectBackend::Fs;
        config.storage.root = dir.path().join("objects").display().to_string();
        config.daemon.metrics_addr = None;
        config
    }

    #[tokio::test]
    async fn sweep_updates_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = open(&config(&dir)).await.unwrap();

        store
            .create_share(
                NewShare {
                    filename: "gone".into(),
                    expires_in: Some(Duration::from_secs(0)),
                    ..Default::default()
                },
                b"a".to_vec(),
            )
            .await
            .unwrap();
        store
            .create_share(
                NewShare {
                    filename: "kept".into(),
                    ..Default::default()
                },
                b"b".to_vec(),
            )
            .await
            .unwrap();
        store
            .create_handshake(NewHandshake {
                code: "RAVEN".into(),
                receiver_public_key: "pk".into(),
                ttl: Duration::from_secs(0),
            })
            .unwrap();

        // expiry is strict, so wait out the current second
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let metrics = SweepMetrics::default();
        let report = sweep(&store, &metrics).await.unwrap();
        assert_eq!(report, PurgeReport { shares: 1, handshakes: 1 });
        assert_eq!(metrics.purged_shares.get(), 1);
        assert_eq!(metrics.purged_handshakes.get(), 1);
        assert_eq!(metrics.active_shares.get(), 1);
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        run(config(&dir), cancel).await.unwrap();
        assert!(dir.path().join("objects").exists());
    }

    #[tokio::test]
    async fn purge_once_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        purge_once(config(&dir)).await.unwrap();
    }
}
