//! Node-side scheduler: a heartbeat timer and a sync timer against the
//! active seed, with failover and backoff.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::apply::Applier;
use super::backoff::Backoff;
use super::fetcher::{SeedClient, SeedFileSource};
use super::state::{NodeState, NodeStatus, SyncSummary};
use crate::config::Config;
use crate::manifest::{diff, ManifestBuilder};
use crate::utils::{duration, Result, SeedSyncError};

pub struct UpdateLoop<C: SeedClient> {
    config: Arc<Config>,
    client: Arc<C>,
    state: NodeState,
    backoff: Backoff,
    status: watch::Sender<NodeStatus>,
    cancel: CancellationToken,
}

impl<C: SeedClient> UpdateLoop<C> {
    pub fn new(
        config: Arc<Config>,
        client: Arc<C>,
        local_version: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if config.node.seed_servers.is_empty() {
            return Err(SeedSyncError::Config(
                "at least one seed server is required to run as a node".to_string(),
            ));
        }
        config.validate()?;

        let state = NodeState::new(config.node.seed_servers.clone().into(), local_version);
        let (status, _) = watch::channel(state.snapshot());

        Ok(Self {
            backoff: Backoff::for_sync_interval(config.node.update_interval),
            config,
            client,
            state,
            status,
            cancel,
        })
    }

    /// Receiver for status snapshots, updated on every state change.
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> NodeStatus {
        self.status.borrow().clone()
    }

    fn publish(&self) {
        self.status.send_replace(self.state.snapshot());
    }

    /// Contact the active seed once. On failure the next seed becomes
    /// active. Returns whether the seed answered and is compatible.
    pub async fn heartbeat_tick(&mut self) -> bool {
        let seed = self.state.active_seed().to_string();
        self.state.set_heartbeating(true);
        self.publish();

        let result = self.client.heartbeat(&seed).await;
        self.state.set_heartbeating(false);

        let healthy = match result {
            Ok(heartbeat) => {
                debug!(%seed, version = %heartbeat.version, "Heartbeat ok");
                self.state.heartbeat_succeeded(&heartbeat.version);
                true
            }
            Err(e) => {
                warn!(%seed, error = %e, "Heartbeat failed");
                if self.state.heartbeat_failed(e.to_string()) {
                    info!(from = %seed, to = %self.state.active_seed(), "Failing over to next seed");
                } else {
                    error!("All seeds are unhealthy, retrying from the top of the list");
                }
                false
            }
        };

        self.publish();
        healthy
    }

    /// Run one full sync against the active seed and wait for it.
    pub async fn sync_once(&mut self) -> Result<SyncSummary> {
        let seed = self.state.active_seed().to_string();
        self.state.set_syncing(true);
        self.publish();

        let result = sync_from(
            Arc::clone(&self.config),
            Arc::clone(&self.client),
            seed,
            self.cancel.clone(),
        )
        .await;

        self.finish_sync(&result);
        result
    }

    /// Record a sync result and return the delay before the next attempt.
    fn finish_sync(&mut self, result: &Result<SyncSummary>) -> Duration {
        self.state.set_syncing(false);

        let delay = match result {
            Ok(summary) => {
                self.backoff.reset();
                info!(
                    seed = %summary.seed,
                    fetched = summary.fetched,
                    deleted = summary.deleted,
                    failed = summary.failed,
                    bytes = summary.bytes,
                    "Sync complete"
                );
                self.state.sync_succeeded(summary.clone());
                self.config.node.update_interval
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    error = %e,
                    attempt = self.backoff.failures(),
                    retry_in = %duration::format(delay),
                    "Sync failed"
                );
                self.state.sync_failed(e.to_string());
                delay
            }
        };

        self.publish();
        delay
    }

    /// Drive both timers until the cancellation token fires. A sync runs as
    /// its own task so heartbeats keep their cadence while it is in flight.
    pub async fn run(mut self) {
        info!(
            seeds = ?self.config.node.seed_servers,
            heartbeat = %duration::format(self.config.node.heartbeat_interval),
            update = %duration::format(self.config.node.update_interval),
            "Update loop started"
        );

        let cancel = self.cancel.clone();
        let mut heartbeat = tokio::time::interval(self.config.node.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut next_sync = Instant::now();
        let mut in_flight: Option<JoinHandle<Result<SyncSummary>>> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = heartbeat.tick() => {
                    self.heartbeat_tick().await;
                }

                _ = tokio::time::sleep_until(next_sync), if in_flight.is_none() => {
                    let seed = self.state.active_seed().to_string();
                    self.state.set_syncing(true);
                    self.publish();
                    in_flight = Some(tokio::spawn(sync_from(
                        Arc::clone(&self.config),
                        Arc::clone(&self.client),
                        seed,
                        cancel.clone(),
                    )));
                }

                Some(joined) = futures_util::future::OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    let result = joined.unwrap_or_else(|e| Err(SeedSyncError::Task(e.to_string())));
                    next_sync = Instant::now() + self.finish_sync(&result);
                }
            }
        }

        // The applier stops at entry boundaries once cancelled; let it finish
        // so no temp file is left half written.
        if let Some(handle) = in_flight.take() {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(SeedSyncError::Task(e.to_string())));
            self.finish_sync(&result);
        }

        info!("Update loop stopped");
    }
}

async fn sync_from<C: SeedClient>(
    config: Arc<Config>,
    client: Arc<C>,
    seed: String,
    cancel: CancellationToken,
) -> Result<SyncSummary> {
    let remote = tokio::select! {
        remote = client.fetch_manifest(&seed) => remote?,
        _ = cancel.cancelled() => {
            return Err(SeedSyncError::Task("sync cancelled before the manifest arrived".to_string()));
        }
    };

    let root = config.root_dir.clone();
    let local = tokio::task::spawn_blocking(move || {
        ManifestBuilder::new(root, crate::protocol::VERSION).build()
    })
    .await
    .map_err(|e| SeedSyncError::Task(e.to_string()))??;

    let changes = diff(&remote, &local.manifest);
    debug!(
        %seed,
        fetch = changes.to_fetch.len(),
        delete = changes.to_delete.len(),
        unchanged = changes.unchanged.len(),
        bytes = changes.fetch_bytes(),
        "Computed change set"
    );

    let source = Arc::new(SeedFileSource::new(client, seed.clone()));
    let report = Applier::new(&config.root_dir, config.node.max_concurrent_fetches)
        .with_cancel(cancel)
        .apply(&changes, source)
        .await?;

    Ok(SyncSummary::new(&seed, changes.unchanged.len(), Some(&report)))
}
