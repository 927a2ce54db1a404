//! Node-side replication state.
//!
//! [`NodeState`] is owned by the update loop alone. Everyone else (the API's
//! `/status` handler, tests) reads [`NodeStatus`] snapshots published over a
//! `watch` channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::apply::ApplyReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Heartbeating,
    Syncing,
    /// Every seed failed its last heartbeat, or the last sync failed.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedHealth {
    pub address: String,
    pub healthy: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub remote_version: Option<String>,
}

/// Summary of one completed sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub seed: String,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl SyncSummary {
    pub fn new(seed: &str, unchanged: usize, report: Option<&ApplyReport>) -> Self {
        use super::apply::{EntryAction, EntryStatus};

        let count = |action: EntryAction| {
            report.map_or(0, |r| {
                r.outcomes
                    .iter()
                    .filter(|o| o.action == action && o.status == EntryStatus::Applied)
                    .count()
            })
        };

        Self {
            seed: seed.to_string(),
            finished_at: Utc::now(),
            fetched: count(EntryAction::Fetch),
            deleted: count(EntryAction::Delete),
            unchanged,
            failed: report.map_or(0, ApplyReport::failed),
            bytes: report.map_or(0, ApplyReport::bytes_fetched),
        }
    }
}

/// Immutable snapshot of [`NodeState`].
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub phase: LoopPhase,
    pub active_seed: String,
    pub seeds: Vec<SeedHealth>,
    pub local_version: String,
    pub remote_version: Option<String>,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub consecutive_sync_failures: u32,
    pub last_sync: Option<SyncSummary>,
}

pub struct NodeState {
    seeds: Arc<[String]>,
    health: Vec<SeedHealth>,
    active: usize,
    /// Heartbeat failures since the last success; reaching the seed count
    /// means every seed was tried and found unhealthy.
    round_failures: usize,
    all_unhealthy: bool,
    heartbeating: bool,
    syncing: bool,
    local_version: String,
    remote_version: Option<String>,
    last_successful_sync: Option<DateTime<Utc>>,
    last_sync_error: Option<String>,
    consecutive_sync_failures: u32,
    last_sync: Option<SyncSummary>,
}

impl NodeState {
    /// `seeds` must be non-empty; configuration validation guarantees it.
    pub fn new(seeds: Arc<[String]>, local_version: impl Into<String>) -> Self {
        let health = seeds
            .iter()
            .map(|address| SeedHealth {
                address: address.clone(),
                healthy: true,
                last_seen: None,
                last_error: None,
                remote_version: None,
            })
            .collect();

        Self {
            seeds,
            health,
            active: 0,
            round_failures: 0,
            all_unhealthy: false,
            heartbeating: false,
            syncing: false,
            local_version: local_version.into(),
            remote_version: None,
            last_successful_sync: None,
            last_sync_error: None,
            consecutive_sync_failures: 0,
            last_sync: None,
        }
    }

    pub fn active_seed(&self) -> &str {
        &self.seeds[self.active]
    }

    pub fn phase(&self) -> LoopPhase {
        if self.heartbeating {
            LoopPhase::Heartbeating
        } else if self.syncing {
            LoopPhase::Syncing
        } else if self.all_unhealthy || self.consecutive_sync_failures > 0 {
            LoopPhase::Error
        } else {
            LoopPhase::Idle
        }
    }

    pub fn set_heartbeating(&mut self, active: bool) {
        self.heartbeating = active;
    }

    pub fn set_syncing(&mut self, active: bool) {
        self.syncing = active;
    }

    pub fn heartbeat_succeeded(&mut self, remote_version: &str) {
        let health = &mut self.health[self.active];
        health.healthy = true;
        health.last_seen = Some(Utc::now());
        health.last_error = None;
        health.remote_version = Some(remote_version.to_string());

        self.remote_version = Some(remote_version.to_string());
        self.round_failures = 0;
        self.all_unhealthy = false;
    }

    /// Mark the active seed unhealthy and move to the next one, wrapping.
    /// When every seed has failed in this round, go back to the top of the
    /// list and report `false`.
    pub fn heartbeat_failed(&mut self, error: String) -> bool {
        let health = &mut self.health[self.active];
        health.healthy = false;
        health.last_error = Some(error);

        self.round_failures += 1;
        if self.round_failures >= self.seeds.len() {
            self.round_failures = 0;
            self.all_unhealthy = true;
            self.active = 0;
            false
        } else {
            self.active = (self.active + 1) % self.seeds.len();
            true
        }
    }

    pub fn sync_succeeded(&mut self, summary: SyncSummary) {
        self.last_successful_sync = Some(summary.finished_at);
        self.last_sync_error = None;
        self.consecutive_sync_failures = 0;
        self.last_sync = Some(summary);
    }

    pub fn sync_failed(&mut self, error: String) {
        self.last_sync_error = Some(error);
        self.consecutive_sync_failures = self.consecutive_sync_failures.saturating_add(1);
    }

    pub fn snapshot(&self) -> NodeStatus {
        NodeStatus {
            phase: self.phase(),
            active_seed: self.active_seed().to_string(),
            seeds: self.health.clone(),
            local_version: self.local_version.clone(),
            remote_version: self.remote_version.clone(),
            last_successful_sync: self.last_successful_sync,
            last_sync_error: self.last_sync_error.clone(),
            consecutive_sync_failures: self.consecutive_sync_failures,
            last_sync: self.last_sync.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(seeds: &[&str]) -> NodeState {
        let seeds: Vec<String> = seeds.iter().map(|s| s.to_string()).collect();
        NodeState::new(seeds.into(), "1.0")
    }

    #[test]
    fn test_failover_advances_in_order() {
        let mut state = state(&["a", "b", "c"]);
        assert_eq!(state.active_seed(), "a");

        assert!(state.heartbeat_failed("down".into()));
        assert_eq!(state.active_seed(), "b");

        state.heartbeat_succeeded("1.0");
        assert_eq!(state.active_seed(), "b");
        assert_eq!(state.phase(), LoopPhase::Idle);

        let snapshot = state.snapshot();
        assert!(!snapshot.seeds[0].healthy);
        assert!(snapshot.seeds[1].healthy);
        assert_eq!(snapshot.remote_version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_all_unhealthy_restarts_from_top() {
        let mut state = state(&["a", "b"]);

        assert!(state.heartbeat_failed("down".into()));
        assert_eq!(state.active_seed(), "b");
        assert!(!state.heartbeat_failed("down".into()));
        assert_eq!(state.active_seed(), "a");
        assert_eq!(state.phase(), LoopPhase::Error);

        // Next round tries the list again from the top.
        assert!(state.heartbeat_failed("still down".into()));
        assert_eq!(state.active_seed(), "b");
        state.heartbeat_succeeded("1.0");
        assert_eq!(state.phase(), LoopPhase::Idle);
    }

    #[test]
    fn test_single_seed_wraps_onto_itself() {
        let mut state = state(&["only"]);
        assert!(!state.heartbeat_failed("down".into()));
        assert_eq!(state.active_seed(), "only");
    }

    #[test]
    fn test_sync_bookkeeping() {
        let mut state = state(&["a"]);
        assert!(state.snapshot().last_successful_sync.is_none());

        state.sync_failed("boom".into());
        state.sync_failed("boom".into());
        assert_eq!(state.snapshot().consecutive_sync_failures, 2);
        assert_eq!(state.phase(), LoopPhase::Error);

        state.sync_succeeded(SyncSummary::new("a", 3, None));
        let snapshot = state.snapshot();
        assert!(snapshot.last_successful_sync.is_some());
        assert_eq!(snapshot.consecutive_sync_failures, 0);
        assert_eq!(snapshot.last_sync.unwrap().unchanged, 3);
        assert_eq!(state.phase(), LoopPhase::Idle);
    }
}
