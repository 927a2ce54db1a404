//! Node-side replication: fetching from seeds, applying change sets, and
//! the loop that schedules both.

pub mod apply;
pub mod backoff;
pub mod fetcher;
pub mod state;
pub mod update_loop;

pub use apply::{Applier, ApplyReport, FileSource};
pub use fetcher::{Fetcher, SeedClient, SeedFileSource};
pub use state::{LoopPhase, NodeStatus, SeedHealth, SyncSummary};
pub use update_loop::UpdateLoop;
