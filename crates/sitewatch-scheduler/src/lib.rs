//! sitewatch-scheduler — serial check queue with retry ladder and
//! notification dedup.
//!
//! # Architecture
//!
//! ```text
//! ProducerCron ──┐
//!                ├─► SchedulerHandle ─► SerialScheduler (one worker)
//! ChangeListener ┘                            │
//!                                             ▼
//!                                      CheckLifecycle
//!                             Prober · RetryLadder · DedupGate
//!                                                      │
//!                                               Store · Notifier
//! ```

pub mod dedup;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod listener;
pub mod producer;
pub mod queue;
pub mod retry;

pub use dedup::{DedupGate, DedupReport};
pub use error::{SchedulerError, SchedulerResult};
pub use health::HealthPing;
pub use lifecycle::{CheckLifecycle, JobOutcome, LifecycleConfig, STUCK_CALL_GRACE};
pub use listener::ChangeListener;
pub use producer::{ProducerCron, seed};
pub use queue::{JobHandle, JobResult, SchedulerHandle, SerialScheduler};
pub use retry::{RetryDecision, RetryLadder};
