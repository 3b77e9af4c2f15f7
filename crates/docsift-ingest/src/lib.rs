//! Document ingestion for docsift.
//!
//! Documents move through `PENDING → PROCESSING → COMPLETE | FAILED`. The
//! coordinator records a submission and queues a job; a bounded pool of
//! workers runs extraction, embedding and the vector write, committing each
//! status change through the [`JobStateMachine`].
//!
//! # Components
//!
//! - [`IngestionCoordinator`]: submit, resubmit, status, delete, recovery
//! - [`WorkerPool`]: bounded workers with per-job isolation and timeouts
//! - [`JobStateMachine`]: compare-and-swap status transitions
//! - [`IngestUpdate`]: events emitted while jobs run
//!
//! # Example
//!
//! ```rust,ignore
//! use docsift_ingest::{IngestConfig, IngestServices, IngestionCoordinator};
//!
//! let coordinator = IngestionCoordinator::start(services, IngestConfig::default()).await?;
//! coordinator.recover().await?;
//!
//! let record = coordinator.submit(&bytes, "pdf", "report.pdf").await?;
//! let done = coordinator.wait_for(record.id, Duration::from_secs(60)).await?;
//! println!("{} is {}", done.original_name, done.status);
//! ```

pub mod config;
pub mod coordinator;
pub mod job;
pub mod retry;
pub mod state;
pub mod worker;

pub use config::IngestConfig;
pub use coordinator::{IngestServices, IngestionCoordinator, RecoveryReport, INTERRUPTED_DETAIL};
pub use job::{IngestJob, IngestUpdate, JobOutcome};
pub use retry::RetryPolicy;
pub use state::{JobStateMachine, Transition};
pub use worker::{WorkerContext, WorkerPool};
