//! Warden Supervisor - Observable task execution
//!
//! Region mutations, persistence and migrations run as supervised tasks so
//! the host's control thread never waits on I/O. The supervisor provides:
//!
//! - A bounded worker pool ([`SupervisorConfig::workers`])
//! - Lifecycle tracking (`Queued -> Running -> Succeeded | Failed | Cancelled`)
//! - Cooperative cancellation through [`CancelToken`]
//! - Submission-time conflict checks ([`SubmitOptions`]) instead of locks
//!   held for a task's lifetime
//! - A fail-fast single-slot guard ([`ExclusiveSlot`]) and a fixed-rate
//!   [`Sampler`]

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cancel;
pub mod error;
pub mod sampler;
pub mod slot;
pub mod supervisor;
pub mod task;

pub use cancel::{CancelCause, CancelToken};
pub use error::{Result, SupervisorError, TaskError};
pub use sampler::{Probe, SampleReport, Sampler};
pub use slot::{ExclusiveSlot, SlotGuard};
pub use supervisor::{SubmitOptions, Supervisor, SupervisorConfig, TaskHandle};
pub use task::{TaskId, TaskInfo, TaskState};
