//! Cooperative scheduling for the HLOD hierarchy.
//!
//! # Invariants
//! - Tasks run one at a time, in FIFO order, on the thread that owns the tree.
//! - A quantum never exceeds its budget by more than one step.
//! - At most one gated background job executes at any moment, process-wide.

mod scheduler;
mod worker;

pub use scheduler::{QuantumHistory, QuantumReport, Scheduler, SchedulerStats, Step, Task};
pub use worker::{BackgroundJob, JobPoll, gate_busy, run_gated};

pub fn crate_info() -> &'static str {
    "hlod-sched v0.1.0"
}
