//! Results of program executions: account snapshots, state diffs and the
//! invocation trace reconstructed from program logs.

pub mod diff;
pub mod trace;
pub mod types;

pub use {
    diff::{attach_changes, compute_state_diff},
    trace::parse_transaction_logs,
    types::{
        AccountSnapshot, AccountSnapshotAfter, ExecutionResult, StateDiffEntry, TraceEntry,
        TraceStatus,
    },
};
