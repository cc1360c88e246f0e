//! Core result types for program executions.

use {
    crate::trace::parse_transaction_logs,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Owner reported for addresses that do not exist on chain (the system
/// program).
pub const DEFAULT_OWNER: &str = "11111111111111111111111111111111";

/// The state of one account at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    /// Base58 address of the account.
    pub address: String,
    /// Human-readable role of the account within the request.
    pub label: String,
    /// Base58 address of the owning program.
    pub owner: String,
    /// Native balance.
    pub lamports: u64,
    /// Length of the account's data, in bytes.
    pub data_size: u64,
    /// Decoded account fields, when the layout is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl AccountSnapshot {
    /// Snapshot of an address with no live account behind it.
    pub fn empty(address: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: label.into(),
            owner: DEFAULT_OWNER.to_string(),
            lamports: 0,
            data_size: 0,
            data: None,
        }
    }
}

/// An after-execution snapshot, annotated with its diff against the
/// before-execution snapshot of the same address.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshotAfter {
    #[serde(flatten)]
    pub snapshot: AccountSnapshot,
    pub changes: Vec<String>,
}

/// The human-readable changes detected for one address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiffEntry {
    pub address: String,
    pub changes: Vec<String>,
}

/// Where a traced program invocation ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    /// The invocation was entered but no outcome line was seen.
    Invoke,
    Success,
    Failed,
}

/// One program invocation frame, reconstructed from log lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Base58 program id.
    pub program: String,
    /// Invocation depth, starting at 1 for top-level instructions.
    pub depth: u32,
    pub status: TraceStatus,
    /// Log lines emitted while this frame was the innermost open frame.
    pub logs: Vec<String>,
}

/// The overall result of one execution request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    /// Name of the scenario that ran, or `custom-transaction`.
    pub scenario: String,
    pub accounts_before: Vec<AccountSnapshot>,
    pub accounts_after: Vec<AccountSnapshotAfter>,
    pub logs: Vec<String>,
    pub compute_units: u64,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A failed result carrying only the scenario name and the error.
    pub fn failure(scenario: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            scenario: scenario.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attach program logs, replacing the trace with one parsed from them.
    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.trace = parse_transaction_logs(&logs);
        self.logs = logs;
        self
    }

    /// Get an after-execution snapshot by its address.
    pub fn get_account_after(&self, address: &str) -> Option<&AccountSnapshotAfter> {
        self.accounts_after
            .iter()
            .find(|account| account.snapshot.address == address)
    }
}
