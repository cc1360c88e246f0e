//! Before/after comparison of account snapshots.

use crate::types::{AccountSnapshot, AccountSnapshotAfter, StateDiffEntry};

/// Compute the human-readable changes between two sets of snapshots.
///
/// Every address in `after` is compared against the snapshot with the same
/// address in `before`:
///
/// * Absent from `before`: the account was created.
/// * Lamports differ: the signed direction and exact magnitude are reported.
/// * Data size differs: the old and new sizes are reported.
///
/// Addresses with no detected change are left out of the result entirely.
pub fn compute_state_diff(
    before: &[AccountSnapshot],
    after: &[AccountSnapshot],
) -> Vec<StateDiffEntry> {
    after
        .iter()
        .filter_map(|after_account| {
            let changes = match before
                .iter()
                .find(|account| account.address == after_account.address)
            {
                None => vec!["Account created".to_string()],
                Some(before_account) => account_changes(before_account, after_account),
            };
            (!changes.is_empty()).then(|| StateDiffEntry {
                address: after_account.address.clone(),
                changes,
            })
        })
        .collect()
}

fn account_changes(before: &AccountSnapshot, after: &AccountSnapshot) -> Vec<String> {
    let mut changes = Vec::new();
    if after.lamports > before.lamports {
        changes.push(format!(
            "Lamports increased by {}",
            after.lamports - before.lamports
        ));
    } else if after.lamports < before.lamports {
        changes.push(format!(
            "Lamports decreased by {}",
            before.lamports - after.lamports
        ));
    }
    if before.data_size != after.data_size {
        changes.push(format!(
            "Data size changed from {} to {}",
            before.data_size, after.data_size
        ));
    }
    changes
}

/// Annotate each after-execution snapshot with its diff entry's changes, or
/// an empty change list when the diff has nothing for that address.
pub fn attach_changes(
    after: Vec<AccountSnapshot>,
    diff: &[StateDiffEntry],
) -> Vec<AccountSnapshotAfter> {
    after
        .into_iter()
        .map(|snapshot| {
            let changes = diff
                .iter()
                .find(|entry| entry.address == snapshot.address)
                .map(|entry| entry.changes.clone())
                .unwrap_or_default();
            AccountSnapshotAfter { snapshot, changes }
        })
        .collect()
}
