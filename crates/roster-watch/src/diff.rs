//! Change detection between two roster snapshots.

use crate::types::{ChangeSet, CounterDecrease, CounterIncrease, Snapshot, StatusChange};

/// Compare a baseline snapshot with a fresh one.
///
/// Every sequence in the result is ordered by member name, so the same two
/// snapshots always produce the same notifications. A towed counter that went
/// down is not an increase; it only shows up in `counter_decreases`.
pub fn compute_changes(previous: &Snapshot, current: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for name in current.names() {
        if !previous.contains(name) {
            changes.joined.insert(name.to_string());
        }
    }
    for name in previous.names() {
        if !current.contains(name) {
            changes.left.insert(name.to_string());
        }
    }

    for now in current.records() {
        let Some(before) = previous.get(&now.name) else {
            continue;
        };

        if now.towed_count > before.towed_count {
            changes.counter_increases.push(CounterIncrease {
                name: now.name.clone(),
                from: before.towed_count,
                to: now.towed_count,
                delta: now.towed_count - before.towed_count,
            });
        } else if now.towed_count < before.towed_count {
            changes.counter_decreases.push(CounterDecrease {
                name: now.name.clone(),
                from: before.towed_count,
                to: now.towed_count,
            });
        }

        if before.status.is_known() && now.status.is_known() && before.status != now.status {
            changes.status_changes.push(StatusChange {
                name: now.name.clone(),
                from: before.status,
                to: now.status,
            });
        }
    }

    changes
}
