//! Bounded FIFO of recent diffs used as rolling context for completions.

use shared_types::DiffRecord;

/// Append `diff` and evict from the front until at most `max_size` remain.
pub fn push(mut queue: Vec<DiffRecord>, diff: DiffRecord, max_size: usize) -> Vec<DiffRecord> {
    queue.push(diff);
    if queue.len() > max_size {
        let excess = queue.len() - max_size;
        queue.drain(..excess);
    }
    queue
}

/// Up to `history` queued diffs preceding `latest`, followed by `latest`.
///
/// `latest` is usually already at the back of the queue; it is never
/// repeated.
pub fn recent_context(
    queue: &[DiffRecord],
    latest: &DiffRecord,
    history: usize,
) -> Vec<DiffRecord> {
    let earlier: Vec<&DiffRecord> = queue.iter().filter(|d| d.id != latest.id).collect();
    let skip = earlier.len().saturating_sub(history);
    earlier
        .into_iter()
        .skip(skip)
        .cloned()
        .chain(std::iter::once(latest.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(n: i64) -> DiffRecord {
        DiffRecord {
            id: format!("d{n}"),
            timestamp: n,
            changes: format!("+ line {n}"),
        }
    }

    fn ids(queue: &[DiffRecord]) -> Vec<&str> {
        queue.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_seven_pushes_keep_last_five_in_order() {
        let mut queue = Vec::new();
        for n in 1..=7 {
            queue = push(queue, diff(n), 5);
        }
        assert_eq!(ids(&queue), vec!["d3", "d4", "d5", "d6", "d7"]);
    }

    #[test]
    fn test_queue_never_exceeds_max_size() {
        for max in 0..4 {
            let mut queue = Vec::new();
            for n in 0..10 {
                queue = push(queue, diff(n), max);
                assert!(queue.len() <= max);
            }
        }
    }

    #[test]
    fn test_shrinking_max_size_evicts_oldest_first() {
        let queue = (1..=5).fold(Vec::new(), |q, n| push(q, diff(n), 5));
        let queue = push(queue, diff(6), 2);
        assert_eq!(ids(&queue), vec!["d5", "d6"]);
    }

    #[test]
    fn test_recent_context_takes_three_before_latest() {
        let queue: Vec<_> = (1..=5).map(diff).collect();
        let latest = diff(5);
        let context = recent_context(&queue, &latest, 3);
        assert_eq!(ids(&context), vec!["d2", "d3", "d4", "d5"]);
    }

    #[test]
    fn test_recent_context_with_latest_not_queued() {
        let queue: Vec<_> = (1..=2).map(diff).collect();
        let context = recent_context(&queue, &diff(9), 3);
        assert_eq!(ids(&context), vec!["d1", "d2", "d9"]);
    }
}
