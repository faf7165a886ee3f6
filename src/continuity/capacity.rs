//! Capacity policy: pure trimming functions for each bounded collection.
//!
//! Exceeding a limit is never an error. Notes and events are trimmed FIFO;
//! active threads keep the top `limit` by `(importance, created_at)`.
//! Evicted threads are dropped, not archived.

use std::collections::VecDeque;

use super::PlotThread;

/// Drop the oldest entries until at most `limit` remain. Returns how many were dropped.
pub fn trim_fifo<T>(items: &mut VecDeque<T>, limit: usize) -> usize {
    let excess = items.len().saturating_sub(limit);
    items.drain(..excess);
    excess
}

/// Rank used for thread retention, higher is kept first.
pub fn thread_rank(thread: &PlotThread) -> (u8, u32) {
    (thread.importance, thread.created_at)
}

/// Keep the `limit` highest-ranked threads, preserving their relative order.
///
/// Ties on `(importance, created_at)` keep the earlier-inserted thread.
/// Returns the evicted threads.
pub fn retain_top_threads(threads: &mut Vec<PlotThread>, limit: usize) -> Vec<PlotThread> {
    if threads.len() <= limit {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..threads.len()).collect();
    // Stable sort: equal ranks stay in insertion order.
    order.sort_by(|&a, &b| thread_rank(&threads[b]).cmp(&thread_rank(&threads[a])));

    let mut keep = vec![false; threads.len()];
    for &index in order.iter().take(limit) {
        keep[index] = true;
    }

    let mut kept = Vec::with_capacity(limit);
    let mut evicted = Vec::new();
    for (thread, keep) in threads.drain(..).zip(keep) {
        if keep {
            kept.push(thread);
        } else {
            evicted.push(thread);
        }
    }
    *threads = kept;
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(text: &str, importance: u8, created_at: u32) -> PlotThread {
        PlotThread::new(text, created_at, importance)
    }

    #[test]
    fn test_trim_fifo_drops_oldest() {
        let mut notes: VecDeque<u32> = (1..=13).collect();
        let dropped = trim_fifo(&mut notes, 10);
        assert_eq!(dropped, 3);
        assert_eq!(notes.front(), Some(&4));
        assert_eq!(notes.back(), Some(&13));
    }

    #[test]
    fn test_trim_fifo_under_limit_is_noop() {
        let mut events: VecDeque<u32> = (1..=5).collect();
        assert_eq!(trim_fifo(&mut events, 15), 0);
        assert_eq!(events.len(), 5);
    }

    #[test]
    fn test_retain_top_threads_under_limit() {
        let mut threads = vec![thread("a", 3, 1), thread("b", 9, 2)];
        assert!(retain_top_threads(&mut threads, 30).is_empty());
        assert_eq!(threads.len(), 2);
    }

    #[test]
    fn test_retain_prefers_importance_then_recency() {
        let mut threads = vec![
            thread("old-high", 8, 1),
            thread("low", 2, 9),
            thread("new-high", 8, 5),
            thread("mid", 5, 3),
        ];
        let evicted = retain_top_threads(&mut threads, 2);
        let kept: Vec<&str> = threads.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(kept, vec!["old-high", "new-high"]);
        assert_eq!(evicted.len(), 2);
    }

    #[test]
    fn test_retain_keeps_insertion_order() {
        let mut threads = vec![thread("c", 9, 3), thread("x", 1, 1), thread("a", 7, 1)];
        retain_top_threads(&mut threads, 2);
        assert_eq!(threads[0].text, "c");
        assert_eq!(threads[1].text, "a");
    }
}
