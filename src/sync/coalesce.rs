//! Per-key trailing debounce.
//!
//! A burst of edits to one key collapses into one flush carrying the last
//! value. Each staged edit pushes the key's deadline out by the window. The
//! queue never reads a clock: callers pass `now`, which keeps it testable
//! and lets the async driver decide how to wait.

use std::hash::Hash;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

#[derive(Debug, Clone)]
struct Pending<V> {
    value: V,
    /// Value before the first edit of the burst
    prior: V,
    deadline: Instant,
    edits: u32,
}

/// A burst that is ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flush<K, V> {
    pub key: K,
    pub value: V,
    pub prior: V,
    /// How many edits were collapsed into this flush
    pub edits: u32,
}

#[derive(Debug, Clone)]
pub struct Coalescer<K, V> {
    window: Duration,
    pending: IndexMap<K, Pending<V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Coalescer<K, V> {
    pub fn new(window: Duration) -> Self {
        Coalescer {
            window,
            pending: IndexMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an edit. `prior` is only kept for the first edit of a burst.
    pub fn stage(&mut self, key: K, value: V, prior: V, now: Instant) {
        let deadline = now + self.window;
        match self.pending.get_mut(&key) {
            Some(pending) => {
                pending.value = value;
                pending.deadline = deadline;
                pending.edits += 1;
            }
            None => {
                self.pending.insert(
                    key,
                    Pending {
                        value,
                        prior,
                        deadline,
                        edits: 1,
                    },
                );
            }
        }
    }

    /// Remove and return every burst whose deadline is at or before `now`,
    /// in staging order.
    pub fn take_due(&mut self, now: Instant) -> Vec<Flush<K, V>> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        due.into_iter()
            .filter_map(|key| {
                let pending = self.pending.shift_remove(&key)?;
                Some(into_flush(key, pending))
            })
            .collect()
    }

    /// Remove and return every pending burst regardless of deadline.
    pub fn take_all(&mut self) -> Vec<Flush<K, V>> {
        self.pending
            .drain(..)
            .map(|(key, pending)| into_flush(key, pending))
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// The newest staged value for `key`, if a burst is open.
    pub fn pending_value(&self, key: &K) -> Option<&V> {
        self.pending.get(key).map(|p| &p.value)
    }

    /// Open bursts with their newest values, in staging order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.pending.iter().map(|(k, p)| (k, &p.value))
    }

    /// Drop a pending burst without flushing it. Returns it so the caller can
    /// restore the prior value.
    pub fn discard(&mut self, key: &K) -> Option<Flush<K, V>> {
        let pending = self.pending.shift_remove(key)?;
        Some(into_flush(key.clone(), pending))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn into_flush<K, V>(key: K, pending: Pending<V>) -> Flush<K, V> {
    Flush {
        key,
        value: pending.value,
        prior: pending.prior,
        edits: pending.edits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WINDOW: Duration = Duration::from_millis(400);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_collapses_to_last_value() {
        let t0 = Instant::now();
        let mut q = Coalescer::new(WINDOW);
        q.stage("sp", 2, 1, t0);
        q.stage("sp", 3, 2, t0 + ms(100));
        q.stage("sp", 5, 3, t0 + ms(200));

        assert!(q.take_due(t0 + ms(500)).is_empty());
        let flushed = q.take_due(t0 + ms(600));
        assert_eq!(
            flushed,
            vec![Flush {
                key: "sp",
                value: 5,
                prior: 1,
                edits: 3,
            }]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let t0 = Instant::now();
        let mut q = Coalescer::new(WINDOW);
        q.stage((1, "sp"), 2, 1, t0);
        q.stage((2, "sp"), 8, 5, t0 + ms(300));

        let first = q.take_due(t0 + ms(400));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].key, (1, "sp"));
        assert!(q.is_pending(&(2, "sp")));
        assert_eq!(q.next_deadline(), Some(t0 + ms(700)));
    }

    #[test]
    fn new_burst_after_flush_captures_fresh_prior() {
        let t0 = Instant::now();
        let mut q = Coalescer::new(WINDOW);
        q.stage("sp", 2, 1, t0);
        q.take_due(t0 + WINDOW);
        q.stage("sp", 4, 2, t0 + ms(1000));
        let flushed = q.take_all();
        assert_eq!(flushed[0].prior, 2);
        assert_eq!(flushed[0].edits, 1);
    }

    #[test]
    fn discard_returns_prior() {
        let t0 = Instant::now();
        let mut q = Coalescer::new(WINDOW);
        q.stage("title", "b".to_string(), "a".to_string(), t0);
        assert_eq!(q.pending_value(&"title").map(String::as_str), Some("b"));
        let dropped = q.discard(&"title").unwrap();
        assert_eq!(dropped.prior, "a");
        assert!(q.discard(&"title").is_none());
        assert_eq!(q.next_deadline(), None);
    }
}
