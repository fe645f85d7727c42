//! Thread-safe interner mapping runtime identities to small trace ids.
//!
//! Objects and threads are identified in the trace by dense `i32` ids rather
//! than by whatever the host runtime uses to tell them apart. The runtime hands
//! the interner an opaque `u64` identity key (it is responsible for keeping the
//! key stable while the identity is reachable) and gets back the id to record.
//!
//! # Thread Safety
//!
//! Ids come from an `AtomicI32` and the identity map is a `DashMap`, so probes
//! on different threads never serialize on a single lock.
//!
//! # Id Sequentiality
//!
//! Under concurrent access ids may not be strictly dense, but an id is never
//! handed out for two different identities. Id 0 is reserved for `null`. Once
//! the positive range is used up interning fails instead of wrapping into the
//! sentinel values.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use dashmap::DashMap;

use crate::error::{Result, TraceError};
use crate::trace::NULL_ID;

const INITIAL_CAPACITY: usize = 4096;

#[derive(Debug)]
pub struct IdInterner {
    next_id: AtomicI32,
    ids: DashMap<u64, i32>,
}

impl IdInterner {
    /// Create an interner whose first assigned id is 1.
    pub fn new() -> Self {
        Self::starting_at(NULL_ID + 1)
    }

    fn starting_at(next_id: i32) -> Self {
        Self {
            next_id: AtomicI32::new(next_id),
            ids: DashMap::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Get or assign the id for `identity`; `None` stands for `null`.
    ///
    /// Fails with [`TraceError::IdsExhausted`] when a new id is needed and the
    /// counter has reached `i32::MAX`. Identities interned earlier keep
    /// resolving.
    pub fn intern(&self, identity: Option<u64>) -> Result<i32> {
        let Some(identity) = identity else {
            return Ok(NULL_ID);
        };
        // Relaxed is enough, only uniqueness matters.
        let id = self.ids.entry(identity).or_try_insert_with(|| {
            self.next_id
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
                .map_err(|_| TraceError::IdsExhausted)
        })?;
        Ok(*id)
    }

    /// Id already assigned to `identity`, without assigning a new one.
    pub fn get(&self, identity: u64) -> Option<i32> {
        self.ids.get(&identity).as_deref().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Copy of the complete identity -> id mapping.
    pub fn snapshot(&self) -> HashMap<u64, i32> {
        self.ids.iter().map(|r| (*r.key(), *r.value())).collect()
    }
}

impl Default for IdInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_reserved() {
        let interner = IdInterner::new();
        assert_eq!(interner.intern(None).unwrap(), NULL_ID);
        // Identity key 0 is an ordinary identity, not null.
        let id = interner.intern(Some(0)).unwrap();
        assert!(id > NULL_ID);
        assert_eq!(interner.intern(Some(0)).unwrap(), id);
        assert!(interner.get(1).is_none());
    }

    #[test]
    fn test_ids_are_sequential() {
        let interner = IdInterner::new();
        assert_eq!(interner.intern(Some(100)).unwrap(), 1);
        assert_eq!(interner.intern(Some(200)).unwrap(), 2);
        assert_eq!(interner.intern(Some(100)).unwrap(), 1);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_exhausted_ids_do_not_wrap() {
        let interner = IdInterner::starting_at(i32::MAX - 2);
        assert_eq!(interner.intern(Some(1)).unwrap(), i32::MAX - 2);
        assert_eq!(interner.intern(Some(2)).unwrap(), i32::MAX - 1);

        for identity in 3..6 {
            assert!(matches!(
                interner.intern(Some(identity)),
                Err(TraceError::IdsExhausted)
            ));
        }
        assert!(interner.get(3).is_none());
        assert_eq!(interner.len(), 2);

        // Known identities and null still resolve.
        assert_eq!(interner.intern(Some(1)).unwrap(), i32::MAX - 2);
        assert_eq!(interner.intern(None).unwrap(), NULL_ID);
        assert!(interner.snapshot().values().all(|id| *id > NULL_ID));
    }

    #[test]
    fn test_concurrent_intern() {
        use std::sync::Arc;
        use std::thread;

        let interner = Arc::new(IdInterner::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let interner = Arc::clone(&interner);
            handles.push(thread::spawn(move || {
                for identity in 0..100 {
                    interner.intern(Some(identity)).unwrap();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let map = interner.snapshot();
        assert_eq!(map.len(), 100);

        let mut ids: Vec<_> = map.values().copied().collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| *id > NULL_ID));
    }
}
