//! Keyed create-once cache shared by the connection and client registries.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// Map from key -> lazily initialized value. Concurrent first-use callers of
/// the same key share one initialization; a failed initialization leaves no
/// entry behind once nobody else is waiting on it.
#[derive(Debug)]
pub(crate) struct OnceMap<K, V> {
    /// Map from key -> its once-cell. The map lock is only held for lookups,
    /// never across an initialization.
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty map.
    pub(crate) fn new() -> Self {
        OnceMap {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the initialized value for `key`, if any.
    pub(crate) async fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.lock().await;
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Returns the value for `key`, running `init` to create it if this is
    /// the first use. Callers racing on the same key wait for the one
    /// initialization in flight instead of running their own.
    pub(crate) async fn get_or_try_init<F, Fut, E>(
        &self,
        key: K,
        init: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell.get_or_try_init(init).await.map(|v| v.clone());
        if result.is_err() {
            let mut cells = self.cells.lock().await;
            let removable = match cells.get(&key) {
                // map + my clone only: no other waiter will retry it
                Some(registered) => {
                    Arc::ptr_eq(registered, &cell)
                        && !cell.initialized()
                        && Arc::strong_count(&cell) == 2
                }
                None => false,
            };
            drop(cell);
            if removable {
                cells.remove(&key);
            }
        }
        result
    }

    /// Number of initialized entries. Cells left behind by a cancelled
    /// initialization are not counted; the next caller initializes them.
    pub(crate) async fn len(&self) -> usize {
        let cells = self.cells.lock().await;
        cells.values().filter(|cell| cell.initialized()).count()
    }

    /// Snapshot of all initialized values.
    pub(crate) async fn values(&self) -> Vec<V> {
        let cells = self.cells.lock().await;
        cells.values().filter_map(|cell| cell.get().cloned()).collect()
    }
}
