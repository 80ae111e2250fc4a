//! In-memory implementation of [`PostStore`].
//!
//! Intended for local runs without PostgreSQL and for tests. It keeps the
//! same table lifecycle as the database (create fails when present, drop
//! fails when absent) and checks out a slot from a bounded [`SlotPool`]
//! for every operation, so pool exhaustion and exclusivity behave like the
//! real backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::models::{NewPost, Post};
use super::store::{PostStore, StoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct SlotTable {
    free: Vec<usize>,
    held: BTreeSet<usize>,
    peak: usize,
    collisions: usize,
}

impl SlotTable {
    fn check_out(&mut self) -> Option<usize> {
        let slot = self.free.pop()?;
        if !self.held.insert(slot) {
            self.collisions += 1;
        }
        self.peak = self.peak.max(self.held.len());
        Some(slot)
    }

    fn check_in(&mut self, slot: usize) {
        self.held.remove(&slot);
        self.free.push(slot);
    }
}

/// Bounded set of connection slots with exclusive checkout.
#[derive(Debug)]
pub struct SlotPool {
    permits: Arc<Semaphore>,
    table: Arc<Mutex<SlotTable>>,
    acquire_timeout: Duration,
}

/// A checked-out slot. Dropping it returns the slot to the pool.
#[derive(Debug)]
pub struct SlotGuard {
    slot: usize,
    table: Arc<Mutex<SlotTable>>,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    /// Identifier of the slot held by this guard.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // The slot goes back before the permit is released, so a waiter
        // woken by the permit always finds a free slot.
        lock(&self.table).check_in(self.slot);
    }
}

impl SlotPool {
    /// Creates a pool of `size` slots.
    #[must_use]
    pub fn new(size: usize, acquire_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            table: Arc::new(Mutex::new(SlotTable {
                free: (0..size).rev().collect(),
                held: BTreeSet::new(),
                peak: 0,
                collisions: 0,
            })),
            acquire_timeout,
        }
    }

    /// Checks out a slot, waiting at most the acquire timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PoolExhausted`] on timeout and
    /// [`StoreError::Connect`] once the pool is closed.
    pub async fn acquire(&self) -> Result<SlotGuard, StoreError> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| StoreError::PoolExhausted(self.acquire_timeout))?
        .map_err(|_| StoreError::Connect("connection pool is closed".to_string()))?;

        let slot = lock(&self.table)
            .check_out()
            .ok_or_else(|| StoreError::Connect("no free slot behind permit".to_string()))?;

        Ok(SlotGuard {
            slot,
            table: Arc::clone(&self.table),
            _permit: permit,
        })
    }

    /// Number of slots not currently checked out.
    #[must_use]
    pub fn idle(&self) -> usize {
        lock(&self.table).free.len()
    }

    /// Highest number of slots ever checked out at once.
    #[must_use]
    pub fn peak_in_use(&self) -> usize {
        lock(&self.table).peak
    }

    /// Number of checkouts that handed out a slot already held.
    #[must_use]
    pub fn collisions(&self) -> usize {
        lock(&self.table).collisions
    }

    /// Refuses every further checkout. Outstanding guards stay valid.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[derive(Debug, Default)]
struct Table {
    next_id: i32,
    rows: BTreeMap<i32, Post>,
}

/// Post store held entirely in process memory.
#[derive(Debug)]
pub struct InMemoryPostStore {
    slots: SlotPool,
    table: Mutex<Option<Table>>,
    latency: Duration,
}

impl InMemoryPostStore {
    /// Creates a store with `max_connections` slots and no table.
    #[must_use]
    pub fn new(max_connections: usize, acquire_timeout: Duration) -> Self {
        Self {
            slots: SlotPool::new(max_connections, acquire_timeout),
            table: Mutex::new(None),
            latency: Duration::ZERO,
        }
    }

    /// Holds each checked-out slot for `latency` before running the
    /// operation, to simulate a slow database.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The slot pool behind this store.
    #[must_use]
    pub const fn slots(&self) -> &SlotPool {
        &self.slots
    }

    async fn checkout(&self) -> Result<SlotGuard, StoreError> {
        let guard = self.slots.acquire().await?;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(guard)
    }

    fn with_table<T>(
        &self,
        op: impl FnOnce(&mut Table) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut table = lock(&self.table);
        let table = table.as_mut().ok_or(StoreError::TableMissing)?;
        op(table)
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn create_table(&self) -> Result<(), StoreError> {
        let _conn = self.checkout().await?;
        let mut table = lock(&self.table);
        if table.is_some() {
            return Err(StoreError::TableExists);
        }
        *table = Some(Table {
            next_id: 1,
            rows: BTreeMap::new(),
        });
        Ok(())
    }

    async fn drop_table(&self) -> Result<(), StoreError> {
        let _conn = self.checkout().await?;
        lock(&self.table)
            .take()
            .map(|_| ())
            .ok_or(StoreError::TableMissing)
    }

    async fn insert_post(&self, post: &NewPost) -> Result<i32, StoreError> {
        let _conn = self.checkout().await?;
        self.with_table(|table| {
            let id = table.next_id;
            table.next_id = id
                .checked_add(1)
                .ok_or_else(|| StoreError::Query("id sequence exhausted".to_string()))?;
            table.rows.insert(id, post.clone().into_post(id));
            Ok(id)
        })
    }

    async fn find_posts(&self, id: i32) -> Result<Vec<Post>, StoreError> {
        let _conn = self.checkout().await?;
        self.with_table(|table| Ok(table.rows.get(&id).cloned().into_iter().collect()))
    }

    async fn delete_posts(&self, id: i32) -> Result<u64, StoreError> {
        let _conn = self.checkout().await?;
        self.with_table(|table| Ok(u64::from(table.rows.remove(&id).is_some())))
    }

    async fn close(&self) {
        self.slots.close();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn new_post(title: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: "body".to_string(),
            username: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn table_lifecycle_matches_database() {
        let store = InMemoryPostStore::new(5, Duration::from_millis(100));
        assert!(matches!(store.drop_table().await, Err(StoreError::TableMissing)));
        assert!(store.create_table().await.is_ok());
        assert!(matches!(store.create_table().await, Err(StoreError::TableExists)));
        assert!(store.drop_table().await.is_ok());
        assert!(matches!(
            store.insert_post(&new_post("x")).await,
            Err(StoreError::TableMissing)
        ));
    }

    #[tokio::test]
    async fn insert_find_delete() {
        let store = InMemoryPostStore::new(5, Duration::from_millis(100));
        assert!(store.create_table().await.is_ok());

        let Ok(first) = store.insert_post(&new_post("first")).await else {
            panic!("insert failed");
        };
        let Ok(second) = store.insert_post(&new_post("second")).await else {
            panic!("insert failed");
        };
        assert_ne!(first, second);

        let Ok(rows) = store.find_posts(second).await else {
            panic!("find failed");
        };
        assert_eq!(rows, vec![new_post("second").into_post(second)]);

        assert!(matches!(store.find_posts(999).await, Ok(rows) if rows.is_empty()));
        assert!(matches!(store.delete_posts(first).await, Ok(1)));
        assert!(matches!(store.delete_posts(first).await, Ok(0)));
    }

    #[tokio::test]
    async fn failed_operations_release_their_slot() {
        let store = InMemoryPostStore::new(2, Duration::from_millis(100));
        for _ in 0..10 {
            assert!(store.find_posts(1).await.is_err());
        }
        assert_eq!(store.slots().idle(), 2);
    }

    #[tokio::test]
    async fn exhausted_pool_fails_after_bounded_wait() {
        let pool = SlotPool::new(1, Duration::from_millis(20));
        let Ok(held) = pool.acquire().await else {
            panic!("first acquire failed");
        };
        assert!(matches!(
            pool.acquire().await,
            Err(StoreError::PoolExhausted(_))
        ));
        assert_eq!(pool.peak_in_use(), 1);
        drop(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn closed_pool_refuses_checkout() {
        let pool = SlotPool::new(2, Duration::from_millis(20));
        pool.close();
        assert!(matches!(pool.acquire().await, Err(StoreError::Connect(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_share_a_slot() {
        let pool = Arc::new(SlotPool::new(5, Duration::from_secs(5)));
        let in_use = Arc::new(Mutex::new(HashSet::new()));
        let collisions = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..64 {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            let collisions = Arc::clone(&collisions);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let Ok(guard) = pool.acquire().await else {
                    panic!("acquire failed");
                };
                {
                    let mut set = lock(&in_use);
                    if !set.insert(guard.slot()) {
                        collisions.fetch_add(1, Ordering::SeqCst);
                    }
                    peak.fetch_max(set.len(), Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                lock(&in_use).remove(&guard.slot());
            }));
        }
        for task in tasks {
            assert!(task.await.is_ok());
        }

        assert_eq!(collisions.load(Ordering::SeqCst), 0);
        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(pool.idle(), 5);
        assert_eq!(pool.collisions(), 0);
        assert!(pool.peak_in_use() <= 5);
    }
}
