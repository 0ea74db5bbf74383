//! Concurrency primitives: the shared-slot cell backing the node table and
//! label arrays, and the bucket queues driving ordered parallel phases.
//!
//! The build and maintenance phases decompose work so that every mutable
//! location has exactly one writer at a time (vertex-disjoint subgraphs,
//! per-thread distance slots, per-label-index buckets). [`SharedCell`]
//! expresses that protocol: mutation through a shared reference, with the
//! disjointness argument living at each call site. Visibility across threads
//! is established by the surrounding joins, barriers and mutexes.

use std::cell::UnsafeCell;
use std::sync::{
    Barrier,
    Mutex,
};

/// A `Sync` cell for slot data whose access is serialized externally.
///
/// Callers must uphold: a slot is written only by the task that currently
/// owns it (the task whose subgraph contains the vertex, the thread assigned
/// the distance slot, or the thread assigned the label index), and no other
/// task touches the slot until a join, barrier or mutex hand-off orders the
/// accesses.
#[repr(transparent)]
#[derive(Debug, Default)]
pub(crate) struct SharedCell<T>(UnsafeCell<T>);

// SAFETY: access is serialized by the ownership protocol documented above;
// cross-thread visibility comes from the synchronization points between
// phases.
unsafe impl<T: Send> Sync for SharedCell<T> {}

impl<T> SharedCell<T> {
    /// Wraps a value.
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Shared access to the slot.
    pub fn as_ref(&self) -> &T {
        // SAFETY: see the type-level protocol.
        unsafe { &*self.0.get() }
    }

    /// Exclusive access to the slot through a shared reference; the caller
    /// must be the slot's current owner.
    #[allow(clippy::mut_from_ref)]
    pub fn as_mut(&self) -> &mut T {
        // SAFETY: see the type-level protocol.
        unsafe { &mut *self.0.get() }
    }

    /// Unwraps the value.
    pub fn into_inner(self) -> T {
        self.0.into_inner()
    }
}

impl<T: Copy> SharedCell<T> {
    /// Reads the slot by value.
    pub fn get(&self) -> T {
        *self.as_ref()
    }

    /// Overwrites the slot.
    pub fn set(&self, value: T) {
        *self.as_mut() = value;
    }
}

impl<T: Clone> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        Self::new(self.as_ref().clone())
    }
}

/// Single-threaded bucket queue popping the minimum non-empty bucket.
///
/// Within a bucket the pop order is unspecified; across buckets it is
/// monotone in the key. Pushing below the cursor rewinds it.
#[derive(Debug)]
pub(crate) struct MinBucketQueue<T> {
    /// Bucket storage, indexed by key.
    buckets: Vec<Vec<T>>,
    /// Smallest possibly non-empty bucket.
    min_bucket: usize,
}

impl<T> MinBucketQueue<T> {
    pub fn new() -> Self {
        Self { buckets: Vec::new(), min_bucket: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.min_bucket >= self.buckets.len()
    }

    pub fn push(&mut self, value: T, bucket: usize) {
        if self.is_empty() || self.min_bucket > bucket {
            self.min_bucket = bucket;
        }
        if self.buckets.len() <= bucket {
            self.buckets.resize_with(bucket + 1, Vec::new);
        }
        self.buckets[bucket].push(value);
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let top = self.buckets[self.min_bucket].pop();
        debug_assert!(top.is_some());
        while self.min_bucket < self.buckets.len() && self.buckets[self.min_bucket].is_empty() {
            self.min_bucket += 1;
        }
        top
    }
}

/// Bucket queue handing out whole buckets under a mutex, smallest key first.
///
/// Filled single-threaded, drained concurrently: each call to
/// [`Self::next_bucket`] transfers one entire bucket to the calling thread.
#[derive(Debug)]
pub(crate) struct TsBucketQueue<T> {
    /// Cursor state, guarded for concurrent draining.
    inner: Mutex<MinBucketQueue<T>>,
}

impl<T> TsBucketQueue<T> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(MinBucketQueue::new()) }
    }

    /// Pushes an element into a bucket. Not intended for use while draining.
    pub fn push(&mut self, value: T, bucket: usize) {
        self.inner.get_mut().expect("bucket queue poisoned").push(value, bucket);
    }

    /// Pops the next non-empty bucket along with its key.
    pub fn next_bucket(&self) -> Option<(Vec<T>, usize)> {
        let mut q = self.inner.lock().expect("bucket queue poisoned");
        if q.is_empty() {
            return None;
        }
        let bucket = q.min_bucket;
        let items = std::mem::take(&mut q.buckets[bucket]);
        q.min_bucket += 1;
        while q.min_bucket < q.buckets.len() && q.buckets[q.min_bucket].is_empty() {
            q.min_bucket += 1;
        }
        Some((items, bucket))
    }
}

/// Cursor state of a [`ParBucketQueue`].
#[derive(Debug)]
struct ParBucketState<T> {
    /// Bucket storage, indexed by key.
    buckets: Vec<Vec<T>>,
    /// Bucket currently being drained.
    current: usize,
    /// Next element within the current bucket.
    next_in_bucket: usize,
    /// Set once the last bucket has been drained.
    exhausted: bool,
}

/// Barrier-synchronized bucket work list for `N` cooperating threads.
///
/// Elements of the current bucket are handed out one at a time; when the
/// bucket runs dry, all threads meet at a barrier, the leader advances the
/// cursor to the next non-empty bucket, and a second barrier releases the
/// group. This gives the cross-bucket ordering guarantee the label
/// propagation phases rely on: no element of bucket k+1 is processed until
/// every element of bucket k is done.
///
/// Every participating thread must keep calling [`Self::next`] until it
/// returns `None`, otherwise the group deadlocks at the barrier.
#[derive(Debug)]
pub(crate) struct ParBucketQueue<T> {
    /// Shared cursor.
    state: Mutex<ParBucketState<T>>,
    /// Rendezvous point between buckets.
    sync: Barrier,
}

impl<T: Copy> ParBucketQueue<T> {
    /// Creates a queue for a group of `threads` workers.
    pub fn new(threads: usize) -> Self {
        Self {
            state: Mutex::new(ParBucketState {
                buckets: Vec::new(),
                current: 0,
                next_in_bucket: 0,
                exhausted: true,
            }),
            sync: Barrier::new(threads),
        }
    }

    /// Pushes an element into a bucket. Must happen before draining starts.
    pub fn push(&mut self, value: T, bucket: usize) {
        let state = self.state.get_mut().expect("bucket list poisoned");
        if state.buckets.len() <= bucket {
            state.buckets.resize_with(bucket + 1, Vec::new);
        }
        state.buckets[bucket].push(value);
        state.exhausted = false;
    }

    /// Hands the calling worker the next element, blocking at the bucket
    /// boundary until the whole group arrives.
    pub fn next(&self) -> Option<T> {
        loop {
            {
                let mut state = self.state.lock().expect("bucket list poisoned");
                if state.exhausted {
                    return None;
                }
                let (current, pos) = (state.current, state.next_in_bucket);
                if pos < state.buckets[current].len() {
                    state.next_in_bucket += 1;
                    return Some(state.buckets[current][pos]);
                }
            }
            // Current bucket drained: everyone waits, the leader advances.
            if self.sync.wait().is_leader() {
                let mut state = self.state.lock().expect("bucket list poisoned");
                state.next_in_bucket = 0;
                loop {
                    if state.current + 1 >= state.buckets.len() {
                        state.exhausted = true;
                        break;
                    }
                    state.current += 1;
                    if !state.buckets[state.current].is_empty() {
                        break;
                    }
                }
            }
            self.sync.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_bucket_queue_pops_in_key_order() {
        let mut q = MinBucketQueue::new();
        q.push("c", 7);
        q.push("a", 2);
        q.push("b", 2);
        assert!(!q.is_empty());
        let first_two = [q.pop().unwrap(), q.pop().unwrap()];
        assert!(first_two.contains(&"a") && first_two.contains(&"b"));
        assert_eq!(q.pop(), Some("c"));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn min_bucket_queue_rewinds_on_smaller_push() {
        let mut q = MinBucketQueue::new();
        q.push(10, 5);
        assert_eq!(q.pop(), Some(10));
        q.push(1, 1);
        q.push(9, 4);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(9));
    }

    #[test]
    fn ts_bucket_queue_hands_out_whole_buckets() {
        let mut q = TsBucketQueue::new();
        q.push(1, 3);
        q.push(2, 3);
        q.push(3, 0);
        let (items, key) = q.next_bucket().unwrap();
        assert_eq!((items, key), (vec![3], 0));
        let (items, key) = q.next_bucket().unwrap();
        assert_eq!((items.len(), key), (2, 3));
        assert!(q.next_bucket().is_none());
    }

    #[test]
    fn par_bucket_queue_orders_across_buckets() {
        use std::sync::atomic::{
            AtomicUsize,
            Ordering,
        };

        const THREADS: usize = 4;
        let mut q = ParBucketQueue::new(THREADS);
        for i in 0..100_usize {
            q.push(i, i / 10);
        }
        let q = &q;
        let max_seen = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    while let Some(v) = q.next() {
                        // Keys never decrease across barrier boundaries.
                        let prev = max_seen.fetch_max(v / 10, Ordering::SeqCst);
                        assert!(prev <= v / 10);
                    }
                });
            }
        });
        assert_eq!(max_seen.load(Ordering::SeqCst), 9);
    }
}
