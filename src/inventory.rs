// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! In-memory inventory of dirty/clean chunk ids.
//!
//! Every mutation goes through the single `parking_lot::Mutex` guarding
//! `Inner`; no operation here ever touches the filesystem, so the lock is
//! only ever held across O(1) memory updates.

use parking_lot::Mutex;

/// Which deque an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Dirty,
    Clean,
}

/// Point-in-time snapshot of pool geometry and population, returned by
/// `Inventory::snapshot` / `Pool::get_state`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolState {
    pub chunk_size: u32,
    pub meta_page_size: u32,
    pub block_size: u32,
    pub dirty_left: u64,
    pub clean_left: u64,
    pub preallocated_left: u64,
}

struct Inner {
    dirty: Vec<u64>,
    clean: Vec<u64>,
    next_id: u64,
    state: PoolState,
}

/// Holds the two id-sets, the allocation high-water mark, and aggregate
/// counters (component C4 of the pool). Id `0` is a reserved sentinel and
/// is never pushed into either deque.
pub struct Inventory {
    inner: Mutex<Inner>,
}

impl Inventory {
    pub fn new(chunk_size: u32, meta_page_size: u32, block_size: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                dirty: Vec::new(),
                clean: Vec::new(),
                next_id: 1,
                state: PoolState {
                    chunk_size,
                    meta_page_size,
                    block_size,
                    ..Default::default()
                },
            }),
        }
    }

    /// Pop the top id off `kind`'s deque, or `None` if empty.
    pub fn pop(&self, kind: Kind) -> Option<u64> {
        let mut inner = self.inner.lock();
        let id = match kind {
            Kind::Dirty => inner.dirty.pop(),
            Kind::Clean => inner.clean.pop(),
        }?;
        match kind {
            Kind::Dirty => inner.state.dirty_left -= 1,
            Kind::Clean => inner.state.clean_left -= 1,
        }
        inner.state.preallocated_left -= 1;
        Some(id)
    }

    /// Push `id` onto `kind`'s deque.
    pub fn push(&self, kind: Kind, id: u64) {
        debug_assert_ne!(id, 0, "id 0 is reserved and must never be tracked");
        let mut inner = self.inner.lock();
        match kind {
            Kind::Dirty => {
                inner.dirty.push(id);
                inner.state.dirty_left += 1;
            }
            Kind::Clean => {
                inner.clean.push(id);
                inner.state.clean_left += 1;
            }
        }
        inner.state.preallocated_left += 1;
    }

    /// Move `id` from dirty to clean (used by the Cleaner on success).
    /// Callers that already popped `id` from `dirty` should call `push`
    /// directly; this helper exists for scanner/format bookkeeping that
    /// tracks ids without popping first.
    pub fn promote(&self, id: u64) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.dirty.iter().position(|&x| x == id) {
            inner.dirty.remove(pos);
            inner.state.dirty_left -= 1;
            inner.clean.push(id);
            inner.state.clean_left += 1;
        }
    }

    /// Seed the inventory with an id discovered by the Scanner or created
    /// by the Formatter, bumping `next_id` to stay ahead of it.
    pub fn seed(&self, kind: Kind, id: u64) {
        if id == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        match kind {
            Kind::Dirty => {
                inner.dirty.push(id);
                inner.state.dirty_left += 1;
            }
            Kind::Clean => {
                inner.clean.push(id);
                inner.state.clean_left += 1;
            }
        }
        inner.state.preallocated_left += 1;
        if id >= inner.next_id {
            inner.next_id = id + 1;
        }
    }

    /// Reset `next_id` to `maxnum + 1` after a full scan, without
    /// re-seeding the deques (the caller already seeded them one at a
    /// time via `seed`). A no-op if `seed` already advanced past it.
    pub fn set_next_id_floor(&self, maxnum: u64) {
        let mut inner = self.inner.lock();
        if maxnum + 1 > inner.next_id {
            inner.next_id = maxnum + 1;
        }
    }

    /// Return the current `next_id`, then increment it.
    pub fn bump_next_id(&self) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    pub fn snapshot(&self) -> PoolState {
        self.inner.lock().state
    }

    pub fn preallocated_left(&self) -> u64 {
        self.inner.lock().state.preallocated_left
    }

    /// Clear both deques (used by `UnInitialize`).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.dirty.clear();
        inner.clean.clear();
        inner.state.dirty_left = 0;
        inner.state.clean_left = 0;
        inner.state.preallocated_left = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trips_and_updates_counters() {
        let inv = Inventory::new(1024, 64, 4096);
        inv.seed(Kind::Dirty, 5);
        inv.seed(Kind::Clean, 7);
        let snap = inv.snapshot();
        assert_eq!(snap.dirty_left, 1);
        assert_eq!(snap.clean_left, 1);
        assert_eq!(snap.preallocated_left, 2);

        let popped = inv.pop(Kind::Clean).unwrap();
        assert_eq!(popped, 7);
        assert_eq!(inv.preallocated_left(), 1);

        inv.push(Kind::Dirty, 9);
        assert_eq!(inv.snapshot().preallocated_left, 2);
    }

    #[test]
    fn promote_moves_id_between_deques() {
        let inv = Inventory::new(1024, 64, 4096);
        inv.seed(Kind::Dirty, 3);
        inv.promote(3);
        let snap = inv.snapshot();
        assert_eq!(snap.dirty_left, 0);
        assert_eq!(snap.clean_left, 1);
        assert_eq!(snap.preallocated_left, 1);
    }

    #[test]
    fn bump_next_id_is_monotonic_and_skips_zero() {
        let inv = Inventory::new(1024, 64, 4096);
        assert_eq!(inv.bump_next_id(), 1);
        assert_eq!(inv.bump_next_id(), 2);
        inv.seed(Kind::Dirty, 10);
        inv.set_next_id_floor(10);
        assert_eq!(inv.bump_next_id(), 11);
    }
}
