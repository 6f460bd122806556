//! Fixed-capacity arenas keyed by index.
//!
//! Interrupt handlers cannot capture `self`; instead they carry a small
//! index and resolve it through one of these arenas. Two flavors exist:
//!
//! - [`SlotPool`]: pre-built cells that are claimed and released at runtime
//!   (interrupt sources, decoder cells). `no_std`, lock-free.
//! - [`UnitRegistry`]: one lazily built value per hardware unit, constructed
//!   at most once (timers). Requires `std`.
//!
//! # Example
//!
//! ```rust
//! use core::sync::atomic::{AtomicU32, Ordering};
//! use irq_io::registry::SlotPool;
//!
//! let pool: SlotPool<AtomicU32, 2> = SlotPool::new();
//! let a = pool.claim().unwrap();
//! let b = pool.claim().unwrap();
//! assert!(pool.claim().is_none());
//!
//! pool.get(a).store(7, Ordering::Relaxed);
//! pool.release(b);
//! assert_eq!(pool.claim(), Some(b));
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

/// Pool of `N` pre-built cells with lock-free claim/release.
///
/// Cells are never moved or dropped while the pool lives, so a claimed
/// index stays valid for interrupt handlers until it is released.
pub struct SlotPool<T, const N: usize> {
    cells: [T; N],
    claimed: [AtomicBool; N],
}

impl<T: Default, const N: usize> SlotPool<T, N> {
    /// Creates a pool with every cell default-initialized and unclaimed.
    pub fn new() -> Self {
        Self {
            cells: core::array::from_fn(|_| T::default()),
            claimed: core::array::from_fn(|_| AtomicBool::new(false)),
        }
    }
}

impl<T: Default, const N: usize> Default for SlotPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> SlotPool<T, N> {
    /// Number of cells in the pool.
    pub const CAPACITY: usize = N;

    /// Claims the first free cell and returns its index.
    ///
    /// Returns `None` when every cell is in use.
    pub fn claim(&self) -> Option<usize> {
        self.claimed.iter().position(|flag| {
            flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    /// Returns the cell at `index` to the pool.
    ///
    /// The caller must have reset any state it stored in the cell.
    pub fn release(&self, index: usize) {
        if let Some(flag) = self.claimed.get(index) {
            flag.store(false, Ordering::Release);
        }
    }

    /// Returns true if the cell at `index` is currently claimed.
    #[inline]
    pub fn is_claimed(&self, index: usize) -> bool {
        self.claimed
            .get(index)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Returns the cell at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= N`. Indices handed out by [`claim`](Self::claim)
    /// are always in range.
    #[inline]
    pub fn get(&self, index: usize) -> &T {
        &self.cells[index]
    }

    /// Returns the cell at `index` only if it is claimed.
    #[inline]
    pub fn claimed(&self, index: usize) -> Option<&T> {
        self.is_claimed(index).then(|| &self.cells[index])
    }

    /// Iterates over claimed cells with their indices.
    pub fn iter_claimed(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(index, _)| self.is_claimed(*index))
    }

    /// Number of claimed cells.
    pub fn claimed_count(&self) -> usize {
        self.claimed
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }
}

/// One lazily constructed value per hardware unit.
///
/// Each index is initialized at most once, on first access, and then lives
/// as long as the registry. This replaces hidden function-local singletons
/// with an explicit, owned context.
#[cfg(feature = "std")]
pub struct UnitRegistry<T, const N: usize> {
    units: [std::sync::OnceLock<T>; N],
}

#[cfg(feature = "std")]
impl<T, const N: usize> UnitRegistry<T, N> {
    /// Creates a registry with every unit unconstructed.
    pub fn new() -> Self {
        Self {
            units: core::array::from_fn(|_| std::sync::OnceLock::new()),
        }
    }

    /// Returns the value for `index`, constructing it with `init` on first use.
    ///
    /// Returns `None` if `index >= N`.
    pub fn get_or_init(&self, index: usize, init: impl FnOnce() -> T) -> Option<&T> {
        self.units.get(index).map(|unit| unit.get_or_init(init))
    }

    /// Returns the value for `index` if it was already constructed.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.units.get(index).and_then(|unit| unit.get())
    }

    /// Number of constructed units.
    pub fn initialized_count(&self) -> usize {
        self.units.iter().filter(|unit| unit.get().is_some()).count()
    }
}

#[cfg(feature = "std")]
impl<T, const N: usize> Default for UnitRegistry<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn claim_exhausts_pool() {
        let pool: SlotPool<AtomicU32, 3> = SlotPool::new();
        assert_eq!(pool.claim(), Some(0));
        assert_eq!(pool.claim(), Some(1));
        assert_eq!(pool.claim(), Some(2));
        assert_eq!(pool.claim(), None);
        assert_eq!(pool.claimed_count(), 3);
    }

    #[test]
    fn release_makes_slot_reusable() {
        let pool: SlotPool<AtomicU32, 2> = SlotPool::new();
        let a = pool.claim().unwrap();
        let _b = pool.claim().unwrap();
        pool.release(a);
        assert!(!pool.is_claimed(a));
        assert!(pool.claimed(a).is_none());
        assert_eq!(pool.claim(), Some(a));
    }

    #[test]
    fn release_out_of_range_is_ignored() {
        let pool: SlotPool<AtomicU32, 1> = SlotPool::new();
        pool.release(5);
        assert!(!pool.is_claimed(5));
    }

    #[test]
    fn iter_claimed_skips_free_cells() {
        let pool: SlotPool<AtomicU32, 4> = SlotPool::new();
        let a = pool.claim().unwrap();
        let b = pool.claim().unwrap();
        pool.release(a);
        let indices: Vec<usize> = pool.iter_claimed().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![b]);
    }

    #[test]
    fn concurrent_claims_never_share_a_slot() {
        let pool: Arc<SlotPool<AtomicU32, 16>> = Arc::new(SlotPool::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || pool.claim())
            })
            .collect();
        let mut claimed: Vec<usize> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        claimed.sort_unstable();
        claimed.dedup();
        assert_eq!(claimed.len(), 16);
    }

    #[test]
    fn unit_registry_initializes_once() {
        let registry: UnitRegistry<u32, 4> = UnitRegistry::new();
        let calls = AtomicU32::new(0);
        let first = *registry
            .get_or_init(2, || {
                calls.fetch_add(1, Ordering::Relaxed);
                42
            })
            .unwrap();
        let second = *registry
            .get_or_init(2, || {
                calls.fetch_add(1, Ordering::Relaxed);
                7
            })
            .unwrap();
        assert_eq!((first, second), (42, 42));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(registry.initialized_count(), 1);
    }

    #[test]
    fn unit_registry_rejects_out_of_range() {
        let registry: UnitRegistry<u32, 2> = UnitRegistry::new();
        assert!(registry.get_or_init(2, || 1).is_none());
        assert!(registry.get(0).is_none());
    }
}
