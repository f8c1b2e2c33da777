//! An open-addressing associative array for plain-old-data elements.
//!
//! [`AssocArray<D>`] stores fixed-size `Copy` elements in one contiguous
//! slot array. The element itself embeds its key; there is no separate key
//! storage and no per-slot occupancy tag. A slot is empty exactly when the
//! caller-supplied [`Description`] says so, which keeps the per-slot
//! overhead at zero bytes and the whole table in one allocation.
//!
//! Collisions are resolved by linear probing with stride one. Deletion uses
//! back-shifting instead of tombstones: after a slot is cleared, the repair
//! loop walks forward and pulls back every element whose natural bucket
//! lies outside the gap opened so far, stopping at the first empty slot.
//! Probe chains stay intact, so lookups never pay for past deletions and
//! the table never needs a cleanup pass.
//!
//! ## Design
//!
//! The table targets a load factor of one half. An insert that pushes
//! `used` past `capacity / 2` triggers a rehash into `2 * capacity + 1`
//! slots. Odd capacities keep `hash % capacity` reasonably spread even for
//! weak hash functions, which matters because descriptions frequently hash
//! by truncating an id. Before rehashing, the table consults its
//! [`FillUpHandler`]; a veto pins the capacity and the table keeps
//! accepting inserts with growing probe lengths instead. Re-insertion
//! during a rehash uses a fast path that only looks for empty slots and
//! never consults equality, since the old table cannot contain duplicates.
//!
//! The back-shift predicate is the subtle part of the structure. With the
//! gap at `i` and a candidate at `k`, the element at `k` is pulled back
//! exactly when its natural bucket `j` lies outside the circular interval
//! `(i, k]`. Both orientations of that interval occur in practice because
//! probing wraps at the end of the slot array, and both are spelled out in
//! [`remove_key`] rather than being folded into a cleverer expression.
//!
//! Every operation updates a set of statistics counters suitable for
//! capacity tuning. Lookups update them too, through interior mutability,
//! so the table does not implement `Sync`. The counters compile to no-ops
//! when the `stats` feature is disabled.
//!
//! ## Invariants
//!
//! 1. `capacity` is strictly positive from construction onward.
//! 2. For every used slot at index `i`, walking forward from
//!    `hash_element(slot) % capacity` reaches `i` without crossing an
//!    empty slot. Insertion establishes this and back-shifting preserves
//!    it.
//! 3. `used` equals the number of slots whose contents are not the empty
//!    sentinel.
//! 4. Slot contents are bitwise copies of elements that were passed to an
//!    insert operation. Elements are relocated, never reconstructed.
//!
//! Callers must never retain references into the slot array across a
//! mutating call. Any insert may rehash and any removal may relocate
//! elements.
//!
//! [`AssocArray<D>`]: AssocArray
//! [`Description`]: crate::description::Description
//! [`FillUpHandler`]: crate::fill_up::FillUpHandler
//! [`remove_key`]: AssocArray::remove_key

use alloc::boxed::Box;
use alloc::vec;
#[cfg(feature = "stats")]
use core::cell::Cell;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem;

use cfg_if::cfg_if;

use crate::description::Description;
use crate::fill_up::ExtendAtFillUp;
use crate::fill_up::FillUp;
use crate::fill_up::FillUpHandler;

cfg_if! {
    if #[cfg(feature = "stats")] {
        /// One operational counter. Lives behind a `Cell` so that const
        /// queries can record the probes they perform.
        #[derive(Debug, Default)]
        struct Counter(Cell<u64>);

        impl Counter {
            #[inline(always)]
            fn bump(&self) {
                self.0.set(self.0.get() + 1);
            }

            #[inline(always)]
            fn get(&self) -> u64 {
                self.0.get()
            }

            #[inline(always)]
            fn reset(&self) {
                self.0.set(0);
            }
        }
    } else {
        #[derive(Debug, Default)]
        struct Counter;

        impl Counter {
            #[inline(always)]
            fn bump(&self) {}

            #[inline(always)]
            fn reset(&self) {}
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    finds: Counter,
    adds: Counter,
    removes: Counter,
    resizes: Counter,
    probes_find: Counter,
    probes_add: Counter,
    probes_remove: Counter,
    probes_rehash: Counter,
}

impl Counters {
    // `resizes` describes the slot array itself and survives `clear`.
    fn reset_except_resizes(&self) {
        self.finds.reset();
        self.adds.reset();
        self.removes.reset();
        self.probes_find.reset();
        self.probes_add.reset();
        self.probes_remove.reset();
        self.probes_rehash.reset();
    }
}

/// A snapshot of the operational statistics of an [`AssocArray`].
///
/// Probe counters record steps taken past the natural bucket, so a lookup
/// that hits its bucket directly contributes zero probes. Comparing probe
/// totals against operation totals gives the average chain length, which
/// is the primary capacity-tuning signal.
#[cfg(feature = "stats")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Number of lookup calls, hits and misses alike.
    pub finds: u64,
    /// Number of insertion calls, including rejected duplicates.
    pub adds: u64,
    /// Number of removal calls, including misses.
    pub removes: u64,
    /// Number of rehashes into a larger slot array.
    pub resizes: u64,
    /// Probe steps taken during lookups.
    pub probes_find: u64,
    /// Probe steps taken during insertions.
    pub probes_add: u64,
    /// Probe steps taken during removals.
    pub probes_remove: u64,
    /// Probe steps taken while re-inserting elements during rehashes.
    pub probes_rehash: u64,
}

#[cfg(feature = "stats")]
impl Stats {
    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Associative Array Statistics ===");
        println!(
            "Operations: {} finds, {} adds, {} removes, {} resizes",
            self.finds, self.adds, self.removes, self.resizes
        );
        println!(
            "Probes: {} find, {} add, {} remove, {} rehash",
            self.probes_find, self.probes_add, self.probes_remove, self.probes_rehash
        );
    }
}

/// An open-addressing hash table for `Copy` elements that embed their key.
///
/// `AssocArray<D, F>` delegates all knowledge about its element type to the
/// description `D` and all growth policy to the fill-up handler `F`. The
/// table owns its slot array exclusively; elements are copied in by value
/// and no reference to caller storage is retained.
///
/// Lookups update the probe counters through interior mutability, so a
/// table handle cannot be shared across threads, not even read-only.
pub struct AssocArray<D, F = ExtendAtFillUp>
where
    D: Description,
{
    desc: D,
    slots: Box<[D::Element]>,
    used: usize,
    counters: Counters,
    _fill_up: PhantomData<F>,
}

impl<D, F> Debug for AssocArray<D, F>
where
    D: Description,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AssocArray")
            .field("used", &self.used)
            .field("capacity", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl<D, F> AssocArray<D, F>
where
    D: Description,
    F: FillUpHandler<D>,
{
    /// Creates a table with `capacity` slots and a default description.
    ///
    /// All slots start empty. Callers typically pass a small odd number;
    /// growth keeps capacities odd from there.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use backshift_hash::AssocArray;
    /// # use backshift_hash::Description;
    /// #
    /// # #[derive(Default)]
    /// # struct IdDesc;
    /// #
    /// # impl Description for IdDesc {
    /// #     type Key = u64;
    /// #     type Element = u64;
    /// #
    /// #     fn empty_element(&self) -> u64 {
    /// #         0
    /// #     }
    /// #
    /// #     fn is_empty_element(&self, element: &u64) -> bool {
    /// #         *element == 0
    /// #     }
    /// #
    /// #     fn hash_key(&self, key: &u64) -> u32 {
    /// #         *key as u32
    /// #     }
    /// #
    /// #     fn hash_element(&self, element: &u64) -> u32 {
    /// #         *element as u32
    /// #     }
    /// #
    /// #     fn key_matches_element(&self, key: &u64, element: &u64) -> bool {
    /// #         key == element
    /// #     }
    /// #
    /// #     fn element_matches_element(&self, left: &u64, right: &u64) -> bool {
    /// #         left == right
    /// #     }
    /// # }
    /// #
    /// let table: AssocArray<IdDesc> = AssocArray::with_capacity(7);
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 7);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self
    where
        D: Default,
    {
        Self::with_capacity_and_description(capacity, D::default())
    }

    /// Creates a table with `capacity` slots and the given description.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity_and_description(capacity: usize, desc: D) -> Self {
        assert!(capacity > 0, "capacity must be at least 1");

        let slots = vec![desc.empty_element(); capacity].into_boxed_slice();
        Self {
            desc,
            slots,
            used: 0,
            counters: Counters::default(),
            _fill_up: PhantomData,
        }
    }

    /// Returns the number of elements in the table.
    pub fn len(&self) -> usize {
        self.used
    }

    /// Returns `true` if the table contains no elements.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Returns the current number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the raw slot array, empty slots included.
    ///
    /// This is the scanning surface for callers that iterate the table
    /// themselves. Slot order is unspecified and changes across mutating
    /// calls; distinguish used from empty slots with the description's
    /// emptiness predicate.
    pub fn slots(&self) -> &[D::Element] {
        &self.slots
    }

    /// Returns the description the table was built with.
    pub fn description(&self) -> &D {
        &self.desc
    }

    /// Returns an iterator over the used slots, in unspecified order.
    pub fn iter(&self) -> Iter<'_, D> {
        Iter {
            desc: &self.desc,
            slots: &self.slots,
        }
    }

    /// Returns a snapshot of the operational counters.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> Stats {
        Stats {
            finds: self.counters.finds.get(),
            adds: self.counters.adds.get(),
            removes: self.counters.removes.get(),
            resizes: self.counters.resizes.get(),
            probes_find: self.counters.probes_find.get(),
            probes_add: self.counters.probes_add.get(),
            probes_remove: self.counters.probes_remove.get(),
            probes_rehash: self.counters.probes_rehash.get(),
        }
    }

    /// Finds the element with the given key.
    ///
    /// Probes forward from the key's natural bucket and returns the
    /// matching slot, or `None` when probing reaches an empty slot first.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use backshift_hash::AssocArray;
    /// # use backshift_hash::Description;
    /// #
    /// # #[derive(Default)]
    /// # struct IdDesc;
    /// #
    /// # impl Description for IdDesc {
    /// #     type Key = u64;
    /// #     type Element = u64;
    /// #
    /// #     fn empty_element(&self) -> u64 {
    /// #         0
    /// #     }
    /// #
    /// #     fn is_empty_element(&self, element: &u64) -> bool {
    /// #         *element == 0
    /// #     }
    /// #
    /// #     fn hash_key(&self, key: &u64) -> u32 {
    /// #         *key as u32
    /// #     }
    /// #
    /// #     fn hash_element(&self, element: &u64) -> u32 {
    /// #         *element as u32
    /// #     }
    /// #
    /// #     fn key_matches_element(&self, key: &u64, element: &u64) -> bool {
    /// #         key == element
    /// #     }
    /// #
    /// #     fn element_matches_element(&self, left: &u64, right: &u64) -> bool {
    /// #         left == right
    /// #     }
    /// # }
    /// #
    /// let mut table: AssocArray<IdDesc> = AssocArray::with_capacity(7);
    /// table.add_element(42, true);
    ///
    /// assert_eq!(table.find_key(&42), Some(&42));
    /// assert_eq!(table.find_key(&99), None);
    /// ```
    pub fn find_key(&self, key: &D::Key) -> Option<&D::Element> {
        self.counters.finds.bump();

        let start = self.bucket_of(self.desc.hash_key(key));
        let i = self.probe(
            start,
            |slot| self.desc.key_matches_element(key, slot),
            &self.counters.probes_find,
        )?;

        let slot = &self.slots[i];
        if self.desc.is_empty_element(slot) {
            None
        } else {
            Some(slot)
        }
    }

    /// Finds the stored element matching the given element's key.
    ///
    /// Identical to [`find_key`] except that the probe hashes and compares
    /// through the element-side operations of the description.
    ///
    /// [`find_key`]: AssocArray::find_key
    pub fn find_element(&self, element: &D::Element) -> Option<&D::Element> {
        self.counters.finds.bump();

        let start = self.bucket_of(self.desc.hash_element(element));
        let i = self.probe(
            start,
            |slot| self.desc.element_matches_element(element, slot),
            &self.counters.probes_find,
        )?;

        let slot = &self.slots[i];
        if self.desc.is_empty_element(slot) {
            None
        } else {
            Some(slot)
        }
    }

    /// Adds an element, returning `true` if it was newly inserted.
    ///
    /// If an element with the same key is already present, no insertion
    /// happens and the return value is `false`; the stored element is
    /// replaced by `element` when `overwrite` is set, and left untouched
    /// otherwise.
    ///
    /// A successful insert that pushes the load factor past one half
    /// triggers a rehash into `2 * capacity + 1` slots, unless the fill-up
    /// handler vetoes it.
    ///
    /// # Panics
    ///
    /// Panics if every slot is used and none matches. That state is only
    /// reachable with a vetoing fill-up handler.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use backshift_hash::AssocArray;
    /// # use backshift_hash::Description;
    /// #
    /// # #[derive(Default)]
    /// # struct IdDesc;
    /// #
    /// # impl Description for IdDesc {
    /// #     type Key = u64;
    /// #     type Element = u64;
    /// #
    /// #     fn empty_element(&self) -> u64 {
    /// #         0
    /// #     }
    /// #
    /// #     fn is_empty_element(&self, element: &u64) -> bool {
    /// #         *element == 0
    /// #     }
    /// #
    /// #     fn hash_key(&self, key: &u64) -> u32 {
    /// #         *key as u32
    /// #     }
    /// #
    /// #     fn hash_element(&self, element: &u64) -> u32 {
    /// #         *element as u32
    /// #     }
    /// #
    /// #     fn key_matches_element(&self, key: &u64, element: &u64) -> bool {
    /// #         key == element
    /// #     }
    /// #
    /// #     fn element_matches_element(&self, left: &u64, right: &u64) -> bool {
    /// #         left == right
    /// #     }
    /// # }
    /// #
    /// let mut table: AssocArray<IdDesc> = AssocArray::with_capacity(7);
    ///
    /// assert!(table.add_element(42, true));
    /// assert!(!table.add_element(42, true));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn add_element(&mut self, element: D::Element, overwrite: bool) -> bool {
        self.counters.adds.bump();

        let start = self.bucket_of(self.desc.hash_element(&element));
        let i = self
            .probe(
                start,
                |slot| self.desc.element_matches_element(&element, slot),
                &self.counters.probes_add,
            )
            .expect("no free slot in associative array");

        self.finish_add(i, element, overwrite)
    }

    /// Adds an element, probing by a standalone key.
    ///
    /// Same contract as [`add_element`], for callers that hold the key
    /// separately from the constructed element, such as an insert that
    /// follows a failed lookup. The probe uses the key-side hash and
    /// equality; everything after the probe, including the growth path,
    /// is identical to [`add_element`].
    ///
    /// # Panics
    ///
    /// Panics if every slot is used and none matches.
    ///
    /// [`add_element`]: AssocArray::add_element
    pub fn add_element_with_key(
        &mut self,
        key: &D::Key,
        element: D::Element,
        overwrite: bool,
    ) -> bool {
        self.counters.adds.bump();

        let start = self.bucket_of(self.desc.hash_key(key));
        let i = self
            .probe(
                start,
                |slot| self.desc.key_matches_element(key, slot),
                &self.counters.probes_add,
            )
            .expect("no free slot in associative array");

        self.finish_add(i, element, overwrite)
    }

    /// Removes the element with the given key and returns it.
    ///
    /// Returns `None` when no element matches. After the slot is cleared,
    /// the repair loop walks forward and back-shifts every element whose
    /// natural bucket lies outside the open gap, so probe chains stay
    /// intact without tombstones.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use backshift_hash::AssocArray;
    /// # use backshift_hash::Description;
    /// #
    /// # #[derive(Default)]
    /// # struct IdDesc;
    /// #
    /// # impl Description for IdDesc {
    /// #     type Key = u64;
    /// #     type Element = u64;
    /// #
    /// #     fn empty_element(&self) -> u64 {
    /// #         0
    /// #     }
    /// #
    /// #     fn is_empty_element(&self, element: &u64) -> bool {
    /// #         *element == 0
    /// #     }
    /// #
    /// #     fn hash_key(&self, key: &u64) -> u32 {
    /// #         *key as u32
    /// #     }
    /// #
    /// #     fn hash_element(&self, element: &u64) -> u32 {
    /// #         *element as u32
    /// #     }
    /// #
    /// #     fn key_matches_element(&self, key: &u64, element: &u64) -> bool {
    /// #         key == element
    /// #     }
    /// #
    /// #     fn element_matches_element(&self, left: &u64, right: &u64) -> bool {
    /// #         left == right
    /// #     }
    /// # }
    /// #
    /// let mut table: AssocArray<IdDesc> = AssocArray::with_capacity(7);
    /// table.add_element(42, true);
    ///
    /// assert_eq!(table.remove_key(&42), Some(42));
    /// assert_eq!(table.remove_key(&42), None);
    /// ```
    pub fn remove_key(&mut self, key: &D::Key) -> Option<D::Element> {
        self.counters.removes.bump();

        let start = self.bucket_of(self.desc.hash_key(key));
        let i = self.probe(
            start,
            |slot| self.desc.key_matches_element(key, slot),
            &self.counters.probes_remove,
        )?;

        if self.desc.is_empty_element(&self.slots[i]) {
            return None;
        }

        let element = self.slots[i];
        self.desc.clear_element(&mut self.slots[i]);
        self.used -= 1;
        self.backshift(i);

        Some(element)
    }

    /// Removes the stored element matching the given element's key.
    ///
    /// Returns `true` iff a matching element was found and removed.
    pub fn remove_element(&mut self, element: &D::Element) -> bool {
        self.counters.removes.bump();

        let start = self.bucket_of(self.desc.hash_element(element));
        let Some(i) = self.probe(
            start,
            |slot| self.desc.element_matches_element(element, slot),
            &self.counters.probes_remove,
        ) else {
            return false;
        };

        if self.desc.is_empty_element(&self.slots[i]) {
            return false;
        }

        self.desc.clear_element(&mut self.slots[i]);
        self.used -= 1;
        self.backshift(i);

        true
    }

    /// Removes all elements, keeping the current capacity.
    ///
    /// The slot array is reallocated and every slot cleared. All counters
    /// except `resizes` are reset.
    pub fn clear(&mut self) {
        let fresh = vec![self.desc.empty_element(); self.slots.len()].into_boxed_slice();
        self.slots = fresh;
        self.used = 0;
        self.counters.reset_except_resizes();
    }

    /// Releases element payloads through the description, then clears.
    ///
    /// Calls the description's `delete_element` on every slot, used or
    /// empty; the description decides whether empty slots need a check.
    /// This is the single sanctioned hook for descriptions that own
    /// resources reachable through their elements.
    pub fn clear_and_delete(&mut self) {
        for slot in self.slots.iter_mut() {
            self.desc.delete_element(slot);
        }
        self.clear();
    }

    /// Exchanges the entire state of two tables in O(1).
    ///
    /// Slot arrays, descriptions, element counts, and statistics counters
    /// all swap sides. Both tables remain valid.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    #[inline(always)]
    fn bucket_of(&self, hash: u32) -> usize {
        hash as usize % self.slots.len()
    }

    /// Walks forward from `start` until the first slot that is empty or
    /// matches, bumping `probes` per step past the first. Returns `None`
    /// after inspecting every slot, which is only possible when the table
    /// is completely full and nothing matches.
    #[inline]
    fn probe(
        &self,
        start: usize,
        matches: impl Fn(&D::Element) -> bool,
        probes: &Counter,
    ) -> Option<usize> {
        let capacity = self.slots.len();
        let mut i = start;
        let mut inspected = 0;

        loop {
            let slot = &self.slots[i];
            if self.desc.is_empty_element(slot) || matches(slot) {
                return Some(i);
            }

            inspected += 1;
            if inspected == capacity {
                return None;
            }

            i = (i + 1) % capacity;
            probes.bump();
        }
    }

    fn finish_add(&mut self, i: usize, element: D::Element, overwrite: bool) -> bool {
        if !self.desc.is_empty_element(&self.slots[i]) {
            if overwrite {
                self.slots[i] = element;
            }
            return false;
        }

        self.slots[i] = element;
        self.used += 1;
        self.extend_if_half_full();

        true
    }

    fn extend_if_half_full(&mut self) {
        if self.slots.len() >= 2 * self.used {
            return;
        }

        if let FillUp::Veto = F::handle(self) {
            return;
        }

        self.rehash(2 * self.slots.len() + 1);
    }

    fn rehash(&mut self, new_capacity: usize) {
        let fresh = vec![self.desc.empty_element(); new_capacity].into_boxed_slice();
        let old = mem::replace(&mut self.slots, fresh);
        self.used = 0;
        self.counters.resizes.bump();

        for slot in old.iter() {
            if !self.desc.is_empty_element(slot) {
                self.add_new_element(*slot);
            }
        }
    }

    /// Insert fast path for rehashing. The element is known not to be in
    /// the table, so only emptiness is checked.
    fn add_new_element(&mut self, element: D::Element) {
        let capacity = self.slots.len();
        let mut i = self.bucket_of(self.desc.hash_element(&element));

        while !self.desc.is_empty_element(&self.slots[i]) {
            i = (i + 1) % capacity;
            self.counters.probes_rehash.bump();
        }

        self.slots[i] = element;
        self.used += 1;
    }

    /// Repairs probe chains after slot `i` was cleared.
    ///
    /// Walks forward from the gap. An element at `k` with natural bucket
    /// `j` moves into the gap exactly when `j` lies outside the circular
    /// interval `(i, k]`; moving it re-opens the gap at `k`. The loop ends
    /// at the first empty slot.
    fn backshift(&mut self, mut i: usize) {
        let capacity = self.slots.len();
        let mut k = (i + 1) % capacity;

        while !self.desc.is_empty_element(&self.slots[k]) {
            let j = self.bucket_of(self.desc.hash_element(&self.slots[k]));

            let relocates = if i < k {
                !(i < j && j <= k)
            } else {
                // The gap-to-candidate interval wraps past the last slot.
                !(i < j || j <= k)
            };

            if relocates {
                self.slots[i] = self.slots[k];
                self.desc.clear_element(&mut self.slots[k]);
                i = k;
            }

            k = (k + 1) % capacity;
        }
    }
}

/// An iterator over the used slots of an [`AssocArray`].
///
/// Yields `&Element` references in unspecified order.
pub struct Iter<'a, D>
where
    D: Description,
{
    desc: &'a D,
    slots: &'a [D::Element],
}

impl<'a, D> Iterator for Iter<'a, D>
where
    D: Description,
{
    type Item = &'a D::Element;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((first, rest)) = self.slots.split_first() {
            self.slots = rest;
            if !self.desc.is_empty_element(first) {
                return Some(first);
            }
        }
        None
    }
}

impl<'a, D, F> IntoIterator for &'a AssocArray<D, F>
where
    D: Description,
    F: FillUpHandler<D>,
{
    type IntoIter = Iter<'a, D>;
    type Item = &'a D::Element;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::fill_up::VetoAtFillUp;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Doc {
        id: u64,
        value: i32,
    }

    fn doc(id: u64, value: i32) -> Doc {
        Doc { id, value }
    }

    /// Identity-hash description over `Doc`. Id 0 marks an empty slot and
    /// the natural bucket of id `n` is `n % capacity`, which makes slot
    /// layouts exactly predictable.
    #[derive(Default)]
    struct DocDesc;

    impl Description for DocDesc {
        type Key = u64;
        type Element = Doc;

        fn empty_element(&self) -> Doc {
            Doc { id: 0, value: 0 }
        }

        fn is_empty_element(&self, element: &Doc) -> bool {
            element.id == 0
        }

        fn hash_key(&self, key: &u64) -> u32 {
            *key as u32
        }

        fn hash_element(&self, element: &Doc) -> u32 {
            element.id as u32
        }

        fn key_matches_element(&self, key: &u64, element: &Doc) -> bool {
            *key == element.id
        }

        fn element_matches_element(&self, left: &Doc, right: &Doc) -> bool {
            left.id == right.id
        }
    }

    /// Keyed-SipHash description for realistic hash distributions.
    #[derive(Clone, Copy)]
    struct SipDesc {
        k0: u64,
        k1: u64,
    }

    impl SipDesc {
        fn random() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn hash(&self, id: u64) -> u32 {
            use core::hash::Hasher;
            let mut h = SipHasher::new_with_keys(self.k0, self.k1);
            h.write_u64(id);
            h.finish() as u32
        }
    }

    impl Description for SipDesc {
        type Key = u64;
        type Element = Doc;

        fn empty_element(&self) -> Doc {
            Doc { id: 0, value: 0 }
        }

        fn is_empty_element(&self, element: &Doc) -> bool {
            element.id == 0
        }

        fn hash_key(&self, key: &u64) -> u32 {
            self.hash(*key)
        }

        fn hash_element(&self, element: &Doc) -> u32 {
            self.hash(element.id)
        }

        fn key_matches_element(&self, key: &u64, element: &Doc) -> bool {
            *key == element.id
        }

        fn element_matches_element(&self, left: &Doc, right: &Doc) -> bool {
            left.id == right.id
        }
    }

    /// Checks the probe-chain invariant: every used slot is reachable from
    /// its natural bucket by forward probing without crossing an empty
    /// slot.
    fn assert_probe_chains<D, F>(table: &AssocArray<D, F>)
    where
        D: Description,
        F: FillUpHandler<D>,
    {
        let slots = table.slots();
        let capacity = slots.len();
        let desc = table.description();

        for (index, slot) in slots.iter().enumerate() {
            if desc.is_empty_element(slot) {
                continue;
            }

            let mut i = desc.hash_element(slot) as usize % capacity;
            loop {
                assert!(
                    !desc.is_empty_element(&slots[i]),
                    "probe chain to slot {index} crosses empty slot {i}"
                );
                if i == index {
                    break;
                }
                i = (i + 1) % capacity;
            }
        }
    }

    #[test]
    fn insert_and_find_colliding_keys() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(7);

        // All three ids map to bucket 1 and chain into slots 1, 2, 3.
        for id in [1u64, 8, 15] {
            assert!(table.add_element(doc(id, id as i32), true), "{table:#?}");
        }
        assert_eq!(table.len(), 3);
        assert_eq!(table.capacity(), 7);

        for id in [1u64, 8, 15] {
            assert_eq!(table.find_key(&id), Some(&doc(id, id as i32)), "{table:#?}");
        }
        assert!(table.find_key(&22).is_none());

        let stats = table.stats();
        assert_eq!(stats.adds, 3);
        assert_eq!(stats.probes_add, 3);
        assert_eq!(stats.finds, 4);
        assert_eq!(stats.probes_find, 6);
        assert_eq!(stats.removes, 0);
        assert_eq!(stats.resizes, 0);
    }

    #[test]
    fn find_element_matches_by_embedded_key() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(7);
        table.add_element(doc(10, 5), true);

        // Only the embedded key participates in equality.
        assert_eq!(table.find_element(&doc(10, -1)), Some(&doc(10, 5)));
        assert!(table.find_element(&doc(11, 5)).is_none());
    }

    #[test]
    fn growth_from_capacity_three() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(3);

        for id in 1..=4u64 {
            assert!(table.add_element(doc(id, 0), true));
        }

        // The load-factor trigger fires at used=2/capacity=3 and again at
        // used=4/capacity=7, so four inserts pass through 7 and land at 15.
        assert_eq!(table.capacity(), 15);
        assert_eq!(table.len(), 4);
        assert_eq!(table.stats().resizes, 2);

        for id in 1..=4u64 {
            assert!(table.find_key(&id).is_some(), "{table:#?}");
        }
        assert_probe_chains(&table);
    }

    #[test]
    fn backshift_without_wraparound() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(7);

        // Bucket 2 collision chain occupying slots 2, 3, 4.
        for id in [2u64, 9, 16] {
            table.add_element(doc(id, 0), true);
        }

        assert_eq!(table.remove_key(&2), Some(doc(2, 0)));
        assert_eq!(table.len(), 2);

        let desc = DocDesc;
        assert_eq!(table.slots()[2].id, 9);
        assert_eq!(table.slots()[3].id, 16);
        assert!(desc.is_empty_element(&table.slots()[4]));
        assert_probe_chains(&table);

        assert_eq!(table.find_key(&9), Some(&doc(9, 0)));
        assert_eq!(table.find_key(&16), Some(&doc(16, 0)));
    }

    #[test]
    fn backshift_with_wraparound() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(7);

        // Bucket 6 collision chain wraps into slots 6, 0, 1.
        for id in [6u64, 13, 20] {
            table.add_element(doc(id, 0), true);
        }
        assert_eq!(table.slots()[6].id, 6);
        assert_eq!(table.slots()[0].id, 13);
        assert_eq!(table.slots()[1].id, 20);

        // Removing the element at slot 6 must pull both survivors back
        // across the wrap point.
        assert_eq!(table.remove_key(&6), Some(doc(6, 0)));

        let desc = DocDesc;
        assert_eq!(table.slots()[6].id, 13);
        assert_eq!(table.slots()[0].id, 20);
        assert!(desc.is_empty_element(&table.slots()[1]));
        assert_probe_chains(&table);

        assert_eq!(table.find_key(&13), Some(&doc(13, 0)));
        assert_eq!(table.find_key(&20), Some(&doc(20, 0)));
    }

    #[test]
    fn overwrite_and_reject() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(7);

        assert!(table.add_element(doc(5, 1), true));

        assert!(!table.add_element(doc(5, 2), false));
        assert_eq!(table.find_key(&5), Some(&doc(5, 1)));

        assert!(!table.add_element(doc(5, 2), true));
        assert_eq!(table.find_key(&5), Some(&doc(5, 2)));

        assert_eq!(table.len(), 1);
        assert_eq!(table.stats().adds, 3);
    }

    #[test]
    fn keyed_insert_shares_the_growth_path() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(3);

        for id in 1..=4u64 {
            assert!(table.add_element_with_key(&id, doc(id, id as i32), true));
        }
        assert_eq!(table.capacity(), 15);
        assert_eq!(table.len(), 4);

        for id in 1..=4u64 {
            assert_eq!(table.find_key(&id), Some(&doc(id, id as i32)));
        }

        // Duplicate through the keyed path behaves like add_element.
        assert!(!table.add_element_with_key(&3, doc(3, 99), false));
        assert_eq!(table.find_key(&3), Some(&doc(3, 3)));
        assert!(!table.add_element_with_key(&3, doc(3, 99), true));
        assert_eq!(table.find_key(&3), Some(&doc(3, 99)));
    }

    #[test]
    fn remove_then_find_returns_nothing() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(7);
        for id in [3u64, 10, 17] {
            table.add_element(doc(id, 0), true);
        }

        assert!(table.remove_element(&doc(10, -5)));
        assert!(table.find_element(&doc(10, 0)).is_none());
        assert!(!table.remove_element(&doc(10, 0)));
        assert_eq!(table.len(), 2);

        assert!(table.remove_key(&99).is_none());
        assert_eq!(table.stats().removes, 3);
    }

    #[test]
    fn vetoed_growth_keeps_capacity() {
        let mut table: AssocArray<DocDesc, VetoAtFillUp> = AssocArray::with_capacity(7);

        for id in 1..=6u64 {
            assert!(table.add_element(doc(id, 0), true));
            assert_eq!(table.capacity(), 7);
        }

        assert_eq!(table.len(), 6);
        assert_eq!(table.stats().resizes, 0);
        for id in 1..=6u64 {
            assert!(table.find_key(&id).is_some());
        }
        assert_probe_chains(&table);
    }

    #[test]
    fn full_table_probes_terminate() {
        let mut table: AssocArray<DocDesc, VetoAtFillUp> = AssocArray::with_capacity(3);
        for id in 1..=3u64 {
            assert!(table.add_element(doc(id, 0), true));
        }
        assert_eq!(table.len(), 3);

        assert!(table.find_key(&99).is_none());
        assert!(table.remove_key(&99).is_none());
        assert!(table.find_key(&2).is_some());

        // Removal re-opens a slot and the table keeps working.
        assert_eq!(table.remove_key(&1), Some(doc(1, 0)));
        assert_probe_chains(&table);
        assert!(table.add_element(doc(7, 0), true));
        assert!(table.find_key(&7).is_some());
    }

    #[test]
    #[should_panic(expected = "no free slot")]
    fn adding_to_a_full_table_panics() {
        let mut table: AssocArray<DocDesc, VetoAtFillUp> = AssocArray::with_capacity(3);
        for id in 1..=3u64 {
            table.add_element(doc(id, 0), true);
        }
        table.add_element(doc(4, 0), true);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn zero_capacity_panics() {
        let _table: AssocArray<DocDesc> = AssocArray::with_capacity(0);
    }

    #[test]
    fn capacity_one_grows_on_first_insert() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(1);

        assert!(table.add_element(doc(5, 0), true));
        assert_eq!(table.capacity(), 3);
        assert_eq!(table.find_key(&5), Some(&doc(5, 0)));

        assert_eq!(table.remove_key(&5), Some(doc(5, 0)));
        assert!(table.is_empty());
    }

    #[test]
    fn clear_resets_counters_except_resizes() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(3);
        for id in 1..=4u64 {
            table.add_element(doc(id, 0), true);
        }
        table.find_key(&1);
        assert_eq!(table.stats().resizes, 2);

        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.capacity(), 15);
        let desc = DocDesc;
        assert!(
            table
                .slots()
                .iter()
                .all(|slot| desc.is_empty_element(slot))
        );

        let stats = table.stats();
        assert_eq!(stats.adds, 0);
        assert_eq!(stats.finds, 0);
        assert_eq!(stats.probes_add, 0);
        assert_eq!(stats.probes_find, 0);
        assert_eq!(stats.resizes, 2);

        // The cleared table stays usable.
        assert!(table.add_element(doc(1, 1), true));
        assert_eq!(table.find_key(&1), Some(&doc(1, 1)));
    }

    /// Description whose elements index an external arena; deletion marks
    /// the arena entry as released.
    struct ArenaDesc {
        released: Rc<RefCell<Vec<bool>>>,
    }

    impl Description for ArenaDesc {
        type Key = u64;
        type Element = Doc;

        fn empty_element(&self) -> Doc {
            Doc { id: 0, value: 0 }
        }

        fn is_empty_element(&self, element: &Doc) -> bool {
            element.id == 0
        }

        fn hash_key(&self, key: &u64) -> u32 {
            *key as u32
        }

        fn hash_element(&self, element: &Doc) -> u32 {
            element.id as u32
        }

        fn key_matches_element(&self, key: &u64, element: &Doc) -> bool {
            *key == element.id
        }

        fn element_matches_element(&self, left: &Doc, right: &Doc) -> bool {
            left.id == right.id
        }

        fn delete_element(&self, element: &mut Doc) {
            if element.id != 0 {
                self.released.borrow_mut()[element.id as usize] = true;
            }
        }
    }

    #[test]
    fn clear_and_delete_releases_payloads() {
        let released = Rc::new(RefCell::new(vec![false; 8]));
        let desc = ArenaDesc {
            released: Rc::clone(&released),
        };
        let mut table: AssocArray<ArenaDesc> = AssocArray::with_capacity_and_description(7, desc);

        for id in [1u64, 2, 3] {
            table.add_element(doc(id, 0), true);
        }

        table.clear_and_delete();

        assert!(table.is_empty());
        assert_eq!(table.capacity(), 7);
        let released = released.borrow();
        assert!(released[1] && released[2] && released[3]);
        assert!(!released[4]);
    }

    #[test]
    fn swap_exchanges_everything() {
        let mut left: AssocArray<DocDesc> = AssocArray::with_capacity(7);
        let mut right: AssocArray<DocDesc> = AssocArray::with_capacity(5);

        left.add_element(doc(1, 0), true);
        left.add_element(doc(2, 0), true);
        right.add_element(doc(9, 0), true);

        left.swap(&mut right);

        assert_eq!(left.len(), 1);
        assert_eq!(left.capacity(), 5);
        assert!(left.find_key(&9).is_some());
        assert!(left.find_key(&1).is_none());

        assert_eq!(right.len(), 2);
        assert_eq!(right.capacity(), 7);
        assert!(right.find_key(&1).is_some());
        assert!(right.find_key(&2).is_some());

        assert_eq!(left.stats().adds, 1);
        assert_eq!(right.stats().adds, 2);
    }

    #[test]
    fn iterator_yields_used_slots() {
        let mut table: AssocArray<DocDesc> = AssocArray::with_capacity(7);
        for id in [3u64, 10, 17] {
            table.add_element(doc(id, id as i32), true);
        }

        let mut ids: Vec<u64> = table.iter().map(|element| element.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![3, 10, 17]);

        let count = (&table).into_iter().count();
        assert_eq!(count, 3);
    }

    #[test]
    fn growth_preserves_membership() {
        let desc = SipDesc::random();
        let mut table: AssocArray<SipDesc> = AssocArray::with_capacity_and_description(3, desc);

        for id in 1..=100u64 {
            assert!(table.add_element(doc(id, id as i32), true));
        }

        assert_eq!(table.len(), 100);
        assert_eq!(table.capacity(), 255);
        assert_eq!(table.stats().resizes, 6);

        for id in 1..=100u64 {
            assert_eq!(table.find_key(&id), Some(&doc(id, id as i32)));
        }
        assert_probe_chains(&table);
    }

    #[test]
    fn randomized_ops_preserve_probe_chains() {
        let mut rng = OsRng;
        let desc = SipDesc::random();
        let mut table: AssocArray<SipDesc> = AssocArray::with_capacity_and_description(7, desc);
        let mut model: HashMap<u64, i32> = HashMap::new();

        for _ in 0..1000 {
            let r = rng.try_next_u64().unwrap();
            // Small id space keeps the chains long and the wraps frequent.
            let id = r % 48 + 1;
            let value = (r >> 16) as i32;

            match (r >> 32) % 3 {
                0 => {
                    let inserted = table.add_element(doc(id, value), true);
                    let was_absent = model.insert(id, value).is_none();
                    assert_eq!(inserted, was_absent);
                }
                1 => {
                    let removed = table.remove_key(&id);
                    let model_removed = model.remove(&id);
                    assert_eq!(removed.map(|element| element.value), model_removed);
                }
                _ => {
                    let found = table.find_key(&id);
                    assert_eq!(found.map(|element| element.value), model.get(&id).copied());
                }
            }

            assert_eq!(table.len(), model.len());
            assert_probe_chains(&table);
        }
    }
}
