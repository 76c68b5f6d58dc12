//! Time-keyed eviction cache.
//!
//! Records are stored in an open-addressed slot table keyed by timestamp.
//! Keys are mixed with a Fibonacci multiplicative hash before they are reduced
//! to a home slot, so bar-aligned timestamps spread over the whole table.
//! Every record sits within `max_conflicts` slots of its home, which bounds
//! both hits and misses.
//!
//! Below `CachePolicy::max_slots` the table grows when it passes a 3/4 load
//! factor or when an insertion finds its lookup run occupied. At the cap a full
//! lookup run is overwritten instead: the slot with the most recorded conflicts
//! is replaced, ties going to the least recently used slot.

use tracing::debug;

/// Growth is triggered once `len / slots` would exceed `LOAD_NUM / LOAD_DEN`.
const LOAD_NUM: usize = 3;
const LOAD_DEN: usize = 4;

const FIBONACCI: u64 = 0x9E37_79B9_7F4A_7C15;

/// Sizing and overwrite parameters of a [`TimeKeyedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub initial_slots: usize,
    /// Hard cap on the slot count. 86,400 holds one day of per-second candles.
    pub max_slots: usize,
    /// Longest lookup run: a lookup inspects at most this many slots, and a
    /// full run at the cap is where the overwrite victim is chosen.
    pub max_conflicts: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            initial_slots: 1024,
            max_slots: 86_400,
            max_conflicts: 8,
        }
    }
}

impl CachePolicy {
    /// A table that never grows: `slots` is both the initial size and the cap,
    /// and every slot is an overwrite candidate, so nothing is overwritten
    /// before the table is full.
    pub fn fixed(slots: usize) -> Self {
        Self {
            initial_slots: slots,
            max_slots: slots,
            max_conflicts: slots,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearDirection {
    /// Remove keys strictly before the pivot.
    Older,
    /// Remove keys strictly after the pivot.
    Newer,
}

#[derive(Debug, Clone)]
struct Slot<R> {
    key: i64,
    record: R,
    conflicts: u32,
    last_used: u64,
}

#[derive(Debug, Clone)]
pub struct TimeKeyedCache<R> {
    slots: Vec<Option<Slot<R>>>,
    len: usize,
    min: Option<i64>,
    max: Option<i64>,
    policy: CachePolicy,
    clock: u64,
    overwrites: u64,
}

impl<R> Default for TimeKeyedCache<R> {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl<R> TimeKeyedCache<R> {
    pub fn new(policy: CachePolicy) -> Self {
        let max_slots = policy.max_slots.max(1);
        let policy = CachePolicy {
            initial_slots: policy.initial_slots.clamp(1, max_slots),
            max_slots,
            max_conflicts: policy.max_conflicts.max(1),
        };
        Self {
            slots: empty_slots(policy.initial_slots),
            len: 0,
            min: None,
            max: None,
            policy,
            clock: 0,
            overwrites: 0,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of records replaced by the overwrite policy so far.
    pub fn overwrite_count(&self) -> u64 {
        self.overwrites
    }

    pub fn min_key(&self) -> Option<i64> {
        self.min
    }

    pub fn max_key(&self) -> Option<i64> {
        self.max
    }

    pub fn contains(&self, key: i64) -> bool {
        self.find(key).is_some()
    }

    /// Looks up `key` and marks its slot as recently used.
    pub fn get(&mut self, key: i64) -> Option<&R> {
        let idx = self.find(key)?;
        self.clock += 1;
        let clock = self.clock;
        self.slots[idx].as_mut().map(|slot| {
            slot.last_used = clock;
            &slot.record
        })
    }

    /// Looks up `key` without touching recency.
    pub fn peek(&self, key: i64) -> Option<&R> {
        let idx = self.find(key)?;
        self.slots[idx].as_ref().map(|slot| &slot.record)
    }

    pub fn get_mut(&mut self, key: i64) -> Option<&mut R> {
        let idx = self.find(key)?;
        self.clock += 1;
        let clock = self.clock;
        self.slots[idx].as_mut().map(|slot| {
            slot.last_used = clock;
            &mut slot.record
        })
    }

    /// Inserts or replaces the record stored under `key`.
    pub fn put(&mut self, key: i64, record: R) {
        self.clock += 1;

        if let Some(idx) = self.find(key) {
            if let Some(slot) = self.slots[idx].as_mut() {
                slot.record = record;
                slot.last_used = self.clock;
            }
            return;
        }

        if self.below_cap() && (self.len + 1) * LOAD_DEN > self.slots.len() * LOAD_NUM {
            self.grow();
        }

        let mut slot = Slot {
            key,
            record,
            conflicts: 0,
            last_used: self.clock,
        };
        loop {
            match self.place(slot) {
                Ok(()) => {
                    self.len += 1;
                    self.extend_bounds(key);
                    return;
                }
                Err(back) if self.below_cap() => {
                    self.grow();
                    slot = back;
                }
                Err(back) => {
                    self.overwrite(back);
                    return;
                }
            }
        }
    }

    /// Removes `key`, shifting later members of its lookup run back so lookups
    /// keep terminating at the first vacant slot.
    pub fn remove(&mut self, key: i64) -> Option<R> {
        let removed = self.take_slot(key)?;
        if Some(removed.key) == self.min || Some(removed.key) == self.max {
            self.recompute_bounds();
        }
        Some(removed.record)
    }

    /// Removes every key strictly older (or newer) than `pivot`. Returns the
    /// number of records removed.
    pub fn clear(&mut self, pivot: i64, direction: ClearDirection) -> usize {
        let doomed: Vec<i64> = self
            .iter()
            .map(|(key, _)| key)
            .filter(|&key| match direction {
                ClearDirection::Older => key < pivot,
                ClearDirection::Newer => key > pivot,
            })
            .collect();
        for &key in &doomed {
            self.take_slot(key);
        }

        if !doomed.is_empty() {
            self.recompute_bounds();
            debug!(pivot, ?direction, removed = doomed.len(), "cleared cache range");
        }
        doomed.len()
    }

    pub fn clear_all(&mut self) {
        self.slots = empty_slots(self.policy.initial_slots);
        self.len = 0;
        self.min = None;
        self.max = None;
    }

    /// All stored keys in ascending order.
    pub fn keys(&self) -> Vec<i64> {
        let mut keys: Vec<i64> = self.slots.iter().flatten().map(|slot| slot.key).collect();
        keys.sort_unstable();
        keys
    }

    /// Unordered iteration over `(key, record)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &R)> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| (slot.key, &slot.record))
    }

    fn home(&self, key: i64) -> usize {
        let mixed = (key as u64).wrapping_mul(FIBONACCI);
        ((mixed as u128 * self.slots.len() as u128) >> 64) as usize
    }

    fn run_limit(&self) -> usize {
        self.policy.max_conflicts.min(self.slots.len())
    }

    fn below_cap(&self) -> bool {
        self.slots.len() < self.policy.max_slots
    }

    fn find(&self, key: i64) -> Option<usize> {
        let n = self.slots.len();
        let home = self.home(key);
        for i in 0..self.run_limit() {
            let idx = (home + i) % n;
            match &self.slots[idx] {
                None => return None,
                Some(slot) if slot.key == key => return Some(idx),
                Some(_) => {}
            }
        }
        None
    }

    fn take_slot(&mut self, key: i64) -> Option<Slot<R>> {
        let idx = self.find(key)?;
        let removed = self.slots[idx].take()?;
        self.len -= 1;

        let n = self.slots.len();
        let mut hole = idx;
        let mut j = idx;
        loop {
            j = (j + 1) % n;
            if j == idx {
                break;
            }
            let home = match &self.slots[j] {
                Some(slot) => self.home(slot.key),
                None => break,
            };
            let stays = if hole < j {
                home > hole && home <= j
            } else {
                home > hole || home <= j
            };
            if !stays {
                self.slots[hole] = self.slots[j].take();
                hole = j;
            }
        }
        Some(removed)
    }

    /// Puts `slot` in the first vacant slot of its lookup run, counting a
    /// conflict on every occupied slot it passes. A full run hands it back.
    fn place(&mut self, slot: Slot<R>) -> Result<(), Slot<R>> {
        let n = self.slots.len();
        let home = self.home(slot.key);
        for i in 0..self.run_limit() {
            let cell = &mut self.slots[(home + i) % n];
            if let Some(occupied) = cell.as_mut() {
                occupied.conflicts = occupied.conflicts.saturating_add(1);
            } else {
                *cell = Some(slot);
                return Ok(());
            }
        }
        Err(slot)
    }

    /// Doubles the table (clamped to the cap) and rehashes every record,
    /// recomputing conflict counts. A record whose run is still full after
    /// rehashing at the cap overwrites a victim.
    fn grow(&mut self) {
        let old_count = self.slots.len();
        let mut count = old_count;
        let mut records = self.drain_sorted();
        loop {
            count = (count * 2).clamp(count + 1, self.policy.max_slots);
            self.slots = empty_slots(count);
            let mut spilled = Vec::new();
            for mut slot in records {
                slot.conflicts = 0;
                if let Err(back) = self.place(slot) {
                    spilled.push(back);
                }
            }
            if spilled.is_empty() {
                break;
            }
            if count == self.policy.max_slots {
                for slot in spilled {
                    self.evict_for(slot);
                }
                break;
            }
            records = self.drain_sorted();
            records.extend(spilled);
            records.sort_by_key(|slot| slot.key);
        }

        self.len = self.slots.iter().flatten().count();
        self.recompute_bounds();
        debug!(from = old_count, to = count, len = self.len, "grew cache slot table");
    }

    fn drain_sorted(&mut self) -> Vec<Slot<R>> {
        let mut records: Vec<Slot<R>> = std::mem::take(&mut self.slots)
            .into_iter()
            .flatten()
            .collect();
        records.sort_by_key(|slot| slot.key);
        records
    }

    fn overwrite(&mut self, slot: Slot<R>) {
        let key = slot.key;
        match self.evict_for(slot) {
            Some(old) => {
                if Some(old.key) == self.min || Some(old.key) == self.max {
                    self.recompute_bounds();
                } else {
                    self.extend_bounds(key);
                }
            }
            None => {
                self.len += 1;
                self.extend_bounds(key);
            }
        }
    }

    /// Replaces the victim of `slot`'s lookup run and returns what it evicted.
    fn evict_for(&mut self, mut slot: Slot<R>) -> Option<Slot<R>> {
        let n = self.slots.len();
        let home = self.home(slot.key);

        let mut victim = home;
        let mut best: Option<(u32, u64)> = None;
        for i in 0..self.run_limit() {
            let idx = (home + i) % n;
            if let Some(occupied) = &self.slots[idx] {
                let better = match best {
                    None => true,
                    Some((conflicts, last_used)) => {
                        occupied.conflicts > conflicts
                            || (occupied.conflicts == conflicts && occupied.last_used < last_used)
                    }
                };
                if better {
                    best = Some((occupied.conflicts, occupied.last_used));
                    victim = idx;
                }
            }
        }

        slot.conflicts = 0;
        let inserted = slot.key;
        let evicted = self.slots[victim].replace(slot);
        self.overwrites += 1;
        if let Some(old) = &evicted {
            debug!(evicted = old.key, inserted, conflicts = old.conflicts, "overwrote cache slot");
        }
        evicted
    }

    fn extend_bounds(&mut self, key: i64) {
        self.min = Some(self.min.map_or(key, |m| m.min(key)));
        self.max = Some(self.max.map_or(key, |m| m.max(key)));
    }

    fn recompute_bounds(&mut self) {
        self.min = self.slots.iter().flatten().map(|slot| slot.key).min();
        self.max = self.slots.iter().flatten().map(|slot| slot.key).max();
    }
}

fn empty_slots<R>(count: usize) -> Vec<Option<Slot<R>>> {
    std::iter::repeat_with(|| None).take(count).collect()
}
