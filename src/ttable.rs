/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::{Move, Score, ZobristKey};

/// Number of bytes in a megabyte
const BYTES_IN_MB: usize = 1024 * 1024;

/// Number of entries that share one bucket.
const CLUSTER_SIZE: usize = 4;

/// Each new search bumps the generation by this much, leaving the low two bits for the [`Bound`].
const GENERATION_STEP: u8 = 4;

/// Masks the generation out of an entry's flag byte.
const GENERATION_MASK: u8 = 0xFC;

/// What a stored score says about the true value of its position.
///
/// See [CPW](https://www.chessprogramming.org/Node_Types) for more.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Default)]
#[repr(u8)]
pub enum Bound {
    /// Nothing stored. Every stored entry carries one of the other bounds.
    #[default]
    None = 0,

    /// The score failed low; the true value is at most this (All-node).
    Upper = 1,

    /// The score failed high; the true value is at least this (Cut-node).
    Lower = 2,

    /// The score is exact (PV-node).
    Exact = 3,
}

impl Bound {
    #[inline(always)]
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::None,
            1 => Self::Upper,
            2 => Self::Lower,
            _ => Self::Exact,
        }
    }

    /// Returns `true` if this bound includes every bit of `other`, such that [`Bound::Exact`] includes both
    /// [`Bound::Upper`] and [`Bound::Lower`].
    #[inline(always)]
    pub const fn includes(&self, other: Self) -> bool {
        *self as u8 & other as u8 != 0
    }
}

/// The decoded contents of one table slot.
///
/// Packed into a single `u64`:
/// ```text
///     [63-48] upper 16 bits of the position key
///     [47-32] best move
///     [31-16] score
///     [15-8]  depth
///     [7-0]   generation (upper 6 bits) | bound (lower 2 bits)
/// ```
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct TTEntry {
    key16: u16,
    mv: u16,
    score: i16,
    depth: u8,
    flag: u8,
}

impl TTEntry {
    #[inline(always)]
    const fn unpack(bits: u64) -> Self {
        Self {
            key16: (bits >> 48) as u16,
            mv: (bits >> 32) as u16,
            score: (bits >> 16) as u16 as i16,
            depth: (bits >> 8) as u8,
            flag: bits as u8,
        }
    }

    #[inline(always)]
    const fn pack(&self) -> u64 {
        (self.key16 as u64) << 48
            | (self.mv as u64) << 32
            | (self.score as u16 as u64) << 16
            | (self.depth as u64) << 8
            | self.flag as u64
    }

    /// Best move stored for this position, or [`Move::NONE`].
    #[inline(always)]
    pub const fn mv(&self) -> Move {
        Move::from_inner(self.mv)
    }

    /// Stored score, still relative to the node it was stored at. See [`Score::from_tt`].
    #[inline(always)]
    pub const fn score(&self) -> Score {
        Score(self.score as i32)
    }

    #[inline(always)]
    pub const fn depth(&self) -> i32 {
        self.depth as i32
    }

    #[inline(always)]
    pub const fn bound(&self) -> Bound {
        Bound::from_bits(self.flag)
    }

    #[inline(always)]
    const fn generation(&self) -> u8 {
        self.flag & GENERATION_MASK
    }

    #[inline(always)]
    const fn is_empty(&self) -> bool {
        self.flag & 0x3 == Bound::None as u8
    }
}

/// Result of [`TTable::probe`].
///
/// `slot` is where a later [`TTable::store`] for the same key should write, whether or not the probe hit.
#[derive(Clone, Copy, Debug)]
pub struct TTProbe {
    pub hit: bool,
    pub entry: TTEntry,
    slot: usize,
}

#[derive(Default)]
#[repr(align(32))]
struct Cluster([AtomicU64; CLUSTER_SIZE]);

/// Transposition Table.
///
/// Shared by every search thread without locks. Each slot is one `u64` read and written with relaxed atomics,
/// so two threads writing the same slot leave one of the two complete entries behind.
/// A slot overwritten between a probe and the matching store simply gets clobbered: its key
/// no longer matches, and the next probe treats it as a miss.
pub struct TTable {
    clusters: Vec<Cluster>,
    generation: AtomicU8,
}

impl TTable {
    /// Default size of the Transposition Table, in megabytes.
    pub const DEFAULT_SIZE: usize = 16;

    /// Minimum size of the Transposition Table, in megabytes.
    pub const MIN_SIZE: usize = 1;

    /// Maximum size of the Transposition Table, in megabytes.
    pub const MAX_SIZE: usize = 65_536;

    /// Create a new [`TTable`] of at most `mb` megabytes.
    ///
    /// The number of clusters is rounded down to a power of two.
    /// Terminates the process if the memory cannot be allocated.
    pub fn new(mb: usize) -> Self {
        let mut tt = Self {
            clusters: Vec::new(),
            generation: AtomicU8::new(0),
        };
        tt.resize(mb);
        tt
    }

    /// Reallocates this table to at most `mb` megabytes, discarding all entries.
    pub fn resize(&mut self, mb: usize) {
        let mb = mb.clamp(Self::MIN_SIZE, Self::MAX_SIZE);
        let clusters = mb * BYTES_IN_MB / size_of::<Cluster>();
        let count = 1usize << clusters.ilog2();

        if count == self.clusters.len() {
            self.clear();
            return;
        }

        // Release the old table first so both are never alive at once
        self.clusters = Vec::new();
        if self.clusters.try_reserve_exact(count).is_err() {
            log::error!("Failed to allocate {mb}MB for the transposition table");
            std::process::exit(1);
        }
        self.clusters.resize_with(count, Cluster::default);
        self.generation.store(0, Ordering::Relaxed);

        log::debug!("Transposition table resized to {mb}MB ({count} clusters)");
    }

    /// Zeroes every entry.
    pub fn clear(&self) {
        for cluster in &self.clusters {
            for slot in &cluster.0 {
                slot.store(0, Ordering::Relaxed);
            }
        }
        self.generation.store(0, Ordering::Relaxed);

        log::debug!("Transposition table cleared");
    }

    /// Ages every entry by one generation, making older entries preferred for replacement.
    #[inline(always)]
    pub fn new_search(&self) {
        self.generation.fetch_add(GENERATION_STEP, Ordering::Relaxed);
    }

    #[inline(always)]
    fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Size of this table, in megabytes.
    #[inline(always)]
    pub fn size_mb(&self) -> usize {
        self.clusters.len() * size_of::<Cluster>() / BYTES_IN_MB
    }

    /// Number of entries this table can hold.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.clusters.len() * CLUSTER_SIZE
    }

    #[inline(always)]
    fn cluster_index(&self, key: ZobristKey) -> usize {
        key.inner() as usize & (self.clusters.len() - 1)
    }

    #[inline(always)]
    fn slot(&self, slot: usize) -> &AtomicU64 {
        &self.clusters[slot / CLUSTER_SIZE].0[slot % CLUSTER_SIZE]
    }

    /// Looks up `key`.
    ///
    /// On a hit, the entry is refreshed to the current generation. On a miss, the returned slot is
    /// the first empty entry of the cluster if there is one, or else the least valuable entry:
    /// the shallowest after penalizing each entry by how many generations old it is.
    pub fn probe(&self, key: ZobristKey) -> TTProbe {
        let key16 = (key.inner() >> 48) as u16;
        let generation = self.generation();
        let first = self.cluster_index(key) * CLUSTER_SIZE;

        let mut entries = [TTEntry::default(); CLUSTER_SIZE];
        for (i, entry) in entries.iter_mut().enumerate() {
            *entry = TTEntry::unpack(self.slot(first + i).load(Ordering::Relaxed));
        }

        for (i, entry) in entries.iter().enumerate() {
            if entry.is_empty() || entry.key16 == key16 {
                let mut entry = *entry;
                let hit = !entry.is_empty();

                if hit && entry.generation() != generation {
                    entry.flag = generation | entry.bound() as u8;
                    self.slot(first + i).store(entry.pack(), Ordering::Relaxed);
                }

                return TTProbe {
                    hit,
                    entry,
                    slot: first + i,
                };
            }
        }

        let worth = |entry: &TTEntry| {
            let age = (259 + generation as i32 - entry.flag as i32) & GENERATION_MASK as i32;
            entry.depth() - age * 2
        };

        let mut replace = 0;
        for i in 1..CLUSTER_SIZE {
            if worth(&entries[replace]) > worth(&entries[i]) {
                replace = i;
            }
        }

        TTProbe {
            hit: false,
            entry: entries[replace],
            slot: first + replace,
        }
    }

    /// Writes a search result into the slot returned by a previous [`TTable::probe`] for `key`.
    ///
    /// The move is kept when storing [`Move::NONE`] over an entry of the same position.
    /// The rest of the entry is only overwritten by a different position, by a result that is not much shallower,
    /// or by an exact result.
    pub fn store(
        &self,
        probe: &TTProbe,
        key: ZobristKey,
        depth: i32,
        score: Score,
        mv: Move,
        bound: Bound,
    ) {
        debug_assert_ne!(bound, Bound::None);

        let key16 = (key.inner() >> 48) as u16;
        let slot = self.slot(probe.slot);
        let mut entry = TTEntry::unpack(slot.load(Ordering::Relaxed));
        let depth = depth.clamp(0, u8::MAX as i32);
        let other = entry.is_empty() || key16 != entry.key16;

        if mv != Move::NONE || other {
            entry.mv = mv.inner();
        }

        if other || depth > entry.depth() - 4 || bound == Bound::Exact {
            entry.key16 = key16;
            entry.depth = depth as u8;
            entry.flag = self.generation() | bound as u8;
            entry.score = score.0.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }

        slot.store(entry.pack(), Ordering::Relaxed);
    }

    /// Permille of the sampled entries that were written during the current search.
    pub fn hashfull(&self) -> usize {
        let generation = self.generation();
        let sample = self.clusters.len().min(1_000);
        if sample == 0 {
            return 0;
        }

        let used = self.clusters[..sample]
            .iter()
            .flat_map(|cluster| cluster.0.iter())
            .map(|slot| TTEntry::unpack(slot.load(Ordering::Relaxed)))
            .filter(|entry| !entry.is_empty() && entry.generation() == generation)
            .count();

        used * 1_000 / (sample * CLUSTER_SIZE)
    }

    /// Hints the CPU to start loading the cluster for `key` into cache.
    #[inline(always)]
    pub fn prefetch(&self, key: ZobristKey) {
        #[cfg(target_arch = "x86_64")]
        {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            let ptr = &self.clusters[self.cluster_index(key)] as *const Cluster as *const i8;
            // Safety: `ptr` points into `self.clusters`, and prefetching never faults.
            unsafe { _mm_prefetch(ptr, _MM_HINT_T0) };
        }

        #[cfg(not(target_arch = "x86_64"))]
        let _ = key;
    }
}

impl Default for TTable {
    #[inline(always)]
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

impl std::fmt::Debug for TTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TTable")
            .field("size_mb", &self.size_mb())
            .field("clusters", &self.clusters.len())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    /// Keys that all land in the same cluster but carry different 16-bit tags.
    fn colliding_key(tag: u64) -> ZobristKey {
        ZobristKey::new(tag << 48 | 0x1234)
    }

    #[test]
    fn test_entry_packing() {
        let entry = TTEntry {
            key16: 0xBEEF,
            mv: Move::new(Square::E2, Square::E4, MoveKind::Normal).inner(),
            score: -1234,
            depth: 17,
            flag: 8 | Bound::Lower as u8,
        };
        let unpacked = TTEntry::unpack(entry.pack());
        assert_eq!(unpacked, entry);
        assert_eq!(unpacked.score(), Score(-1234));
        assert_eq!(unpacked.bound(), Bound::Lower);
        assert_eq!(unpacked.generation(), 8);
    }

    #[test]
    fn test_store_then_probe() {
        let tt = TTable::new(1);
        let pos = Position::default();
        let key = pos.key();
        let mv = Move::from_uci(&pos, "g1f3");

        let probe = tt.probe(key);
        assert!(!probe.hit);
        tt.store(&probe, key, 7, Score(35), mv, Bound::Exact);

        let probe = tt.probe(key);
        assert!(probe.hit);
        assert_eq!(probe.entry.mv(), mv);
        assert_eq!(probe.entry.depth(), 7);
        assert_eq!(probe.entry.score(), Score(35));
        assert_eq!(probe.entry.bound(), Bound::Exact);
    }

    #[test]
    fn test_keep_move_and_depth() {
        let tt = TTable::new(1);
        let key = colliding_key(1);
        let mv = Move::new(Square::D2, Square::D4, MoveKind::Normal);

        let probe = tt.probe(key);
        tt.store(&probe, key, 10, Score(50), mv, Bound::Lower);

        // A much shallower non-exact result without a move changes nothing
        let probe = tt.probe(key);
        tt.store(&probe, key, 2, Score(-80), Move::NONE, Bound::Upper);
        let entry = tt.probe(key).entry;
        assert_eq!(entry.mv(), mv);
        assert_eq!(entry.depth(), 10);
        assert_eq!(entry.bound(), Bound::Lower);

        // An exact result always overwrites, but still keeps the move
        let probe = tt.probe(key);
        tt.store(&probe, key, 2, Score(-80), Move::NONE, Bound::Exact);
        let entry = tt.probe(key).entry;
        assert_eq!(entry.mv(), mv);
        assert_eq!(entry.depth(), 2);
        assert_eq!(entry.score(), Score(-80));
    }

    #[test]
    fn test_replacement_prefers_shallow() {
        let tt = TTable::new(1);
        for (tag, depth) in [(1, 9), (2, 3), (3, 12), (4, 6)] {
            let key = colliding_key(tag);
            let probe = tt.probe(key);
            tt.store(&probe, key, depth, Score(0), Move::NONE, Bound::Lower);
        }

        // Cluster is full, so the depth 3 entry gets evicted
        let newcomer = colliding_key(5);
        let probe = tt.probe(newcomer);
        assert!(!probe.hit);
        assert_eq!(probe.entry.depth(), 3);
        tt.store(&probe, newcomer, 1, Score(0), Move::NONE, Bound::Lower);

        assert!(tt.probe(newcomer).hit);
        assert!(!tt.probe(colliding_key(2)).hit);
        for tag in [1, 3, 4] {
            assert!(tt.probe(colliding_key(tag)).hit);
        }
    }

    #[test]
    fn test_replacement_prefers_old() {
        let tt = TTable::new(1);

        let old = colliding_key(1);
        let probe = tt.probe(old);
        tt.store(&probe, old, 10, Score(0), Move::NONE, Bound::Exact);

        tt.new_search();
        for tag in 2..=4 {
            let key = colliding_key(tag);
            let probe = tt.probe(key);
            tt.store(&probe, key, 5, Score(0), Move::NONE, Bound::Exact);
        }

        // The deep entry from the previous search is worth less than the shallow fresh ones
        let probe = tt.probe(colliding_key(5));
        assert!(!probe.hit);
        assert_eq!(probe.entry.depth(), 10);
    }

    #[test]
    fn test_probe_refreshes_generation() {
        let tt = TTable::new(1);
        let key = colliding_key(7);
        let probe = tt.probe(key);
        tt.store(&probe, key, 4, Score(0), Move::NONE, Bound::Upper);

        tt.new_search();
        let probe = tt.probe(key);
        assert!(probe.hit);
        assert_eq!(probe.entry.generation(), GENERATION_STEP);
        assert_eq!(probe.entry.bound(), Bound::Upper);
    }

    #[test]
    fn test_zero_tag_is_stored() {
        let tt = TTable::new(1);
        let key = colliding_key(0);
        let mv = Move::new(Square::G1, Square::F3, MoveKind::Normal);

        let probe = tt.probe(key);
        assert!(!probe.hit);
        tt.store(&probe, key, 6, Score(12), mv, Bound::Upper);

        let probe = tt.probe(key);
        assert!(probe.hit);
        assert_eq!(probe.entry.mv(), mv);
        assert_eq!(probe.entry.depth(), 6);

        // Fill the rest of the cluster; the zero-tag entry is no longer the first to go
        for tag in 1..=3 {
            let key = colliding_key(tag);
            let probe = tt.probe(key);
            tt.store(&probe, key, 2, Score(0), Move::NONE, Bound::Lower);
        }
        assert!(tt.probe(key).hit);
        assert_eq!(tt.probe(colliding_key(4)).entry.depth(), 2);
    }

    #[test]
    fn test_hashfull() {
        let tt = TTable::new(1);
        assert_eq!(tt.hashfull(), 0);

        // One entry in each of the sampled clusters
        for index in 0..1_000 {
            let key = ZobristKey::new(1 << 48 | index);
            let probe = tt.probe(key);
            tt.store(&probe, key, 1, Score(0), Move::NONE, Bound::Lower);
        }
        assert_eq!(tt.hashfull(), 250);

        tt.new_search();
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn test_clear_and_size() {
        let mut tt = TTable::new(2);
        assert_eq!(tt.size_mb(), 2);
        assert!(tt.capacity().is_power_of_two());

        let key = colliding_key(3);
        let probe = tt.probe(key);
        tt.store(&probe, key, 1, Score(1), Move::NONE, Bound::Exact);
        tt.clear();
        assert!(!tt.probe(key).hit);

        tt.resize(1);
        assert_eq!(tt.size_mb(), 1);
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn test_bound_includes() {
        assert!(Bound::Exact.includes(Bound::Lower));
        assert!(Bound::Exact.includes(Bound::Upper));
        assert!(!Bound::Lower.includes(Bound::Upper));
        assert!(!Bound::None.includes(Bound::Lower));
    }
}
