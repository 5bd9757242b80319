
//! Bounded, write-back tile cache (§4.6): LRU eviction over a fixed slot
//! count (not a byte budget), one entry per `tileIndex`. Modeled as
//! arena-indexed slots with `(cacheId, generation)` tokens rather than
//! back-pointers into the owning file, per the re-architecture note in §9:
//! accessors hold a token, and a stale token (its slot since evicted and
//! reused) is detected by a generation mismatch instead of dangling.

use std::collections::HashMap;

use super::buffer::TileBuffer;

/// Canonical cache sizes named in §4.6; `Huge` carries the caller's count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSize {
    Small,
    Medium,
    /// Enough slots for one full row or column of tiles.
    Large { tiles_per_row_or_column: u32 },
    Huge(u32),
}

impl CacheSize {
    pub fn slot_count(self) -> u32 {
        match self {
            CacheSize::Small => 4,
            CacheSize::Medium => 16,
            CacheSize::Large { tiles_per_row_or_column } => tiles_per_row_or_column,
            CacheSize::Huge(count) => count,
        }
    }
}

/// A non-owning handle to a live cache slot (§3: "the accessor holds a
/// non-owning handle whose validity is bounded by the next cache eviction
/// on that tile").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileToken {
    slot: usize,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    tile: Option<TileBuffer>,
    generation: u32,
}

/// LRU-evicted cache of [`TileBuffer`]s bounded by slot count.
#[derive(Debug)]
pub struct TileCache {
    slots: Vec<Slot>,
    by_tile_index: HashMap<u32, usize>,
    /// Slot ids in least-to-most-recently-used order.
    lru: Vec<usize>,
    capacity: usize,
}

impl TileCache {
    pub fn new(size: CacheSize) -> Self {
        let capacity = size.slot_count().max(1) as usize;
        Self { slots: Vec::new(), by_tile_index: HashMap::new(), lru: Vec::new(), capacity }
    }

    pub fn len(&self) -> usize {
        self.by_tile_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tile_index.is_empty()
    }

    pub fn contains(&self, tile_index: u32) -> bool {
        self.by_tile_index.contains_key(&tile_index)
    }

    pub fn get(&mut self, tile_index: u32) -> Option<(&TileBuffer, TileToken)> {
        let slot_id = *self.by_tile_index.get(&tile_index)?;
        self.touch(slot_id);
        let slot = &self.slots[slot_id];
        Some((slot.tile.as_ref().expect("cache index points at an occupied slot"), TileToken { slot: slot_id, generation: slot.generation }))
    }

    pub fn get_mut_by_token(&mut self, token: TileToken) -> Option<&mut TileBuffer> {
        let slot = self.slots.get_mut(token.slot)?;
        if slot.generation != token.generation {
            return None;
        }

        slot.tile.as_mut()
    }

    pub fn get_mut(&mut self, tile_index: u32) -> Option<&mut TileBuffer> {
        let slot_id = *self.by_tile_index.get(&tile_index)?;
        self.touch(slot_id);
        self.slots[slot_id].tile.as_mut()
    }

    /// Install a freshly loaded (or synthesized-absent) tile as the most
    /// recently used entry, evicting the LRU slot first if the cache is
    /// already at capacity. Returns the evicted tile so the caller (the
    /// record manager) can encode and write it back if it was dirty.
    pub fn install(&mut self, tile: TileBuffer) -> (TileToken, Option<TileBuffer>) {
        debug_assert!(!self.by_tile_index.contains_key(&tile.tile_index), "at most one cache entry per tileIndex");

        let mut evicted = None;

        let slot_id = if self.slots.len() < self.capacity {
            self.slots.push(Slot { tile: None, generation: 0 });
            self.slots.len() - 1
        } else {
            let lru_slot = self.lru.remove(0);

            if let Some(old_tile) = self.slots[lru_slot].tile.take() {
                self.by_tile_index.remove(&old_tile.tile_index);
                evicted = Some(old_tile);
            }

            self.slots[lru_slot].generation = self.slots[lru_slot].generation.wrapping_add(1);
            lru_slot
        };

        let tile_index = tile.tile_index;
        self.slots[slot_id].tile = Some(tile);
        self.by_tile_index.insert(tile_index, slot_id);
        self.lru.push(slot_id);

        (TileToken { slot: slot_id, generation: self.slots[slot_id].generation }, evicted)
    }

    fn touch(&mut self, slot_id: usize) {
        if let Some(position) = self.lru.iter().position(|&id| id == slot_id) {
            self.lru.remove(position);
            self.lru.push(slot_id);
        }
    }

    /// Every dirty tile's index, ascending (§4.6: "a flush writes all dirty
    /// tiles in ascending tileIndex order").
    pub fn dirty_tile_indices_ascending(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.slots.iter()
            .filter_map(|slot| slot.tile.as_ref())
            .filter(|tile| tile.is_dirty())
            .map(|tile| tile.tile_index)
            .collect();

        indices.sort_unstable();
        indices
    }

    /// Forcibly evict and return every cached tile, dirty or clean, in
    /// ascending `tileIndex` order. Used on close, where nothing stays
    /// resident afterward.
    pub fn drain_all_ascending(&mut self) -> Vec<TileBuffer> {
        let mut tiles: Vec<TileBuffer> = self.slots.iter_mut().filter_map(|slot| slot.tile.take()).collect();
        tiles.sort_by_key(|tile| tile.tile_index);

        self.by_tile_index.clear();
        self.lru.clear();

        tiles
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spec::{ElementSpec, ElementType};

    fn tile(tile_index: u32) -> TileBuffer {
        let specs = vec![ElementSpec::new("e", ElementType::I32, 0).unwrap()];
        TileBuffer::absent(tile_index, &specs, 4, 4)
    }

    #[test]
    fn at_most_one_entry_per_tile_index() {
        let mut cache = TileCache::new(CacheSize::Small);
        cache.install(tile(1));
        assert!(cache.contains(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used_slot() {
        let mut cache = TileCache::new(CacheSize::Huge(2));
        cache.install(tile(1));
        cache.install(tile(2));
        cache.get(1); // touch 1, making 2 the LRU slot
        let (_, evicted) = cache.install(tile(3));
        assert_eq!(evicted.unwrap().tile_index, 2);
        assert!(cache.contains(1));
        assert!(cache.contains(3));
    }

    #[test]
    fn stale_token_is_rejected_after_eviction() {
        let mut cache = TileCache::new(CacheSize::Huge(1));
        let (token, _) = cache.install(tile(1));
        cache.install(tile(2));
        assert!(cache.get_mut_by_token(token).is_none());
    }

    #[test]
    fn dirty_tiles_are_reported_in_ascending_order() {
        let mut cache = TileCache::new(CacheSize::Huge(4));
        cache.install(tile(5));
        cache.install(tile(1));
        cache.install(tile(3));

        cache.get_mut(5).unwrap().write_cell(0, 0, 0, 42).unwrap();
        cache.get_mut(1).unwrap().write_cell(0, 0, 0, 7).unwrap();

        assert_eq!(cache.dirty_tile_indices_ascending(), vec![1, 5]);
    }
}
