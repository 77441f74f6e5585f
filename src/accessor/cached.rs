//! The cached accessor (C8, §4.8): a bounded, LRU-by-last-touch tile cache with
//! write-back, supporting both compressed and uncompressed layers.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Accessor, TileAccess, TileBundle, TileModifier};
use crate::error::{Error, Result};
use crate::io::{self, ByteOrder, Read, Seek, Write};
use crate::layer::Layer;
use crate::meta::header::Header;

struct CacheEntry {
    /// Decoded tile bytes: one slice for interleaved, one per channel for planar.
    planes: Vec<Vec<u8>>,
    dirty: bool,
    last_touch: u64,
}

struct CachedState<S> {
    stream: S,
    layer: Layer,
    cache: HashMap<usize, CacheEntry>,
    clock: u64,
    max_size: usize,
}

impl<S: Read + Write + Seek> CachedState<S> {
    fn channel_count_for_tile(&self) -> usize {
        if self.layer.separated { self.layer.channels.len() } else { 1 }
    }

    fn load(&mut self, tile: usize) -> Result<Vec<Vec<u8>>> {
        let count = self.channel_count_for_tile();
        (0..count).map(|c| {
            let channel_index = self.layer.separated.then_some(c);
            self.layer.read_tile(&mut self.stream, tile, channel_index)
        }).collect()
    }

    fn evict_one_if_full(&mut self) -> Result<()> {
        if self.cache.len() < self.max_size { return Ok(()); }

        let oldest_tile = *self.cache.iter()
            .min_by_key(|(_, entry)| entry.last_touch)
            .map(|(tile, _)| tile)
            .expect("cache is full, so it has at least one entry");

        self.flush_one(oldest_tile)?;
        self.cache.remove(&oldest_tile);
        Ok(())
    }

    fn flush_one(&mut self, tile: usize) -> Result<()> {
        let dirty = self.cache.get(&tile).map(|e| e.dirty).unwrap_or(false);
        if !dirty { return Ok(()); }

        let planes = self.cache[&tile].planes.clone();
        for (c, plane) in planes.iter().enumerate() {
            let channel_index = self.layer.separated.then_some(c);
            self.layer.overwrite_tile(&mut self.stream, tile, channel_index, plane)?;
        }

        if let Some(entry) = self.cache.get_mut(&tile) {
            entry.dirty = false;
        }
        Ok(())
    }

    fn touch(&mut self, tile: usize) -> Result<()> {
        if !self.cache.contains_key(&tile) {
            self.evict_one_if_full()?;
            let planes = self.load(tile)?;
            self.clock += 1;
            let clock = self.clock;
            self.cache.insert(tile, CacheEntry { planes, dirty: false, last_touch: clock });
        } else {
            self.clock += 1;
            let clock = self.clock;
            self.cache.get_mut(&tile).unwrap().last_touch = clock;
        }
        Ok(())
    }
}

/// Bounded tile cache over a layer, evicting the least-recently-touched entry and
/// flushing it (if dirty) via [`Layer::overwrite_tile`] (§4.8).
pub struct CachedAccessor<S> {
    state: Mutex<CachedState<S>>,
    header: Header,
}

impl<S: Read + Write + Seek> CachedAccessor<S> {
    /// Wrap `stream` with a cache holding at most `max_size` tiles at once.
    pub fn new(stream: S, layer: Layer, header: Header, max_size: usize) -> Self {
        assert!(max_size > 0, "a cache of size zero could never hold the tile it just read");
        Self {
            state: Mutex::new(CachedState { stream, layer, cache: HashMap::new(), clock: 0, max_size }),
            header,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CachedState<S>> {
        self.state.lock().expect("mutex never poisoned: no panics while held")
    }

    /// Fetch the bytes of channel `channel_index` (`None` for an interleaved layer) of
    /// tile `tile`, reading through the cache (§4.8 "get").
    pub fn get(&self, tile: usize, channel_index: Option<usize>) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.touch(tile)?;
        let plane = channel_index.unwrap_or(0);
        Ok(state.cache[&tile].planes[plane].clone())
    }

    /// Patch `bytes` into tile `tile`'s channel `channel_index` at `offset_in_tile`,
    /// marking the entry dirty (§4.8 "set_fragment").
    pub fn set_fragment(&self, tile: usize, channel_index: Option<usize>, offset_in_tile: usize, bytes: &[u8]) -> Result<()> {
        let mut state = self.lock();
        state.touch(tile)?;

        let plane = channel_index.unwrap_or(0);
        let entry = state.cache.get_mut(&tile).expect("just touched");
        let target = &mut entry.planes[plane];

        if offset_in_tile + bytes.len() > target.len() {
            return Err(Error::range(format!(
                "fragment of {} bytes at offset {offset_in_tile} overruns a {}-byte tile plane",
                bytes.len(), target.len()
            )));
        }

        target[offset_in_tile..offset_in_tile + bytes.len()].copy_from_slice(bytes);
        entry.dirty = true;
        Ok(())
    }

    /// Set bit `bit_index` of tile `tile`'s channel `channel_index`'s plane, marking the
    /// entry dirty (§4.8 "set_bit").
    pub fn set_bit(&self, tile: usize, channel_index: Option<usize>, bit_index: usize, value: bool) -> Result<()> {
        let mut state = self.lock();
        state.touch(tile)?;

        let plane = channel_index.unwrap_or(0);
        let entry = state.cache.get_mut(&tile).expect("just touched");
        io::pack_bit(&mut entry.planes[plane], bit_index, value);
        entry.dirty = true;
        Ok(())
    }

    /// Write every dirty entry back and clear their dirty flags (§4.8 "flush").
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock();
        let tiles: Vec<usize> = state.cache.keys().copied().collect();
        for tile in tiles {
            state.flush_one(tile)?;
        }
        Ok(())
    }

    /// Number of tiles currently resident, for tests asserting the eviction bound.
    pub fn resident_tiles(&self) -> usize {
        self.lock().cache.len()
    }

    /// Consume the accessor, flushing first, and return the backing stream and layer.
    pub fn into_inner(self) -> Result<(S, Layer)> {
        self.flush()?;
        let state = self.state.into_inner().expect("mutex never poisoned: no panics while held");
        Ok((state.stream, state.layer))
    }
}

impl<S: Read + Write + Seek> Accessor for CachedAccessor<S> {
    fn layer(&self) -> Layer {
        self.lock().layer.clone()
    }
}

impl<S: Read + Write + Seek> TileAccess for CachedAccessor<S> {
    fn header(&self) -> &Header { &self.header }

    fn tile(&mut self, tile: usize) -> Result<TileBundle> {
        let mut state = self.lock();
        state.touch(tile)?;
        let entry = &state.cache[&tile];

        Ok(if state.layer.separated {
            TileBundle::Planar(entry.planes.clone())
        } else {
            TileBundle::Interleaved(entry.planes[0].clone())
        })
    }
}

impl<S: Read + Write + Seek> TileModifier for CachedAccessor<S> {
    fn write_tile(&mut self, tile: usize, bundle: TileBundle) -> Result<()> {
        let mut state = self.lock();
        state.touch(tile)?;

        let entry = state.cache.get_mut(&tile).expect("just touched");
        entry.planes = match bundle {
            TileBundle::Interleaved(bytes) => vec![bytes],
            TileBundle::Planar(planes) => planes,
        };
        entry.dirty = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.flush()
    }
}
