//! The append writer (C9, §4.9): a strictly sequential, tile-major producer with a
//! small read cache for back-references.

use std::collections::VecDeque;

use super::Accessor;
use crate::compression::ByteVec;
use crate::error::{Error, Result};
use crate::io::{ByteOrder, Read, Seek, Write};
use crate::layer::Layer;

/// The tile currently open for in-memory writes.
struct OpenTile {
    index: usize,
    channel_index: Option<usize>,
    buffer: ByteVec,
}

/// Writes samples in strict tile-major order, flushing each tile to disk as soon as
/// the next one is observed, with a small bounded cache of just-finalized tiles for
/// back-reference reads (§4.9).
pub struct AppendWriter<S> {
    stream: S,
    layer: Layer,
    order: ByteOrder,
    offset_size: u8,
    open: Option<OpenTile>,
    read_cache: VecDeque<(usize, Option<usize>, ByteVec)>,
    read_cache_capacity: usize,
}

impl<S: Read + Write + Seek> AppendWriter<S> {
    /// Begin an append session over `layer`, whose tile tables should already be
    /// zeroed (e.g. via [`Layer::write_blank`] for the `None`-compression case, or an
    /// equivalent reservation for a compressed layer).
    pub fn new(stream: S, layer: Layer, order: ByteOrder, offset_size: u8, read_cache_capacity: usize) -> Self {
        Self { stream, layer, order, offset_size, open: None, read_cache: VecDeque::new(), read_cache_capacity }
    }

    fn open_tile(&self, index: usize, channel_index: Option<usize>) -> Result<OpenTile> {
        let size = self.layer.disk_tile_uncompressed_size(channel_index)?;
        Ok(OpenTile { index, channel_index, buffer: vec![0u8; size] })
    }

    fn promote_to_read_cache(&mut self, tile: OpenTile) -> Result<()> {
        self.layer.write_tile(&mut self.stream, tile.index, tile.channel_index, &tile.buffer)?;

        if self.read_cache.len() >= self.read_cache_capacity && self.read_cache_capacity > 0 {
            self.read_cache.pop_front();
        }
        if self.read_cache_capacity > 0 {
            self.read_cache.push_back((tile.index, tile.channel_index, tile.buffer));
        }
        Ok(())
    }

    /// Write `bytes` at byte offset `byte_offset` within the sample/tile identified by
    /// `(tile, channel_index)`, advancing the open tile as needed (§4.9).
    ///
    /// `channel_index` is `None` for an interleaved layer's full sample writes, and
    /// `Some(c)` for a planar layer's per-channel writes — planar full-sample writes
    /// are rejected because different channels' tiles advance at different rates.
    pub fn write_at(&mut self, tile: usize, channel_index: Option<usize>, byte_offset: usize, bytes: &[u8]) -> Result<()> {
        if self.layer.separated && channel_index.is_none() {
            return Err(Error::unsupported("planar layers require per-channel writes through the append writer"));
        }

        match &mut self.open {
            Some(open) if open.index == tile && open.channel_index == channel_index => {
                open.buffer[byte_offset..byte_offset + bytes.len()].copy_from_slice(bytes);
            }
            Some(open) if open.index + 1 == tile && open.channel_index == channel_index => {
                let finished = self.open.take().unwrap();
                self.promote_to_read_cache(finished)?;

                let mut fresh = self.open_tile(tile, channel_index)?;
                fresh.buffer[byte_offset..byte_offset + bytes.len()].copy_from_slice(bytes);
                self.open = Some(fresh);
            }
            None => {
                let mut fresh = self.open_tile(tile, channel_index)?;
                fresh.buffer[byte_offset..byte_offset + bytes.len()].copy_from_slice(bytes);
                self.open = Some(fresh);
            }
            Some(open) => {
                return Err(Error::range(format!(
                    "out-of-order append: tile {tile} follows open tile {}, expected {} or {}",
                    open.index, open.index, open.index + 1
                )));
            }
        }

        Ok(())
    }

    /// Read back bytes from a tile already finalized and still resident in the read
    /// cache; fails if the tile has been evicted or never finalized (§4.9).
    pub fn read_finalized(&self, tile: usize, channel_index: Option<usize>) -> Result<&[u8]> {
        self.read_cache.iter()
            .find(|(index, channel, _)| *index == tile && *channel == channel_index)
            .map(|(_, _, bytes)| bytes.as_slice())
            .ok_or_else(|| Error::range(format!("tile {tile} is not resident in the append writer's read cache")))
    }

    /// Flush the open tile (if any) and rewrite the layer header so `tile_bytes`/
    /// `tile_offsets` reflect final positions (§4.9 "Finalize"). The open buffer is
    /// dropped; previously finalized entries remain in the read cache (§4.9, resolved).
    pub fn finalize(mut self) -> Result<(S, Layer)> {
        if let Some(open) = self.open.take() {
            self.promote_to_read_cache(open)?;
        }

        if self.layer.self_offset.is_some() {
            self.layer.overwrite_self(&mut self.stream, self.offset_size, self.order)?;
        }

        Ok((self.stream, self.layer))
    }
}

impl<S> Accessor for AppendWriter<S> {
    fn layer(&self) -> Layer { self.layer.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::compression::Compression;
    use crate::coord::{Dimension, DimensionSet};
    use crate::meta::channel::{Channel, ChannelSet};
    use crate::value::ChannelType;

    fn tiny_dims() -> DimensionSet {
        DimensionSet::new(vec![Dimension::new("x", 8, 2).unwrap()]).unwrap()
    }

    #[test]
    fn sequential_writes_advance_tiles_in_order() {
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U8)]).unwrap();
        let layer = Layer::new("scenario3", false, Compression::None, tiny_dims(), channels);

        let mut writer = AppendWriter::new(Cursor::new(Vec::new()), layer, ByteOrder::Little, 8, 4);
        writer.write_at(0, None, 0, &[1, 1]).unwrap();
        writer.write_at(1, None, 0, &[2, 2]).unwrap();

        let (_, layer) = writer.finalize().unwrap();
        assert_eq!(layer.tile_bytes.iter().filter(|&&b| b > 0).count(), 2);
    }

    #[test]
    fn out_of_order_tile_is_rejected_and_stream_position_is_unchanged() {
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U8)]).unwrap();
        let layer = Layer::new("scenario3", false, Compression::None, tiny_dims(), channels);

        let mut writer = AppendWriter::new(Cursor::new(Vec::new()), layer, ByteOrder::Little, 8, 4);
        writer.write_at(0, None, 0, &[1, 1]).unwrap();

        let position_before = writer.stream.stream_position().unwrap();
        let result = writer.write_at(2, None, 0, &[3, 3]);
        assert!(matches!(result, Err(Error::Range(_))));
        assert_eq!(writer.stream.stream_position().unwrap(), position_before);
    }

    #[test]
    fn finalized_tiles_remain_readable_until_evicted() {
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U8)]).unwrap();
        let layer = Layer::new("x", false, Compression::None, tiny_dims(), channels);

        let mut writer = AppendWriter::new(Cursor::new(Vec::new()), layer, ByteOrder::Little, 8, 4);
        writer.write_at(0, None, 0, &[9, 9]).unwrap();
        writer.write_at(1, None, 0, &[1, 1]).unwrap();

        assert_eq!(writer.read_finalized(0, None).unwrap(), &[9, 9]);
    }
}
