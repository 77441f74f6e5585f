//! The layer descriptor (§3 "Layer") and its on-disk record and tile I/O (§4.5 "Layer
//! record", §4.6 "Layer tile I/O").

use crate::compression::{self, ByteVec, Bytes, Compression, LayerContext};
use crate::coord::DimensionSet;
use crate::error::{checked_u64_to_usize, Error, Result};
use crate::io::{self, ByteOrder, Primitive, Read, Seek, SeekFrom, Write};
use crate::meta::channel::ChannelSet;
use crate::meta::dimension::{read_dimension, write_dimension};
use crate::value::ChannelType;

const SEPARATED_BIT: u32 = 1 << 0;

/// A single typed, tiled layer of a pixi file (§3 "Layer").
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Human-readable layer name.
    pub name: String,
    /// Channels stored one-stream-per-channel (`true`) or interleaved within a sample (`false`).
    pub separated: bool,
    /// Compression kind every tile of this layer is stored under.
    pub compression: Compression,
    /// Shape of the layer.
    pub dimensions: DimensionSet,
    /// Typed fields of every sample.
    pub channels: ChannelSet,
    /// Stored (possibly compressed, including its CRC32 trailer) byte length of each disk tile.
    pub tile_bytes: Vec<u64>,
    /// Absolute file offset of each disk tile.
    pub tile_offsets: Vec<u64>,
    /// Absolute offset of the next layer record, or 0 if this is the last layer.
    pub next_layer_offset: u64,
    /// Absolute offset this layer's own record was read from or last written to; `None`
    /// until the layer has actually been placed in a file.
    pub self_offset: Option<u64>,
}

impl Layer {
    /// Construct a new, not-yet-written layer with empty tile tables.
    pub fn new(
        name: impl Into<String>,
        separated: bool,
        compression: Compression,
        dimensions: DimensionSet,
        channels: ChannelSet,
    ) -> Self {
        let disk_tiles = Self::compute_disk_tiles(&dimensions, &channels, separated);
        Self {
            name: name.into(),
            separated,
            compression,
            dimensions,
            channels,
            tile_bytes: vec![0; disk_tiles],
            tile_offsets: vec![0; disk_tiles],
            next_layer_offset: 0,
            self_offset: None,
        }
    }

    fn compute_disk_tiles(dimensions: &DimensionSet, channels: &ChannelSet, separated: bool) -> usize {
        dimensions.total_tiles() * if separated { channels.len() } else { 1 }
    }

    /// `total_tiles × (separated ? |channels| : 1)` (§3 "Layer").
    pub fn disk_tiles(&self) -> usize {
        Self::compute_disk_tiles(&self.dimensions, &self.channels, self.separated)
    }

    /// The uncompressed byte size of one disk tile. For planar layers this is the size
    /// of one channel's tile; `channel_index` is required in that case (§4.6).
    pub fn disk_tile_uncompressed_size(&self, channel_index: Option<usize>) -> Result<usize> {
        let tile_samples = self.dimensions.tile_samples();

        if self.separated {
            let channel_index = channel_index
                .ok_or_else(|| Error::range("a separated (planar) layer requires a channel index"))?;
            let channel = self.channels.channels().get(channel_index)
                .ok_or_else(|| Error::range(format!("channel index {channel_index} out of range")))?;
            Ok(if channel.ty == ChannelType::Bool {
                io::bits_to_bytes(tile_samples)
            } else {
                tile_samples * channel.ty.size()
            })
        } else {
            Ok(tile_samples * self.channels.sample_size())
        }
    }

    /// Index into `tile_bytes`/`tile_offsets` for tile `tile` (and, for planar layers, channel
    /// `channel_index`) — `tile + total_tiles × channel_index` (§3 "Layer").
    pub fn disk_tile_storage_index(&self, tile: usize, channel_index: Option<usize>) -> Result<usize> {
        let total_tiles = self.dimensions.total_tiles();
        if tile >= total_tiles {
            return Err(Error::range(format!("tile {tile} is out of range [0, {total_tiles})")));
        }

        Ok(if self.separated {
            let channel_index = channel_index
                .ok_or_else(|| Error::range("a separated (planar) layer requires a channel index"))?;
            if channel_index >= self.channels.len() {
                return Err(Error::range(format!(
                    "channel index {channel_index} is out of range [0, {})", self.channels.len()
                )));
            }
            tile + total_tiles * channel_index
        } else {
            tile
        })
    }

    fn context_for(&self, channel_index: Option<usize>) -> Result<LayerContext> {
        Ok(if self.separated {
            let channel_index = channel_index
                .ok_or_else(|| Error::range("a separated (planar) layer requires a channel index"))?;
            let channel = self.channels.channels().get(channel_index)
                .ok_or_else(|| Error::range(format!("channel index {channel_index} out of range")))?;
            LayerContext { sample_size: channel.ty.size(), separated: true }
        } else {
            LayerContext { sample_size: self.channels.sample_size(), separated: false }
        })
    }

    /// Read and CRC-verify disk tile `(tile, channel_index)` from `stream` (§4.6 "Read tile").
    pub fn read_tile(
        &self,
        stream: &mut (impl Read + Seek),
        tile: usize,
        channel_index: Option<usize>,
    ) -> Result<ByteVec> {
        let storage_index = self.disk_tile_storage_index(tile, channel_index)?;
        let stored_len = checked_u64_to_usize(self.tile_bytes[storage_index])?;

        stream.seek(SeekFrom::Start(self.tile_offsets[storage_index]))?;
        let mut stored = vec![0u8; stored_len];
        stream.read_exact(&mut stored)?;

        let payload = compression::split_and_verify_checksum(&stored)
            .map_err(|_| Error::integrity(self.name.clone(), tile))?;

        let uncompressed_len = self.disk_tile_uncompressed_size(channel_index)?;
        self.compression.decode(payload, self.context_for(channel_index)?, uncompressed_len)
    }

    /// Encode, checksum, and append disk tile `(tile, channel_index)` at the stream's
    /// current position, recording its offset and stored length (§4.6 "Write tile").
    pub fn write_tile(
        &mut self,
        stream: &mut (impl Write + Seek),
        tile: usize,
        channel_index: Option<usize>,
        uncompressed: Bytes<'_>,
    ) -> Result<()> {
        let storage_index = self.disk_tile_storage_index(tile, channel_index)?;
        let mut encoded = self.compression.encode(uncompressed, self.context_for(channel_index)?)?;
        compression::append_checksum(&mut encoded);

        let offset = stream.stream_position()?;
        stream.write_all(&encoded)?;

        self.tile_offsets[storage_index] = offset;
        self.tile_bytes[storage_index] = encoded.len() as u64;
        Ok(())
    }

    /// Re-encode disk tile `(tile, channel_index)`. If the new encoded size fits in the
    /// original slot, it is overwritten in place; otherwise the tile is relocated to the
    /// stream tail and its offset patched, leaving the old bytes an unreferenced hole
    /// (§4.6 "Overwrite tile", resolved in DESIGN.md).
    pub fn overwrite_tile(
        &mut self,
        stream: &mut (impl Read + Write + Seek),
        tile: usize,
        channel_index: Option<usize>,
        uncompressed: Bytes<'_>,
    ) -> Result<()> {
        let storage_index = self.disk_tile_storage_index(tile, channel_index)?;
        let mut encoded = self.compression.encode(uncompressed, self.context_for(channel_index)?)?;
        compression::append_checksum(&mut encoded);

        let original_len = self.tile_bytes[storage_index];
        if (encoded.len() as u64) <= original_len {
            stream.seek(SeekFrom::Start(self.tile_offsets[storage_index]))?;
            stream.write_all(&encoded)?;
            self.tile_bytes[storage_index] = encoded.len() as u64;
        } else {
            let offset = stream.seek(SeekFrom::End(0))?;
            stream.write_all(&encoded)?;
            self.tile_offsets[storage_index] = offset;
            self.tile_bytes[storage_index] = encoded.len() as u64;
        }

        Ok(())
    }

    /// Write the layer header, then `disk_tiles` zero-filled uncompressed tiles in order,
    /// recording their offsets, leaving the stream positioned at end-of-layer (§4.6 "Blank
    /// uncompressed layer"). The layer must use `Compression::None`.
    pub fn write_blank(
        &mut self,
        stream: &mut (impl Write + Seek),
        offset_size: u8,
        order: ByteOrder,
    ) -> Result<()> {
        if self.compression != Compression::None {
            return Err(Error::unsupported("write_blank requires Compression::None"));
        }

        let layer_offset = stream.stream_position()?;
        self.self_offset = Some(layer_offset);
        self.write(stream, offset_size, order)?;

        let disk_tiles = self.disk_tiles();
        for tile_storage_index in 0..disk_tiles {
            let (tile, channel_index) = self.decompose_storage_index(tile_storage_index);
            let size = self.disk_tile_uncompressed_size(channel_index)?;
            let blank = vec![0u8; size];
            self.write_tile(stream, tile, channel_index, &blank)?;
        }

        Ok(())
    }

    fn decompose_storage_index(&self, storage_index: usize) -> (usize, Option<usize>) {
        if self.separated {
            let total_tiles = self.dimensions.total_tiles();
            (storage_index % total_tiles, Some(storage_index / total_tiles))
        } else {
            (storage_index, None)
        }
    }

    /// Read a complete layer record from the current stream position (§4.5 "Layer record").
    pub fn read(read: &mut impl Read, offset_size: u8, order: ByteOrder, self_offset: u64) -> Result<Self> {
        let flags: u32 = Primitive::read(read, order)?;
        let separated = flags & SEPARATED_BIT != 0;

        let compression_tag: u32 = Primitive::read(read, order)?;
        let compression = Compression::from_tag(compression_tag)?;

        let name = io::read_friendly_string(read, order)?;

        let dimension_count: u32 = Primitive::read(read, order)?;
        let mut dimensions = Vec::with_capacity(dimension_count as usize);
        for _ in 0..dimension_count {
            dimensions.push(read_dimension(read, offset_size, order)?);
        }
        let dimensions = DimensionSet::new(dimensions)?;

        let channels = ChannelSet::read(read, order)?;

        let disk_tiles = Self::compute_disk_tiles(&dimensions, &channels, separated);

        let mut tile_bytes = Vec::with_capacity(disk_tiles);
        for _ in 0..disk_tiles {
            tile_bytes.push(io::read_offset(read, offset_size, order)?);
        }

        let mut tile_offsets = Vec::with_capacity(disk_tiles);
        for _ in 0..disk_tiles {
            tile_offsets.push(io::read_offset(read, offset_size, order)?);
        }

        let next_layer_offset = io::read_offset(read, offset_size, order)?;

        Ok(Self {
            name, separated, compression, dimensions, channels,
            tile_bytes, tile_offsets, next_layer_offset,
            self_offset: Some(self_offset),
        })
    }

    /// Write the complete layer record at the current stream position (§4.5 "Layer record").
    pub fn write(&self, write: &mut impl Write, offset_size: u8, order: ByteOrder) -> Result<()> {
        let flags = if self.separated { SEPARATED_BIT } else { 0 };
        Primitive::write(flags, write, order)?;
        Primitive::write(self.compression.tag(), write, order)?;

        io::write_friendly_string(write, &self.name, order)?;

        Primitive::write(self.dimensions.len() as u32, write, order)?;
        for dimension in self.dimensions.dimensions() {
            write_dimension(write, dimension, offset_size, order)?;
        }

        self.channels.write(write, order)?;

        for &tile_byte_len in &self.tile_bytes {
            io::write_offset(write, tile_byte_len, offset_size, order)?;
        }
        for &tile_offset in &self.tile_offsets {
            io::write_offset(write, tile_offset, offset_size, order)?;
        }

        io::write_offset(write, self.next_layer_offset, offset_size, order)?;
        Ok(())
    }

    /// Rewrite this layer's own record in place at `self_offset`, restoring the stream's
    /// prior position. Used after tile writes change `tile_bytes`/`tile_offsets`, or after
    /// `next_layer_offset` is patched by a newly appended sibling layer.
    pub fn overwrite_self(&self, stream: &mut (impl Write + Seek), offset_size: u8, order: ByteOrder) -> Result<()> {
        let self_offset = self.self_offset
            .ok_or_else(|| Error::format("layer has not yet been written, cannot overwrite"))?;

        let previous_position = stream.stream_position()?;
        stream.seek(SeekFrom::Start(self_offset))?;
        self.write(stream, offset_size, order)?;
        stream.seek(SeekFrom::Start(previous_position))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::coord::Dimension;
    use crate::meta::channel::Channel;

    fn tiny_dims() -> DimensionSet {
        DimensionSet::new(vec![
            Dimension::new("x", 4, 2).unwrap(),
            Dimension::new("y", 4, 2).unwrap(),
        ]).unwrap()
    }

    #[test]
    fn layer_record_round_trips() {
        for offset_size in [4u8, 8] {
            for order in [ByteOrder::Little, ByteOrder::Big] {
                let channels = ChannelSet::new(vec![
                    Channel::new("a", ChannelType::F64),
                    Channel::new("b", ChannelType::I16),
                ]).unwrap();
                let mut layer = Layer::new("depth", false, Compression::None, tiny_dims(), channels);
                layer.tile_bytes = vec![10, 20, 30, 40];
                layer.tile_offsets = vec![100, 200, 300, 400];
                layer.next_layer_offset = 9999;

                let mut bytes = Vec::new();
                layer.write(&mut bytes, offset_size, order).unwrap();

                let read_back = Layer::read(&mut bytes.as_slice(), offset_size, order, 0).unwrap();
                assert_eq!(read_back.name, layer.name);
                assert_eq!(read_back.separated, layer.separated);
                assert_eq!(read_back.tile_bytes, layer.tile_bytes);
                assert_eq!(read_back.tile_offsets, layer.tile_offsets);
                assert_eq!(read_back.next_layer_offset, layer.next_layer_offset);
            }
        }
    }

    #[test]
    fn disk_tiles_matches_separation_formula() {
        let channels = ChannelSet::new(vec![Channel::new("r", ChannelType::U8), Channel::new("g", ChannelType::U8)]).unwrap();

        let interleaved = Layer::new("x", false, Compression::None, tiny_dims(), channels.clone());
        assert_eq!(interleaved.disk_tiles(), tiny_dims().total_tiles());

        let planar = Layer::new("x", true, Compression::None, tiny_dims(), channels);
        assert_eq!(planar.disk_tiles(), tiny_dims().total_tiles() * 2);
    }

    #[test]
    fn planar_bool_tile_size_is_bit_packed() {
        let dims = DimensionSet::new(vec![Dimension::new("x", 10, 10).unwrap()]).unwrap();
        let channels = ChannelSet::new(vec![Channel::new("mask", ChannelType::Bool)]).unwrap();
        let layer = Layer::new("mask", true, Compression::None, dims, channels);

        assert_eq!(layer.disk_tile_uncompressed_size(Some(0)).unwrap(), 2);
    }

    #[test]
    fn write_blank_then_read_tile_round_trips_zeros() {
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U32)]).unwrap();
        let mut layer = Layer::new("blank", false, Compression::None, tiny_dims(), channels);

        let mut stream = Cursor::new(Vec::new());
        layer.write_blank(&mut stream, 8, ByteOrder::Little).unwrap();

        let tile = layer.read_tile(&mut stream, 0, None).unwrap();
        assert_eq!(tile, vec![0u8; layer.disk_tile_uncompressed_size(None).unwrap()]);
    }

    #[test]
    fn write_tile_then_read_tile_round_trips_with_flate() {
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U8)]).unwrap();
        let mut layer = Layer::new("flated", false, Compression::Flate, tiny_dims(), channels);

        let mut stream = Cursor::new(Vec::new());
        let data: Vec<u8> = (0..layer.disk_tile_uncompressed_size(None).unwrap() as u8).collect();
        layer.write_tile(&mut stream, 0, None, &data).unwrap();

        let read_back = layer.read_tile(&mut stream, 0, None).unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn overwrite_tile_relocates_when_it_grows() {
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U8)]).unwrap();
        let mut layer = Layer::new("relocatable", false, Compression::Flate, tiny_dims(), channels);

        let mut stream = Cursor::new(Vec::new());
        let uniform = vec![7u8; layer.disk_tile_uncompressed_size(None).unwrap()];
        layer.write_tile(&mut stream, 0, None, &uniform).unwrap();
        let original_offset = layer.tile_offsets[0];

        let random: Vec<u8> = (0..layer.disk_tile_uncompressed_size(None).unwrap() as u32)
            .map(|i| (i * 2654435761u32) as u8)
            .collect();
        layer.overwrite_tile(&mut stream, 0, None, &random).unwrap();

        assert_ne!(layer.tile_offsets[0], original_offset);
        let read_back = layer.read_tile(&mut stream, 0, None).unwrap();
        assert_eq!(read_back, random);
    }

    #[test]
    fn corrupted_tile_fails_integrity_with_layer_name_and_tile_index() {
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U8)]).unwrap();
        let mut layer = Layer::new("checked", false, Compression::None, tiny_dims(), channels);

        let mut stream = Cursor::new(Vec::new());
        let data = vec![1u8; layer.disk_tile_uncompressed_size(None).unwrap()];
        layer.write_tile(&mut stream, 0, None, &data).unwrap();

        let corrupt_at = layer.tile_offsets[0] as usize;
        stream.get_mut()[corrupt_at] ^= 0xFF;

        match layer.read_tile(&mut stream, 0, None) {
            Err(Error::Integrity { layer_name, tile_index }) => {
                assert_eq!(layer_name, "checked");
                assert_eq!(tile_index, 0);
            }
            other => panic!("expected Integrity error, got {other:?}"),
        }
    }
}
