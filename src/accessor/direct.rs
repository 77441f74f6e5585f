//! The direct accessor (C7, §4.7): single-sample reads and writes against an
//! uncompressed layer, seeking straight to the in-tile byte (or bit) offset rather
//! than decoding a whole tile.

use std::sync::Mutex;

use super::{Accessor, TileAccess, TileBundle, TileModifier};
use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::io::{self, ByteOrder, Read, Seek, SeekFrom, Write};
use crate::layer::Layer;
use crate::meta::header::Header;
use crate::value::{ChannelType, Value};

/// Reads and writes single samples/channels of an uncompressed layer by seeking
/// directly to their byte (or, for planar `Bool`, bit) offset.
///
/// Concurrent reads of one `Seek + Read` handle require positioned I/O (`pread`),
/// which `std::io` does not expose generically; this accessor serializes every
/// stream access behind one mutex rather than the finer-grained reader/writer split
/// described in §4.7 — a conservative, still-correct subset (see DESIGN.md).
pub struct DirectAccessor<S> {
    stream: Mutex<S>,
    layer: Layer,
    order: ByteOrder,
    header: Header,
}

impl<S: Read + Write + Seek> DirectAccessor<S> {
    /// Wrap `stream` for direct access to `layer`. Fails if `layer` is compressed
    /// (§4.7: "attempting to write into a compressed layer via this path is a
    /// programmer error"; we reject it up front for read symmetry too).
    pub fn new(stream: S, layer: Layer, header: Header) -> Result<Self> {
        if layer.compression != Compression::None {
            return Err(Error::unsupported("the direct accessor only supports uncompressed layers"));
        }
        let order = header.byte_order;
        Ok(Self { stream: Mutex::new(stream), layer, order, header })
    }

    /// Consume the accessor, returning the backing stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner().expect("mutex never poisoned: no panics while held")
    }

    fn sample_offset(&self, coord: &[usize], channel_index: usize) -> Result<(u64, Option<usize>)> {
        let selector = self.layer.dimensions.sample_to_tile_selector(coord)?;
        let channel = self.layer.channels.channels().get(channel_index)
            .ok_or_else(|| Error::range(format!("channel index {channel_index} out of range")))?;

        if self.layer.separated {
            let disk_tile = self.layer.disk_tile_storage_index(selector.tile, Some(channel_index))?;
            let tile_offset = self.layer.tile_offsets[disk_tile];

            if channel.ty == ChannelType::Bool {
                let byte_offset = selector.in_tile / 8;
                Ok((tile_offset + byte_offset as u64, Some(selector.in_tile % 8)))
            } else {
                Ok((tile_offset + (selector.in_tile * channel.ty.size()) as u64, None))
            }
        } else {
            let tile_offset = self.layer.tile_offsets[selector.tile];
            let in_sample_offset = self.layer.channels.byte_offset(channel_index);
            let offset = tile_offset
                + (selector.in_tile * self.layer.channels.sample_size()) as u64
                + in_sample_offset as u64;
            Ok((offset, None))
        }
    }

    /// Read channel `channel_index`'s value at `coord` (§4.7, step 2/3).
    pub fn read_value(&self, coord: &[usize], channel_index: usize) -> Result<Value> {
        let channel = self.layer.channels.channels()[channel_index].clone();
        let (offset, bit) = self.sample_offset(coord, channel_index)?;

        let mut stream = self.stream.lock().expect("mutex never poisoned: no panics while held");
        stream.seek(SeekFrom::Start(offset))?;

        if let Some(bit_index) = bit {
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte)?;
            Ok(Value::Bool(io::unpack_bit(&byte, bit_index)))
        } else {
            Value::read(&mut *stream, self.order, channel.ty)
        }
    }

    /// Write `value` into channel `channel_index` at `coord` (§4.7, symmetric to read).
    pub fn write_value(&self, coord: &[usize], channel_index: usize, value: Value) -> Result<()> {
        let (offset, bit) = self.sample_offset(coord, channel_index)?;

        let mut stream = self.stream.lock().expect("mutex never poisoned: no panics while held");
        stream.seek(SeekFrom::Start(offset))?;

        if let Some(bit_index) = bit {
            let Value::Bool(flag) = value else {
                return Err(Error::unsupported("planar Bool write requires Value::Bool"));
            };
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte)?;
            io::pack_bit(&mut byte, bit_index, flag);
            stream.seek(SeekFrom::Start(offset))?;
            stream.write_all(&byte)?;
        } else {
            value.write(&mut *stream, self.order)?;
        }

        Ok(())
    }

    /// Read every channel's value at `coord`.
    pub fn read_sample(&self, coord: &[usize]) -> Result<Vec<Value>> {
        (0..self.layer.channels.len()).map(|c| self.read_value(coord, c)).collect()
    }

    /// Write every channel's value at `coord`. `values` must have one entry per channel.
    pub fn write_sample(&self, coord: &[usize], values: &[Value]) -> Result<()> {
        if values.len() != self.layer.channels.len() {
            return Err(Error::range(format!(
                "sample has {} values, layer has {} channels", values.len(), self.layer.channels.len()
            )));
        }
        for (channel_index, &value) in values.iter().enumerate() {
            self.write_value(coord, channel_index, value)?;
        }
        Ok(())
    }
}

impl<S> Accessor for DirectAccessor<S> {
    fn layer(&self) -> Layer { self.layer.clone() }
}

impl<S: Read + Write + Seek> TileAccess for DirectAccessor<S> {
    fn header(&self) -> &Header { &self.header }

    fn tile(&mut self, tile: usize) -> Result<TileBundle> {
        let stream = self.stream.get_mut().expect("mutex never poisoned: no panics while held");

        if self.layer.separated {
            let planes = (0..self.layer.channels.len())
                .map(|c| self.layer.read_tile(stream, tile, Some(c)))
                .collect::<Result<Vec<_>>>()?;
            Ok(TileBundle::Planar(planes))
        } else {
            Ok(TileBundle::Interleaved(self.layer.read_tile(stream, tile, None)?))
        }
    }
}

impl<S: Read + Write + Seek> TileModifier for DirectAccessor<S> {
    /// Writes straight through: there is no cache to mark dirty, so `bundle` is
    /// encoded and placed back at `tile`'s existing offset immediately.
    fn write_tile(&mut self, tile: usize, bundle: TileBundle) -> Result<()> {
        let stream = self.stream.get_mut().expect("mutex never poisoned: no panics while held");

        match bundle {
            TileBundle::Interleaved(bytes) => {
                self.layer.overwrite_tile(stream, tile, None, &bytes)?;
            }
            TileBundle::Planar(planes) => {
                for (channel_index, bytes) in planes.into_iter().enumerate() {
                    self.layer.overwrite_tile(stream, tile, Some(channel_index), &bytes)?;
                }
            }
        }
        Ok(())
    }

    /// A no-op: [`Self::write_tile`] already wrote through.
    fn commit(&mut self) -> Result<()> { Ok(()) }
}
