//! Tile access layers (§4.7-§4.9) and the traits the sample facade (§4.11) is
//! polymorphic over (§6.2 "Accessor traits").

pub mod direct;
pub mod cached;
pub mod append;

pub use direct::DirectAccessor;
pub use cached::CachedAccessor;
pub use append::AppendWriter;

use crate::compression::ByteVec;
use crate::error::Result;
use crate::io::{self, ByteOrder};
use crate::layer::Layer;
use crate::meta::header::Header;
use crate::value::{ChannelType, Value};

/// A decoded tile, bundled the way the owning layer stores its channels: one
/// contiguous slice for interleaved layers, or one slice per channel for planar layers.
#[derive(Debug, Clone)]
pub enum TileBundle {
    /// Interleaved: all channels of every sample adjacent.
    Interleaved(ByteVec),
    /// Planar: `bundle[channel_index]` holds that channel's tile bytes alone.
    Planar(Vec<ByteVec>),
}

impl TileBundle {
    /// The bytes for one channel of this bundle, slicing an interleaved bundle at its
    /// channel's byte offset and sample stride, or indexing a planar bundle directly.
    pub fn channel_bytes(&self, layer: &Layer, channel_index: usize) -> &[u8] {
        match self {
            TileBundle::Planar(planes) => &planes[channel_index],
            TileBundle::Interleaved(bytes) => bytes,
        }
    }
}

/// Decode channel `channel_index`'s value at within-tile sample index `in_tile` of
/// `bundle` (§4.10, §4.11). Shared by the direct sample facade and the tile-order
/// read iterator, which both need to turn a decoded tile back into scalar values.
pub fn read_channel_value(bundle: &TileBundle, layer: &Layer, channel_index: usize, in_tile: usize, order: ByteOrder) -> Result<Value> {
    let channel = &layer.channels.channels()[channel_index];

    match bundle {
        TileBundle::Interleaved(bytes) => {
            let offset = in_tile * layer.channels.sample_size() + layer.channels.byte_offset(channel_index);
            Value::read(&mut &bytes[offset..], order, channel.ty)
        }
        TileBundle::Planar(planes) => {
            let plane = &planes[channel_index];
            if channel.ty == ChannelType::Bool {
                Ok(Value::Bool(io::unpack_bit(plane, in_tile)))
            } else {
                let offset = in_tile * channel.ty.size();
                Value::read(&mut &plane[offset..], order, channel.ty)
            }
        }
    }
}

/// Encode `value` into channel `channel_index` at within-tile sample index `in_tile`
/// of `bundle`, the write-side counterpart of [`read_channel_value`].
pub fn write_channel_value(bundle: &mut TileBundle, layer: &Layer, channel_index: usize, in_tile: usize, order: ByteOrder, value: Value) -> Result<()> {
    let channel = &layer.channels.channels()[channel_index];

    match bundle {
        TileBundle::Interleaved(bytes) => {
            let offset = in_tile * layer.channels.sample_size() + layer.channels.byte_offset(channel_index);
            value.write(&mut bytes[offset..], order)
        }
        TileBundle::Planar(planes) => {
            let plane = &mut planes[channel_index];
            if let Value::Bool(flag) = value {
                io::pack_bit(plane, in_tile, flag);
                Ok(())
            } else {
                let offset = in_tile * channel.ty.size();
                value.write(&mut plane[offset..], order)
            }
        }
    }
}

/// Exposes the [`Layer`] an accessor addresses (§6.2).
///
/// Returns an owned clone rather than a borrow: accessors that mutate their layer's
/// tile tables behind a lock (the cached accessor, on relocation) cannot hand out a
/// reference that outlives the lock guard, and `Layer` is cheap enough to clone that
/// this is simpler than threading a guard type through every caller.
pub trait Accessor {
    /// A snapshot of the layer this accessor reads and writes tiles of.
    fn layer(&self) -> Layer;
}

/// Extends [`Accessor`] with whole-tile access and the file's [`Header`] (§6.2).
pub trait TileAccess: Accessor {
    /// The header governing this accessor's backing stream.
    fn header(&self) -> &Header;

    /// Fetch disk tile `tile` (and, for planar layers, every channel of it) as a bundle.
    fn tile(&mut self, tile: usize) -> Result<TileBundle>;
}

/// Extends [`TileAccess`] with dirty-tracking and write-back (§6.2, §4.8).
pub trait TileModifier: TileAccess {
    /// Replace disk tile `tile` with `bundle`, marking it dirty so the next
    /// [`Self::commit`] writes it back. Accessors that write straight through
    /// (no cache to flush) may treat `commit` as a no-op.
    fn write_tile(&mut self, tile: usize, bundle: TileBundle) -> Result<()>;

    /// Flush every dirty tile to the backing store.
    fn commit(&mut self) -> Result<()>;
}
