//! On-disk serialization of [`Channel`] records and the [`ChannelSet`] they form (§4.5
//! "Channel record", §3 "ChannelSet").

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::io::{self, ByteOrder, Read, Write};
use crate::value::{ChannelType, Value};

/// A single typed, optionally-bounded field of every sample (§3 "Channel").
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Column name, e.g. `"elevation"` or `"red"`.
    pub name: String,
    /// The scalar type every sample's value for this channel has.
    pub ty: ChannelType,
    /// Optional recorded minimum, matching `ty`.
    pub min: Option<Value>,
    /// Optional recorded maximum, matching `ty`.
    pub max: Option<Value>,
}

impl Channel {
    /// Construct a channel with no recorded min/max.
    pub fn new(name: impl Into<String>, ty: ChannelType) -> Self {
        Self { name: name.into(), ty, min: None, max: None }
    }

    /// Read one channel record: friendly name · encoded type (+ optional min/max).
    pub fn read(read: &mut impl Read, order: ByteOrder) -> Result<Self> {
        let name = io::read_friendly_string(read, order)?;
        let encoded_type: u32 = crate::io::Primitive::read(read, order)?;
        let (ty, has_min, has_max) = ChannelType::decode_flags(encoded_type)?;

        let min = has_min.then(|| Value::read(read, order, ty)).transpose()?;
        let max = has_max.then(|| Value::read(read, order, ty)).transpose()?;

        Ok(Self { name, ty, min, max })
    }

    /// Write one channel record. Min precedes max when both are present (§4.5 "Channel record").
    pub fn write(&self, write: &mut impl Write, order: ByteOrder) -> Result<()> {
        io::write_friendly_string(write, &self.name, order)?;

        let encoded_type = self.ty.encode_flags(self.min.is_some(), self.max.is_some());
        crate::io::Primitive::write(encoded_type, write, order)?;

        if let Some(min) = self.min { min.write(write, order)?; }
        if let Some(max) = self.max { max.write(write, order)?; }

        Ok(())
    }
}

/// An ordered sequence of [`Channel`]s (§3 "ChannelSet").
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSet {
    channels: SmallVec<[Channel; 4]>,
    byte_offsets: Vec<usize>,
    sample_size: usize,
}

impl ChannelSet {
    /// Build a channel set, precomputing each channel's prefix-sum byte offset within a
    /// (interleaved) sample.
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Result<Self> {
        let channels: SmallVec<[Channel; 4]> = channels.into_iter().collect();
        if channels.is_empty() {
            return Err(Error::range("a channel set needs at least one channel"));
        }

        let mut byte_offsets = Vec::with_capacity(channels.len());
        let mut running = 0usize;
        for channel in &channels {
            byte_offsets.push(running);
            running += channel.ty.size();
        }

        Ok(Self { channels, byte_offsets, sample_size: running })
    }

    /// Number of channels.
    pub fn len(&self) -> usize { self.channels.len() }

    /// Whether this channel set has no channels (never true for a validly constructed set).
    pub fn is_empty(&self) -> bool { self.channels.is_empty() }

    /// The channel records in order.
    pub fn channels(&self) -> &[Channel] { &self.channels }

    /// Mutable access, for updating a channel's recorded min/max in place.
    pub fn channels_mut(&mut self) -> &mut [Channel] { &mut self.channels }

    /// `Σ channel.type.size()`: bytes per sample in an interleaved layer (§3 "ChannelSet").
    pub fn sample_size(&self) -> usize { self.sample_size }

    /// Byte offset of channel `index` within an interleaved sample.
    pub fn byte_offset(&self, index: usize) -> usize { self.byte_offsets[index] }

    /// Look up a channel's index by name (§7 "ChannelNotFound").
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.channels.iter().position(|channel| channel.name == name)
            .ok_or_else(|| Error::channel_not_found(name))
    }

    /// Read a channel set: `u32` channel count followed by that many channel records.
    pub fn read(read: &mut impl Read, order: ByteOrder) -> Result<Self> {
        let count: u32 = crate::io::Primitive::read(read, order)?;
        let mut channels = Vec::with_capacity(count as usize);
        for _ in 0..count {
            channels.push(Channel::read(read, order)?);
        }
        Self::new(channels)
    }

    /// Write a channel set: `u32` channel count followed by that many channel records.
    pub fn write(&self, write: &mut impl Write, order: ByteOrder) -> Result<()> {
        crate::io::Primitive::write(self.channels.len() as u32, write, order)?;
        for channel in &self.channels {
            channel.write(write, order)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_record_round_trips_with_and_without_bounds() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut channel = Channel::new("elevation", ChannelType::F64);
            channel.min = Some(Value::F64(-50.0));
            channel.max = Some(Value::F64(8848.0));

            let mut bytes = Vec::new();
            channel.write(&mut bytes, order).unwrap();
            let read_back = Channel::read(&mut bytes.as_slice(), order).unwrap();
            assert_eq!(read_back, channel);

            let bare = Channel::new("mask", ChannelType::Bool);
            let mut bare_bytes = Vec::new();
            bare.write(&mut bare_bytes, order).unwrap();
            let bare_read_back = Channel::read(&mut bare_bytes.as_slice(), order).unwrap();
            assert_eq!(bare_read_back, bare);
        }
    }

    #[test]
    fn channel_set_computes_prefix_sum_offsets() {
        let set = ChannelSet::new(vec![
            Channel::new("a", ChannelType::F64),
            Channel::new("b", ChannelType::I16),
            Channel::new("c", ChannelType::U64),
        ]).unwrap();

        assert_eq!(set.byte_offset(0), 0);
        assert_eq!(set.byte_offset(1), 8);
        assert_eq!(set.byte_offset(2), 10);
        assert_eq!(set.sample_size(), 18);
    }

    #[test]
    fn channel_set_round_trips() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let set = ChannelSet::new(vec![
                Channel::new("r", ChannelType::U8),
                Channel::new("g", ChannelType::U8),
                Channel::new("b", ChannelType::U8),
            ]).unwrap();

            let mut bytes = Vec::new();
            set.write(&mut bytes, order).unwrap();
            let read_back = ChannelSet::read(&mut bytes.as_slice(), order).unwrap();
            assert_eq!(read_back, set);
        }
    }

    #[test]
    fn index_of_reports_channel_not_found() {
        let set = ChannelSet::new(vec![Channel::new("r", ChannelType::U8)]).unwrap();
        assert!(matches!(set.index_of("nonexistent"), Err(Error::ChannelNotFound(_))));
    }
}
