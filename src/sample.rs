//! The sample facade (C11, §4.11): free functions polymorphic over the accessor
//! traits, so callers can read and write single samples without caring whether the
//! tiles underneath come from the direct, cached, or any future accessor.

use crate::accessor::{read_channel_value, write_channel_value, TileAccess, TileModifier};
use crate::error::{Error, Result};
use crate::value::Value;

/// Decode every channel's value at `coord` (§4.11 "SampleAt").
pub fn sample_at(acc: &mut impl TileAccess, coord: &[usize]) -> Result<Vec<Value>> {
    let layer = acc.layer();
    (0..layer.channels.len()).map(|c| channel_at(acc, coord, c)).collect()
}

/// Decode one channel's value at `coord`, without decoding the other channels of the
/// same sample (§4.11 "ChannelAt").
pub fn channel_at(acc: &mut impl TileAccess, coord: &[usize], channel_index: usize) -> Result<Value> {
    let layer = acc.layer();
    let order = acc.header().byte_order;

    let selector = layer.dimensions.sample_to_tile_selector(coord)?;
    let bundle = acc.tile(selector.tile)?;
    read_channel_value(&bundle, &layer, channel_index, selector.in_tile, order)
}

/// Encode every channel's value of `sample` at `coord`, marking the owning tile dirty
/// (§4.11 "SetSampleAt"). `sample` must have one entry per channel.
pub fn set_sample_at(acc: &mut impl TileModifier, coord: &[usize], sample: &[Value]) -> Result<()> {
    let layer = acc.layer();
    if sample.len() != layer.channels.len() {
        return Err(Error::range(format!(
            "sample has {} values, layer has {} channels", sample.len(), layer.channels.len()
        )));
    }
    for (channel_index, &value) in sample.iter().enumerate() {
        set_channel_at(acc, coord, channel_index, value)?;
    }
    Ok(())
}

/// Encode one channel's value at `coord`, marking the owning tile dirty so a later
/// `commit()` writes it back (§4.11 "SetChannelAt").
pub fn set_channel_at(acc: &mut impl TileModifier, coord: &[usize], channel_index: usize, value: Value) -> Result<()> {
    let layer = acc.layer();
    let order = acc.header().byte_order;

    let selector = layer.dimensions.sample_to_tile_selector(coord)?;
    let mut bundle = acc.tile(selector.tile)?;
    write_channel_value(&mut bundle, &layer, channel_index, selector.in_tile, order, value)?;
    acc.write_tile(selector.tile, bundle)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::accessor::CachedAccessor;
    use crate::compression::Compression;
    use crate::coord::{Dimension, DimensionSet};
    use crate::io::ByteOrder;
    use crate::layer::Layer;
    use crate::meta::channel::{Channel, ChannelSet};
    use crate::meta::header::Header;
    use crate::value::ChannelType;

    #[test]
    fn set_sample_then_sample_at_round_trips_through_cache() {
        let dims = DimensionSet::new(vec![
            Dimension::new("x", 4, 2).unwrap(),
            Dimension::new("y", 4, 2).unwrap(),
        ]).unwrap();
        let channels = ChannelSet::new(vec![
            Channel::new("a", ChannelType::F32),
            Channel::new("b", ChannelType::I8),
        ]).unwrap();
        let mut layer = Layer::new("facade-test", false, Compression::None, dims, channels);

        let mut stream = Cursor::new(Vec::new());
        layer.write_blank(&mut stream, 8, ByteOrder::Little).unwrap();
        let header = Header::new(1, 8, ByteOrder::Little).unwrap();

        let mut accessor = CachedAccessor::new(stream, layer.clone(), header, 4);

        for coord in layer.dimensions.sample_coordinates() {
            let sample = [Value::F32(coord[0] as f32), Value::I8(coord[1] as i8)];
            set_sample_at(&mut accessor, &coord, &sample).unwrap();
        }
        accessor.commit().unwrap();

        for coord in layer.dimensions.sample_coordinates() {
            let expected = vec![Value::F32(coord[0] as f32), Value::I8(coord[1] as i8)];
            assert_eq!(sample_at(&mut accessor, &coord).unwrap(), expected);
        }
    }

    #[test]
    fn channel_count_mismatch_is_rejected() {
        let dims = DimensionSet::new(vec![Dimension::new("x", 2, 2).unwrap()]).unwrap();
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U8)]).unwrap();
        let mut layer = Layer::new("x", false, Compression::None, dims, channels);
        let mut stream = Cursor::new(Vec::new());
        layer.write_blank(&mut stream, 8, ByteOrder::Little).unwrap();
        let header = Header::new(1, 8, ByteOrder::Little).unwrap();

        let mut accessor = CachedAccessor::new(stream, layer, header, 2);
        let result = set_sample_at(&mut accessor, &[0], &[Value::U8(1), Value::U8(2)]);
        assert!(result.is_err());
    }
}
