//! The tile-order read iterator (§4.10 "Read iterator"): a single-threaded cursor
//! backed by a background prefetcher.

use std::sync::mpsc::{sync_channel, Receiver};
use std::thread::{self, JoinHandle};

use super::PREFETCH_DEPTH;
use crate::accessor::{read_channel_value, TileBundle};
use crate::coord::Coord;
use crate::error::{Error, Result};
use crate::io::{ByteOrder, Read, Seek};
use crate::layer::Layer;
use crate::value::Value;

type PrefetchedTile = (usize, Result<TileBundle>);

/// Reads every sample of a layer in tile-major, in-tile-linear order, with a
/// background thread decoding up to [`PREFETCH_DEPTH`] tiles ahead of the cursor.
pub struct TileOrderReader {
    layer: Layer,
    order: ByteOrder,
    receiver: Receiver<PrefetchedTile>,
    worker: Option<JoinHandle<()>>,
    current_tile: Option<(usize, TileBundle)>,
    in_tile: usize,
    tile_samples: usize,
    total_tiles: usize,
    sticky_error: Option<String>,
    finished: bool,
}

impl TileOrderReader {
    /// Begin reading `layer` through `stream`, which is moved onto the background
    /// prefetch thread for the lifetime of the iterator.
    pub fn new<S: Read + Seek + Send + 'static>(stream: S, layer: Layer, order: ByteOrder) -> Self {
        let (sender, receiver) = sync_channel(PREFETCH_DEPTH);
        let worker_layer = layer.clone();

        let worker = thread::spawn(move || {
            let mut stream = stream;
            let total_tiles = worker_layer.dimensions.total_tiles();

            for tile in 0..total_tiles {
                let bundle = Self::read_bundle(&worker_layer, &mut stream, tile);
                let is_err = bundle.is_err();
                if sender.send((tile, bundle)).is_err() { return; }
                if is_err { return; }
            }
        });

        Self {
            tile_samples: layer.dimensions.tile_samples(),
            total_tiles: layer.dimensions.total_tiles(),
            layer,
            order,
            receiver,
            worker: Some(worker),
            current_tile: None,
            in_tile: 0,
            sticky_error: None,
            finished: false,
        }
    }

    fn read_bundle(layer: &Layer, stream: &mut (impl Read + Seek), tile: usize) -> Result<TileBundle> {
        if layer.separated {
            let planes = (0..layer.channels.len())
                .map(|c| layer.read_tile(stream, tile, Some(c)))
                .collect::<Result<Vec<_>>>()?;
            Ok(TileBundle::Planar(planes))
        } else {
            Ok(TileBundle::Interleaved(layer.read_tile(stream, tile, None)?))
        }
    }

    /// Advance to the next sample. Returns `false` at end-of-layer or once a sticky
    /// error has been recorded (§4.10).
    pub fn next(&mut self) -> bool {
        if self.finished || self.sticky_error.is_some() { return false; }

        let need_new_tile = match &self.current_tile {
            None => true,
            Some((_, _)) if self.in_tile + 1 >= self.tile_samples => true,
            _ => { self.in_tile += 1; false }
        };

        if !need_new_tile { return true; }

        let next_index = self.current_tile.as_ref().map(|(t, _)| t + 1).unwrap_or(0);
        if next_index >= self.total_tiles {
            self.finished = true;
            return false;
        }

        match self.receiver.recv() {
            Ok((tile, Ok(bundle))) => {
                debug_assert_eq!(tile, next_index, "prefetcher must deliver tiles in order");
                self.current_tile = Some((tile, bundle));
                self.in_tile = 0;
                true
            }
            Ok((_, Err(error))) => {
                self.sticky_error = Some(error.to_string());
                false
            }
            Err(_) => {
                self.finished = true;
                false
            }
        }
    }

    /// The sample coordinate the cursor currently points at.
    pub fn coordinate(&self) -> Result<Coord> {
        let (tile, _) = self.current_tile.as_ref()
            .ok_or_else(|| Error::range("reader has not been advanced onto a sample yet"))?;

        let selector = crate::coord::TileSelector { tile: *tile, in_tile: self.in_tile };
        let tile_coord = self.layer.dimensions.selector_to_tile_coord(&selector)?;
        Ok(self.layer.dimensions.tile_coord_to_sample(&tile_coord))
    }

    /// Every channel's value at the current cursor position.
    pub fn sample(&self) -> Result<Vec<Value>> {
        (0..self.layer.channels.len()).map(|c| self.channel(c)).collect()
    }

    /// One channel's value at the current cursor position.
    pub fn channel(&self, channel_index: usize) -> Result<Value> {
        let (_, bundle) = self.current_tile.as_ref()
            .ok_or_else(|| Error::range("reader has not been advanced onto a sample yet"))?;
        read_channel_value(bundle, &self.layer, channel_index, self.in_tile, self.order)
    }

    /// Stop the prefetcher and join its thread. Safe to call at any point (§4.10 "Done").
    pub fn done(&mut self) {
        self.finished = true;
        drop(std::mem::replace(&mut self.current_tile, None));
        // Dropping the receiver unblocks a sender stuck on a full channel so the
        // worker can observe the send failure and exit.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    /// The sticky error, if reading ever failed (§4.10 "Errors surface via Error()").
    pub fn error(&self) -> Option<&str> {
        self.sticky_error.as_deref()
    }
}

impl Drop for TileOrderReader {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::compression::Compression;
    use crate::coord::{Dimension, DimensionSet};
    use crate::meta::channel::{Channel, ChannelSet};
    use crate::value::ChannelType;

    #[test]
    fn reads_every_sample_in_tile_major_order() {
        let dims = DimensionSet::new(vec![
            Dimension::new("x", 4, 2).unwrap(),
            Dimension::new("y", 4, 2).unwrap(),
        ]).unwrap();
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::U32)]).unwrap();
        let mut layer = Layer::new("reader-test", false, Compression::None, dims, channels);

        let mut stream = Cursor::new(Vec::new());
        layer.write_blank(&mut stream, 8, ByteOrder::Little).unwrap();

        for coord in layer.dimensions.sample_coordinates() {
            let selector = layer.dimensions.sample_to_tile_selector(&coord).unwrap();
            let value = (coord[0] + 10 * coord[1]) as u32;
            let mut bytes = [0u8; 4];
            crate::io::Primitive::write(value, &mut bytes.as_mut_slice(), ByteOrder::Little).unwrap();

            let mut tile_bytes = layer.read_tile(&mut stream, selector.tile, None).unwrap();
            tile_bytes[selector.in_tile * 4..selector.in_tile * 4 + 4].copy_from_slice(&bytes);
            layer.overwrite_tile(&mut stream, selector.tile, None, &tile_bytes).unwrap();
        }

        let mut reader = TileOrderReader::new(stream, layer.clone(), ByteOrder::Little);
        let mut visited = 0;
        while reader.next() {
            let coord = reader.coordinate().unwrap();
            let expected = (coord[0] + 10 * coord[1]) as u32;
            assert_eq!(reader.channel(0).unwrap(), Value::U32(expected));
            visited += 1;
        }
        assert_eq!(visited, layer.dimensions.total_samples());
        assert!(reader.error().is_none());
        reader.done();
    }
}
