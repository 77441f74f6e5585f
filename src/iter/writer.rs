//! The tile-order write iterator (§4.10 "Write iterator"): a single-threaded cursor
//! backed by a background tile-flushing thread.

use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread::{self, JoinHandle};

use super::PREFETCH_DEPTH;
use crate::accessor::{write_channel_value, TileBundle};
use crate::error::{Error, Result};
use crate::io::{ByteOrder, Read, Seek, Write};
use crate::layer::Layer;
use crate::value::Value;

enum Job {
    Tile { index: usize, bundle: TileBundle },
    Finish,
}

type WorkerResult<S> = Result<(S, Layer)>;

/// Writes every sample of a layer in tile-major, in-tile-linear order. Completed
/// tiles are handed to a background thread that encodes and appends them while the
/// caller fills the next tile's buffer, and per-channel min/max are tracked as
/// samples are written (§4.10).
pub struct TileOrderWriter<S> {
    layer: Layer,
    order: ByteOrder,
    offset_size: u8,
    sender: Option<SyncSender<Job>>,
    worker: Option<JoinHandle<WorkerResult<S>>>,
    current: Option<(usize, TileBundle)>,
    next_tile_index: usize,
    in_tile: usize,
    tile_samples: usize,
    total_tiles: usize,
    minmax: Vec<Option<(Value, Value)>>,
    sticky_error: Option<String>,
}

impl<S: Read + Write + Seek + Send + 'static> TileOrderWriter<S> {
    /// Begin writing `layer`'s tiles through `stream`, moved onto a background thread
    /// for the duration of the session. `layer`'s tile tables should already be sized
    /// (e.g. via a prior [`Layer::write_blank`] reservation for uncompressed layers).
    pub fn new(stream: S, layer: Layer, order: ByteOrder, offset_size: u8) -> Self {
        let (sender, receiver) = sync_channel::<Job>(PREFETCH_DEPTH);
        let worker_layer = layer.clone();

        let worker = thread::spawn(move || -> WorkerResult<S> {
            let mut stream = stream;
            let mut layer = worker_layer;

            while let Ok(job) = receiver.recv() {
                match job {
                    Job::Tile { index, bundle } => match bundle {
                        TileBundle::Interleaved(bytes) => {
                            layer.overwrite_tile(&mut stream, index, None, &bytes)?;
                        }
                        TileBundle::Planar(planes) => {
                            for (channel_index, bytes) in planes.into_iter().enumerate() {
                                layer.overwrite_tile(&mut stream, index, Some(channel_index), &bytes)?;
                            }
                        }
                    },
                    Job::Finish => break,
                }
            }

            Ok((stream, layer))
        });

        Self {
            tile_samples: layer.dimensions.tile_samples(),
            total_tiles: layer.dimensions.total_tiles(),
            minmax: vec![None; layer.channels.len()],
            layer,
            order,
            offset_size,
            sender: Some(sender),
            worker: Some(worker),
            current: None,
            next_tile_index: 0,
            in_tile: 0,
            sticky_error: None,
        }
    }

    fn ensure_current(&mut self) -> Result<()> {
        if self.current.is_some() { return Ok(()); }

        let next_index = self.next_tile_index;
        if next_index >= self.total_tiles {
            return Err(Error::range("tile-order writer has already produced every tile"));
        }

        let bundle = if self.layer.separated {
            TileBundle::Planar(
                (0..self.layer.channels.len())
                    .map(|c| Ok(vec![0u8; self.layer.disk_tile_uncompressed_size(Some(c))?]))
                    .collect::<Result<Vec<_>>>()?,
            )
        } else {
            TileBundle::Interleaved(vec![0u8; self.layer.disk_tile_uncompressed_size(None)?])
        };

        self.current = Some((next_index, bundle));
        self.in_tile = 0;
        Ok(())
    }

    fn push_current_to_worker(&mut self) -> Result<()> {
        if let Some((index, bundle)) = self.current.take() {
            let sender = self.sender.as_ref().expect("writer not yet finished");
            sender.send(Job::Tile { index, bundle })
                .map_err(|_| Error::format("tile-order writer's background thread has already stopped"))?;
        }
        Ok(())
    }

    /// Write every channel's value for the sample at the current cursor position,
    /// then advance to the next sample, opening and flushing tiles as needed.
    pub fn set_sample(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.layer.channels.len() {
            return Err(Error::range(format!(
                "sample has {} values, layer has {} channels", values.len(), self.layer.channels.len()
            )));
        }
        for (channel_index, &value) in values.iter().enumerate() {
            self.set_channel(channel_index, value)?;
        }
        self.advance()
    }

    /// Write one channel's value at the current cursor position without advancing.
    /// Call [`Self::advance`] once every channel of the current sample has been set,
    /// or use [`Self::set_sample`] to do both in one call.
    pub fn set_channel(&mut self, channel_index: usize, value: Value) -> Result<()> {
        if self.sticky_error.is_some() {
            return Err(Error::format("tile-order writer already failed; see error()"));
        }
        self.ensure_current()?;

        let (_, bundle) = self.current.as_mut().expect("ensure_current populates current");
        write_channel_value(bundle, &self.layer, channel_index, self.in_tile, self.order, value)?;

        let entry = &mut self.minmax[channel_index];
        *entry = Some(match entry.take() {
            None => (value, value),
            Some((lo, hi)) => (Value::min(lo, value), Value::max(hi, value)),
        });

        Ok(())
    }

    /// Advance the cursor to the next sample, flushing the current tile to the
    /// background thread if it is now complete.
    pub fn advance(&mut self) -> Result<()> {
        if self.sticky_error.is_some() { return Ok(()); }

        self.in_tile += 1;
        if self.in_tile >= self.tile_samples {
            if let Err(error) = self.push_current_to_worker() {
                self.sticky_error = Some(error.to_string());
                return Err(error);
            }
            self.next_tile_index += 1;
            self.in_tile = 0;
        }
        Ok(())
    }

    /// The sticky error, if a background write ever failed.
    pub fn error(&self) -> Option<&str> {
        self.sticky_error.as_deref()
    }

    /// Flush any partially-filled tile, stop the background thread, and recover the
    /// stream and the final layer — its channels' `min`/`max` set from the values
    /// written, and its tile tables reflecting every tile's final position (§4.10
    /// "Done").
    pub fn done(mut self) -> Result<(S, Layer)> {
        self.push_current_to_worker()?;

        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Job::Finish);
        }

        let (stream, mut layer) = self.worker.take()
            .expect("worker only taken once")
            .join()
            .map_err(|_| Error::format("tile-order writer's background thread panicked"))??;

        for (channel, minmax) in layer.channels.channels_mut().iter_mut().zip(self.minmax.into_iter()) {
            if let Some((lo, hi)) = minmax {
                channel.min = Some(lo);
                channel.max = Some(hi);
            }
        }

        let mut stream = stream;
        if layer.self_offset.is_some() {
            layer.overwrite_self(&mut stream, self.offset_size, self.order)?;
        }

        Ok((stream, layer))
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

    fn tiny_dims() -> DimensionSet {
        DimensionSet::new(vec![
            Dimension::new("x", 4, 2).unwrap(),
            Dimension::new("y", 4, 2).unwrap(),
        ]).unwrap()
    }

    #[test]
    fn writes_every_tile_and_tracks_minmax() {
        let channels = ChannelSet::new(vec![Channel::new("a", ChannelType::I32)]).unwrap();
        let mut layer = Layer::new("writer-test", false, Compression::None, tiny_dims(), channels);

        let mut stream = Cursor::new(Vec::new());
        layer.write_blank(&mut stream, 8, ByteOrder::Little).unwrap();

        let total = layer.dimensions.total_samples();
        let mut writer = TileOrderWriter::new(stream, layer.clone(), ByteOrder::Little, 8);
        for i in 0..total {
            let value = i as i32 - 3;
            writer.set_sample(&[Value::I32(value)]).unwrap();
        }

        let (stream, layer) = writer.done().unwrap();
        assert_eq!(layer.channels.channels()[0].min, Some(Value::I32(-3)));
        assert_eq!(layer.channels.channels()[0].max, Some(Value::I32(total as i32 - 4)));

        // `set_sample` fills tiles in strict tile-major order (the same order
        // `tile_coordinates()` enumerates), not the sample-major order `sample_coordinates()`
        // enumerates — those two orders diverge whenever a layer has more than one tile.
        let mut stream = stream;
        for (i, selector) in layer.dimensions.tile_coordinates().enumerate() {
            let tile = layer.read_tile(&mut stream, selector.tile, None).unwrap();
            let bytes = &tile[selector.in_tile * 4..selector.in_tile * 4 + 4];
            let mut reader = bytes;
            let value: i32 = crate::io::Primitive::read(&mut reader, ByteOrder::Little).unwrap();
            assert_eq!(value, i as i32 - 3);
        }
    }
}
