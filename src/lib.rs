#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
)]

#![deny(
    unused_variables,
    unused_assignments,
    dead_code,
    unused_must_use,
    trivial_numeric_casts,
    redundant_semicolon
)]

#![forbid(unsafe_code)]

//! A random-access, cloud-optimizable container format for large N-dimensional tiled
//! raster datasets with multiple per-cell channels (§1 "Purpose & scope").
//!
//! A [`file::PixiFile`] owns the header and the layer/tag chains; each
//! [`layer::Layer`] describes one typed, tiled grid of samples. Tiles are addressed
//! either one sample at a time through an [`accessor`], or in bulk through an
//! [`iter`] reader/writer; [`sample`] supplies the free functions that tie the two
//! addressing styles together.

pub mod math;
pub mod io;
pub mod coord;
pub mod value;
pub mod compression;
pub mod meta;
pub mod layer;
pub mod tag;
pub mod accessor;
pub mod iter;
pub mod sample;
pub mod file;
pub mod error;

/// Re-exports of the types most programs need to read or write a pixi container.
pub mod prelude {
    pub use crate::file::PixiFile;
    pub use crate::layer::Layer;
    pub use crate::meta::header::Header;
    pub use crate::meta::{Channel, ChannelSet};
    pub use crate::coord::{Dimension, DimensionSet};

    pub use crate::accessor::{Accessor, CachedAccessor, DirectAccessor, AppendWriter, TileAccess, TileModifier};
    pub use crate::iter::{TileOrderReader, TileOrderWriter};
    pub use crate::sample::{sample_at, channel_at, set_sample_at, set_channel_at};

    pub use crate::compression::Compression;
    pub use crate::value::{ChannelType, Value};
    pub use crate::io::ByteOrder;
    pub use crate::error::{Error, Result};
}
