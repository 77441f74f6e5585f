//! The error type returned by (almost) every fallible operation in this crate.

use std::fmt;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that carries no value, only a possible error.
pub type UnitResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;

/// Everything that can go wrong while reading, writing, or addressing a pixi container.
#[derive(Debug)]
pub enum Error {
    /// The container's binary layout does not match what this crate expects:
    /// missing magic bytes, an unsupported version, a bad endianness byte,
    /// an offset size that is neither 4 nor 8, or a record that ends early.
    Format(String),

    /// A value names a feature this crate does not implement:
    /// an unknown compression kind, an unsupported channel type,
    /// or a planar full-sample write through the append writer.
    NotSupported(String),

    /// A tile's stored CRC32 does not match the checksum of its decoded bytes.
    Integrity {
        /// Name of the layer the corrupt tile belongs to.
        layer_name: String,
        /// Index of the corrupt tile within the layer's tile array.
        tile_index: usize,
    },

    /// A coordinate, channel index, or append order fell outside its valid bounds.
    Range(String),

    /// No channel with the requested name exists in the layer.
    ChannelNotFound(String),

    /// An error was returned by the backing byte stream.
    Io(IoError),
}

impl Error {
    /// Build a [`Error::Format`] error from any message-like value.
    pub fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    /// Build a [`Error::NotSupported`] error from any message-like value.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Build a [`Error::Range`] error from any message-like value.
    pub fn range(message: impl Into<String>) -> Self {
        Error::Range(message.into())
    }

    /// Build a [`Error::Integrity`] error naming the offending layer and tile.
    pub fn integrity(layer_name: impl Into<String>, tile_index: usize) -> Self {
        Error::Integrity { layer_name: layer_name.into(), tile_index }
    }

    /// Build a [`Error::ChannelNotFound`] error naming the missing channel.
    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Error::ChannelNotFound(name.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Format(message) => write!(f, "invalid pixi container: {message}"),
            Error::NotSupported(message) => write!(f, "not supported: {message}"),
            Error::Integrity { layer_name, tile_index } =>
                write!(f, "CRC mismatch in layer '{layer_name}', tile {tile_index}"),
            Error::Range(message) => write!(f, "out of range: {message}"),
            Error::ChannelNotFound(name) => write!(f, "no channel named '{name}'"),
            Error::Io(io_error) => write!(f, "i/o error: {io_error}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(io_error) => Some(io_error),
            _ => None,
        }
    }
}

/// Enable using the `?` operator on `io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

#[inline]
pub fn usize_to_u64(value: usize) -> u64 {
    value as u64
}

#[inline]
pub fn u64_to_usize(value: u64) -> usize {
    debug_assert!(value <= usize::MAX as u64, "offset too large for this platform");
    value as usize
}

#[inline]
pub fn usize_to_i32(value: usize) -> i32 {
    debug_assert!(value <= i32::MAX as usize, "value too large to fit in i32");
    value as i32
}

/// Like [`u64_to_usize`], but for values read from an untrusted byte stream: returns a
/// proper [`Error::Format`] instead of panicking when the value cannot fit.
#[inline]
pub fn checked_u64_to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::format(format!("value {value} does not fit on this platform")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_tile() {
        let error = Error::integrity("elevation", 7);
        assert_eq!(error.to_string(), "CRC mismatch in layer 'elevation', tile 7");
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_error = IoError::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));
    }
}
