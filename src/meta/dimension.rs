//! On-disk serialization of [`Dimension`] records (§4.5 "Dimension record").

use crate::coord::Dimension;
use crate::error::{checked_u64_to_usize, Result};
use crate::io::{self, ByteOrder, Read, Write};

/// Read one dimension record: friendly name · offset(size) · offset(tile_size).
pub fn read_dimension(read: &mut impl Read, offset_size: u8, order: ByteOrder) -> Result<Dimension> {
    let name = io::read_friendly_string(read, order)?;
    let size = io::read_offset(read, offset_size, order)?;
    let tile_size = io::read_offset(read, offset_size, order)?;

    Dimension::new(name, checked_u64_to_usize(size)?, checked_u64_to_usize(tile_size)?)
}

/// Write one dimension record.
pub fn write_dimension(write: &mut impl Write, dimension: &Dimension, offset_size: u8, order: ByteOrder) -> Result<()> {
    io::write_friendly_string(write, &dimension.name, order)?;
    io::write_offset(write, dimension.size as u64, offset_size, order)?;
    io::write_offset(write, dimension.tile_size as u64, offset_size, order)?;
    Ok(())
}
