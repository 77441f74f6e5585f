//! The fixed-size file header (§4.5 "Header on-disk layout"): the only part of a pixi
//! file whose byte layout does not itself depend on the header's own fields.

use crate::error::{Error, Result};
use crate::io::{self, ByteOrder, Primitive, Read, Write, Seek, SeekFrom};

/// The first four bytes of every pixi file.
pub const MAGIC: [u8; 4] = *b"pixi";

/// Byte offset, from the start of the file, of the `first_layer_offset` field.
/// `MAGIC` (4) + two version digits (2) + `offset_size` (1) + `byte_order` (1).
const OFFSETS_START: u64 = 8;

/// Governs the encoding of every offset and multibyte scalar in the rest of the file (§3 "Header").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Container format version; a small monotonic integer, not a feature negotiation scheme.
    pub version: u8,
    /// Width in bytes (4 or 8) of every absolute offset stored in this file.
    pub offset_size: u8,
    /// Endianness every multibyte scalar in this file is stored with.
    pub byte_order: ByteOrder,
    /// Absolute offset of the first layer record, or 0 if the file has no layers yet.
    pub first_layer_offset: u64,
    /// Absolute offset of the first tag section, or 0 if the file has no tags yet.
    pub first_tag_offset: u64,
}

impl Header {
    /// Construct a header for a brand-new, empty file.
    pub fn new(version: u8, offset_size: u8, byte_order: ByteOrder) -> Result<Self> {
        if version > 99 {
            return Err(Error::range("version must fit in two decimal digits"));
        }
        if offset_size != 4 && offset_size != 8 {
            return Err(Error::format(format!("offset_size must be 4 or 8, got {offset_size}")));
        }

        Ok(Self { version, offset_size, byte_order, first_layer_offset: 0, first_tag_offset: 0 })
    }

    /// Total on-disk size of the header: `8 + 2 * offset_size` (§4.5).
    pub fn byte_size(&self) -> usize {
        8 + 2 * self.offset_size as usize
    }

    /// Read and validate a header from the start of a stream.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        read.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::format("missing \"pixi\" magic bytes"));
        }

        let mut version_digits = [0u8; 2];
        read.read_exact(&mut version_digits)?;
        let version_str = std::str::from_utf8(&version_digits)
            .map_err(|_| Error::format("version field is not ASCII"))?;
        let version: u8 = version_str.parse()
            .map_err(|_| Error::format(format!("version field '{version_str}' is not two decimal digits")))?;

        let mut offset_size_byte = [0u8; 1];
        read.read_exact(&mut offset_size_byte)?;
        let offset_size = offset_size_byte[0];
        if offset_size != 4 && offset_size != 8 {
            return Err(Error::format(format!("offset_size must be 4 or 8, got {offset_size}")));
        }

        let mut order_byte = [0u8; 1];
        read.read_exact(&mut order_byte)?;
        let byte_order = ByteOrder::from_marker(order_byte[0])?;

        let first_layer_offset = io::read_offset(read, offset_size, byte_order)?;
        let first_tag_offset = io::read_offset(read, offset_size, byte_order)?;

        Ok(Self { version, offset_size, byte_order, first_layer_offset, first_tag_offset })
    }

    /// Write the complete header, including its two (possibly still zero) offsets.
    pub fn write(&self, write: &mut impl Write) -> Result<()> {
        write.write_all(&MAGIC)?;
        write.write_all(format!("{:02}", self.version).as_bytes())?;
        write.write_all(&[self.offset_size])?;
        write.write_all(&[self.byte_order.to_marker()])?;

        io::write_offset(write, self.first_layer_offset, self.offset_size, self.byte_order)?;
        io::write_offset(write, self.first_tag_offset, self.offset_size, self.byte_order)?;

        Ok(())
    }

    /// Rewrite just the two mutable offset fields in place (§3 "Header": "Immutable after
    /// creation except for two offsets"), without disturbing the rest of the stream position.
    pub fn overwrite_offsets(&self, stream: &mut (impl Write + Seek)) -> Result<()> {
        let previous_position = stream.stream_position()?;

        stream.seek(SeekFrom::Start(OFFSETS_START))?;
        io::write_offset(stream, self.first_layer_offset, self.offset_size, self.byte_order)?;
        io::write_offset(stream, self.first_tag_offset, self.offset_size, self.byte_order)?;

        stream.seek(SeekFrom::Start(previous_position))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trips_every_offset_size_and_byte_order() {
        for offset_size in [4u8, 8] {
            for byte_order in [ByteOrder::Little, ByteOrder::Big] {
                let mut header = Header::new(1, offset_size, byte_order).unwrap();
                header.first_layer_offset = 12345;
                header.first_tag_offset = 67890;

                let mut bytes = Vec::new();
                header.write(&mut bytes).unwrap();
                assert_eq!(bytes.len(), header.byte_size());

                let read_back = Header::read(&mut bytes.as_slice()).unwrap();
                assert_eq!(read_back, header);
            }
        }
    }

    #[test]
    fn overwrite_offsets_reproduces_the_struct_and_preserves_position() {
        let mut header = Header::new(1, 8, ByteOrder::Little).unwrap();
        let mut stream = Cursor::new(Vec::new());
        header.write(&mut stream).unwrap();

        header.first_layer_offset = 999;
        header.first_tag_offset = 111;

        stream.seek(SeekFrom::End(0)).unwrap();
        let position_before = stream.stream_position().unwrap();
        header.overwrite_offsets(&mut stream).unwrap();
        assert_eq!(stream.stream_position().unwrap(), position_before);

        stream.seek(SeekFrom::Start(0)).unwrap();
        let read_back = Header::read(&mut stream).unwrap();
        assert_eq!(read_back, header);
    }

    #[test]
    fn rejects_missing_magic() {
        let bytes = [0u8; 20];
        assert!(Header::read(&mut &bytes[..]).is_err());
    }

    #[test]
    fn rejects_bad_offset_size() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(b"01");
        bytes.push(5); // invalid offset size
        bytes.push(0x00);
        assert!(Header::read(&mut bytes.as_slice()).is_err());
    }
}
