//! Pluggable per-tile compression (§4.3). Every stored tile is `codec(payload) · CRC32(payload)`,
//! the checksum always computed over the *uncompressed* bytes (§4.3, §4.6).

mod flate;
#[cfg(feature = "lzw")]
mod lzw;
#[cfg(feature = "rle8")]
mod rle;

use crate::error::{Error, Result};

/// A byte vector holding either raw or encoded tile payload.
pub type ByteVec = Vec<u8>;

/// A borrowed byte slice.
pub type Bytes<'s> = &'s [u8];

/// The context an encoder/decoder needs beyond the raw bytes: enough of the owning
/// layer's shape to make layout-aware decisions (only `Rle8` currently uses this, §4.3).
#[derive(Debug, Clone, Copy)]
pub struct LayerContext {
    /// Bytes per sample (sum of channel sizes) of the disk tile being en/decoded.
    pub sample_size: usize,
    /// Whether the owning layer stores channels planar (`true`) or interleaved (`false`).
    pub separated: bool,
}

/// Which compression algorithm a layer's tiles are stored under (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Tiles are stored uncompressed.
    None,
    /// RFC 1951 deflate.
    Flate,
    /// LZW with least-significant-bit-first code packing.
    LzwLsb,
    /// LZW with most-significant-bit-first code packing.
    LzwMsb,
    /// Byte-run-length encoding, layer-aware to pick a sensible byte stride.
    Rle8,
}

impl Compression {
    /// The `u32` tag a layer record stores for this compression kind (§4.5 "Layer record").
    pub fn tag(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Flate => 1,
            Compression::LzwLsb => 2,
            Compression::LzwMsb => 3,
            Compression::Rle8 => 4,
        }
    }

    /// Decode a layer record's compression tag.
    pub fn from_tag(tag: u32) -> Result<Self> {
        Ok(match tag {
            0 => Compression::None,
            1 => Compression::Flate,
            2 => Compression::LzwLsb,
            3 => Compression::LzwMsb,
            4 => Compression::Rle8,
            other => return Err(Error::unsupported(format!("unknown compression kind tag {other}"))),
        })
    }

    /// Encode `uncompressed` under this compression kind (§4.3).
    pub fn encode(self, uncompressed: Bytes<'_>, context: LayerContext) -> Result<ByteVec> {
        match self {
            Compression::None => Ok(uncompressed.to_vec()),
            Compression::Flate => flate::compress(uncompressed),

            #[cfg(feature = "lzw")]
            Compression::LzwLsb => lzw::compress(uncompressed, lzw::BitOrder::Lsb),
            #[cfg(feature = "lzw")]
            Compression::LzwMsb => lzw::compress(uncompressed, lzw::BitOrder::Msb),
            #[cfg(not(feature = "lzw"))]
            Compression::LzwLsb | Compression::LzwMsb =>
                Err(Error::unsupported("LZW compression requires the `lzw` feature")),

            #[cfg(feature = "rle8")]
            Compression::Rle8 => rle::compress(uncompressed, context),
            #[cfg(not(feature = "rle8"))]
            Compression::Rle8 => Err(Error::unsupported("RLE8 compression requires the `rle8` feature")),
        }
    }

    /// Decode `compressed` under this compression kind into a buffer of exactly
    /// `expected_len` bytes (§4.3; the caller pre-sizes the output).
    pub fn decode(self, compressed: Bytes<'_>, context: LayerContext, expected_len: usize) -> Result<ByteVec> {
        match self {
            Compression::None => {
                if compressed.len() != expected_len {
                    return Err(Error::format(format!(
                        "uncompressed tile has {} bytes, expected {expected_len}", compressed.len()
                    )));
                }
                Ok(compressed.to_vec())
            }
            Compression::Flate => flate::decompress(compressed, expected_len),

            #[cfg(feature = "lzw")]
            Compression::LzwLsb => lzw::decompress(compressed, expected_len, lzw::BitOrder::Lsb),
            #[cfg(feature = "lzw")]
            Compression::LzwMsb => lzw::decompress(compressed, expected_len, lzw::BitOrder::Msb),
            #[cfg(not(feature = "lzw"))]
            Compression::LzwLsb | Compression::LzwMsb =>
                Err(Error::unsupported("LZW compression requires the `lzw` feature")),

            #[cfg(feature = "rle8")]
            Compression::Rle8 => rle::decompress(compressed, expected_len, context),
            #[cfg(not(feature = "rle8"))]
            Compression::Rle8 => Err(Error::unsupported("RLE8 compression requires the `rle8` feature")),
        }
    }
}

/// Append the IEEE CRC32 of `payload` to `payload` itself, the format a stored tile
/// suffixes every encoded payload with (§4.3, §4.6).
pub fn append_checksum(payload: &mut ByteVec) {
    let checksum = crc32fast::hash(payload);
    payload.extend_from_slice(&checksum.to_le_bytes());
}

/// Split a tile's stored bytes into `(encoded_payload, stored_checksum)` and verify the
/// checksum against `encoded_payload`. Returns the payload slice on success.
pub fn split_and_verify_checksum<'b>(stored: Bytes<'b>) -> Result<Bytes<'b>> {
    if stored.len() < 4 {
        return Err(Error::format("tile is too short to contain a CRC32 trailer"));
    }

    let (payload, checksum_bytes) = stored.split_at(stored.len() - 4);
    let stored_checksum = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
    let actual_checksum = crc32fast::hash(payload);

    if actual_checksum != stored_checksum {
        return Err(Error::format(format!(
            "CRC32 mismatch: stored {stored_checksum:#010x}, computed {actual_checksum:#010x}"
        )));
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_round_trips() {
        let mut payload = vec![1, 2, 3, 4, 5];
        let original = payload.clone();
        append_checksum(&mut payload);
        assert_eq!(payload.len(), original.len() + 4);

        let verified = split_and_verify_checksum(&payload).unwrap();
        assert_eq!(verified, original.as_slice());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut payload = vec![1, 2, 3, 4, 5];
        append_checksum(&mut payload);

        let last = payload.len() - 1;
        payload[last] ^= 0xFF;

        assert!(split_and_verify_checksum(&payload).is_err());
    }

    #[test]
    fn none_compression_requires_exact_length() {
        let context = LayerContext { sample_size: 1, separated: false };
        let data = vec![1u8, 2, 3];
        assert!(Compression::None.decode(&data, context, 3).is_ok());
        assert!(Compression::None.decode(&data, context, 4).is_err());
    }
}
