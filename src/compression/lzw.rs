//! LZW compression, in both bit-packing orders (`LzwLsb`/`LzwMsb`, §4.3), gated
//! behind the `lzw` feature.

use crate::error::{Error, Result};
use super::{ByteVec, Bytes};

/// Which end of each output byte the next LZW code bit lands in.
#[derive(Debug, Clone, Copy)]
pub enum BitOrder {
    Lsb,
    Msb,
}

impl BitOrder {
    fn weezl(self) -> weezl::BitOrder {
        match self {
            BitOrder::Lsb => weezl::BitOrder::Lsb,
            BitOrder::Msb => weezl::BitOrder::Msb,
        }
    }
}

/// Minimum LZW code width in bits; matches the conventional TIFF/GIF byte-oriented alphabet.
const MIN_CODE_SIZE: u8 = 8;

pub fn compress(uncompressed: Bytes<'_>, order: BitOrder) -> Result<ByteVec> {
    weezl::encode::Encoder::with_tiff_size_switch(order.weezl(), MIN_CODE_SIZE)
        .encode(uncompressed)
        .map_err(|error| Error::format(format!("lzw compression failed: {error}")))
}

pub fn decompress(compressed: Bytes<'_>, expected_len: usize, order: BitOrder) -> Result<ByteVec> {
    let decompressed = weezl::decode::Decoder::with_tiff_size_switch(order.weezl(), MIN_CODE_SIZE)
        .decode(compressed)
        .map_err(|error| Error::format(format!("lzw decompression failed: {error}")))?;

    if decompressed.len() != expected_len {
        return Err(Error::format(format!(
            "lzw decompressed to {} bytes, expected {expected_len}", decompressed.len()
        )));
    }

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn round_trips_both_bit_orders() {
        for order in [BitOrder::Lsb, BitOrder::Msb] {
            let mut rng = rand::rng();
            let data: Vec<u8> = (0..512).map(|_| rng.random_range(0..4)).collect();

            let compressed = compress(&data, order).unwrap();
            let decompressed = decompress(&compressed, data.len(), order).unwrap();
            assert_eq!(decompressed, data);
        }
    }
}
