//! RFC 1951 raw deflate, the required `Flate` compression kind (§4.3).

use miniz_oxide::deflate::compress_to_vec;
use miniz_oxide::inflate::decompress_to_vec_with_limit;

use crate::error::{Error, Result};
use super::{ByteVec, Bytes};

/// Default zlib compression level; favors ratio over speed, matching the teacher
/// crate's "slow processing, large memory savings" ZIP characterization.
const COMPRESSION_LEVEL: u8 = 6;

pub fn compress(uncompressed: Bytes<'_>) -> Result<ByteVec> {
    Ok(compress_to_vec(uncompressed, COMPRESSION_LEVEL))
}

pub fn decompress(compressed: Bytes<'_>, expected_len: usize) -> Result<ByteVec> {
    let decompressed = decompress_to_vec_with_limit(compressed, expected_len)
        .map_err(|error| Error::format(format!("flate decompression failed: {error:?}")))?;

    if decompressed.len() != expected_len {
        return Err(Error::format(format!(
            "flate decompressed to {} bytes, expected {expected_len}", decompressed.len()
        )));
    }

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn round_trips_empty_and_small_buffers() {
        for len in [0usize, 1, 127, 4096] {
            let mut rng = rand::rng();
            let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();

            let compressed = compress(&data).unwrap();
            let decompressed = decompress(&compressed, data.len()).unwrap();
            assert_eq!(decompressed, data);
        }
    }

    #[test]
    fn round_trips_repetitive_data_well() {
        let data = vec![42u8; 8192];
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len() / 4);

        let decompressed = decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }
}
