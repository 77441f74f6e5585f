//! Byte-run-length encoding, the optional `Rle8` compression kind (§4.3). Layer-aware:
//! before run-length coding, bytes are deinterleaved by their offset within a sample so
//! that, e.g., all high bytes of a multi-byte channel sit next to each other — the same
//! byte-plane-separation trick the teacher crate uses ahead of its own RLE/ZIP coders.

use crate::error::{Error, Result};
use super::{ByteVec, Bytes, LayerContext};

const MIN_RUN_LENGTH: usize = 3;
const MAX_RUN_LENGTH: usize = 127;

fn stride_for(context: LayerContext) -> usize {
    // Planar tiles already hold one channel's worth of identically-sized scalars;
    // interleaved tiles hold `sample_size` bytes per full sample.
    if context.separated { 1 } else { context.sample_size.max(1) }
}

/// Reorders `data` (a sequence of `stride`-byte samples) into `stride` contiguous planes:
/// all byte-offset-0 values, then all byte-offset-1 values, and so on.
fn separate_by_byte_plane(data: &[u8], stride: usize) -> ByteVec {
    if stride <= 1 || data.len() % stride != 0 { return data.to_vec(); }

    let sample_count = data.len() / stride;
    let mut separated = vec![0u8; data.len()];

    for sample in 0..sample_count {
        for plane in 0..stride {
            separated[plane * sample_count + sample] = data[sample * stride + plane];
        }
    }

    separated
}

/// Inverse of [`separate_by_byte_plane`].
fn interleave_by_byte_plane(data: &[u8], stride: usize) -> ByteVec {
    if stride <= 1 || data.len() % stride != 0 { return data.to_vec(); }

    let sample_count = data.len() / stride;
    let mut interleaved = vec![0u8; data.len()];

    for sample in 0..sample_count {
        for plane in 0..stride {
            interleaved[sample * stride + plane] = data[plane * sample_count + sample];
        }
    }

    interleaved
}

/// Classic PackBits-style run-length coding: a signed length byte followed either by
/// that many literal bytes (length negative, as `-count` literals) or one repeated
/// byte (length non-negative, repeated `count + 1` times).
fn packbits_compress(data: &[u8]) -> ByteVec {
    let mut out = ByteVec::with_capacity(data.len());
    let mut index = 0;

    while index < data.len() {
        let mut run_length = 1;
        while run_length < MAX_RUN_LENGTH
            && index + run_length < data.len()
            && data[index + run_length] == data[index]
        {
            run_length += 1;
        }

        if run_length >= MIN_RUN_LENGTH {
            out.push((run_length - 1) as u8);
            out.push(data[index]);
            index += run_length;
        } else {
            let literal_start = index;
            let mut literal_len = 0;
            while literal_len < MAX_RUN_LENGTH && index < data.len() {
                let remaining_run = {
                    let mut run = 1;
                    while run < MIN_RUN_LENGTH
                        && index + run < data.len()
                        && data[index + run] == data[index]
                    { run += 1; }
                    run
                };
                if remaining_run >= MIN_RUN_LENGTH { break; }

                literal_len += 1;
                index += 1;
            }

            out.push((-(literal_len as i32) - 1) as i8 as u8);
            out.extend_from_slice(&data[literal_start..literal_start + literal_len]);
        }
    }

    out
}

fn packbits_decompress(data: &[u8], expected_len: usize) -> Result<ByteVec> {
    let mut out = ByteVec::with_capacity(expected_len);
    let mut index = 0;

    while index < data.len() && out.len() < expected_len {
        let count = data[index] as i8 as i32;
        index += 1;

        if count < 0 {
            let literal_len = (-(count + 1)) as usize;
            if index + literal_len > data.len() {
                return Err(Error::format("rle8 stream ends mid-literal-run"));
            }
            out.extend_from_slice(&data[index..index + literal_len]);
            index += literal_len;
        } else {
            if index >= data.len() {
                return Err(Error::format("rle8 stream ends mid-repeat-run"));
            }
            out.resize(out.len() + count as usize + 1, data[index]);
            index += 1;
        }
    }

    Ok(out)
}

pub fn compress(uncompressed: Bytes<'_>, context: LayerContext) -> Result<ByteVec> {
    let planed = separate_by_byte_plane(uncompressed, stride_for(context));
    Ok(packbits_compress(&planed))
}

pub fn decompress(compressed: Bytes<'_>, expected_len: usize, context: LayerContext) -> Result<ByteVec> {
    let planed = packbits_decompress(compressed, expected_len)?;
    Ok(interleave_by_byte_plane(&planed, stride_for(context)))
}
