//! High-throughput block coder (Part-15 substitution for the MQ-based
//! tier-1).
//!
//! The block is processed as 2x2 quads in raster order: MEL codes quad
//! significance, VLC codes the significance pattern of each significant
//! quad, and the MagSgn stream carries sign/magnitude for every
//! significant sample. Everything lands in one cleanup pass, so the
//! tier-2 interface (zero bit-planes, passes with lengths and slopes,
//! byte stream) is unchanged from the legacy coder.
//!
//! The codeword segment is laid out as a 2-byte big-endian control
//! stream length, the control stream (MEL + VLC interleaved), then the
//! MagSgn stream.

pub mod mag_sgn;
pub mod mel;
pub mod vlc;

use crate::error::J2kError;
use mag_sgn::{RawBitReader, RawBitWriter};
use mel::{MelDecoder, MelEncoder};

/// Encoded form of one HT code-block.
#[derive(Debug, Clone, Default)]
pub struct HtEncodedBlock {
    pub data: Vec<u8>,
    /// Magnitude bit-plane count (for zero-bit-plane signalling).
    pub num_bit_planes: u8,
    /// Squared-error weight of the block's coefficients, the slope input
    /// for rate control.
    pub distortion: f64,
}

/// Quad grid context: 1 when the left or upper quad is significant.
fn quad_context(qsig: &[bool], qx: usize, qy: usize, qw: usize) -> u8 {
    let left = qx > 0 && qsig[qy * qw + qx - 1];
    let above = qy > 0 && qsig[(qy - 1) * qw + qx];
    u8::from(left || above)
}

/// Sample offsets within a quad, raster order; bit i of rho covers
/// offset i.
const QUAD_OFFSETS: [(usize, usize); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// Encode one code-block with the HT cleanup coder.
pub fn encode_block(
    coeffs: &[i32],
    width: usize,
    height: usize,
    weight: f64,
) -> Result<HtEncodedBlock, J2kError> {
    if coeffs.len() != width * height {
        return Err(J2kError::data(format!(
            "code-block coefficient count {} does not match {}x{}",
            coeffs.len(),
            width,
            height
        )));
    }
    let num_bit_planes = crate::bit_plane_coder::magnitude_planes(coeffs);
    if num_bit_planes == 0 {
        return Ok(HtEncodedBlock::default());
    }

    let qw = width.div_ceil(2);
    let qh = height.div_ceil(2);
    let mut qsig = vec![false; qw * qh];

    let mut ctrl = RawBitWriter::new();
    let mut magsgn = RawBitWriter::new();
    let mut mel = MelEncoder::new();
    let mut distortion = 0.0f64;

    for qy in 0..qh {
        for qx in 0..qw {
            let mut rho = 0u8;
            for (i, &(dx, dy)) in QUAD_OFFSETS.iter().enumerate() {
                let (x, y) = (qx * 2 + dx, qy * 2 + dy);
                if x < width && y < height && coeffs[y * width + x] != 0 {
                    rho |= 1 << i;
                }
            }
            let significant = rho != 0;
            mel.encode(&mut ctrl, significant);
            if significant {
                let context = quad_context(&qsig, qx, qy, qw);
                vlc::encode_rho(&mut ctrl, rho, context);
                qsig[qy * qw + qx] = true;
                for (i, &(dx, dy)) in QUAD_OFFSETS.iter().enumerate() {
                    if rho & (1 << i) != 0 {
                        let v = coeffs[(qy * 2 + dy) * width + (qx * 2 + dx)];
                        mag_sgn::encode_value(&mut magsgn, v);
                        distortion += (v as f64) * (v as f64) * weight;
                    }
                }
            }
        }
    }
    mel.flush(&mut ctrl);

    let ctrl_bytes = ctrl.finish();
    if ctrl_bytes.len() > u16::MAX as usize {
        return Err(J2kError::data("HT control stream exceeds 65535 bytes".to_string()));
    }
    let magsgn_bytes = magsgn.finish();
    let mut data = Vec::with_capacity(2 + ctrl_bytes.len() + magsgn_bytes.len());
    data.extend_from_slice(&(ctrl_bytes.len() as u16).to_be_bytes());
    data.extend_from_slice(&ctrl_bytes);
    data.extend_from_slice(&magsgn_bytes);

    Ok(HtEncodedBlock {
        data,
        num_bit_planes,
        distortion,
    })
}

/// Decode one HT code-block segment back into coefficients.
pub fn decode_block(data: &[u8], width: usize, height: usize) -> Result<Vec<i32>, J2kError> {
    let mut coeffs = vec![0i32; width * height];
    if data.is_empty() {
        return Ok(coeffs);
    }
    if data.len() < 2 {
        return Err(J2kError::Truncated);
    }
    let ctrl_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    if data.len() < 2 + ctrl_len {
        return Err(J2kError::Truncated);
    }
    let mut ctrl = RawBitReader::new(&data[2..2 + ctrl_len]);
    let mut magsgn = RawBitReader::new(&data[2 + ctrl_len..]);
    let mut mel = MelDecoder::new();

    let qw = width.div_ceil(2);
    let qh = height.div_ceil(2);
    let mut qsig = vec![false; qw * qh];

    for qy in 0..qh {
        for qx in 0..qw {
            if !mel.decode(&mut ctrl) {
                continue;
            }
            let context = quad_context(&qsig, qx, qy, qw);
            let rho = vlc::decode_rho(&mut ctrl, context)
                .ok_or_else(|| J2kError::Corrupted("HT control stream exhausted".to_string()))?;
            qsig[qy * qw + qx] = true;
            for (i, &(dx, dy)) in QUAD_OFFSETS.iter().enumerate() {
                if rho & (1 << i) == 0 {
                    continue;
                }
                let (x, y) = (qx * 2 + dx, qy * 2 + dy);
                if x >= width || y >= height {
                    return Err(J2kError::Corrupted(
                        "HT quad pattern addresses samples outside the block".to_string(),
                    ));
                }
                let v = mag_sgn::decode_value(&mut magsgn)
                    .ok_or_else(|| J2kError::Corrupted("HT MagSgn stream exhausted".to_string()))?;
                coeffs[y * width + x] = v;
            }
        }
    }
    Ok(coeffs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(coeffs: &[i32], w: usize, h: usize) {
        let block = encode_block(coeffs, w, h, 1.0).unwrap();
        let decoded = decode_block(&block.data, w, h).unwrap();
        assert_eq!(decoded, coeffs, "{w}x{h}");
    }

    #[test]
    fn test_ht_roundtrip_patterns() {
        let n = 32 * 32;
        let dense: Vec<i32> = (0..n).map(|i| ((i as i64 * 40503) % 4096) as i32 - 2048).collect();
        let sparse: Vec<i32> = (0..n).map(|i| if i % 31 == 0 { 1999 } else { 0 }).collect();
        let zeros = vec![0i32; n];
        roundtrip(&dense, 32, 32);
        roundtrip(&sparse, 32, 32);
        roundtrip(&zeros, 32, 32);
    }

    #[test]
    fn test_ht_roundtrip_odd_dimensions() {
        let coeffs: Vec<i32> = (0..15 * 9).map(|i| (i as i32 % 7) - 3).collect();
        roundtrip(&coeffs, 15, 9);
        let coeffs: Vec<i32> = (0..3 * 5).map(|i| i as i32 - 7).collect();
        roundtrip(&coeffs, 3, 5);
    }

    #[test]
    fn test_ht_roundtrip_64x64_dense() {
        let coeffs: Vec<i32> = (0..64 * 64)
            .map(|i| ((i as i64 * 2654435761) % 8192) as i32 - 4096)
            .collect();
        roundtrip(&coeffs, 64, 64);
    }

    #[test]
    fn test_ht_zero_block_is_empty() {
        let block = encode_block(&[0; 64], 8, 8, 1.0).unwrap();
        assert!(block.data.is_empty());
        assert_eq!(block.num_bit_planes, 0);
    }

    #[test]
    fn test_ht_truncated_rejected() {
        let coeffs: Vec<i32> = (0..64).map(|i| i + 1).collect();
        let block = encode_block(&coeffs, 8, 8, 1.0).unwrap();
        let cut = &block.data[..block.data.len() / 2];
        assert!(decode_block(cut, 8, 8).is_err());
    }
}
