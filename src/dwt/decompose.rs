//! Multi-level decomposition.
//!
//! Three structures are supported: the dyadic Mallat tree (default), a
//! wavelet-packet tree driven by per-level band masks, and an arbitrary
//! anisotropic form with independent horizontal and vertical level
//! counts. Every split obeys the ceil-half dimension law; degenerate
//! one-sample axes pass through as lowpass so deep decompositions of
//! small tiles stay well-defined.

use super::kernel::{self, WaveletKernel};
use super::{BoundaryExtension, Dwt53, Dwt97};
use crate::error::J2kError;

/// Subband orientation within a decomposition level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubbandOrientation {
    #[default]
    LL,
    HL,
    LH,
    HH,
}

/// Band selection bits for wavelet-packet masks.
pub const PACKET_LL: u8 = 1;
pub const PACKET_HL: u8 = 2;
pub const PACKET_LH: u8 = 4;
pub const PACKET_HH: u8 = 8;

/// How the multi-level tree is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecompositionStructure {
    /// Classic Mallat tree: recurse on LL only.
    Dyadic { levels: u8 },
    /// Per-level bitmask selecting which of LL/HL/LH/HH is decomposed
    /// further. A zero mask (or one without the LL bit) is illegal.
    Packet { masks: Vec<u8> },
    /// Independent horizontal and vertical split counts; the level count
    /// is the maximum of the two.
    Anisotropic { horizontal: u8, vertical: u8 },
}

impl DecompositionStructure {
    pub fn level_count(&self) -> u8 {
        match self {
            Self::Dyadic { levels } => *levels,
            Self::Packet { masks } => masks.len() as u8,
            Self::Anisotropic {
                horizontal,
                vertical,
            } => (*horizontal).max(*vertical),
        }
    }

    pub fn validate(&self) -> Result<(), J2kError> {
        if let Self::Packet { masks } = self {
            for (i, &mask) in masks.iter().enumerate() {
                if mask & PACKET_LL == 0 {
                    return Err(J2kError::parameter(format!(
                        "wavelet-packet mask at level {i} must include the LL band"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One band with explicit dimensions (empty axes occur at degenerate
/// sizes and in anisotropic levels).
#[derive(Debug, Clone, PartialEq)]
pub struct BandData<T> {
    pub width: usize,
    pub height: usize,
    pub data: Vec<T>,
}

impl<T> BandData<T> {
    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }
}

/// Detail bands produced by one split, finest level first.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionLevel<T> {
    pub hl: BandData<T>,
    pub lh: BandData<T>,
    pub hh: BandData<T>,
}

/// A completed multi-level decomposition: ordered detail levels plus the
/// coarsest LL approximation.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition<T> {
    pub width: usize,
    pub height: usize,
    pub levels: Vec<DecompositionLevel<T>>,
    pub ll: BandData<T>,
}

#[derive(Clone, Copy, PartialEq)]
enum SplitMode {
    Both,
    RowsOnly,
    ColsOnly,
}

type RowTransform<'a, T> = &'a dyn Fn(&[T]) -> Result<(Vec<T>, Vec<T>), J2kError>;
type RowInverse<'a, T> = &'a dyn Fn(&[T], &[T]) -> Result<Vec<T>, J2kError>;

struct SplitOut<T> {
    ll: BandData<T>,
    hl: BandData<T>,
    lh: BandData<T>,
    hh: BandData<T>,
}

fn split_once<T: Copy + Default>(
    data: &[T],
    w: usize,
    h: usize,
    mode: SplitMode,
    forward: RowTransform<T>,
) -> Result<SplitOut<T>, J2kError> {
    let mode = match mode {
        SplitMode::Both if w < 2 && h < 2 => {
            // Single sample: identity lowpass.
            return Ok(SplitOut {
                ll: BandData {
                    width: w,
                    height: h,
                    data: data.to_vec(),
                },
                hl: BandData::empty(),
                lh: BandData::empty(),
                hh: BandData::empty(),
            });
        }
        SplitMode::Both if w < 2 => SplitMode::ColsOnly,
        SplitMode::Both if h < 2 => SplitMode::RowsOnly,
        m => m,
    };

    match mode {
        SplitMode::RowsOnly => {
            if w < 2 {
                return Ok(SplitOut {
                    ll: BandData {
                        width: w,
                        height: h,
                        data: data.to_vec(),
                    },
                    hl: BandData::empty(),
                    lh: BandData::empty(),
                    hh: BandData::empty(),
                });
            }
            let lw = w.div_ceil(2);
            let hw = w / 2;
            let mut ll = vec![T::default(); lw * h];
            let mut hl = vec![T::default(); hw * h];
            for y in 0..h {
                let (l, hi) = forward(&data[y * w..(y + 1) * w])?;
                ll[y * lw..(y + 1) * lw].copy_from_slice(&l);
                hl[y * hw..(y + 1) * hw].copy_from_slice(&hi);
            }
            Ok(SplitOut {
                ll: BandData {
                    width: lw,
                    height: h,
                    data: ll,
                },
                hl: BandData {
                    width: hw,
                    height: h,
                    data: hl,
                },
                lh: BandData::empty(),
                hh: BandData::empty(),
            })
        }
        SplitMode::ColsOnly => {
            if h < 2 {
                return Ok(SplitOut {
                    ll: BandData {
                        width: w,
                        height: h,
                        data: data.to_vec(),
                    },
                    hl: BandData::empty(),
                    lh: BandData::empty(),
                    hh: BandData::empty(),
                });
            }
            let lh_n = h.div_ceil(2);
            let hh_n = h / 2;
            let mut ll = vec![T::default(); w * lh_n];
            let mut lh = vec![T::default(); w * hh_n];
            let mut column = vec![T::default(); h];
            for x in 0..w {
                for y in 0..h {
                    column[y] = data[y * w + x];
                }
                let (l, hi) = forward(&column)?;
                for (y, &v) in l.iter().enumerate() {
                    ll[y * w + x] = v;
                }
                for (y, &v) in hi.iter().enumerate() {
                    lh[y * w + x] = v;
                }
            }
            Ok(SplitOut {
                ll: BandData {
                    width: w,
                    height: lh_n,
                    data: ll,
                },
                hl: BandData::empty(),
                lh: BandData {
                    width: w,
                    height: hh_n,
                    data: lh,
                },
                hh: BandData::empty(),
            })
        }
        SplitMode::Both => {
            let bands = super::forward_2d_impl(data, w, h, |row| forward(row))?;
            let (lw, hw, lh_n, hh_n) = (
                bands.low_width(),
                bands.high_width(),
                bands.low_height(),
                bands.high_height(),
            );
            Ok(SplitOut {
                ll: BandData {
                    width: lw,
                    height: lh_n,
                    data: bands.ll,
                },
                hl: BandData {
                    width: hw,
                    height: lh_n,
                    data: bands.hl,
                },
                lh: BandData {
                    width: lw,
                    height: hh_n,
                    data: bands.lh,
                },
                hh: BandData {
                    width: hw,
                    height: hh_n,
                    data: bands.hh,
                },
            })
        }
    }
}

fn merge_once<T: Copy + Default>(
    ll: &BandData<T>,
    hl: &BandData<T>,
    lh: &BandData<T>,
    hh: &BandData<T>,
    inverse: RowInverse<T>,
) -> Result<BandData<T>, J2kError> {
    let horizontal = hl.width > 0;
    let vertical = lh.height > 0;
    if !horizontal && !vertical {
        return Ok(ll.clone());
    }
    if horizontal && !vertical {
        let w = ll.width + hl.width;
        let h = ll.height;
        let mut out = vec![T::default(); w * h];
        for y in 0..h {
            let row = inverse(
                &ll.data[y * ll.width..(y + 1) * ll.width],
                &hl.data[y * hl.width..(y + 1) * hl.width],
            )?;
            out[y * w..(y + 1) * w].copy_from_slice(&row);
        }
        return Ok(BandData {
            width: w,
            height: h,
            data: out,
        });
    }
    if !horizontal && vertical {
        let w = ll.width;
        let h = ll.height + lh.height;
        let mut out = vec![T::default(); w * h];
        let mut low_col = vec![T::default(); ll.height];
        let mut high_col = vec![T::default(); lh.height];
        for x in 0..w {
            for y in 0..ll.height {
                low_col[y] = ll.data[y * w + x];
            }
            for y in 0..lh.height {
                high_col[y] = lh.data[y * w + x];
            }
            let col = inverse(&low_col, &high_col)?;
            for (y, &v) in col.iter().enumerate() {
                out[y * w + x] = v;
            }
        }
        return Ok(BandData {
            width: w,
            height: h,
            data: out,
        });
    }
    let bands = super::Subbands2d {
        width: ll.width + hl.width,
        height: ll.height + lh.height,
        ll: ll.data.clone(),
        hl: hl.data.clone(),
        lh: lh.data.clone(),
        hh: hh.data.clone(),
    };
    let data = super::inverse_2d_impl(&bands, |l, h| inverse(l, h))?;
    Ok(BandData {
        width: bands.width,
        height: bands.height,
        data,
    })
}

fn split_mode_for_level(structure: &DecompositionStructure, level: u8) -> SplitMode {
    match structure {
        DecompositionStructure::Anisotropic {
            horizontal,
            vertical,
        } => {
            let h_active = level < *horizontal;
            let v_active = level < *vertical;
            match (h_active, v_active) {
                (true, true) => SplitMode::Both,
                (true, false) => SplitMode::RowsOnly,
                (false, true) => SplitMode::ColsOnly,
                (false, false) => SplitMode::Both,
            }
        }
        _ => SplitMode::Both,
    }
}

fn forward_multi<T: Copy + Default>(
    data: &[T],
    width: usize,
    height: usize,
    structure: &DecompositionStructure,
    forward: RowTransform<T>,
) -> Result<Decomposition<T>, J2kError> {
    structure.validate()?;
    if data.len() != width * height {
        return Err(J2kError::data(format!(
            "expected {} samples, got {}",
            width * height,
            data.len()
        )));
    }
    let mut current = BandData {
        width,
        height,
        data: data.to_vec(),
    };
    let mut levels = Vec::new();
    for level in 0..structure.level_count() {
        let mode = split_mode_for_level(structure, level);
        let split = split_once(&current.data, current.width, current.height, mode, forward)?;
        levels.push(DecompositionLevel {
            hl: split.hl,
            lh: split.lh,
            hh: split.hh,
        });
        current = split.ll;
    }
    Ok(Decomposition {
        width,
        height,
        levels,
        ll: current,
    })
}

fn inverse_multi<T: Copy + Default>(
    decomposition: &Decomposition<T>,
    inverse: RowInverse<T>,
) -> Result<Vec<T>, J2kError> {
    let mut current = decomposition.ll.clone();
    for level in decomposition.levels.iter().rev() {
        current = merge_once(&current, &level.hl, &level.lh, &level.hh, inverse)?;
    }
    if current.width != decomposition.width || current.height != decomposition.height {
        return Err(J2kError::data(format!(
            "reconstruction is {}x{}, expected {}x{}",
            current.width, current.height, decomposition.width, decomposition.height
        )));
    }
    Ok(current.data)
}

/// Forward multi-level transform on the reversible integer path.
pub fn forward_i32(
    kernel_sel: &WaveletKernel,
    data: &[i32],
    width: usize,
    height: usize,
    structure: &DecompositionStructure,
    policy: BoundaryExtension,
) -> Result<Decomposition<i32>, J2kError> {
    let forward = |row: &[i32]| match kernel_sel {
        WaveletKernel::Reversible53 => Dwt53::forward(row, policy),
        _ => kernel::forward_i32(kernel_sel, row, policy),
    };
    forward_multi(data, width, height, structure, &forward)
}

/// Inverse of [`forward_i32`].
pub fn inverse_i32(
    kernel_sel: &WaveletKernel,
    decomposition: &Decomposition<i32>,
    policy: BoundaryExtension,
) -> Result<Vec<i32>, J2kError> {
    let inverse = |l: &[i32], h: &[i32]| match kernel_sel {
        WaveletKernel::Reversible53 => Dwt53::inverse(l, h, policy),
        _ => kernel::inverse_i32(kernel_sel, l, h, policy),
    };
    inverse_multi(decomposition, &inverse)
}

/// Forward multi-level transform on the floating path.
pub fn forward_f32(
    kernel_sel: &WaveletKernel,
    data: &[f32],
    width: usize,
    height: usize,
    structure: &DecompositionStructure,
    policy: BoundaryExtension,
) -> Result<Decomposition<f32>, J2kError> {
    let forward = |row: &[f32]| match kernel_sel {
        WaveletKernel::Irreversible97 => Dwt97::forward(row, policy),
        _ => kernel::forward_f32(kernel_sel, row, policy),
    };
    forward_multi(data, width, height, structure, &forward)
}

/// Inverse of [`forward_f32`].
pub fn inverse_f32(
    kernel_sel: &WaveletKernel,
    decomposition: &Decomposition<f32>,
    policy: BoundaryExtension,
) -> Result<Vec<f32>, J2kError> {
    let inverse = |l: &[f32], h: &[f32]| match kernel_sel {
        WaveletKernel::Irreversible97 => Dwt97::inverse(l, h, policy),
        _ => kernel::inverse_f32(kernel_sel, l, h, policy),
    };
    inverse_multi(decomposition, &inverse)
}

/// Wavelet-packet tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketTree<T> {
    Leaf(BandData<T>),
    Split {
        width: usize,
        height: usize,
        ll: Box<PacketTree<T>>,
        hl: Box<PacketTree<T>>,
        lh: Box<PacketTree<T>>,
        hh: Box<PacketTree<T>>,
    },
}

fn forward_packet<T: Copy + Default>(
    band: BandData<T>,
    masks: &[u8],
    came_from: SubbandOrientation,
    forward: RowTransform<T>,
) -> Result<PacketTree<T>, J2kError> {
    let Some((&mask, rest)) = masks.split_first() else {
        return Ok(PacketTree::Leaf(band));
    };
    let selected = match came_from {
        SubbandOrientation::LL => mask & PACKET_LL != 0,
        SubbandOrientation::HL => mask & PACKET_HL != 0,
        SubbandOrientation::LH => mask & PACKET_LH != 0,
        SubbandOrientation::HH => mask & PACKET_HH != 0,
    };
    if !selected || band.data.is_empty() {
        return Ok(PacketTree::Leaf(band));
    }
    let split = split_once(&band.data, band.width, band.height, SplitMode::Both, forward)?;
    Ok(PacketTree::Split {
        width: band.width,
        height: band.height,
        ll: Box::new(forward_packet(split.ll, rest, SubbandOrientation::LL, forward)?),
        hl: Box::new(forward_packet(split.hl, rest, SubbandOrientation::HL, forward)?),
        lh: Box::new(forward_packet(split.lh, rest, SubbandOrientation::LH, forward)?),
        hh: Box::new(forward_packet(split.hh, rest, SubbandOrientation::HH, forward)?),
    })
}

fn inverse_packet<T: Copy + Default>(
    tree: &PacketTree<T>,
    inverse: RowInverse<T>,
) -> Result<BandData<T>, J2kError> {
    match tree {
        PacketTree::Leaf(band) => Ok(band.clone()),
        PacketTree::Split { ll, hl, lh, hh, .. } => {
            let ll = inverse_packet(ll, inverse)?;
            let hl = inverse_packet(hl, inverse)?;
            let lh = inverse_packet(lh, inverse)?;
            let hh = inverse_packet(hh, inverse)?;
            merge_once(&ll, &hl, &lh, &hh, inverse)
        }
    }
}

/// Forward wavelet-packet transform on the integer path. The root is
/// always decomposed; `masks[i]` selects which children of level `i`
/// split further.
pub fn forward_packet_i32(
    kernel_sel: &WaveletKernel,
    data: &[i32],
    width: usize,
    height: usize,
    masks: &[u8],
    policy: BoundaryExtension,
) -> Result<PacketTree<i32>, J2kError> {
    DecompositionStructure::Packet {
        masks: masks.to_vec(),
    }
    .validate()?;
    if masks.is_empty() {
        return Err(J2kError::parameter("wavelet-packet masks must be non-empty"));
    }
    let forward = |row: &[i32]| match kernel_sel {
        WaveletKernel::Reversible53 => Dwt53::forward(row, policy),
        _ => kernel::forward_i32(kernel_sel, row, policy),
    };
    forward_packet(
        BandData {
            width,
            height,
            data: data.to_vec(),
        },
        masks,
        SubbandOrientation::LL,
        &forward,
    )
}

/// Inverse of [`forward_packet_i32`].
pub fn inverse_packet_i32(
    kernel_sel: &WaveletKernel,
    tree: &PacketTree<i32>,
    policy: BoundaryExtension,
) -> Result<Vec<i32>, J2kError> {
    let inverse = |l: &[i32], h: &[i32]| match kernel_sel {
        WaveletKernel::Reversible53 => Dwt53::inverse(l, h, policy),
        _ => kernel::inverse_i32(kernel_sel, l, h, policy),
    };
    Ok(inverse_packet(tree, &inverse)?.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize) -> Vec<i32> {
        (0..w * h).map(|i| (i as i32 * 17 % 255) - 120).collect()
    }

    #[test]
    fn test_dyadic_roundtrip_and_dims() {
        let (w, h) = (23usize, 17usize);
        let data = ramp(w, h);
        let structure = DecompositionStructure::Dyadic { levels: 3 };
        let dec = forward_i32(
            &WaveletKernel::Reversible53,
            &data,
            w,
            h,
            &structure,
            BoundaryExtension::default(),
        )
        .unwrap();
        assert_eq!(dec.levels.len(), 3);
        // Level dims follow the ceil-half law and never grow.
        let (mut cw, mut ch) = (w, h);
        for level in &dec.levels {
            let (lw, hw) = (cw.div_ceil(2), cw / 2);
            let (lh, hh) = (ch.div_ceil(2), ch / 2);
            assert_eq!((level.hl.width, level.hl.height), (hw, lh));
            assert_eq!((level.lh.width, level.lh.height), (lw, hh));
            assert_eq!((level.hh.width, level.hh.height), (hw, hh));
            cw = lw;
            ch = lh;
        }
        assert_eq!((dec.ll.width, dec.ll.height), (cw, ch));
        let rec = inverse_i32(
            &WaveletKernel::Reversible53,
            &dec,
            BoundaryExtension::default(),
        )
        .unwrap();
        assert_eq!(rec, data);
    }

    #[test]
    fn test_dyadic_deep_levels_on_small_input() {
        // 8 levels on a 5x3 input degenerates to 1x1 without failing.
        let (w, h) = (5usize, 3usize);
        let data = ramp(w, h);
        let structure = DecompositionStructure::Dyadic { levels: 8 };
        let dec = forward_i32(
            &WaveletKernel::Reversible53,
            &data,
            w,
            h,
            &structure,
            BoundaryExtension::default(),
        )
        .unwrap();
        assert_eq!((dec.ll.width, dec.ll.height), (1, 1));
        let rec = inverse_i32(
            &WaveletKernel::Reversible53,
            &dec,
            BoundaryExtension::default(),
        )
        .unwrap();
        assert_eq!(rec, data);
    }

    #[test]
    fn test_anisotropic_roundtrip() {
        let (w, h) = (16usize, 16usize);
        let data = ramp(w, h);
        let structure = DecompositionStructure::Anisotropic {
            horizontal: 3,
            vertical: 1,
        };
        assert_eq!(structure.level_count(), 3);
        let dec = forward_i32(
            &WaveletKernel::Reversible53,
            &data,
            w,
            h,
            &structure,
            BoundaryExtension::default(),
        )
        .unwrap();
        // Levels beyond the vertical count split horizontally only.
        assert_eq!(dec.levels[1].lh.height, 0);
        assert_eq!(dec.levels[2].lh.height, 0);
        assert_eq!(dec.levels[0].lh.height, 8);
        let rec = inverse_i32(
            &WaveletKernel::Reversible53,
            &dec,
            BoundaryExtension::default(),
        )
        .unwrap();
        assert_eq!(rec, data);
    }

    #[test]
    fn test_packet_mask_validation() {
        let bad = DecompositionStructure::Packet { masks: vec![0] };
        assert!(bad.validate().is_err());
        let no_ll = DecompositionStructure::Packet {
            masks: vec![PACKET_HL],
        };
        assert!(no_ll.validate().is_err());
    }

    #[test]
    fn test_packet_roundtrip() {
        let (w, h) = (16usize, 16usize);
        let data = ramp(w, h);
        // masks[d] selects which depth-d bands split further; the LL bit
        // is mandatory so an approximation chain always exists.
        let masks = [PACKET_LL, PACKET_LL | PACKET_HH];
        let tree = forward_packet_i32(
            &WaveletKernel::Reversible53,
            &data,
            w,
            h,
            &masks,
            BoundaryExtension::default(),
        )
        .unwrap();
        // Root splits, HH child splits at level 1, HL/LH stay leaves.
        match &tree {
            PacketTree::Split { hl, hh, .. } => {
                assert!(matches!(**hl, PacketTree::Leaf(_)));
                assert!(matches!(**hh, PacketTree::Split { .. }));
            }
            PacketTree::Leaf(_) => panic!("root must split"),
        }
        let rec = inverse_packet_i32(
            &WaveletKernel::Reversible53,
            &tree,
            BoundaryExtension::default(),
        )
        .unwrap();
        assert_eq!(rec, data);
    }

    #[test]
    fn test_float_dyadic_roundtrip() {
        let (w, h) = (12usize, 10usize);
        let data: Vec<f32> = (0..w * h).map(|i| (i % 200) as f32 - 100.0).collect();
        let structure = DecompositionStructure::Dyadic { levels: 2 };
        let dec = forward_f32(
            &WaveletKernel::Irreversible97,
            &data,
            w,
            h,
            &structure,
            BoundaryExtension::default(),
        )
        .unwrap();
        let rec = inverse_f32(
            &WaveletKernel::Irreversible97,
            &dec,
            BoundaryExtension::default(),
        )
        .unwrap();
        for (a, b) in rec.iter().zip(data.iter()) {
            assert!((a - b).abs() < 1e-2);
        }
    }
}
