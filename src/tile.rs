//! Canvas, tile, resolution, subband and code-block geometry.
//!
//! Encoder and decoder both derive their grids from SIZ/COD through this
//! module, so the structures always agree. Origins are anchored at zero
//! (the writer never emits non-zero XOsiz/XTOsiz), which keeps every
//! dimension on the plain ceil-half law.

use crate::dwt::decompose::SubbandOrientation;
use crate::headers::{J2kCod, J2kSiz};

/// One code-block inside a subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlockGeom {
    /// Grid coordinates within the band.
    pub bx: usize,
    pub by: usize,
    /// Sample rectangle within the band.
    pub x0: usize,
    pub y0: usize,
    pub width: usize,
    pub height: usize,
}

/// One subband of a resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BandGeom {
    pub orientation: SubbandOrientation,
    /// Decomposition level the band belongs to (LL carries the deepest).
    pub level: u8,
    /// Index in the QCD step-size list (LL first, then HL/LH/HH per
    /// resolution from coarse to fine).
    pub band_index: usize,
    pub width: usize,
    pub height: usize,
    /// log2 nominal dynamic-range gain (LL 0, HL/LH 1, HH 2).
    pub gain: u8,
    /// Code-block grid.
    pub grid_w: usize,
    pub grid_h: usize,
    pub blocks: Vec<CodeBlockGeom>,
}

impl BandGeom {
    /// Squared synthesis-gain weight for the MSE distortion model.
    pub fn mse_weight(&self) -> f64 {
        let level_gain = 4f64.powi(self.level as i32 - 1);
        let orientation_gain = match self.orientation {
            SubbandOrientation::LL => 4.0,
            SubbandOrientation::HL | SubbandOrientation::LH => 1.0,
            SubbandOrientation::HH => 0.25,
        };
        level_gain * orientation_gain
    }
}

/// One resolution level of a tile-component (0 = LL only).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionGeom {
    pub index: u8,
    pub width: usize,
    pub height: usize,
    pub bands: Vec<BandGeom>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileComponentGeom {
    pub component: u16,
    pub width: usize,
    pub height: usize,
    pub decomposition_levels: u8,
    pub resolutions: Vec<ResolutionGeom>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileGeom {
    pub index: u32,
    /// Canvas rectangle.
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    pub components: Vec<TileComponentGeom>,
}

/// Successive ceil-half dimensions `w_0..=w_levels`.
fn level_dims(mut w: usize, mut h: usize, levels: u8) -> Vec<(usize, usize)> {
    let mut dims = vec![(w, h)];
    for _ in 0..levels {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        dims.push((w, h));
    }
    dims
}

fn build_blocks(width: usize, height: usize, cb_w: usize, cb_h: usize) -> (usize, usize, Vec<CodeBlockGeom>) {
    if width == 0 || height == 0 {
        return (0, 0, Vec::new());
    }
    let grid_w = width.div_ceil(cb_w);
    let grid_h = height.div_ceil(cb_h);
    let mut blocks = Vec::with_capacity(grid_w * grid_h);
    for by in 0..grid_h {
        for bx in 0..grid_w {
            let x0 = bx * cb_w;
            let y0 = by * cb_h;
            blocks.push(CodeBlockGeom {
                bx,
                by,
                x0,
                y0,
                width: cb_w.min(width - x0),
                height: cb_h.min(height - y0),
            });
        }
    }
    (grid_w, grid_h, blocks)
}

/// QCD step-size list index for a band.
pub fn band_index(resolution: u8, orientation: SubbandOrientation) -> usize {
    if resolution == 0 {
        0
    } else {
        let o = match orientation {
            SubbandOrientation::HL => 0,
            SubbandOrientation::LH => 1,
            SubbandOrientation::HH => 2,
            SubbandOrientation::LL => 0,
        };
        3 * (resolution as usize - 1) + 1 + o
    }
}

/// Number of signalled subbands for a decomposition depth.
pub fn band_count(levels: u8) -> usize {
    1 + 3 * levels as usize
}

/// Build the full geometry of one tile-component.
pub fn build_tile_component(
    component: u16,
    tc_width: usize,
    tc_height: usize,
    cod: &J2kCod,
) -> TileComponentGeom {
    let levels = cod.decomposition_levels;
    let cb_w = cod.code_block_width() as usize;
    let cb_h = cod.code_block_height() as usize;
    let dims = level_dims(tc_width, tc_height, levels);

    let mut resolutions = Vec::with_capacity(levels as usize + 1);
    for r in 0..=levels {
        let (res_w, res_h) = dims[(levels - r) as usize];
        let mut bands = Vec::new();
        if r == 0 {
            let (w, h) = dims[levels as usize];
            let (grid_w, grid_h, blocks) = build_blocks(w, h, cb_w, cb_h);
            bands.push(BandGeom {
                orientation: SubbandOrientation::LL,
                level: levels.max(1),
                band_index: 0,
                width: w,
                height: h,
                gain: 0,
                grid_w,
                grid_h,
                blocks,
            });
        } else {
            let level = levels - r + 1;
            let (in_w, in_h) = dims[(level - 1) as usize];
            let (low_w, low_h) = dims[level as usize];
            let (high_w, high_h) = (in_w - low_w, in_h - low_h);
            for orientation in [
                SubbandOrientation::HL,
                SubbandOrientation::LH,
                SubbandOrientation::HH,
            ] {
                let (w, h, gain) = match orientation {
                    SubbandOrientation::HL => (high_w, low_h, 1),
                    SubbandOrientation::LH => (low_w, high_h, 1),
                    SubbandOrientation::HH => (high_w, high_h, 2),
                    SubbandOrientation::LL => unreachable!(),
                };
                let (grid_w, grid_h, blocks) = build_blocks(w, h, cb_w, cb_h);
                bands.push(BandGeom {
                    orientation,
                    level,
                    band_index: band_index(r, orientation),
                    width: w,
                    height: h,
                    gain,
                    grid_w,
                    grid_h,
                    blocks,
                });
            }
        }
        resolutions.push(ResolutionGeom {
            index: r,
            width: res_w,
            height: res_h,
            bands,
        });
    }

    TileComponentGeom {
        component,
        width: tc_width,
        height: tc_height,
        decomposition_levels: levels,
        resolutions,
    }
}

/// Build the geometry of one tile. `cods` supplies the effective coding
/// style per component (COD or COC override).
pub fn build_tile(siz: &J2kSiz, cods: &[J2kCod], tile_index: u32) -> TileGeom {
    let tiles_across = siz.tiles_across();
    let tx = tile_index % tiles_across;
    let ty = tile_index / tiles_across;
    let x0 = tx * siz.tile_width;
    let y0 = ty * siz.tile_height;
    let x1 = (x0 + siz.tile_width).min(siz.width);
    let y1 = (y0 + siz.tile_height).min(siz.height);

    let mut components = Vec::with_capacity(siz.components.len());
    for (c, info) in siz.components.iter().enumerate() {
        let sx = info.sub_x as u32;
        let sy = info.sub_y as u32;
        let tc_x0 = x0.div_ceil(sx);
        let tc_x1 = x1.div_ceil(sx);
        let tc_y0 = y0.div_ceil(sy);
        let tc_y1 = y1.div_ceil(sy);
        components.push(build_tile_component(
            c as u16,
            (tc_x1 - tc_x0) as usize,
            (tc_y1 - tc_y0) as usize,
            &cods[c],
        ));
    }

    TileGeom {
        index: tile_index,
        x0,
        y0,
        width: x1 - x0,
        height: y1 - y0,
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::J2kComponentInfo;

    fn siz_single(width: u32, height: u32) -> J2kSiz {
        J2kSiz {
            width,
            height,
            tile_width: width,
            tile_height: height,
            components: vec![J2kComponentInfo {
                depth: 8,
                signed: false,
                sub_x: 1,
                sub_y: 1,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_band_dims_follow_ceil_half_law() {
        let cod = J2kCod {
            decomposition_levels: 3,
            ..Default::default()
        };
        let tc = build_tile_component(0, 23, 17, &cod);
        assert_eq!(tc.resolutions.len(), 4);
        // Level dims: (23,17) -> (12,9) -> (6,5) -> (3,3).
        let r3 = &tc.resolutions[3]; // finest detail, level 1
        assert_eq!(r3.bands[0].orientation, SubbandOrientation::HL);
        assert_eq!((r3.bands[0].width, r3.bands[0].height), (11, 9));
        assert_eq!((r3.bands[1].width, r3.bands[1].height), (12, 8));
        assert_eq!((r3.bands[2].width, r3.bands[2].height), (11, 8));
        let r0 = &tc.resolutions[0];
        assert_eq!((r0.bands[0].width, r0.bands[0].height), (3, 3));
        assert_eq!(r0.bands[0].orientation, SubbandOrientation::LL);
        // Resolution canvas sizes.
        assert_eq!((tc.resolutions[3].width, tc.resolutions[3].height), (23, 17));
        assert_eq!((tc.resolutions[0].width, tc.resolutions[0].height), (3, 3));
    }

    #[test]
    fn test_band_indices() {
        assert_eq!(band_index(0, SubbandOrientation::LL), 0);
        assert_eq!(band_index(1, SubbandOrientation::HL), 1);
        assert_eq!(band_index(1, SubbandOrientation::HH), 3);
        assert_eq!(band_index(2, SubbandOrientation::LH), 5);
        assert_eq!(band_count(5), 16);
    }

    #[test]
    fn test_code_block_partition_edges() {
        let (grid_w, grid_h, blocks) = build_blocks(100, 40, 64, 64);
        assert_eq!((grid_w, grid_h), (2, 1));
        assert_eq!(blocks[0].width, 64);
        assert_eq!(blocks[1].width, 36);
        assert_eq!(blocks[1].height, 40);
        let (gw, gh, blocks) = build_blocks(0, 40, 64, 64);
        assert_eq!((gw, gh), (0, 0));
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_tile_grid_edge_tiles() {
        let mut siz = siz_single(100, 70);
        siz.tile_width = 64;
        siz.tile_height = 64;
        let cods = vec![J2kCod::default()];
        let t0 = build_tile(&siz, &cods, 0);
        assert_eq!((t0.width, t0.height), (64, 64));
        let t1 = build_tile(&siz, &cods, 1);
        assert_eq!((t1.width, t1.height), (36, 64));
        let t3 = build_tile(&siz, &cods, 3);
        assert_eq!((t3.x0, t3.y0), (64, 64));
        assert_eq!((t3.width, t3.height), (36, 6));
    }

    #[test]
    fn test_subsampled_component_dims() {
        let mut siz = siz_single(101, 51);
        siz.components.push(J2kComponentInfo {
            depth: 8,
            signed: false,
            sub_x: 2,
            sub_y: 2,
        });
        let cods = vec![J2kCod::default(), J2kCod::default()];
        let tile = build_tile(&siz, &cods, 0);
        assert_eq!(tile.components[0].width, 101);
        assert_eq!(tile.components[1].width, 51);
        assert_eq!(tile.components[1].height, 26);
    }
}
