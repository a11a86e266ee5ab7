//! Decode pipeline and partial-decode driver.
//!
//! Tile-part bodies are located through Psot, concatenated per tile and
//! parsed packet by packet in the declared progression order (honouring
//! POC). Recovered codeword segments feed the tier-1 decoder per
//! code-block; bands are dequantized, ROI scaling undone, the wavelet
//! pyramid inverted to the requested resolution, component transforms
//! reversed, and samples level-shifted back into component range.

use crate::bit_plane_coder;
use crate::concurrency::{parallel_map, CancellationToken};
use crate::config::{DecodeOptions, ProgressCallback, ProgressStage};
use crate::dwt::decompose::{self, BandData, Decomposition, SubbandOrientation};
use crate::dwt::kernel::WaveletKernel;
use crate::dwt::BoundaryExtension;
use crate::encoder::band_range_bits;
use crate::error::J2kError;
use crate::headers::J2kMainHeader;
use crate::ht_block_coder;
use crate::image::{Image, ImageComponent, Region};
use crate::marker::J2kMarkerCode;
use crate::mct;
use crate::packet::{self, PrecinctState};
use crate::parser::J2kParser;
use crate::progression::{packet_sequence_with_poc, PacketSpace};
use crate::quantization;
use crate::roi::{self, RoiDecodeStrategy};
use crate::tile::{self, TileGeom};

/// Codeword data recovered for one code-block.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoredBlock {
    pub included: bool,
    pub zero_bit_planes: u8,
    /// One terminated segment per coding pass (the HT coder has a single
    /// pass).
    pub segments: Vec<Vec<u8>>,
}

/// `store[comp][resolution][band][block]`.
pub(crate) type TileStore = Vec<Vec<Vec<Vec<StoredBlock>>>>;

fn empty_store(geom: &TileGeom) -> TileStore {
    geom.components
        .iter()
        .map(|cg| {
            cg.resolutions
                .iter()
                .map(|res| {
                    res.bands
                        .iter()
                        .map(|band| vec![StoredBlock::default(); band.blocks.len()])
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Parse every packet of a tile out of its concatenated tile-part body.
/// Contributions above `max_layer` are parsed (the packet stream cannot
/// be skipped) but not stored; with `early_stop` the loop ends once all
/// wanted packets are in.
pub(crate) fn read_tile_packets(
    header: &J2kMainHeader,
    geom: &TileGeom,
    body: &[u8],
    max_layer: Option<u16>,
    early_stop: bool,
) -> Result<TileStore, J2kError> {
    let cod = header.cod()?;
    let mut store = empty_store(geom);
    let mut states: Vec<Vec<PrecinctState>> = geom
        .components
        .iter()
        .map(|cg| cg.resolutions.iter().map(PrecinctState::new).collect())
        .collect();

    let precincts: Vec<Vec<usize>> = geom
        .components
        .iter()
        .map(|cg| vec![1; cg.resolutions.len()])
        .collect();
    let space = PacketSpace {
        layers: cod.layers,
        precincts: &precincts,
    };
    let sequence = packet_sequence_with_poc(cod.progression_order, &space, &header.poc);
    let wanted_total = sequence
        .iter()
        .filter(|p| max_layer.is_none_or(|m| p.layer <= m))
        .count();
    let mut wanted_done = 0usize;

    let mut cursor = 0usize;
    for packet_id in sequence {
        if cursor >= body.len() {
            // A truncated tile ends cleanly at a packet boundary.
            break;
        }
        let c = packet_id.component as usize;
        let r = packet_id.resolution as usize;
        let res = &geom.components[c].resolutions[r];
        let parsed = packet::read_packet_header(
            &mut states[c][r],
            res,
            packet_id.layer,
            &body[cursor..],
        )?;
        cursor += parsed.header_len;
        let wanted = max_layer.is_none_or(|m| packet_id.layer <= m);
        for info in &parsed.blocks {
            let total: usize = info.segment_lengths.iter().map(|&l| l as usize).sum();
            if cursor + total > body.len() {
                return Err(J2kError::Truncated);
            }
            let slot = &mut store[c][r][info.band][info.block];
            if info.first_inclusion {
                slot.zero_bit_planes = info.zero_bit_planes;
            }
            for &len in &info.segment_lengths {
                let segment = body[cursor..cursor + len as usize].to_vec();
                cursor += len as usize;
                if wanted {
                    slot.included = true;
                    slot.segments.push(segment);
                }
            }
        }
        if wanted {
            wanted_done += 1;
            if early_stop && wanted_done == wanted_total {
                break;
            }
        }
    }
    Ok(store)
}

/// Region mapped into band coordinates with filter-support margin.
fn band_region(region: &Region, level: u8, margin: usize) -> (usize, usize, usize, usize) {
    let scale = 1usize << level;
    let x0 = (region.x as usize / scale).saturating_sub(margin);
    let y0 = (region.y as usize / scale).saturating_sub(margin);
    let x1 = (region.right() as usize).div_ceil(scale) + margin;
    let y1 = (region.bottom() as usize).div_ceil(scale) + margin;
    (x0, y0, x1, y1)
}

fn block_intersects_region(
    block: &tile::CodeBlockGeom,
    band_level: u8,
    region: Option<&Region>,
) -> bool {
    let Some(region) = region else {
        return true;
    };
    // Margin covers the cumulative synthesis filter support across
    // levels for both built-in kernels.
    let (x0, y0, x1, y1) = band_region(region, band_level, 6);
    block.x0 < x1 && x0 < block.x0 + block.width && block.y0 < y1 && y0 < block.y0 + block.height
}

struct TileDecodeOutput {
    /// Reconstructed tile-component planes at the decoded resolution.
    samples: Vec<Vec<i32>>,
    widths: Vec<usize>,
    heights: Vec<usize>,
}

#[allow(clippy::too_many_arguments)]
fn decode_tile(
    header: &J2kMainHeader,
    geom: &TileGeom,
    store: &TileStore,
    max_resolution: u8,
    region: Option<&Region>,
    strategy: RoiDecodeStrategy,
    workers: usize,
    token: &CancellationToken,
) -> Result<TileDecodeOutput, J2kError> {
    let cod = header.cod()?;
    let reversible = cod.transform == 1;
    let use_ht = header.is_htj2k() || cod.uses_ht();
    let max_depth = header
        .siz
        .components
        .iter()
        .map(|c| c.depth)
        .max()
        .unwrap_or(8);
    let mct_growth = match (cod.mct, header.mct.is_empty()) {
        (_, false) => 2,
        (1, _) => 1,
        _ => 0,
    };
    let partial_blocks = strategy.capabilities().partial_tier1;

    // Translate the request into tile-local coordinates; a region that
    // misses the tile entirely skips every block.
    #[derive(Clone, Copy)]
    enum BlockFilter {
        All,
        Local(Region),
        Nothing,
    }
    let filter = match region {
        None => BlockFilter::All,
        Some(reg) => {
            let tile_rect = Region::new(geom.x0, geom.y0, geom.width, geom.height);
            if reg.intersects(&tile_rect) {
                let x0 = reg.x.max(geom.x0) - geom.x0;
                let y0 = reg.y.max(geom.y0) - geom.y0;
                let x1 = reg.right().min(geom.x0 + geom.width) - geom.x0;
                let y1 = reg.bottom().min(geom.y0 + geom.height) - geom.y0;
                BlockFilter::Local(Region::new(x0, y0, x1 - x0, y1 - y0))
            } else {
                BlockFilter::Nothing
            }
        }
    };

    // An ATK segment overrides the built-in kernel choice.
    let kernel = match &header.atk {
        Some(custom) => custom.clone(),
        None if reversible => WaveletKernel::Reversible53,
        None => WaveletKernel::Irreversible97,
    };

    let mut samples = Vec::with_capacity(geom.components.len());
    let mut widths = Vec::with_capacity(geom.components.len());
    let mut heights = Vec::with_capacity(geom.components.len());

    for (c, comp_geom) in geom.components.iter().enumerate() {
        token.check()?;
        let r_max = max_resolution.min(comp_geom.decomposition_levels);
        let roi_shift = header.roi_shift_for(c as u16);
        let info = &header.siz.components[c];
        // Region in this component's coordinate grid.
        let comp_region = match &filter {
            BlockFilter::All => None,
            BlockFilter::Nothing => None,
            BlockFilter::Local(r) => {
                let sx = info.sub_x as u32;
                let sy = info.sub_y as u32;
                let x0 = r.x / sx;
                let y0 = r.y / sy;
                Some(Region::new(
                    x0,
                    y0,
                    r.right().div_ceil(sx).saturating_sub(x0).max(1),
                    r.bottom().div_ceil(sy).saturating_sub(y0).max(1),
                ))
            }
        };
        let skip_all = matches!(filter, BlockFilter::Nothing);

        // Tier-1 per block, bands up to the requested resolution.
        struct BlockJob<'a> {
            r: usize,
            b: usize,
            k: usize,
            width: usize,
            height: usize,
            orientation: SubbandOrientation,
            stored: &'a StoredBlock,
            skip: bool,
        }
        let mut jobs = Vec::new();
        for (r, res) in comp_geom.resolutions.iter().enumerate() {
            if r as u8 > r_max {
                break;
            }
            for (b, band) in res.bands.iter().enumerate() {
                for (k, block) in band.blocks.iter().enumerate() {
                    let skip = partial_blocks
                        && (skip_all
                            || !block_intersects_region(block, band.level, comp_region.as_ref()));
                    jobs.push(BlockJob {
                        r,
                        b,
                        k,
                        width: block.width,
                        height: block.height,
                        orientation: band.orientation,
                        stored: &store[c][r][b][k],
                        skip,
                    });
                }
            }
        }

        let qcd_for_comp = header.qcd_for(c as u16)?;
        let decoded = parallel_map(&jobs, workers, token, |_, job| {
            if job.skip || !job.stored.included || job.stored.segments.is_empty() {
                return Ok(vec![0i32; job.width * job.height]);
            }
            if use_ht {
                let mut data = Vec::new();
                for segment in &job.stored.segments {
                    data.extend_from_slice(segment);
                }
                ht_block_coder::decode_block(&data, job.width, job.height)
            } else {
                let band_index =
                    tile::band_index(job.r as u8, job.orientation);
                let mb = qcd_for_comp.magnitude_bits(band_index)?;
                let planes = mb.saturating_sub(job.stored.zero_bit_planes);
                let segments: Vec<&[u8]> =
                    job.stored.segments.iter().map(|s| s.as_slice()).collect();
                bit_plane_coder::decode_block(
                    &segments,
                    job.width,
                    job.height,
                    job.orientation,
                    planes,
                    job.stored.segments.len(),
                )
            }
        })?;

        // Scatter decoded blocks back into band planes.
        let mut bands: Vec<Vec<Vec<i32>>> = comp_geom
            .resolutions
            .iter()
            .take(r_max as usize + 1)
            .map(|res| {
                res.bands
                    .iter()
                    .map(|band| vec![0i32; band.width * band.height])
                    .collect()
            })
            .collect();
        for (job, coeffs) in jobs.iter().zip(decoded.into_iter()) {
            let band = &comp_geom.resolutions[job.r].bands[job.b];
            let block = &band.blocks[job.k];
            let plane = &mut bands[job.r][job.b];
            for y in 0..block.height {
                let dst = (block.y0 + y) * band.width + block.x0;
                let src = y * block.width;
                plane[dst..dst + block.width]
                    .copy_from_slice(&coeffs[src..src + block.width]);
            }
        }

        // ROI max-shift recovery.
        if roi_shift > 0 {
            for band_planes in bands.iter_mut() {
                for plane in band_planes.iter_mut() {
                    roi::undo_scaling(plane, roi_shift);
                }
            }
        }

        // Inverse wavelet to the requested resolution.
        let plane = if reversible {
            let decomposition = build_decomposition(comp_geom, &bands, r_max, |v, _| v);
            decompose::inverse_i32(&kernel, &decomposition, BoundaryExtension::SymmetricWholeSample)?
        } else {
            let qcd_steps = qcd_for_comp;
            let decomposition = build_decomposition(comp_geom, &bands, r_max, |v, band_index| {
                let (gain, _) = crate::encoder::band_props(cod.decomposition_levels, band_index);
                let range = band_range_bits(max_depth, mct_growth, gain);
                let delta = qcd_steps
                    .step_for_band(band_index)
                    .map_or(1.0, |s| s.delta(range));
                quantization::dequantize_scalar(v, delta, 0.5)
            });
            let recon =
                decompose::inverse_f32(&kernel, &decomposition, BoundaryExtension::SymmetricWholeSample)?;
            recon.into_iter().map(|v| v.round() as i32).collect()
        };

        let (w, h) = reduced_dims(comp_geom, r_max);
        samples.push(plane);
        widths.push(w);
        heights.push(h);
    }

    // Inverse component transforms across the tile planes.
    if !header.mct.is_empty() {
        let matrix = &header.mct[0].matrix;
        let mut fp: Vec<Vec<f32>> = samples
            .iter()
            .map(|p| p.iter().map(|&v| v as f32).collect())
            .collect();
        mct::inverse_matrix(&mut fp, matrix)?;
        for (plane, f) in samples.iter_mut().zip(fp.into_iter()) {
            *plane = f.into_iter().map(|v| v.round() as i32).collect();
        }
    } else if cod.mct == 1 && samples.len() >= 3 {
        if reversible {
            mct::inverse_rct(&mut samples);
        } else {
            let mut fp: Vec<Vec<f32>> = samples
                .iter()
                .map(|p| p.iter().map(|&v| v as f32).collect())
                .collect();
            mct::inverse_ict(&mut fp);
            for (plane, f) in samples.iter_mut().zip(fp.into_iter()) {
                *plane = f.into_iter().map(|v| v.round() as i32).collect();
            }
        }
    }

    Ok(TileDecodeOutput {
        samples,
        widths,
        heights,
    })
}

/// Assemble a decomposition of depth `r_max` from stored band planes.
fn build_decomposition<T: Copy + Default>(
    comp_geom: &tile::TileComponentGeom,
    bands: &[Vec<Vec<i32>>],
    r_max: u8,
    convert: impl Fn(i32, usize) -> T,
) -> Decomposition<T> {
    let ll_band = &comp_geom.resolutions[0].bands[0];
    let ll = BandData {
        width: ll_band.width,
        height: ll_band.height,
        data: bands[0][0]
            .iter()
            .map(|&v| convert(v, ll_band.band_index))
            .collect(),
    };
    // Finest level first: resolution r_max down to 1.
    let mut levels = Vec::with_capacity(r_max as usize);
    for r in (1..=r_max).rev() {
        let res = &comp_geom.resolutions[r as usize];
        let get = |o: SubbandOrientation| -> BandData<T> {
            let (idx, band) = res
                .bands
                .iter()
                .enumerate()
                .find(|(_, b)| b.orientation == o)
                .expect("detail resolution has HL/LH/HH");
            BandData {
                width: band.width,
                height: band.height,
                data: bands[r as usize][idx]
                    .iter()
                    .map(|&v| convert(v, band.band_index))
                    .collect(),
            }
        };
        levels.push(decompose::DecompositionLevel {
            hl: get(SubbandOrientation::HL),
            lh: get(SubbandOrientation::LH),
            hh: get(SubbandOrientation::HH),
        });
    }
    let (width, height) = reduced_dims(comp_geom, r_max);
    Decomposition {
        width,
        height,
        levels,
        ll,
    }
}

fn reduced_dims(comp_geom: &tile::TileComponentGeom, r_max: u8) -> (usize, usize) {
    let res = &comp_geom.resolutions[r_max as usize];
    (res.width, res.height)
}

/// Parse the main header and gather every tile's concatenated
/// tile-part body (ordered by TPsot appearance).
pub(crate) fn parse_codestream_structure(
    data: &[u8],
) -> Result<(J2kMainHeader, Vec<Vec<u8>>), J2kError> {
    let mut parser = J2kParser::new(data);
    parser.parse_main_header()?;
    let tile_count = parser.header.siz.tile_count() as usize;
    let mut bodies: Vec<Vec<u8>> = vec![Vec::new(); tile_count];
    loop {
        match parser.peek_marker()? {
            J2kMarkerCode::EndOfCodestream => break,
            J2kMarkerCode::StartOfTile => {}
            other => {
                return Err(J2kError::codestream(
                    parser.reader.position(),
                    format!("{other:?} between tile-parts"),
                ));
            }
        }
        let sot_start = parser.reader.position();
        let sot = parser.parse_tile_part_header()?;
        let body_start = parser.reader.position();
        let body_end = if sot.tile_part_length == 0 {
            // Open-ended final tile-part: runs to EOC.
            if data.len() < 2 || &data[data.len() - 2..] != [0xFF, 0xD9] {
                return Err(J2kError::Truncated);
            }
            data.len() - 2
        } else {
            sot_start + sot.tile_part_length as usize
        };
        if body_end > data.len() || body_end < body_start {
            return Err(J2kError::Truncated);
        }
        bodies[sot.tile_index as usize].extend_from_slice(&data[body_start..body_end]);
        parser.reader.seek(body_end)?;
    }
    Ok((parser.header, bodies))
}

/// Decode a full image.
pub fn decode(data: &[u8]) -> Result<Image, J2kError> {
    decode_with_options(data, &DecodeOptions::default())
}

/// Decode with subsetting options.
pub fn decode_with_options(data: &[u8], options: &DecodeOptions) -> Result<Image, J2kError> {
    decode_with(
        data,
        options,
        RoiDecodeStrategy::default(),
        &CancellationToken::new(),
        None,
    )
}

/// Full decode entry point with strategy, cancellation and progress.
pub fn decode_with(
    data: &[u8],
    options: &DecodeOptions,
    strategy: RoiDecodeStrategy,
    token: &CancellationToken,
    mut progress: Option<ProgressCallback>,
) -> Result<Image, J2kError> {
    let mut overall = 0.0f32;
    let mut report = |stage: ProgressStage, sp: f32, target: f32, cb: &mut Option<ProgressCallback>| {
        if let Some(cb) = cb.as_mut() {
            overall = overall.max(target.min(1.0));
            cb(stage, sp, overall);
        }
    };

    token.check()?;
    let (header, bodies) = parse_codestream_structure(data)?;
    let cod = header.cod()?.clone();
    let siz = &header.siz;

    options.validate(
        cod.layers,
        cod.decomposition_levels,
        siz.width,
        siz.height,
        siz.components.len() as u16,
    )?;
    report(ProgressStage::Parsing, 1.0, 0.2, &mut progress);
    let tile_count = siz.tile_count() as usize;

    let max_resolution = options
        .max_resolution_level
        .unwrap_or(cod.decomposition_levels);
    let reduction = cod.decomposition_levels - max_resolution;
    let workers = 1;

    // Output plane dimensions at the decoded resolution.
    let scale = 1u32 << reduction;
    let out_width = siz.width.div_ceil(scale);
    let out_height = siz.height.div_ceil(scale);
    let mut planes: Vec<Vec<i32>> = Vec::with_capacity(siz.components.len());
    let mut plane_dims: Vec<(u32, u32)> = Vec::with_capacity(siz.components.len());
    for info in &siz.components {
        let w = out_width.div_ceil(info.sub_x as u32);
        let h = out_height.div_ceil(info.sub_y as u32);
        planes.push(vec![0i32; (w * h) as usize]);
        plane_dims.push((w, h));
    }

    let cods: Vec<_> = (0..siz.components.len())
        .map(|c| header.cod_for(c as u16).cloned())
        .collect::<Result<Vec<_>, _>>()?;

    for t in 0..tile_count {
        token.check()?;
        let geom = tile::build_tile(siz, &cods, t as u32);
        let store = read_tile_packets(
            &header,
            &geom,
            &bodies[t],
            options.max_layer,
            options.early_stop,
        )?;
        let decoded = decode_tile(
            &header,
            &geom,
            &store,
            max_resolution,
            options.region.as_ref(),
            strategy,
            workers,
            token,
        )?;

        // Place tile-component samples into the output planes.
        for (c, plane) in decoded.samples.iter().enumerate() {
            let (pw, ph) = plane_dims[c];
            let info = &siz.components[c];
            let origin_x = geom.x0.div_ceil(info.sub_x as u32).div_ceil(scale) as usize;
            let origin_y = geom.y0.div_ceil(info.sub_y as u32).div_ceil(scale) as usize;
            let tw = decoded.widths[c];
            let th = decoded.heights[c];
            for y in 0..th {
                if origin_y + y >= ph as usize {
                    break;
                }
                for x in 0..tw {
                    if origin_x + x >= pw as usize {
                        break;
                    }
                    planes[c][(origin_y + y) * pw as usize + origin_x + x] = plane[y * tw + x];
                }
            }
        }
        report(
            ProgressStage::Reconstructing,
            (t + 1) as f32 / tile_count as f32,
            0.2 + 0.8 * (t + 1) as f32 / tile_count as f32,
            &mut progress,
        );
    }

    // DC offset, level shift and clamping into component range.
    let dco = header.dco.clone().unwrap_or_default();
    for (c, plane) in planes.iter_mut().enumerate() {
        let info = &siz.components[c];
        if let Some(&offset) = dco.offsets.get(c) {
            mct::remove_dc_offset(plane, offset);
        }
        let (lo, hi) = if info.signed {
            (
                -(1i64 << (info.depth - 1)),
                (1i64 << (info.depth - 1)) - 1,
            )
        } else {
            (0, (1i64 << info.depth) - 1)
        };
        let shift = if info.signed {
            0
        } else {
            1i32 << (info.depth - 1)
        };
        for v in plane.iter_mut() {
            let shifted = *v as i64 + shift as i64;
            *v = shifted.clamp(lo, hi) as i32;
        }
    }

    // Region crop (coordinates scale with the resolution reduction).
    let (img_w, img_h, crop) = match &options.region {
        Some(region) => {
            let rx0 = region.x / scale;
            let ry0 = region.y / scale;
            let rx1 = region.right().div_ceil(scale);
            let ry1 = region.bottom().div_ceil(scale);
            (rx1 - rx0, ry1 - ry0, Some((rx0, ry0)))
        }
        None => (out_width, out_height, None),
    };

    let selected: Vec<u16> = options
        .components
        .clone()
        .unwrap_or_else(|| (0..siz.components.len() as u16).collect());

    let mut components = Vec::with_capacity(selected.len());
    for &c in &selected {
        let info = &siz.components[c as usize];
        let cw = img_w.div_ceil(info.sub_x as u32);
        let ch = img_h.div_ceil(info.sub_y as u32);
        let (ox, oy) = match crop {
            Some((rx0, ry0)) => (
                (rx0 / info.sub_x as u32) as usize,
                (ry0 / info.sub_y as u32) as usize,
            ),
            None => (0, 0),
        };
        let src = &planes[c as usize];
        let (src_w, src_h) = plane_dims[c as usize];
        let mut out = Vec::with_capacity((cw * ch) as usize);
        for y in 0..ch as usize {
            for x in 0..cw as usize {
                let sx = (ox + x).min(src_w as usize - 1);
                let sy = (oy + y).min(src_h as usize - 1);
                out.push(src[sy * src_w as usize + sx]);
            }
        }
        components.push(ImageComponent {
            index: c,
            bit_depth: info.depth,
            signed: info.signed,
            width: cw,
            height: ch,
            sub_x: info.sub_x as u32,
            sub_y: info.sub_y as u32,
            samples: out,
        });
    }

    report(ProgressStage::Reconstructing, 1.0, 1.0, &mut progress);
    Image::new(img_w, img_h, components)
}

/// Region decoder with a per-instance reconstruction cache for the
/// `Cached` strategy: the first request decodes the full image, later
/// requests crop from the retained reconstruction.
pub struct RegionDecoder<'a> {
    data: &'a [u8],
    strategy: RoiDecodeStrategy,
    cached: Option<Image>,
}

impl<'a> RegionDecoder<'a> {
    pub fn new(data: &'a [u8], strategy: RoiDecodeStrategy) -> Self {
        Self {
            data,
            strategy,
            cached: None,
        }
    }

    pub fn decode_region(&mut self, region: Region) -> Result<Image, J2kError> {
        match self.strategy {
            RoiDecodeStrategy::Direct | RoiDecodeStrategy::FullImageExtraction => {
                decode_region(self.data, region, self.strategy)
            }
            RoiDecodeStrategy::Cached => {
                if self.cached.is_none() {
                    self.cached = Some(decode(self.data)?);
                }
                let full = self.cached.as_ref().expect("populated above");
                crop_image(full, &region)
            }
        }
    }
}

fn crop_image(full: &Image, region: &Region) -> Result<Image, J2kError> {
    region.validate_within(full.width, full.height)?;
    let mut components = Vec::with_capacity(full.components.len());
    for comp in &full.components {
        let cx0 = (region.x / comp.sub_x) as usize;
        let cy0 = (region.y / comp.sub_y) as usize;
        let cw = region.width.div_ceil(comp.sub_x);
        let ch = region.height.div_ceil(comp.sub_y);
        let mut samples = Vec::with_capacity((cw * ch) as usize);
        for y in 0..ch as usize {
            for x in 0..cw as usize {
                let sx = (cx0 + x).min(comp.width as usize - 1);
                let sy = (cy0 + y).min(comp.height as usize - 1);
                samples.push(comp.samples[sy * comp.width as usize + sx]);
            }
        }
        components.push(ImageComponent {
            width: cw,
            height: ch,
            samples,
            ..comp.clone()
        });
    }
    Image::new(region.width, region.height, components)
}

/// Partial decode per a full options record.
pub fn decode_partial(data: &[u8], options: &DecodeOptions) -> Result<Image, J2kError> {
    decode_with_options(data, options)
}

/// Attempt a decode against an incremental input buffer. Returns
/// `Ok(None)` while not enough bytes have arrived; a truncation error
/// only surfaces once the buffer is marked complete.
pub fn decode_incremental(
    buffer: &crate::concurrency::IncrementalBuffer,
    options: &DecodeOptions,
    min_bytes: usize,
) -> Result<Option<Image>, J2kError> {
    if !buffer.can_decode(min_bytes) {
        return Ok(None);
    }
    let snapshot = buffer.snapshot();
    match decode_with_options(&snapshot, options) {
        Ok(image) => Ok(Some(image)),
        Err(J2kError::Truncated) if !buffer.is_complete() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decode at a reduced resolution level.
pub fn decode_resolution(data: &[u8], max_resolution_level: u8) -> Result<Image, J2kError> {
    decode_with_options(
        data,
        &DecodeOptions {
            max_resolution_level: Some(max_resolution_level),
            ..Default::default()
        },
    )
}

/// Decode only quality layers up to `max_layer`.
pub fn decode_quality(data: &[u8], max_layer: u16) -> Result<Image, J2kError> {
    decode_with_options(
        data,
        &DecodeOptions {
            max_layer: Some(max_layer),
            ..Default::default()
        },
    )
}

/// Decode a canvas region with the given extraction strategy.
pub fn decode_region(
    data: &[u8],
    region: Region,
    strategy: RoiDecodeStrategy,
) -> Result<Image, J2kError> {
    decode_with(
        data,
        &DecodeOptions {
            region: Some(region),
            early_stop: false,
            ..Default::default()
        },
        strategy,
        &CancellationToken::new(),
        None,
    )
}
