//! Encode pipeline: level shift and DC offset, optional component
//! decorrelation, per-tile wavelet transform, quantization, ROI
//! scaling, tier-1 block coding (legacy or HT), PCRD layer assignment
//! and tier-2 packet assembly.

use crate::bit_plane_coder::{self, EncodedBlock};
use crate::concurrency::{parallel_map, CancellationToken};
use crate::config::{EncoderConfig, ProgressCallback, ProgressStage};
use crate::dwt::decompose::{self, DecompositionStructure, SubbandOrientation};
use crate::dwt::BoundaryExtension;
use crate::error::J2kError;
use crate::headers::{
    J2kCap, J2kCod, J2kComponentInfo, J2kDco, J2kMcc, J2kMco, J2kMct, J2kQcd, J2kRgn, J2kSiz,
    J2kSot, CBSTYLE_HT, CBSTYLE_TERMALL,
};
use crate::ht_block_coder;
use crate::image::Image;
use crate::mct::{self, MctMode};
use crate::packet::{self, BlockContribution, PrecinctState};
use crate::progression::{packet_sequence_with_poc, PacketSpace};
use crate::quantization::{self, QuantStyle, StepSize};
use crate::rate_control::{self, BlockRateInfo, DistortionModel, RateControlMode};
use crate::roi::{self, RoiMask};
use crate::tile::{self, TileGeom};
use crate::writer::J2kWriter;

/// Tier-1 output for one code-block, either coder.
pub(crate) enum TierOneBlock {
    Legacy(EncodedBlock),
    Ht(ht_block_coder::HtEncodedBlock),
}

impl TierOneBlock {
    pub(crate) fn num_bit_planes(&self) -> u8 {
        match self {
            Self::Legacy(b) => b.num_bit_planes,
            Self::Ht(b) => b.num_bit_planes,
        }
    }

    pub(crate) fn pass_count(&self) -> usize {
        match self {
            Self::Legacy(b) => b.passes.len(),
            Self::Ht(b) => usize::from(!b.data.is_empty()),
        }
    }

    fn rate_info(&self) -> BlockRateInfo {
        match self {
            Self::Legacy(b) => BlockRateInfo {
                pass_lengths: b.passes.iter().map(|p| p.data.len()).collect(),
                pass_distortions: b.passes.iter().map(|p| p.distortion_reduction).collect(),
            },
            Self::Ht(b) => {
                if b.data.is_empty() {
                    BlockRateInfo::default()
                } else {
                    BlockRateInfo {
                        pass_lengths: vec![b.data.len()],
                        pass_distortions: vec![b.distortion],
                    }
                }
            }
        }
    }

    pub(crate) fn segment(&self, pass: usize) -> &[u8] {
        match self {
            Self::Legacy(b) => &b.passes[pass].data,
            Self::Ht(b) => &b.data,
        }
    }
}

/// Per-band integer coefficient planes of one tile:
/// `bands[comp][resolution][band]`.
pub(crate) type TileBandPlanes = Vec<Vec<Vec<Vec<i32>>>>;
/// Coded blocks of one tile: `blocks[comp][resolution][band][block]`.
pub(crate) type TileBlocks = Vec<Vec<Vec<Vec<TierOneBlock>>>>;

/// Nominal dynamic-range exponent for a band: component depth budget
/// plus decorrelation growth plus the band gain. Encoder and decoder
/// derive this identically so lossy step sizes agree.
pub(crate) fn band_range_bits(max_depth: u8, mct_growth: u8, gain: u8) -> u8 {
    max_depth + mct_growth + gain
}

/// (gain, level) of the band at a QCD step-size index.
pub(crate) fn band_props(levels: u8, index: usize) -> (u8, u8) {
    if index == 0 {
        return (0, levels.max(1));
    }
    let r = (index - 1) / 3 + 1;
    let orientation = (index - 1) % 3;
    let gain = if orientation == 2 { 2 } else { 1 };
    (gain, levels - r as u8 + 1)
}

/// Step size for a band on the irreversible path.
pub(crate) fn lossy_step(quality: f32, levels: u8, band_index: usize, range_bits: u8) -> StepSize {
    let (gain, level) = band_props(levels, band_index);
    let orientation_gain = match (band_index, gain) {
        (0, _) => 4.0,
        (_, 2) => 0.25,
        _ => 1.0,
    };
    let weight = 4f64.powi(level as i32 - 1) * orientation_gain;
    let base = 0.01 + 2.0 * (1.0 - quality as f64).powi(2);
    let delta = (base / weight.sqrt()).max(1.0 / 4096.0) as f32;
    StepSize::from_delta(delta, range_bits)
}

/// Encode an image to a raw codestream.
pub fn encode(image: &Image, config: &EncoderConfig) -> Result<Vec<u8>, J2kError> {
    encode_with(image, config, &CancellationToken::new(), None)
}

/// Encode with cancellation and progress reporting.
pub fn encode_with(
    image: &Image,
    config: &EncoderConfig,
    token: &CancellationToken,
    mut progress: Option<ProgressCallback>,
) -> Result<Vec<u8>, J2kError> {
    image.validate()?;
    config.validate(image)?;
    token.check()?;

    let mut overall = 0.0f32;
    let mut report = |stage: ProgressStage, stage_progress: f32, target: f32| {
        if let Some(cb) = progress.as_mut() {
            overall = overall.max(target.min(1.0));
            cb(stage, stage_progress, overall);
        }
    };

    let siz = build_siz(image, config);
    let cod = build_cod(image, config)?;
    let kernel = config.effective_kernel();
    let reversible = kernel.is_reversible();
    let roi_shift = config.roi.as_ref().map_or(0, |r| r.shift);
    let use_ht = config.use_htj2k;
    let levels = cod.decomposition_levels;
    let structure = DecompositionStructure::Dyadic { levels };

    // Sample planes, level shifted with DC offsets applied.
    let mut planes: Vec<Vec<i32>> = Vec::with_capacity(image.components.len());
    for (c, comp) in image.components.iter().enumerate() {
        let mut plane = comp.samples.clone();
        if !comp.signed {
            let shift = 1i32 << (comp.bit_depth - 1);
            for v in plane.iter_mut() {
                *v -= shift;
            }
        }
        if let Some(&offset) = config.dc_offset.get(c) {
            mct::apply_dc_offset(&mut plane, offset);
        }
        planes.push(plane);
    }

    // Component decorrelation before tiling. The reversible colour
    // transform stays on the integer path; the irreversible transform
    // and the Part-2 matrix run on floats.
    let mut mct_growth = 0u8;
    let mut float_planes: Option<Vec<Vec<f32>>> = None;
    match &config.mct {
        MctMode::None => {}
        MctMode::Standard => {
            require_equal_dims(image)?;
            mct_growth = 1;
            if reversible {
                mct::forward_rct(&mut planes);
            } else {
                let mut fp: Vec<Vec<f32>> = planes
                    .iter()
                    .map(|p| p.iter().map(|&v| v as f32).collect())
                    .collect();
                mct::forward_ict(&mut fp);
                float_planes = Some(fp);
            }
        }
        MctMode::Matrix(matrix) => {
            require_equal_dims(image)?;
            mct_growth = 2;
            let mut fp: Vec<Vec<f32>> = planes
                .iter()
                .map(|p| p.iter().map(|&v| v as f32).collect())
                .collect();
            mct::forward_matrix(&mut fp, matrix)?;
            float_planes = Some(fp);
        }
    }
    if !reversible && float_planes.is_none() {
        float_planes = Some(
            planes
                .iter()
                .map(|p| p.iter().map(|&v| v as f32).collect())
                .collect(),
        );
    }

    let max_depth = image.components.iter().map(|c| c.bit_depth).max().unwrap_or(8);
    let cods: Vec<J2kCod> = vec![cod.clone(); image.components.len()];
    let tile_count = siz.tile_count();

    struct TileData {
        geom: TileGeom,
        bands: TileBandPlanes,
        blocks: TileBlocks,
        rate: Vec<BlockRateInfo>,
    }

    // Wavelet transform and quantization per tile-component.
    let mut tiles: Vec<TileData> = Vec::with_capacity(tile_count as usize);
    for tile_index in 0..tile_count {
        token.check()?;
        let geom = tile::build_tile(&siz, &cods, tile_index);
        let mut tile_bands: TileBandPlanes = Vec::new();
        for (c, comp_geom) in geom.components.iter().enumerate() {
            let comp = &image.components[c];
            let band_planes = if reversible {
                let tc = extract_tile(&planes[c], comp.width as usize, comp.sub_x, comp.sub_y, &geom, comp_geom);
                let decomposition = decompose::forward_i32(
                    &kernel,
                    &tc,
                    comp_geom.width,
                    comp_geom.height,
                    &structure,
                    BoundaryExtension::SymmetricWholeSample,
                )?;
                collect_bands(&decomposition, comp_geom, |v| v)?
            } else {
                let fp = float_planes.as_ref().expect("float planes on lossy path");
                let tc = extract_tile(&fp[c], comp.width as usize, comp.sub_x, comp.sub_y, &geom, comp_geom);
                let decomposition = decompose::forward_f32(
                    &kernel,
                    &tc,
                    comp_geom.width,
                    comp_geom.height,
                    &structure,
                    BoundaryExtension::SymmetricWholeSample,
                )?;
                let quality = config.quality;
                let collected = collect_bands(&decomposition, comp_geom, |v| v)?;
                quantize_bands(collected, comp_geom, quality, levels, max_depth, mct_growth)
            };
            tile_bands.push(band_planes);
        }
        tiles.push(TileData {
            geom,
            bands: tile_bands,
            blocks: Vec::new(),
            rate: Vec::new(),
        });
    }

    // ROI scaling on quantized coefficients.
    if let Some(roi_cfg) = &config.roi {
        for tile_data in tiles.iter_mut() {
            for (c, comp_geom) in tile_data.geom.components.iter().enumerate() {
                let comp = &image.components[c];
                let mask = RoiMask::build(
                    roi_cfg,
                    &comp.samples,
                    comp.width as usize,
                    comp.height as usize,
                );
                for (r, res) in comp_geom.resolutions.iter().enumerate() {
                    for (b, band) in res.bands.iter().enumerate() {
                        if band.width == 0 {
                            continue;
                        }
                        roi::apply_scaling(
                            &mut tile_data.bands[c][r][b],
                            band.width,
                            band.level,
                            &mask,
                        );
                    }
                }
            }
        }
    }

    // Tier-1 over every code-block of every tile.
    struct BlockTask {
        c: usize,
        r: usize,
        b: usize,
        orientation: SubbandOrientation,
        width: usize,
        height: usize,
        weight: f64,
        coeffs: Vec<i32>,
    }

    let total_tiles = tiles.len().max(1);
    for (t, tile_data) in tiles.iter_mut().enumerate() {
        token.check()?;
        let mut tasks: Vec<BlockTask> = Vec::new();
        for (c, comp_geom) in tile_data.geom.components.iter().enumerate() {
            for (r, res) in comp_geom.resolutions.iter().enumerate() {
                for (b, band) in res.bands.iter().enumerate() {
                    let weight = match config.distortion_model {
                        DistortionModel::NormBased | DistortionModel::MseBased => band.mse_weight(),
                        DistortionModel::Simplified => 1.0,
                    };
                    for block in &band.blocks {
                        tasks.push(BlockTask {
                            c,
                            r,
                            b,
                            orientation: band.orientation,
                            width: block.width,
                            height: block.height,
                            weight,
                            coeffs: extract_block(&tile_data.bands[c][r][b], band.width, block),
                        });
                    }
                }
            }
        }

        let coded = parallel_map(&tasks, config.worker_count(), token, |_, task| {
            if use_ht {
                Ok(TierOneBlock::Ht(ht_block_coder::encode_block(
                    &task.coeffs,
                    task.width,
                    task.height,
                    task.weight,
                )?))
            } else {
                Ok(TierOneBlock::Legacy(bit_plane_coder::encode_block(
                    &task.coeffs,
                    task.width,
                    task.height,
                    task.orientation,
                    task.weight,
                )?))
            }
        })?;

        let mut nested: TileBlocks = tile_data
            .geom
            .components
            .iter()
            .map(|cg| {
                cg.resolutions
                    .iter()
                    .map(|res| res.bands.iter().map(|_| Vec::new()).collect())
                    .collect()
            })
            .collect();
        let mut rate = Vec::with_capacity(coded.len());
        for (task, block) in tasks.iter().zip(coded.into_iter()) {
            rate.push(block.rate_info());
            nested[task.c][task.r][task.b].push(block);
        }
        tile_data.blocks = nested;
        tile_data.rate = rate;
        report(
            ProgressStage::BlockCoding,
            (t + 1) as f32 / total_tiles as f32,
            0.6 * (t + 1) as f32 / total_tiles as f32,
        );
    }

    // QCD: exponents from the dynamic-range budget (the reversible path
    // folds the ROI shift in), guard bits raised until every block fits.
    let mut max_planes_per_band = vec![0u8; tile::band_count(levels)];
    for tile_data in &tiles {
        for (c, comp_geom) in tile_data.geom.components.iter().enumerate() {
            for (r, res) in comp_geom.resolutions.iter().enumerate() {
                for (b, band) in res.bands.iter().enumerate() {
                    for block in &tile_data.blocks[c][r][b] {
                        let slot = &mut max_planes_per_band[band.band_index];
                        *slot = (*slot).max(block.num_bit_planes());
                    }
                }
            }
        }
    }
    let qcd = build_qcd(
        config,
        levels,
        max_depth,
        mct_growth,
        roi_shift,
        &max_planes_per_band,
    )?;

    // Rate control per tile.
    let mode = rate_mode(config);
    let mut assignments: Vec<rate_control::LayerAssignment> = Vec::with_capacity(tiles.len());
    for tile_data in &tiles {
        token.check()?;
        let pixels = tile_data.geom.width as usize * tile_data.geom.height as usize;
        assignments.push(rate_control::assign_layers(
            &tile_data.rate,
            cod.layers as usize,
            pixels,
            mode,
        )?);
    }
    report(ProgressStage::RateControl, 1.0, 0.7);

    // Tier-2 assembly.
    let mut writer = J2kWriter::new(image.components.len());
    writer.write_soc();
    writer.write_siz(&siz);
    if use_ht {
        writer.write_cap(&J2kCap::htj2k());
    }
    writer.write_cod(&cod);
    writer.write_qcd(&qcd);
    if let Some(custom @ crate::dwt::kernel::WaveletKernel::Arbitrary(_)) = &config.wavelet_kernel {
        writer.write_atk(custom)?;
    }
    if let Some(roi_cfg) = &config.roi {
        for c in 0..image.components.len() {
            writer.write_rgn(&J2kRgn {
                component: c as u16,
                style: 0,
                shift: roi_cfg.shift,
            });
        }
    }
    if !config.dc_offset.is_empty() {
        writer.write_dco(&J2kDco {
            offsets: config.dc_offset.clone(),
        });
    }
    if let MctMode::Matrix(matrix) = &config.mct {
        writer.write_mct(&J2kMct {
            index: 0,
            matrix: matrix.clone(),
        });
        writer.write_mcc(&J2kMcc {
            index: 0,
            mct_index: 0,
            components: (0..image.components.len() as u16).collect(),
        });
        writer.write_mco(&J2kMco {
            collections: vec![0],
        });
    }

    for (t, tile_data) in tiles.iter().enumerate() {
        token.check()?;
        let sot_start = writer.len();
        let psot_pos = writer.write_sot(&J2kSot {
            tile_index: t as u16,
            tile_part_length: 0,
            tile_part_index: 0,
            tile_part_count: 1,
        });
        writer.write_sod();
        assemble_tile_packets(
            &mut writer,
            &tile_data.geom,
            &tile_data.blocks,
            &assignments[t],
            &qcd,
            &cod,
            &[],
        )?;
        let psot = (writer.len() - sot_start) as u32;
        writer.patch_psot(psot_pos, psot);
        report(
            ProgressStage::Assembling,
            (t + 1) as f32 / total_tiles as f32,
            0.7 + 0.3 * (t + 1) as f32 / total_tiles as f32,
        );
    }
    writer.write_eoc();
    report(ProgressStage::Assembling, 1.0, 1.0);
    log::debug!("encoded {tile_count} tiles, {} bytes", writer.len());
    Ok(writer.into_bytes())
}

fn require_equal_dims(image: &Image) -> Result<(), J2kError> {
    let w = image.components[0].width;
    let h = image.components[0].height;
    if image.components.iter().any(|c| c.width != w || c.height != h) {
        return Err(J2kError::parameter(
            "multi-component transforms require equal component dimensions",
        ));
    }
    Ok(())
}

fn build_siz(image: &Image, config: &EncoderConfig) -> J2kSiz {
    let (tile_width, tile_height) = config.tile_size.unwrap_or((image.width, image.height));
    J2kSiz {
        width: image.width,
        height: image.height,
        x_origin: 0,
        y_origin: 0,
        tile_width: tile_width.min(image.width),
        tile_height: tile_height.min(image.height),
        tile_x_origin: 0,
        tile_y_origin: 0,
        components: image
            .components
            .iter()
            .map(|c| J2kComponentInfo {
                depth: c.bit_depth,
                signed: c.signed,
                sub_x: c.sub_x as u8,
                sub_y: c.sub_y as u8,
            })
            .collect(),
    }
}

fn build_cod(image: &Image, config: &EncoderConfig) -> Result<J2kCod, J2kError> {
    let mut cod = J2kCod {
        coding_style: 0,
        progression_order: config.progression_order,
        layers: config.quality_layers as u16,
        mct: u8::from(config.mct == MctMode::Standard && image.components.len() >= 3),
        decomposition_levels: config.decomposition_levels,
        cb_style: CBSTYLE_TERMALL | if config.use_htj2k { CBSTYLE_HT } else { 0 },
        transform: u8::from(config.effective_kernel().is_reversible()),
        precinct_sizes: Vec::new(),
        ..Default::default()
    };
    cod.set_code_block_size(config.code_block_size.0, config.code_block_size.1)?;
    Ok(cod)
}

fn rate_mode(config: &EncoderConfig) -> RateControlMode {
    if let Some(bpp) = config.target_bitrate {
        RateControlMode::TargetBitrate {
            bits_per_pixel: bpp,
            strict: config.strict_rate,
        }
    } else if config.lossless {
        RateControlMode::Lossless
    } else {
        RateControlMode::ConstantQuality(config.quality)
    }
}

/// Copy one tile-component's samples out of a full component plane.
fn extract_tile<T: Copy>(
    plane: &[T],
    plane_width: usize,
    sub_x: u32,
    sub_y: u32,
    geom: &TileGeom,
    comp_geom: &tile::TileComponentGeom,
) -> Vec<T> {
    let origin_x = (geom.x0 as usize).div_ceil(sub_x as usize);
    let origin_y = (geom.y0 as usize).div_ceil(sub_y as usize);
    let mut out = Vec::with_capacity(comp_geom.width * comp_geom.height);
    for y in 0..comp_geom.height {
        let row = (origin_y + y) * plane_width + origin_x;
        out.extend_from_slice(&plane[row..row + comp_geom.width]);
    }
    out
}

fn extract_block(plane: &[i32], band_width: usize, block: &tile::CodeBlockGeom) -> Vec<i32> {
    let mut out = Vec::with_capacity(block.width * block.height);
    for y in 0..block.height {
        let row = (block.y0 + y) * band_width + block.x0;
        out.extend_from_slice(&plane[row..row + block.width]);
    }
    out
}

/// Arrange decomposition bands into geometry order, checking sizes.
fn collect_bands<T: Copy, U, F: Fn(T) -> U>(
    decomposition: &decompose::Decomposition<T>,
    comp_geom: &tile::TileComponentGeom,
    convert: F,
) -> Result<Vec<Vec<Vec<U>>>, J2kError> {
    let levels = comp_geom.decomposition_levels as usize;
    let mut out = Vec::with_capacity(levels + 1);
    for res in &comp_geom.resolutions {
        let mut bands = Vec::with_capacity(res.bands.len());
        for band in &res.bands {
            let data: &[T] = if res.index == 0 {
                &decomposition.ll.data
            } else {
                let level = &decomposition.levels[levels - res.index as usize];
                match band.orientation {
                    SubbandOrientation::HL => &level.hl.data,
                    SubbandOrientation::LH => &level.lh.data,
                    SubbandOrientation::HH => &level.hh.data,
                    SubbandOrientation::LL => unreachable!("detail resolutions have no LL"),
                }
            };
            if data.len() != band.width * band.height {
                return Err(J2kError::data(format!(
                    "subband holds {} coefficients, geometry expects {}x{}",
                    data.len(),
                    band.width,
                    band.height
                )));
            }
            bands.push(data.iter().map(|&v| convert(v)).collect());
        }
        out.push(bands);
    }
    Ok(out)
}

/// Quantize float bands with the signalled (decoded) step size so both
/// ends use the identical delta.
fn quantize_bands(
    float_bands: Vec<Vec<Vec<f32>>>,
    comp_geom: &tile::TileComponentGeom,
    quality: f32,
    levels: u8,
    max_depth: u8,
    mct_growth: u8,
) -> Vec<Vec<Vec<i32>>> {
    float_bands
        .into_iter()
        .zip(comp_geom.resolutions.iter())
        .map(|(res_bands, res)| {
            res_bands
                .into_iter()
                .zip(res.bands.iter())
                .map(|(data, band)| {
                    let range = band_range_bits(max_depth, mct_growth, band.gain);
                    let step = lossy_step(quality, levels, band.band_index, range);
                    let delta = step.delta(range);
                    data.into_iter()
                        .map(|v| quantization::quantize_scalar(v, delta))
                        .collect()
                })
                .collect()
        })
        .collect()
}

fn build_qcd(
    config: &EncoderConfig,
    levels: u8,
    max_depth: u8,
    mct_growth: u8,
    roi_shift: u8,
    max_planes_per_band: &[u8],
) -> Result<J2kQcd, J2kError> {
    let reversible = config.effective_kernel().is_reversible();
    let band_total = tile::band_count(levels);
    let mut steps = Vec::with_capacity(band_total);
    for index in 0..band_total {
        let (gain, _) = band_props(levels, index);
        if reversible {
            let exponent = band_range_bits(max_depth, mct_growth, gain) + roi_shift;
            if exponent > 31 {
                return Err(J2kError::parameter(format!(
                    "dynamic range of {exponent} bits exceeds the signalling range \
                     (depth + transform growth + ROI shift must stay within 31)"
                )));
            }
            steps.push(StepSize::reversible(exponent));
        } else {
            let range = band_range_bits(max_depth, mct_growth, gain);
            steps.push(lossy_step(config.quality, levels, index, range));
        }
    }

    let mut guard_bits: u8 = 2;
    for (index, &planes) in max_planes_per_band.iter().enumerate() {
        let needed = (planes + 1).saturating_sub(steps[index].exponent);
        guard_bits = guard_bits.max(needed);
    }
    if guard_bits > 7 {
        return Err(J2kError::data(format!(
            "coefficients need {guard_bits} guard bits; the codestream format allows 7"
        )));
    }

    Ok(J2kQcd {
        style: if reversible {
            QuantStyle::None
        } else {
            QuantStyle::ScalarExpounded
        },
        guard_bits,
        step_sizes: steps,
    })
}

pub(crate) fn assemble_tile_packets(
    writer: &mut J2kWriter,
    geom: &TileGeom,
    blocks: &TileBlocks,
    assignment: &rate_control::LayerAssignment,
    qcd: &J2kQcd,
    cod: &J2kCod,
    poc: &[crate::headers::J2kPocEntry],
) -> Result<(), J2kError> {
    let components = &geom.components;
    let mut states: Vec<Vec<PrecinctState>> = Vec::with_capacity(components.len());
    let mut flat_index: Vec<Vec<Vec<Vec<usize>>>> = Vec::with_capacity(components.len());
    let mut flat = 0usize;
    for (c, comp_geom) in components.iter().enumerate() {
        let mut comp_states = Vec::new();
        let mut comp_flat = Vec::new();
        for (r, res) in comp_geom.resolutions.iter().enumerate() {
            let mut state = PrecinctState::new(res);
            let mut res_flat = Vec::new();
            for (b, band) in res.bands.iter().enumerate() {
                let mb = qcd.magnitude_bits(band.band_index)?;
                let mut band_flat = Vec::new();
                for (k, block_geom) in band.blocks.iter().enumerate() {
                    let block = &blocks[c][r][b][k];
                    let total_passes = block.pass_count();
                    let first_layer = (0..assignment.len() as u16)
                        .find(|&l| total_passes > 0 && assignment[l as usize][flat] > 0);
                    let zbp = mb.saturating_sub(block.num_bit_planes());
                    state.seed_encoder(b, block_geom.bx, block_geom.by, first_layer, zbp);
                    band_flat.push(flat);
                    flat += 1;
                }
                res_flat.push(band_flat);
            }
            comp_states.push(state);
            comp_flat.push(res_flat);
        }
        states.push(comp_states);
        flat_index.push(comp_flat);
    }

    let precincts: Vec<Vec<usize>> = components
        .iter()
        .map(|cg| vec![1; cg.resolutions.len()])
        .collect();
    let space = PacketSpace {
        layers: cod.layers,
        precincts: &precincts,
    };
    for packet_id in packet_sequence_with_poc(cod.progression_order, &space, poc) {
        let c = packet_id.component as usize;
        let r = packet_id.resolution as usize;
        let l = packet_id.layer as usize;
        let res = &components[c].resolutions[r];

        let mut contributions: Vec<Vec<Option<BlockContribution>>> = Vec::new();
        for (b, band) in res.bands.iter().enumerate() {
            let mb = qcd.magnitude_bits(band.band_index)?;
            let mut band_contrib = Vec::with_capacity(band.blocks.len());
            for k in 0..band.blocks.len() {
                let block = &blocks[c][r][b][k];
                let flat = flat_index[c][r][b][k];
                let until = assignment[l][flat].min(block.pass_count());
                let from = if l == 0 {
                    0
                } else {
                    assignment[l - 1][flat].min(block.pass_count())
                };
                if until > from {
                    band_contrib.push(Some(BlockContribution {
                        segments: (from..until).map(|p| block.segment(p)).collect(),
                        zero_bit_planes: mb.saturating_sub(block.num_bit_planes()),
                    }));
                } else {
                    band_contrib.push(None);
                }
            }
            contributions.push(band_contrib);
        }

        let bytes = packet::write_packet(&mut states[c][r], res, packet_id.layer, &contributions)?;
        writer.out.write_bytes(&bytes);
    }
    Ok(())
}
