//! Lossless transcoding between Part-1 and HTJ2K codestreams.
//!
//! Coefficients are recovered bit-exactly with the source block coder,
//! re-encoded with the opposite coder, and the codestream re-emitted
//! with the same SIZ/COD/QCD except the HT mode bit and the CAP marker.
//! Recovered data re-packetises into the first quality layer; the
//! remaining declared layers come out as zero-length packets, since
//! PCRD truncation points do not survive block-coder substitution.

use std::time::Instant;

use crate::bit_plane_coder;
use crate::concurrency::{parallel_map, CancellationToken};
use crate::config::{ProgressCallback, ProgressStage};
use crate::decoder::{self, StoredBlock};
use crate::encoder::{self, TierOneBlock};
use crate::error::J2kError;
use crate::headers::{J2kCap, J2kMainHeader, J2kSot, CBSTYLE_HT};
use crate::ht_block_coder;
use crate::tile::{self, TileGeom};
use crate::writer::J2kWriter;

/// Transcode direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeDirection {
    LegacyToHt,
    HtToLegacy,
}

/// Transcode outcome and statistics.
#[derive(Debug)]
pub struct TranscodeResult {
    pub bytes: Vec<u8>,
    pub direction: TranscodeDirection,
    pub tiles_processed: usize,
    pub code_blocks_transcoded: usize,
    pub elapsed_seconds: f64,
    pub metadata_preserved: bool,
}

/// Concurrency bounds for multi-tile inputs.
#[derive(Debug, Clone, Copy)]
pub struct TranscodeOptions {
    pub parallel_tiles: bool,
    pub max_concurrency: usize,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            parallel_tiles: false,
            max_concurrency: 1,
        }
    }
}

/// True iff the main header carries a CAP marker declaring Part-15.
pub fn is_htj2k(data: &[u8]) -> Result<bool, J2kError> {
    crate::parser::is_htj2k(data)
}

pub fn transcode(data: &[u8], direction: TranscodeDirection) -> Result<TranscodeResult, J2kError> {
    transcode_with(
        data,
        direction,
        &TranscodeOptions::default(),
        &CancellationToken::new(),
        None,
    )
}

pub fn transcode_with(
    data: &[u8],
    direction: TranscodeDirection,
    options: &TranscodeOptions,
    token: &CancellationToken,
    mut progress: Option<ProgressCallback>,
) -> Result<TranscodeResult, J2kError> {
    let started = Instant::now();
    let mut overall = 0.0f32;
    let mut report = |stage: ProgressStage, sp: f32, target: f32, cb: &mut Option<ProgressCallback>| {
        if let Some(cb) = cb.as_mut() {
            overall = overall.max(target.min(1.0));
            cb(stage, sp, overall);
        }
    };

    let source_is_ht = is_htj2k(data)?;
    match direction {
        TranscodeDirection::LegacyToHt if source_is_ht => {
            return Err(J2kError::data("codestream is already HTJ2K".to_string()));
        }
        TranscodeDirection::HtToLegacy if !source_is_ht => {
            return Err(J2kError::data("codestream is not HTJ2K".to_string()));
        }
        _ => {}
    }
    let to_ht = direction == TranscodeDirection::LegacyToHt;

    token.check()?;
    let (header, bodies) = decoder::parse_codestream_structure(data)?;
    report(ProgressStage::Parsing, 1.0, 0.1, &mut progress);

    let siz = &header.siz;
    let cods: Vec<_> = (0..siz.components.len())
        .map(|c| header.cod_for(c as u16).cloned())
        .collect::<Result<Vec<_>, _>>()?;
    let tile_count = siz.tile_count() as usize;

    // Per-tile coefficient recovery and re-encoding.
    let tile_inputs: Vec<usize> = (0..tile_count).collect();
    let workers = if options.parallel_tiles && tile_count > 1 {
        options.max_concurrency.max(1)
    } else {
        1
    };
    let outcomes = parallel_map(&tile_inputs, workers, token, |_, &t| {
        let geom = tile::build_tile(siz, &cods, t as u32);
        transcode_tile(&header, &geom, &bodies[t], to_ht, token)
    })?;
    report(ProgressStage::Transcoding, 1.0, 0.8, &mut progress);

    // Re-emit the codestream.
    let mut cod = header.cod()?.clone();
    if to_ht {
        cod.cb_style |= CBSTYLE_HT;
    } else {
        cod.cb_style &= !CBSTYLE_HT;
    }
    let qcd = header.qcd()?.clone();

    let mut writer = J2kWriter::new(siz.components.len());
    writer.write_soc();
    writer.write_siz(siz);
    if to_ht {
        writer.write_cap(&J2kCap::htj2k());
    }
    writer.write_cod(&cod);
    writer.write_qcd(&qcd);
    for (component, coc) in &header.coc {
        let mut coc = coc.clone();
        if to_ht {
            coc.cb_style |= CBSTYLE_HT;
        } else {
            coc.cb_style &= !CBSTYLE_HT;
        }
        writer.write_coc(*component, &coc);
    }
    for (component, qcc) in &header.qcc {
        writer.write_qcc(*component, qcc);
    }
    for rgn in &header.rgn {
        writer.write_rgn(rgn);
    }
    if !header.poc.is_empty() {
        writer.write_poc(&header.poc);
    }
    if let Some(dco) = &header.dco {
        writer.write_dco(dco);
    }
    if let Some(ads) = &header.ads {
        writer.write_ads(ads);
    }
    if let Some(atk) = &header.atk {
        writer.write_atk(atk)?;
    }
    for mct in &header.mct {
        writer.write_mct(mct);
    }
    for mcc in &header.mcc {
        writer.write_mcc(mcc);
    }
    if let Some(mco) = &header.mco {
        writer.write_mco(mco);
    }
    for comment in &header.comments {
        writer.write_comment(comment)?;
    }

    let mut code_blocks_transcoded = 0usize;
    for (t, (geom, blocks, transcoded)) in outcomes.into_iter().enumerate() {
        token.check()?;
        code_blocks_transcoded += transcoded;
        let sot_start = writer.len();
        let psot_pos = writer.write_sot(&J2kSot {
            tile_index: t as u16,
            tile_part_length: 0,
            tile_part_index: 0,
            tile_part_count: 1,
        });
        writer.write_sod();

        // All recovered passes land in layer 0; later layers stay as
        // valid zero-length packets. The assignment rows are cumulative
        // truncation points, so repeating the full pass counts on every
        // layer means layer 0 contributes [0, pass_counts) and each
        // later layer contributes the empty range [n, n).
        let block_total: usize = blocks
            .iter()
            .flat_map(|c| c.iter().flat_map(|r| r.iter().map(|b| b.len())))
            .sum();
        let mut pass_counts = Vec::with_capacity(block_total);
        for comp in &blocks {
            for res in comp {
                for band in res {
                    for block in band {
                        pass_counts.push(block.pass_count());
                    }
                }
            }
        }
        let assignment: Vec<Vec<usize>> = (0..cod.layers as usize)
            .map(|_| pass_counts.clone())
            .collect();

        encoder::assemble_tile_packets(
            &mut writer,
            &geom,
            &blocks,
            &assignment,
            &qcd,
            &cod,
            &header.poc,
        )?;
        let psot = (writer.len() - sot_start) as u32;
        writer.patch_psot(psot_pos, psot);
        report(
            ProgressStage::Assembling,
            (t + 1) as f32 / tile_count as f32,
            0.8 + 0.2 * (t + 1) as f32 / tile_count as f32,
            &mut progress,
        );
    }
    writer.write_eoc();
    report(ProgressStage::Assembling, 1.0, 1.0, &mut progress);

    Ok(TranscodeResult {
        bytes: writer.into_bytes(),
        direction,
        tiles_processed: tile_count,
        code_blocks_transcoded,
        elapsed_seconds: started.elapsed().as_secs_f64(),
        metadata_preserved: true,
    })
}

type TileOutcome = (TileGeom, encoder::TileBlocks, usize);

fn transcode_tile(
    header: &J2kMainHeader,
    geom: &TileGeom,
    body: &[u8],
    to_ht: bool,
    token: &CancellationToken,
) -> Result<TileOutcome, J2kError> {
    let store = decoder::read_tile_packets(header, geom, body, None, false)?;
    let source_ht = header.is_htj2k();

    let mut blocks: encoder::TileBlocks = Vec::with_capacity(geom.components.len());
    let mut transcoded = 0usize;
    for (c, comp_geom) in geom.components.iter().enumerate() {
        token.check()?;
        let qcd = header.qcd_for(c as u16)?;
        let mut comp_blocks = Vec::with_capacity(comp_geom.resolutions.len());
        for (r, res) in comp_geom.resolutions.iter().enumerate() {
            let mut res_blocks = Vec::with_capacity(res.bands.len());
            for (b, band) in res.bands.iter().enumerate() {
                let mut band_blocks = Vec::with_capacity(band.blocks.len());
                for (k, block_geom) in band.blocks.iter().enumerate() {
                    let stored: &StoredBlock = &store[c][r][b][k];
                    let coeffs = if !stored.included || stored.segments.is_empty() {
                        vec![0i32; block_geom.width * block_geom.height]
                    } else if source_ht {
                        let mut data = Vec::new();
                        for segment in &stored.segments {
                            data.extend_from_slice(segment);
                        }
                        ht_block_coder::decode_block(&data, block_geom.width, block_geom.height)?
                    } else {
                        let mb = qcd.magnitude_bits(band.band_index)?;
                        let planes = mb.saturating_sub(stored.zero_bit_planes);
                        let segments: Vec<&[u8]> =
                            stored.segments.iter().map(|s| s.as_slice()).collect();
                        bit_plane_coder::decode_block(
                            &segments,
                            block_geom.width,
                            block_geom.height,
                            band.orientation,
                            planes,
                            stored.segments.len(),
                        )?
                    };

                    let reencoded = if to_ht {
                        TierOneBlock::Ht(ht_block_coder::encode_block(
                            &coeffs,
                            block_geom.width,
                            block_geom.height,
                            1.0,
                        )?)
                    } else {
                        TierOneBlock::Legacy(bit_plane_coder::encode_block(
                            &coeffs,
                            block_geom.width,
                            block_geom.height,
                            band.orientation,
                            1.0,
                        )?)
                    };
                    if stored.included {
                        transcoded += 1;
                    }
                    band_blocks.push(reencoded);
                }
                res_blocks.push(band_blocks);
            }
            comp_blocks.push(res_blocks);
        }
        blocks.push(comp_blocks);
    }
    log::debug!(
        "tile {}: transcoded {} code-blocks ({})",
        geom.index,
        transcoded,
        if to_ht { "legacy -> HT" } else { "HT -> legacy" }
    );
    Ok((geom.clone(), blocks, transcoded))
}
