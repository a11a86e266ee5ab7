//! Packet headers (ISO/IEC 15444-1 B.10).
//!
//! A packet carries one layer's contribution for one (resolution,
//! component, precinct). Its header codes, per code-block: inclusion
//! (tag tree on first inclusion, single bit afterwards), zero
//! bit-planes (tag tree, first inclusion only), the new pass count, and
//! byte lengths through the adaptive Lblock comma code. The body is the
//! concatenation of the signalled codeword segments; with per-pass
//! termination every pass is its own segment.

use crate::bit_io::{J2kBitReader, J2kBitWriter};
use crate::error::J2kError;
use crate::tag_tree::TagTree;
use crate::tile::ResolutionGeom;

/// Per-band precinct coding state, persistent across layers.
pub struct PrecinctBandState {
    pub incl_tree: TagTree,
    pub imsb_tree: TagTree,
    pub included: Vec<bool>,
    pub lblock: Vec<u8>,
}

impl PrecinctBandState {
    fn new(grid_w: usize, grid_h: usize) -> Self {
        let blocks = grid_w * grid_h;
        Self {
            incl_tree: TagTree::new(grid_w.max(1), grid_h.max(1)),
            imsb_tree: TagTree::new(grid_w.max(1), grid_h.max(1)),
            included: vec![false; blocks],
            lblock: vec![3; blocks],
        }
    }
}

/// Precinct state for one (resolution, component, precinct), one entry
/// per band of the resolution.
pub struct PrecinctState {
    pub bands: Vec<PrecinctBandState>,
}

impl PrecinctState {
    pub fn new(resolution: &ResolutionGeom) -> Self {
        Self {
            bands: resolution
                .bands
                .iter()
                .map(|b| PrecinctBandState::new(b.grid_w, b.grid_h))
                .collect(),
        }
    }

    /// Encoder-side: seed the tag trees with first-inclusion layers and
    /// zero-bit-plane counts. Blocks that never contribute keep an
    /// unset inclusion value, which codes as "not yet included" at every
    /// threshold.
    pub fn seed_encoder(
        &mut self,
        band: usize,
        bx: usize,
        by: usize,
        first_layer: Option<u16>,
        zero_bit_planes: u8,
    ) {
        if let Some(layer) = first_layer {
            self.bands[band].incl_tree.set_value(bx, by, layer as u32);
            self.bands[band]
                .imsb_tree
                .set_value(bx, by, zero_bit_planes as u32);
        }
    }
}

/// What one code-block contributes to one packet (encoder side).
pub struct BlockContribution<'a> {
    /// Terminated codeword segments, one per new pass.
    pub segments: Vec<&'a [u8]>,
    pub zero_bit_planes: u8,
}

/// Decoded header entry for one contributing code-block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBlockInfo {
    pub band: usize,
    pub block: usize,
    pub first_inclusion: bool,
    pub zero_bit_planes: u8,
    pub segment_lengths: Vec<u32>,
}

/// Decoded packet header plus its byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacketHeader {
    pub empty: bool,
    pub blocks: Vec<PacketBlockInfo>,
    pub header_len: usize,
}

fn write_pass_count(writer: &mut J2kBitWriter, n: usize) {
    debug_assert!((1..=164).contains(&n));
    match n {
        1 => writer.write_bit(0),
        2 => {
            writer.write_bit(1);
            writer.write_bit(0);
        }
        3..=5 => {
            writer.write_bits(0b11, 2);
            writer.write_bits(n as u32 - 3, 2);
        }
        6..=36 => {
            writer.write_bits(0b1111, 4);
            writer.write_bits(n as u32 - 6, 5);
        }
        _ => {
            writer.write_bits(0x1FF, 9);
            writer.write_bits(n as u32 - 37, 7);
        }
    }
}

fn read_pass_count(reader: &mut J2kBitReader) -> Result<usize, J2kError> {
    if reader.read_bit()? == 0 {
        return Ok(1);
    }
    if reader.read_bit()? == 0 {
        return Ok(2);
    }
    let v = reader.read_bits(2)?;
    if v < 3 {
        return Ok(3 + v as usize);
    }
    let v = reader.read_bits(5)?;
    if v < 31 {
        return Ok(6 + v as usize);
    }
    let v = reader.read_bits(7)?;
    Ok(37 + v as usize)
}

fn bit_length(v: u32) -> u8 {
    (32 - v.leading_zeros()).max(1) as u8
}

/// Serialise one packet (header plus body). `contributions[band][block]`
/// is `None` for blocks without new data this layer.
pub fn write_packet(
    state: &mut PrecinctState,
    resolution: &ResolutionGeom,
    layer: u16,
    contributions: &[Vec<Option<BlockContribution>>],
) -> Result<Vec<u8>, J2kError> {
    let mut writer = J2kBitWriter::new();
    let non_empty = contributions
        .iter()
        .any(|band| band.iter().any(Option::is_some));
    writer.write_bit(u8::from(non_empty));

    let mut body: Vec<u8> = Vec::new();
    if non_empty {
        for (band_idx, band) in resolution.bands.iter().enumerate() {
            for block in &band.blocks {
                let slot = block.by * band.grid_w + block.bx;
                let contribution = contributions[band_idx][slot].as_ref();
                let band_state = &mut state.bands[band_idx];
                let included_before = band_state.included[slot];

                if !included_before {
                    band_state
                        .incl_tree
                        .encode(&mut writer, block.bx, block.by, layer as u32 + 1);
                } else {
                    writer.write_bit(u8::from(contribution.is_some()));
                }

                let Some(contribution) = contribution else {
                    continue;
                };

                if !included_before {
                    band_state.imsb_tree.encode(
                        &mut writer,
                        block.bx,
                        block.by,
                        contribution.zero_bit_planes as u32 + 1,
                    );
                    band_state.included[slot] = true;
                }

                write_pass_count(&mut writer, contribution.segments.len());

                // Lblock adaptation: grow until every segment length fits.
                let needed = contribution
                    .segments
                    .iter()
                    .map(|s| bit_length(s.len() as u32))
                    .max()
                    .unwrap_or(1);
                let lblock = &mut band_state.lblock[slot];
                let increments = needed.saturating_sub(*lblock);
                for _ in 0..increments {
                    writer.write_bit(1);
                }
                writer.write_bit(0);
                *lblock += increments;
                for segment in &contribution.segments {
                    writer.write_bits(segment.len() as u32, *lblock);
                    body.extend_from_slice(segment);
                }
            }
        }
    }

    let mut packet = writer.finish();
    packet.extend_from_slice(&body);
    Ok(packet)
}

/// Parse one packet header from `data` (which starts at the packet).
/// The body follows at `header_len`.
pub fn read_packet_header(
    state: &mut PrecinctState,
    resolution: &ResolutionGeom,
    layer: u16,
    data: &[u8],
) -> Result<ParsedPacketHeader, J2kError> {
    let mut reader = J2kBitReader::new(data);
    let mut blocks = Vec::new();

    if reader.read_bit()? == 0 {
        let header_len = reader.align()?;
        return Ok(ParsedPacketHeader {
            empty: true,
            blocks,
            header_len,
        });
    }

    for (band_idx, band) in resolution.bands.iter().enumerate() {
        for block in &band.blocks {
            let slot = block.by * band.grid_w + block.bx;
            let band_state = &mut state.bands[band_idx];
            let included_before = band_state.included[slot];

            let included = if !included_before {
                band_state
                    .incl_tree
                    .decode(&mut reader, block.bx, block.by, layer as u32 + 1)?
            } else {
                reader.read_bit()? == 1
            };
            if !included {
                continue;
            }

            let mut zero_bit_planes = 0u8;
            let first_inclusion = !included_before;
            if first_inclusion {
                let mut threshold = 1u32;
                while !band_state
                    .imsb_tree
                    .decode(&mut reader, block.bx, block.by, threshold)?
                {
                    threshold += 1;
                    if threshold > 96 {
                        return Err(J2kError::Corrupted(
                            "zero-bit-plane tag tree does not converge".to_string(),
                        ));
                    }
                }
                zero_bit_planes = (threshold - 1) as u8;
                band_state.included[slot] = true;
            }

            let passes = read_pass_count(&mut reader)?;
            let lblock = &mut band_state.lblock[slot];
            while reader.read_bit()? == 1 {
                *lblock += 1;
                if *lblock > 32 {
                    return Err(J2kError::Corrupted("Lblock exceeds 32 bits".to_string()));
                }
            }
            let mut segment_lengths = Vec::with_capacity(passes);
            for _ in 0..passes {
                segment_lengths.push(reader.read_bits(*lblock)?);
            }

            blocks.push(PacketBlockInfo {
                band: band_idx,
                block: slot,
                first_inclusion,
                zero_bit_planes,
                segment_lengths,
            });
        }
    }

    let header_len = reader.align()?;
    Ok(ParsedPacketHeader {
        empty: false,
        blocks,
        header_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::J2kCod;
    use crate::tile::build_tile_component;

    fn single_band_resolution(blocks_w: usize) -> ResolutionGeom {
        // A 0-level component: one LL band sized for `blocks_w` blocks.
        let mut cod = J2kCod {
            decomposition_levels: 0,
            ..Default::default()
        };
        cod.set_code_block_size(16, 16).unwrap();
        let tc = build_tile_component(0, blocks_w * 16, 16, &cod);
        tc.resolutions.into_iter().next().unwrap()
    }

    #[test]
    fn test_pass_count_code_roundtrip() {
        for n in [1usize, 2, 3, 4, 5, 6, 7, 36, 37, 100, 164] {
            let mut w = J2kBitWriter::new();
            write_pass_count(&mut w, n);
            let bytes = w.finish();
            let mut r = J2kBitReader::new(&bytes);
            assert_eq!(read_pass_count(&mut r).unwrap(), n, "n={n}");
        }
    }

    #[test]
    fn test_empty_packet_is_one_byte() {
        let resolution = single_band_resolution(2);
        let mut enc_state = PrecinctState::new(&resolution);
        let contributions = vec![vec![None, None]];
        let packet = write_packet(&mut enc_state, &resolution, 0, &contributions).unwrap();
        assert_eq!(packet.len(), 1);

        let mut dec_state = PrecinctState::new(&resolution);
        let header = read_packet_header(&mut dec_state, &resolution, 0, &packet).unwrap();
        assert!(header.empty);
        assert_eq!(header.header_len, 1);
    }

    #[test]
    fn test_single_block_single_layer() {
        let resolution = single_band_resolution(1);
        let mut enc_state = PrecinctState::new(&resolution);
        enc_state.seed_encoder(0, 0, 0, Some(0), 3);
        let seg: Vec<u8> = vec![0xAB; 17];
        let contributions = vec![vec![Some(BlockContribution {
            segments: vec![&seg, &seg],
            zero_bit_planes: 3,
        })]];
        let packet = write_packet(&mut enc_state, &resolution, 0, &contributions).unwrap();

        let mut dec_state = PrecinctState::new(&resolution);
        let header = read_packet_header(&mut dec_state, &resolution, 0, &packet).unwrap();
        assert!(!header.empty);
        assert_eq!(header.blocks.len(), 1);
        let info = &header.blocks[0];
        assert!(info.first_inclusion);
        assert_eq!(info.zero_bit_planes, 3);
        assert_eq!(info.segment_lengths, vec![17, 17]);
        // Body begins right after the header and holds both segments.
        assert_eq!(packet.len() - header.header_len, 34);
    }

    #[test]
    fn test_two_layers_inclusion_state() {
        let resolution = single_band_resolution(2);
        let mut enc_state = PrecinctState::new(&resolution);
        // Block 0 joins at layer 0; block 1 joins at layer 1.
        enc_state.seed_encoder(0, 0, 0, Some(0), 1);
        enc_state.seed_encoder(0, 1, 0, Some(1), 2);

        let seg0: Vec<u8> = vec![1; 5];
        let seg1: Vec<u8> = vec![2; 300];

        let layer0 = vec![vec![
            Some(BlockContribution {
                segments: vec![&seg0],
                zero_bit_planes: 1,
            }),
            None,
        ]];
        let p0 = write_packet(&mut enc_state, &resolution, 0, &layer0).unwrap();

        let layer1 = vec![vec![
            None,
            Some(BlockContribution {
                segments: vec![&seg1],
                zero_bit_planes: 2,
            }),
        ]];
        let p1 = write_packet(&mut enc_state, &resolution, 1, &layer1).unwrap();

        let mut dec_state = PrecinctState::new(&resolution);
        let h0 = read_packet_header(&mut dec_state, &resolution, 0, &p0).unwrap();
        assert_eq!(h0.blocks.len(), 1);
        assert_eq!(h0.blocks[0].block, 0);
        assert_eq!(h0.blocks[0].segment_lengths, vec![5]);

        let h1 = read_packet_header(&mut dec_state, &resolution, 1, &p1).unwrap();
        assert_eq!(h1.blocks.len(), 1);
        assert_eq!(h1.blocks[0].block, 1);
        assert!(h1.blocks[0].first_inclusion);
        assert_eq!(h1.blocks[0].zero_bit_planes, 2);
        assert_eq!(h1.blocks[0].segment_lengths, vec![300]);
    }

    #[test]
    fn test_block_pausing_between_layers() {
        // A block contributing at layers 0 and 2 but not 1 codes a plain
        // zero bit at layer 1.
        let resolution = single_band_resolution(1);
        let mut enc_state = PrecinctState::new(&resolution);
        enc_state.seed_encoder(0, 0, 0, Some(0), 0);
        let seg: Vec<u8> = vec![9; 3];

        let with = vec![vec![Some(BlockContribution {
            segments: vec![&seg],
            zero_bit_planes: 0,
        })]];
        let without: Vec<Vec<Option<BlockContribution>>> = vec![vec![None]];

        let p0 = write_packet(&mut enc_state, &resolution, 0, &with).unwrap();
        let p1 = write_packet(&mut enc_state, &resolution, 1, &without).unwrap();
        let with2 = vec![vec![Some(BlockContribution {
            segments: vec![&seg],
            zero_bit_planes: 0,
        })]];
        let p2 = write_packet(&mut enc_state, &resolution, 2, &with2).unwrap();

        let mut dec_state = PrecinctState::new(&resolution);
        let h0 = read_packet_header(&mut dec_state, &resolution, 0, &p0).unwrap();
        assert_eq!(h0.blocks.len(), 1);
        let h1 = read_packet_header(&mut dec_state, &resolution, 1, &p1).unwrap();
        assert!(h1.empty);
        let h2 = read_packet_header(&mut dec_state, &resolution, 2, &p2).unwrap();
        assert_eq!(h2.blocks.len(), 1);
        assert!(!h2.blocks[0].first_inclusion);
    }

    #[test]
    fn test_never_included_block() {
        let resolution = single_band_resolution(2);
        let mut enc_state = PrecinctState::new(&resolution);
        enc_state.seed_encoder(0, 0, 0, Some(0), 0);
        // Block 1 never contributes; its tree value stays unset.
        let seg: Vec<u8> = vec![7; 2];
        let contributions = vec![vec![
            Some(BlockContribution {
                segments: vec![&seg],
                zero_bit_planes: 0,
            }),
            None,
        ]];
        let packet = write_packet(&mut enc_state, &resolution, 0, &contributions).unwrap();
        let mut dec_state = PrecinctState::new(&resolution);
        let header = read_packet_header(&mut dec_state, &resolution, 0, &packet).unwrap();
        assert_eq!(header.blocks.len(), 1);
        assert_eq!(header.blocks[0].block, 0);
    }
}
