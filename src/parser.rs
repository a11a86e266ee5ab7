//! Codestream parsing: main header and tile-part headers.
//!
//! The parser walks marker segments (`0xFFxx` + big-endian length) and
//! fills a [`J2kMainHeader`]. Errors carry the byte offset where parsing
//! stopped; the parser never skips ahead silently over malformed
//! segments. Packet bodies are left to the decoder, which slices them
//! out of the tile-part range given by Psot.

use std::convert::TryFrom;

use crate::config::ProgressionOrder;
use crate::error::J2kError;
use crate::headers::{
    J2kAds, J2kCap, J2kCod, J2kComponentInfo, J2kDco, J2kMainHeader, J2kMcc, J2kMco, J2kMct,
    J2kPocEntry, J2kQcd, J2kRgn, J2kSiz, J2kSot,
};
use crate::marker::J2kMarkerCode;
use crate::quantization::{QuantStyle, StepSize};
use crate::stream_reader::J2kStreamReader;

pub struct J2kParser<'a> {
    pub reader: J2kStreamReader<'a>,
    pub header: J2kMainHeader,
}

/// Bounded segment reader: tracks the declared length so over- and
/// under-runs surface as codestream errors.
struct Segment {
    end: usize,
    start_offset: usize,
}

impl Segment {
    fn open(reader: &mut J2kStreamReader) -> Result<Self, J2kError> {
        let start_offset = reader.position();
        let len = reader.read_u16()? as usize;
        if len < 2 {
            return Err(J2kError::codestream(
                start_offset,
                format!("segment length {len} is shorter than the length field"),
            ));
        }
        let end = start_offset + len;
        Ok(Self { end, start_offset })
    }

    fn remaining(&self, reader: &J2kStreamReader) -> usize {
        self.end.saturating_sub(reader.position())
    }

    fn close(&self, reader: &mut J2kStreamReader) -> Result<(), J2kError> {
        if reader.position() > self.end {
            return Err(J2kError::codestream(
                self.start_offset,
                "segment payload overruns its length field".to_string(),
            ));
        }
        if reader.position() < self.end {
            return Err(J2kError::codestream(
                self.start_offset,
                "segment payload shorter than its length field".to_string(),
            ));
        }
        Ok(())
    }
}

impl<'a> J2kParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: J2kStreamReader::new(data),
            header: J2kMainHeader::default(),
        }
    }

    fn read_marker(&mut self) -> Result<J2kMarkerCode, J2kError> {
        let offset = self.reader.position();
        let code = self.reader.read_u16()?;
        J2kMarkerCode::try_from(code)
            .map_err(|_| J2kError::codestream(offset, format!("unknown marker 0x{code:04X}")))
    }

    fn component_index(&mut self) -> Result<u16, J2kError> {
        if self.header.siz.components.len() < 257 {
            Ok(self.reader.read_u8()? as u16)
        } else {
            self.reader.read_u16()
        }
    }

    /// Parse SOC through the main header, stopping with the reader
    /// positioned at the first SOT marker.
    pub fn parse_main_header(&mut self) -> Result<(), J2kError> {
        let offset = self.reader.position();
        let soc = self.reader.read_u16()?;
        if soc != J2kMarkerCode::StartOfCodestream as u16 {
            return Err(J2kError::codestream(
                offset,
                format!("expected SOC, found 0x{soc:04X}"),
            ));
        }

        let mut seen_siz = false;
        loop {
            let marker_offset = self.reader.position();
            let marker = self.read_marker()?;
            if marker != J2kMarkerCode::ImageAndTileSize && !seen_siz {
                return Err(J2kError::codestream(
                    marker_offset,
                    format!("SIZ must follow SOC, found {marker:?}"),
                ));
            }
            match marker {
                J2kMarkerCode::ImageAndTileSize => {
                    if seen_siz {
                        return Err(J2kError::codestream(marker_offset, "duplicate SIZ".to_string()));
                    }
                    self.parse_siz()?;
                    seen_siz = true;
                }
                J2kMarkerCode::Capability => {
                    if self.header.cod.is_some() {
                        return Err(J2kError::codestream(
                            marker_offset,
                            "CAP must precede COD".to_string(),
                        ));
                    }
                    self.parse_cap()?;
                }
                J2kMarkerCode::CodingStyleDefault => {
                    let cod = self.parse_cod_like()?;
                    self.header.cod = Some(cod);
                }
                J2kMarkerCode::CodingStyleComponent => {
                    let (component, cod) = self.parse_coc()?;
                    self.header.coc.push((component, cod));
                }
                J2kMarkerCode::QuantizationDefault => {
                    let qcd = self.parse_qcd_like()?;
                    self.header.qcd = Some(qcd);
                }
                J2kMarkerCode::QuantizationComponent => {
                    let (component, qcd) = self.parse_qcc()?;
                    self.header.qcc.push((component, qcd));
                }
                J2kMarkerCode::RegionOfInterest => self.parse_rgn()?,
                J2kMarkerCode::ProgressionOrderChange => self.parse_poc()?,
                J2kMarkerCode::DcOffset => self.parse_dco()?,
                J2kMarkerCode::ArbitraryDecompositionStyle => self.parse_ads()?,
                J2kMarkerCode::MultiComponentTransform => self.parse_mct()?,
                J2kMarkerCode::MultiComponentCollection => self.parse_mcc()?,
                J2kMarkerCode::MultiComponentOrdering => self.parse_mco()?,
                J2kMarkerCode::ArbitraryTransformationKernel => self.parse_atk()?,
                J2kMarkerCode::Comment => self.parse_com()?,
                J2kMarkerCode::StartOfTile => {
                    if self.header.cod.is_none() {
                        return Err(J2kError::codestream(
                            marker_offset,
                            "main header ended without COD".to_string(),
                        ));
                    }
                    if self.header.qcd.is_none() {
                        return Err(J2kError::codestream(
                            marker_offset,
                            "main header ended without QCD".to_string(),
                        ));
                    }
                    // Leave the SOT for the tile loop.
                    self.reader.seek(marker_offset)?;
                    return Ok(());
                }
                J2kMarkerCode::EndOfCodestream => {
                    return Err(J2kError::codestream(
                        marker_offset,
                        "EOC before any tile-part".to_string(),
                    ));
                }
                J2kMarkerCode::StartOfCodestream | J2kMarkerCode::StartOfData => {
                    return Err(J2kError::codestream(
                        marker_offset,
                        format!("{marker:?} is not valid in the main header"),
                    ));
                }
            }
        }
    }

    fn parse_siz(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let _rsiz = self.reader.read_u16()?;
        let mut siz = J2kSiz {
            width: self.reader.read_u32()?,
            height: self.reader.read_u32()?,
            x_origin: self.reader.read_u32()?,
            y_origin: self.reader.read_u32()?,
            tile_width: self.reader.read_u32()?,
            tile_height: self.reader.read_u32()?,
            tile_x_origin: self.reader.read_u32()?,
            tile_y_origin: self.reader.read_u32()?,
            components: Vec::new(),
        };
        let offset = segment.start_offset;
        if siz.width == 0 || siz.height == 0 {
            return Err(J2kError::codestream(offset, "SIZ image size is zero".to_string()));
        }
        if siz.x_origin != 0 || siz.y_origin != 0 || siz.tile_x_origin != 0 || siz.tile_y_origin != 0 {
            return Err(J2kError::codestream(
                offset,
                "non-zero canvas origins are not supported".to_string(),
            ));
        }
        if siz.tile_width == 0 || siz.tile_height == 0 {
            return Err(J2kError::codestream(offset, "SIZ tile size is zero".to_string()));
        }
        let count = self.reader.read_u16()?;
        if count == 0 {
            return Err(J2kError::codestream(offset, "SIZ declares no components".to_string()));
        }
        for _ in 0..count {
            let ssiz = self.reader.read_u8()?;
            let sub_x = self.reader.read_u8()?;
            let sub_y = self.reader.read_u8()?;
            if sub_x == 0 || sub_y == 0 {
                return Err(J2kError::codestream(
                    offset,
                    "component subsampling factor is zero".to_string(),
                ));
            }
            siz.components.push(J2kComponentInfo {
                depth: (ssiz & 0x7F) + 1,
                signed: ssiz & 0x80 != 0,
                sub_x,
                sub_y,
            });
        }
        segment.close(&mut self.reader)?;
        log::debug!(
            "SIZ {}x{}, {} components, tiles {}x{}",
            siz.width,
            siz.height,
            siz.components.len(),
            siz.tile_width,
            siz.tile_height
        );
        self.header.siz = siz;
        Ok(())
    }

    fn parse_cod_like(&mut self) -> Result<J2kCod, J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let coding_style = self.reader.read_u8()?;
        let cod = self.parse_cod_body(&segment, coding_style)?;
        segment.close(&mut self.reader)?;
        Ok(cod)
    }

    fn parse_cod_body(&mut self, segment: &Segment, coding_style: u8) -> Result<J2kCod, J2kError> {
        let order_byte = self.reader.read_u8()?;
        let progression_order = ProgressionOrder::from_u8(order_byte).ok_or_else(|| {
            J2kError::codestream(
                segment.start_offset,
                format!("unknown progression order {order_byte}"),
            )
        })?;
        let layers = self.reader.read_u16()?;
        if layers == 0 {
            return Err(J2kError::codestream(
                segment.start_offset,
                "COD declares zero layers".to_string(),
            ));
        }
        let mct = self.reader.read_u8()?;
        let decomposition_levels = self.reader.read_u8()?;
        if decomposition_levels > 32 {
            return Err(J2kError::codestream(
                segment.start_offset,
                format!("decomposition level count {decomposition_levels} out of range"),
            ));
        }
        let cb_width_exp = self.reader.read_u8()?;
        let cb_height_exp = self.reader.read_u8()?;
        if cb_width_exp > 4 || cb_height_exp > 4 || cb_width_exp + cb_height_exp > 8 {
            return Err(J2kError::codestream(
                segment.start_offset,
                "code-block exponents out of range".to_string(),
            ));
        }
        let cb_style = self.reader.read_u8()?;
        let transform = self.reader.read_u8()?;
        let mut precinct_sizes = Vec::new();
        if coding_style & crate::headers::SCOD_PRECINCTS_DEFINED != 0 {
            for _ in 0..=decomposition_levels {
                precinct_sizes.push(self.reader.read_u8()?);
            }
        }
        Ok(J2kCod {
            coding_style,
            progression_order,
            layers,
            mct,
            decomposition_levels,
            cb_width_exp,
            cb_height_exp,
            cb_style,
            transform,
            precinct_sizes,
        })
    }

    fn parse_coc(&mut self) -> Result<(u16, J2kCod), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let component = self.component_index()?;
        let coding_style = self.reader.read_u8()?;
        let cod = self.parse_cod_body(&segment, coding_style)?;
        segment.close(&mut self.reader)?;
        Ok((component, cod))
    }

    fn parse_qcd_like(&mut self) -> Result<J2kQcd, J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let qcd = self.parse_qcd_body(&segment)?;
        segment.close(&mut self.reader)?;
        Ok(qcd)
    }

    fn parse_qcd_body(&mut self, segment: &Segment) -> Result<J2kQcd, J2kError> {
        let sqcd = self.reader.read_u8()?;
        let (style, guard_bits) = QuantStyle::from_sqcd(sqcd).ok_or_else(|| {
            J2kError::codestream(
                segment.start_offset,
                format!("unknown quantization style 0x{sqcd:02X}"),
            )
        })?;
        let mut step_sizes = Vec::new();
        let entry_len = match style {
            QuantStyle::None => 1,
            _ => 2,
        };
        while segment.remaining(&self.reader) >= entry_len {
            let step = match style {
                QuantStyle::None => StepSize::from_u8(self.reader.read_u8()?),
                _ => StepSize::from_u16(self.reader.read_u16()?),
            };
            step_sizes.push(step);
        }
        if step_sizes.is_empty() {
            return Err(J2kError::codestream(
                segment.start_offset,
                "quantization segment carries no step sizes".to_string(),
            ));
        }
        Ok(J2kQcd {
            style,
            guard_bits,
            step_sizes,
        })
    }

    fn parse_qcc(&mut self) -> Result<(u16, J2kQcd), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let component = self.component_index()?;
        let qcd = self.parse_qcd_body(&segment)?;
        segment.close(&mut self.reader)?;
        Ok((component, qcd))
    }

    fn parse_cap(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let pcap = self.reader.read_u32()?;
        let mut ccap = Vec::new();
        while segment.remaining(&self.reader) >= 2 {
            ccap.push(self.reader.read_u16()?);
        }
        segment.close(&mut self.reader)?;
        self.header.cap = Some(J2kCap { pcap, ccap });
        Ok(())
    }

    fn parse_rgn(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let component = self.component_index()?;
        let style = self.reader.read_u8()?;
        let shift = self.reader.read_u8()?;
        segment.close(&mut self.reader)?;
        self.header.rgn.push(J2kRgn {
            component,
            style,
            shift,
        });
        Ok(())
    }

    fn parse_poc(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        while segment.remaining(&self.reader) > 0 {
            let resolution_start = self.reader.read_u8()?;
            let component_start = self.component_index()?;
            let layer_end = self.reader.read_u16()?;
            let resolution_end = self.reader.read_u8()?;
            let component_end = self.component_index()?;
            let order_byte = self.reader.read_u8()?;
            let order = ProgressionOrder::from_u8(order_byte).ok_or_else(|| {
                J2kError::codestream(
                    segment.start_offset,
                    format!("unknown POC progression order {order_byte}"),
                )
            })?;
            self.header.poc.push(J2kPocEntry {
                resolution_start,
                component_start,
                layer_end,
                resolution_end,
                component_end,
                order,
            });
        }
        segment.close(&mut self.reader)?;
        Ok(())
    }

    fn parse_dco(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let sdco = self.reader.read_u8()?;
        if sdco != 0 {
            return Err(J2kError::codestream(
                segment.start_offset,
                format!("unsupported DCO style {sdco}"),
            ));
        }
        let mut offsets = Vec::new();
        while segment.remaining(&self.reader) >= 4 {
            offsets.push(self.reader.read_u32()? as i32);
        }
        segment.close(&mut self.reader)?;
        self.header.dco = Some(J2kDco { offsets });
        Ok(())
    }

    fn parse_ads(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let horizontal_levels = self.reader.read_u8()?;
        let vertical_levels = self.reader.read_u8()?;
        let mask_count = self.reader.read_u8()? as usize;
        let mut packet_masks = Vec::with_capacity(mask_count);
        for _ in 0..mask_count {
            packet_masks.push(self.reader.read_u8()?);
        }
        segment.close(&mut self.reader)?;
        self.header.ads = Some(J2kAds {
            horizontal_levels,
            vertical_levels,
            packet_masks,
        });
        Ok(())
    }

    fn parse_mct(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let index = self.reader.read_u8()?;
        let smct = self.reader.read_u8()?;
        if smct != 0 {
            return Err(J2kError::codestream(
                segment.start_offset,
                format!("unsupported MCT element type {smct}"),
            ));
        }
        let count = self.reader.read_u16()? as usize;
        let mut matrix = Vec::with_capacity(count);
        for _ in 0..count {
            matrix.push(self.reader.read_f32()?);
        }
        segment.close(&mut self.reader)?;
        self.header.mct.push(J2kMct { index, matrix });
        Ok(())
    }

    fn parse_mcc(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let index = self.reader.read_u8()?;
        let mct_index = self.reader.read_u8()?;
        let count = self.reader.read_u16()? as usize;
        let mut components = Vec::with_capacity(count);
        for _ in 0..count {
            components.push(self.reader.read_u16()?);
        }
        segment.close(&mut self.reader)?;
        self.header.mcc.push(J2kMcc {
            index,
            mct_index,
            components,
        });
        Ok(())
    }

    fn parse_mco(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let count = self.reader.read_u8()? as usize;
        let mut collections = Vec::with_capacity(count);
        for _ in 0..count {
            collections.push(self.reader.read_u8()?);
        }
        segment.close(&mut self.reader)?;
        self.header.mco = Some(J2kMco { collections });
        Ok(())
    }

    fn parse_atk(&mut self) -> Result<(), J2kError> {
        use crate::dwt::kernel::{
            ArbitraryKernel, IntLift, KernelSpec, LiftStep, LiftTarget, SymmetryClass,
            WaveletKernel,
        };
        let segment = Segment::open(&mut self.reader)?;
        let satk = self.reader.read_u8()?;
        let taps_form = satk & 0x01 != 0;
        let reversible = satk & 0x02 != 0;
        let spec = if taps_form {
            let mut filters: Vec<Vec<f32>> = Vec::with_capacity(4);
            for _ in 0..4 {
                let len = self.reader.read_u16()? as usize;
                let mut taps = Vec::with_capacity(len);
                for _ in 0..len {
                    taps.push(self.reader.read_f32()?);
                }
                filters.push(taps);
            }
            let low_scale = self.reader.read_f32()?;
            let high_scale = self.reader.read_f32()?;
            let symmetry = match self.reader.read_u8()? {
                0 => SymmetryClass::WholeSample,
                1 => SymmetryClass::HalfSample,
                _ => SymmetryClass::None,
            };
            let mut it = filters.into_iter();
            KernelSpec::Taps {
                analysis_low: it.next().expect("four filters"),
                analysis_high: it.next().expect("four filters"),
                synthesis_low: it.next().expect("four filters"),
                synthesis_high: it.next().expect("four filters"),
                low_scale,
                high_scale,
                reversible,
                symmetry,
            }
        } else {
            let count = self.reader.read_u8()? as usize;
            let mut steps = Vec::with_capacity(count);
            for _ in 0..count {
                let target = if self.reader.read_u8()? == 0 {
                    LiftTarget::Even
                } else {
                    LiftTarget::Odd
                };
                let weight = self.reader.read_f32()?;
                let rounding = if self.reader.read_u8()? != 0 {
                    Some(IntLift {
                        numerator: self.reader.read_u32()? as i32,
                        offset: self.reader.read_u32()? as i32,
                        shift: self.reader.read_u8()? as u32,
                        negate: self.reader.read_u8()? != 0,
                    })
                } else {
                    None
                };
                steps.push(LiftStep {
                    target,
                    weight,
                    rounding,
                });
            }
            let low_scale = self.reader.read_f32()?;
            let high_scale = self.reader.read_f32()?;
            KernelSpec::Lifting {
                steps,
                low_scale,
                high_scale,
                reversible,
                symmetry: SymmetryClass::WholeSample,
            }
        };
        segment.close(&mut self.reader)?;
        let kernel = WaveletKernel::Arbitrary(ArbitraryKernel {
            name: "atk".to_string(),
            spec,
        });
        kernel.validate().map_err(|e| {
            J2kError::codestream(segment.start_offset, format!("invalid ATK kernel: {e}"))
        })?;
        self.header.atk = Some(kernel);
        Ok(())
    }

    fn parse_com(&mut self) -> Result<(), J2kError> {
        let segment = Segment::open(&mut self.reader)?;
        let _registration = self.reader.read_u16()?;
        let len = segment.remaining(&self.reader);
        let bytes = self.reader.read_bytes(len)?;
        self.header
            .comments
            .push(String::from_utf8_lossy(bytes).into_owned());
        segment.close(&mut self.reader)?;
        Ok(())
    }

    /// Parse one tile-part header: SOT segment, any tile-part marker
    /// segments, through SOD. The reader lands on the first packet byte.
    pub fn parse_tile_part_header(&mut self) -> Result<J2kSot, J2kError> {
        let sot_offset = self.reader.position();
        let marker = self.read_marker()?;
        if marker != J2kMarkerCode::StartOfTile {
            return Err(J2kError::codestream(
                sot_offset,
                format!("expected SOT, found {marker:?}"),
            ));
        }
        let segment = Segment::open(&mut self.reader)?;
        let sot = J2kSot {
            tile_index: self.reader.read_u16()?,
            tile_part_length: self.reader.read_u32()?,
            tile_part_index: self.reader.read_u8()?,
            tile_part_count: self.reader.read_u8()?,
        };
        segment.close(&mut self.reader)?;
        if sot.tile_index as u32 >= self.header.siz.tile_count() {
            return Err(J2kError::codestream(
                sot_offset,
                format!(
                    "tile index {} exceeds the {} tiles in SIZ",
                    sot.tile_index,
                    self.header.siz.tile_count()
                ),
            ));
        }

        loop {
            let marker_offset = self.reader.position();
            let marker = self.read_marker()?;
            match marker {
                J2kMarkerCode::StartOfData => break,
                J2kMarkerCode::CodingStyleDefault => {
                    let cod = self.parse_cod_like()?;
                    self.header.cod = Some(cod);
                }
                J2kMarkerCode::QuantizationDefault => {
                    let qcd = self.parse_qcd_like()?;
                    self.header.qcd = Some(qcd);
                }
                J2kMarkerCode::Comment => self.parse_com()?,
                other => {
                    return Err(J2kError::codestream(
                        marker_offset,
                        format!("{other:?} is not valid in a tile-part header"),
                    ));
                }
            }
        }
        Ok(sot)
    }

    /// Peek the next marker without consuming it.
    pub fn peek_marker(&mut self) -> Result<J2kMarkerCode, J2kError> {
        let offset = self.reader.position();
        let code = self.reader.peek_u16()?;
        J2kMarkerCode::try_from(code)
            .map_err(|_| J2kError::codestream(offset, format!("unknown marker 0x{code:04X}")))
    }
}

/// Scan the main header only: true iff a CAP marker declaring Part-15
/// appears before the first SOT. Never reads beyond the first SOT.
pub fn is_htj2k(data: &[u8]) -> Result<bool, J2kError> {
    let mut reader = J2kStreamReader::new(data);
    let offset = reader.position();
    if reader.read_u16()? != J2kMarkerCode::StartOfCodestream as u16 {
        return Err(J2kError::codestream(offset, "expected SOC".to_string()));
    }
    loop {
        let marker_offset = reader.position();
        let code = reader.read_u16()?;
        let Ok(marker) = J2kMarkerCode::try_from(code) else {
            return Err(J2kError::codestream(
                marker_offset,
                format!("unknown marker 0x{code:04X}"),
            ));
        };
        match marker {
            J2kMarkerCode::StartOfTile | J2kMarkerCode::EndOfCodestream => return Ok(false),
            J2kMarkerCode::Capability => {
                let len = reader.read_u16()? as usize;
                if len < 6 {
                    return Err(J2kError::codestream(marker_offset, "CAP too short".to_string()));
                }
                let pcap = reader.read_u32()?;
                return Ok(pcap & crate::headers::PCAP_HTJ2K_BIT != 0);
            }
            _ if marker.has_segment() => {
                let len = reader.read_u16()? as usize;
                reader.skip(len.saturating_sub(2))?;
            }
            _ => {
                return Err(J2kError::codestream(
                    marker_offset,
                    format!("{marker:?} is not valid in the main header"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_main_header() -> Vec<u8> {
        let mut data = vec![
            0xFF, 0x4F, // SOC
            0xFF, 0x51, // SIZ
            0x00, 0x29, // Lsiz = 41
            0x00, 0x00, // Rsiz
            0x00, 0x00, 0x01, 0x00, // width 256
            0x00, 0x00, 0x01, 0x00, // height 256
            0x00, 0x00, 0x00, 0x00, // XOsiz
            0x00, 0x00, 0x00, 0x00, // YOsiz
            0x00, 0x00, 0x01, 0x00, // tile width 256
            0x00, 0x00, 0x01, 0x00, // tile height 256
            0x00, 0x00, 0x00, 0x00, // XTOsiz
            0x00, 0x00, 0x00, 0x00, // YTOsiz
            0x00, 0x01, // one component
            0x07, 0x01, 0x01, // 8-bit unsigned, 1x1
        ];
        data.extend_from_slice(&[
            0xFF, 0x52, // COD
            0x00, 0x0C, // Lcod = 12
            0x00, // Scod
            0x00, // LRCP
            0x00, 0x01, // one layer
            0x00, // no MCT
            0x05, // five levels
            0x04, 0x04, // 64x64 code-blocks
            0x04, // TERMALL
            0x01, // 5/3
        ]);
        data.extend_from_slice(&[
            0xFF, 0x5C, // QCD
            0x00, 0x13, // Lqcd = 19 (style + 16 u8 steps)
            0x40, // no quantization, 2 guard bits
        ]);
        for _ in 0..16 {
            data.push(9 << 3);
        }
        data
    }

    #[test]
    fn test_parse_minimal_main_header() {
        let mut data = minimal_main_header();
        data.extend_from_slice(&[0xFF, 0x90]); // SOT
        let mut parser = J2kParser::new(&data);
        parser.parse_main_header().unwrap();
        assert_eq!(parser.header.siz.width, 256);
        assert_eq!(parser.header.siz.components.len(), 1);
        let cod = parser.header.cod().unwrap();
        assert_eq!(cod.layers, 1);
        assert_eq!(cod.decomposition_levels, 5);
        assert_eq!(cod.code_block_width(), 64);
        let qcd = parser.header.qcd().unwrap();
        assert_eq!(qcd.guard_bits, 2);
        assert_eq!(qcd.step_sizes.len(), 16);
        // The reader sits on the SOT marker.
        assert_eq!(parser.reader.peek_u16().unwrap(), 0xFF90);
    }

    #[test]
    fn test_missing_soc_fails_at_offset_zero() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFE];
        let mut parser = J2kParser::new(&data);
        match parser.parse_main_header() {
            Err(J2kError::InvalidCodestream { offset, .. }) => assert_eq!(offset, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_is_truncated() {
        let mut parser = J2kParser::new(&[]);
        assert_eq!(parser.parse_main_header(), Err(J2kError::Truncated));
    }

    #[test]
    fn test_truncated_siz() {
        let data = minimal_main_header();
        let mut parser = J2kParser::new(&data[..10]);
        assert_eq!(parser.parse_main_header(), Err(J2kError::Truncated));
    }

    #[test]
    fn test_duplicate_siz_rejected() {
        let mut data = minimal_main_header();
        let siz_again = minimal_main_header()[2..45].to_vec();
        data.extend_from_slice(&siz_again);
        let mut parser = J2kParser::new(&data);
        let err = parser.parse_main_header().unwrap_err();
        assert!(matches!(err, J2kError::InvalidCodestream { .. }));
    }

    #[test]
    fn test_main_header_requires_cod_and_qcd() {
        let mut data = minimal_main_header();
        // Strip COD and QCD: keep SOC+SIZ then go straight to SOT.
        data.truncate(2 + 2 + 41);
        data.extend_from_slice(&[0xFF, 0x90]);
        let mut parser = J2kParser::new(&data);
        let err = parser.parse_main_header().unwrap_err();
        assert!(err.to_string().contains("COD"), "{err}");
    }

    #[test]
    fn test_is_htj2k_predicate() {
        let mut plain = minimal_main_header();
        plain.extend_from_slice(&[0xFF, 0x90]);
        assert!(!is_htj2k(&plain).unwrap());

        // Insert a CAP (Pcap with bit 14, one Ccap entry) right after SIZ.
        let mut with_cap = Vec::new();
        with_cap.extend_from_slice(&plain[..45]);
        with_cap.extend_from_slice(&[0xFF, 0x50, 0x00, 0x08, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00]);
        with_cap.extend_from_slice(&plain[45..]);
        assert!(is_htj2k(&with_cap).unwrap());

        assert!(is_htj2k(&[]).is_err());
        assert!(is_htj2k(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn test_parse_tile_part_header() {
        let mut data = minimal_main_header();
        data.extend_from_slice(&[
            0xFF, 0x90, // SOT
            0x00, 0x0A, // Lsot
            0x00, 0x00, // Isot
            0x00, 0x00, 0x00, 0x20, // Psot = 32
            0x00, // TPsot
            0x01, // TNsot
            0xFF, 0x93, // SOD
        ]);
        let mut parser = J2kParser::new(&data);
        parser.parse_main_header().unwrap();
        let sot = parser.parse_tile_part_header().unwrap();
        assert_eq!(sot.tile_index, 0);
        assert_eq!(sot.tile_part_length, 32);
        assert_eq!(sot.tile_part_count, 1);
    }

    #[test]
    fn test_bad_segment_length() {
        let mut data = vec![0xFF, 0x4F, 0xFF, 0x51, 0x00, 0x01];
        data.extend_from_slice(&[0u8; 40]);
        let mut parser = J2kParser::new(&data);
        let err = parser.parse_main_header().unwrap_err();
        assert!(matches!(err, J2kError::InvalidCodestream { offset: 4, .. }), "{err:?}");
    }
}
