//! Marker-segment serialisation.
//!
//! One `write_*` per segment, each emitting the marker, the 2-byte
//! length (payload + 2) and the payload, in the exact wire form the
//! parser reads back.

use crate::error::J2kError;
use crate::headers::{
    J2kAds, J2kCap, J2kCod, J2kDco, J2kMcc, J2kMco, J2kMct, J2kPocEntry, J2kQcd, J2kRgn, J2kSiz,
    J2kSot,
};
use crate::marker::J2kMarkerCode;
use crate::quantization::QuantStyle;
use crate::stream_writer::J2kStreamWriter;

pub struct J2kWriter {
    pub out: J2kStreamWriter,
    component_count: usize,
}

impl J2kWriter {
    pub fn new(component_count: usize) -> Self {
        Self {
            out: J2kStreamWriter::new(),
            component_count,
        }
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }

    fn write_component_index(&mut self, component: u16) {
        if self.component_count < 257 {
            self.out.write_u8(component as u8);
        } else {
            self.out.write_u16(component);
        }
    }

    fn component_index_len(&self) -> usize {
        if self.component_count < 257 {
            1
        } else {
            2
        }
    }

    pub fn write_soc(&mut self) {
        self.out.write_marker(J2kMarkerCode::StartOfCodestream);
    }

    pub fn write_eoc(&mut self) {
        self.out.write_marker(J2kMarkerCode::EndOfCodestream);
    }

    pub fn write_siz(&mut self, siz: &J2kSiz) {
        self.out.write_marker(J2kMarkerCode::ImageAndTileSize);
        self.out.write_u16(38 + 3 * siz.components.len() as u16);
        self.out.write_u16(0); // Rsiz
        self.out.write_u32(siz.width);
        self.out.write_u32(siz.height);
        self.out.write_u32(siz.x_origin);
        self.out.write_u32(siz.y_origin);
        self.out.write_u32(siz.tile_width);
        self.out.write_u32(siz.tile_height);
        self.out.write_u32(siz.tile_x_origin);
        self.out.write_u32(siz.tile_y_origin);
        self.out.write_u16(siz.components.len() as u16);
        for comp in &siz.components {
            let mut ssiz = comp.depth - 1;
            if comp.signed {
                ssiz |= 0x80;
            }
            self.out.write_u8(ssiz);
            self.out.write_u8(comp.sub_x);
            self.out.write_u8(comp.sub_y);
        }
    }

    fn cod_body_len(cod: &J2kCod) -> u16 {
        10 + if cod.coding_style & crate::headers::SCOD_PRECINCTS_DEFINED != 0 {
            cod.decomposition_levels as u16 + 1
        } else {
            0
        }
    }

    fn write_cod_body(&mut self, cod: &J2kCod) {
        self.out.write_u8(cod.progression_order as u8);
        self.out.write_u16(cod.layers);
        self.out.write_u8(cod.mct);
        self.out.write_u8(cod.decomposition_levels);
        self.out.write_u8(cod.cb_width_exp);
        self.out.write_u8(cod.cb_height_exp);
        self.out.write_u8(cod.cb_style);
        self.out.write_u8(cod.transform);
        if cod.coding_style & crate::headers::SCOD_PRECINCTS_DEFINED != 0 {
            for &p in &cod.precinct_sizes {
                self.out.write_u8(p);
            }
        }
    }

    pub fn write_cod(&mut self, cod: &J2kCod) {
        self.out.write_marker(J2kMarkerCode::CodingStyleDefault);
        self.out.write_u16(2 + Self::cod_body_len(cod));
        self.out.write_u8(cod.coding_style);
        self.write_cod_body(cod);
    }

    pub fn write_coc(&mut self, component: u16, cod: &J2kCod) {
        self.out.write_marker(J2kMarkerCode::CodingStyleComponent);
        self.out
            .write_u16(2 + self.component_index_len() as u16 + Self::cod_body_len(cod));
        self.write_component_index(component);
        self.out.write_u8(cod.coding_style);
        self.write_cod_body(cod);
    }

    fn qcd_body_len(qcd: &J2kQcd) -> u16 {
        let entry = match qcd.style {
            QuantStyle::None => 1,
            _ => 2,
        };
        1 + entry * qcd.step_sizes.len() as u16
    }

    fn write_qcd_body(&mut self, qcd: &J2kQcd) {
        self.out.write_u8(qcd.style.to_sqcd(qcd.guard_bits));
        for step in &qcd.step_sizes {
            match qcd.style {
                QuantStyle::None => self.out.write_u8(step.to_u8()),
                _ => self.out.write_u16(step.to_u16()),
            }
        }
    }

    pub fn write_qcd(&mut self, qcd: &J2kQcd) {
        self.out.write_marker(J2kMarkerCode::QuantizationDefault);
        self.out.write_u16(2 + Self::qcd_body_len(qcd));
        self.write_qcd_body(qcd);
    }

    pub fn write_qcc(&mut self, component: u16, qcd: &J2kQcd) {
        self.out.write_marker(J2kMarkerCode::QuantizationComponent);
        self.out
            .write_u16(2 + self.component_index_len() as u16 + Self::qcd_body_len(qcd));
        self.write_component_index(component);
        self.write_qcd_body(qcd);
    }

    pub fn write_cap(&mut self, cap: &J2kCap) {
        self.out.write_marker(J2kMarkerCode::Capability);
        self.out.write_u16(6 + 2 * cap.ccap.len() as u16);
        self.out.write_u32(cap.pcap);
        for &c in &cap.ccap {
            self.out.write_u16(c);
        }
    }

    pub fn write_rgn(&mut self, rgn: &J2kRgn) {
        self.out.write_marker(J2kMarkerCode::RegionOfInterest);
        self.out
            .write_u16(2 + self.component_index_len() as u16 + 2);
        self.write_component_index(rgn.component);
        self.out.write_u8(rgn.style);
        self.out.write_u8(rgn.shift);
    }

    pub fn write_poc(&mut self, entries: &[J2kPocEntry]) {
        self.out.write_marker(J2kMarkerCode::ProgressionOrderChange);
        let entry_len = 5 + 2 * self.component_index_len() as u16;
        self.out.write_u16(2 + entry_len * entries.len() as u16);
        for entry in entries {
            self.out.write_u8(entry.resolution_start);
            self.write_component_index(entry.component_start);
            self.out.write_u16(entry.layer_end);
            self.out.write_u8(entry.resolution_end);
            self.write_component_index(entry.component_end);
            self.out.write_u8(entry.order as u8);
        }
    }

    pub fn write_dco(&mut self, dco: &J2kDco) {
        self.out.write_marker(J2kMarkerCode::DcOffset);
        self.out.write_u16(3 + 4 * dco.offsets.len() as u16);
        self.out.write_u8(0); // integer offsets
        for &offset in &dco.offsets {
            self.out.write_u32(offset as u32);
        }
    }

    pub fn write_ads(&mut self, ads: &J2kAds) {
        self.out
            .write_marker(J2kMarkerCode::ArbitraryDecompositionStyle);
        self.out.write_u16(5 + ads.packet_masks.len() as u16);
        self.out.write_u8(ads.horizontal_levels);
        self.out.write_u8(ads.vertical_levels);
        self.out.write_u8(ads.packet_masks.len() as u8);
        for &mask in &ads.packet_masks {
            self.out.write_u8(mask);
        }
    }

    pub fn write_mct(&mut self, mct: &J2kMct) {
        self.out.write_marker(J2kMarkerCode::MultiComponentTransform);
        self.out.write_u16(6 + 4 * mct.matrix.len() as u16);
        self.out.write_u8(mct.index);
        self.out.write_u8(0); // f32 decorrelation matrix
        self.out.write_u16(mct.matrix.len() as u16);
        for &v in &mct.matrix {
            self.out.write_f32(v);
        }
    }

    pub fn write_mcc(&mut self, mcc: &J2kMcc) {
        self.out
            .write_marker(J2kMarkerCode::MultiComponentCollection);
        self.out.write_u16(6 + 2 * mcc.components.len() as u16);
        self.out.write_u8(mcc.index);
        self.out.write_u8(mcc.mct_index);
        self.out.write_u16(mcc.components.len() as u16);
        for &c in &mcc.components {
            self.out.write_u16(c);
        }
    }

    pub fn write_mco(&mut self, mco: &J2kMco) {
        self.out.write_marker(J2kMarkerCode::MultiComponentOrdering);
        self.out.write_u16(3 + mco.collections.len() as u16);
        self.out.write_u8(mco.collections.len() as u8);
        for &c in &mco.collections {
            self.out.write_u8(c);
        }
    }

    pub fn write_atk(&mut self, kernel: &crate::dwt::kernel::WaveletKernel) -> Result<(), J2kError> {
        use crate::dwt::kernel::{KernelSpec, LiftTarget, SymmetryClass, WaveletKernel};
        let WaveletKernel::Arbitrary(arb) = kernel else {
            return Err(J2kError::parameter(
                "only arbitrary kernels are signalled through ATK",
            ));
        };
        self.out
            .write_marker(J2kMarkerCode::ArbitraryTransformationKernel);
        match &arb.spec {
            KernelSpec::Lifting {
                steps,
                low_scale,
                high_scale,
                reversible,
                ..
            } => {
                let step_bytes: usize = steps
                    .iter()
                    .map(|s| 6 + if s.rounding.is_some() { 10 } else { 0 })
                    .sum();
                self.out.write_u16((4 + step_bytes + 8) as u16);
                self.out.write_u8(if *reversible { 0x02 } else { 0x00 });
                self.out.write_u8(steps.len() as u8);
                for step in steps {
                    self.out
                        .write_u8(u8::from(step.target == LiftTarget::Odd));
                    self.out.write_f32(step.weight);
                    match &step.rounding {
                        Some(r) => {
                            self.out.write_u8(1);
                            self.out.write_u32(r.numerator as u32);
                            self.out.write_u32(r.offset as u32);
                            self.out.write_u8(r.shift as u8);
                            self.out.write_u8(u8::from(r.negate));
                        }
                        None => self.out.write_u8(0),
                    }
                }
                self.out.write_f32(*low_scale);
                self.out.write_f32(*high_scale);
            }
            KernelSpec::Taps {
                analysis_low,
                analysis_high,
                synthesis_low,
                synthesis_high,
                low_scale,
                high_scale,
                reversible,
                symmetry,
            } => {
                let filters = [analysis_low, analysis_high, synthesis_low, synthesis_high];
                let filter_bytes: usize = filters.iter().map(|f| 2 + 4 * f.len()).sum();
                self.out.write_u16((3 + filter_bytes + 9) as u16);
                self.out
                    .write_u8(0x01 | if *reversible { 0x02 } else { 0x00 });
                for filter in filters {
                    self.out.write_u16(filter.len() as u16);
                    for &t in filter.iter() {
                        self.out.write_f32(t);
                    }
                }
                self.out.write_f32(*low_scale);
                self.out.write_f32(*high_scale);
                self.out.write_u8(match symmetry {
                    SymmetryClass::WholeSample => 0,
                    SymmetryClass::HalfSample => 1,
                    SymmetryClass::None => 2,
                });
            }
        }
        Ok(())
    }

    pub fn write_comment(&mut self, text: &str) -> Result<(), J2kError> {
        let bytes = text.as_bytes();
        if bytes.len() > u16::MAX as usize - 4 {
            return Err(J2kError::parameter("comment too long".to_string()));
        }
        self.out.write_marker(J2kMarkerCode::Comment);
        self.out.write_u16(4 + bytes.len() as u16);
        self.out.write_u16(1); // Latin text registration
        self.out.write_bytes(bytes);
        Ok(())
    }

    /// Write the SOT segment; Psot is back-patched once the tile body is
    /// complete. Returns the byte position of the Psot field.
    pub fn write_sot(&mut self, sot: &J2kSot) -> usize {
        self.out.write_marker(J2kMarkerCode::StartOfTile);
        self.out.write_u16(10);
        self.out.write_u16(sot.tile_index);
        let psot_pos = self.out.len();
        self.out.write_u32(sot.tile_part_length);
        self.out.write_u8(sot.tile_part_index);
        self.out.write_u8(sot.tile_part_count);
        psot_pos
    }

    pub fn write_sod(&mut self) {
        self.out.write_marker(J2kMarkerCode::StartOfData);
    }

    pub fn patch_psot(&mut self, psot_pos: usize, value: u32) {
        self.out.patch_u32(psot_pos, value);
    }
}
