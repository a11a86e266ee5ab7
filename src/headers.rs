//! Parsed marker-segment contents and the assembled main header.

use crate::config::ProgressionOrder;
use crate::dwt::kernel::WaveletKernel;
use crate::error::J2kError;
use crate::quantization::{QuantStyle, StepSize};

/// SIZ component record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct J2kComponentInfo {
    pub depth: u8,
    pub signed: bool,
    pub sub_x: u8,
    pub sub_y: u8,
}

/// SIZ: canvas, tiling and component layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct J2kSiz {
    pub width: u32,
    pub height: u32,
    pub x_origin: u32,
    pub y_origin: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_origin: u32,
    pub tile_y_origin: u32,
    pub components: Vec<J2kComponentInfo>,
}

impl J2kSiz {
    pub fn tiles_across(&self) -> u32 {
        self.width.div_ceil(self.tile_width.max(1))
    }

    pub fn tiles_down(&self) -> u32 {
        self.height.div_ceil(self.tile_height.max(1))
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles_across() * self.tiles_down()
    }
}

// COD coding-style flags (Scod).
pub const SCOD_PRECINCTS_DEFINED: u8 = 0x01;

// Code-block style bits (SPcod).
pub const CBSTYLE_TERMALL: u8 = 0x04;
pub const CBSTYLE_HT: u8 = 0x40;

/// COD / COC coding style.
#[derive(Debug, Clone, PartialEq)]
pub struct J2kCod {
    pub coding_style: u8,
    pub progression_order: ProgressionOrder,
    pub layers: u16,
    /// 0 = none, 1 = standard transform for the wavelet in use.
    pub mct: u8,
    pub decomposition_levels: u8,
    /// Signalled exponent minus two (wire form of xcb/ycb).
    pub cb_width_exp: u8,
    pub cb_height_exp: u8,
    pub cb_style: u8,
    /// 0 = irreversible 9/7, 1 = reversible 5/3.
    pub transform: u8,
    pub precinct_sizes: Vec<u8>,
}

impl Default for J2kCod {
    fn default() -> Self {
        Self {
            coding_style: 0,
            progression_order: ProgressionOrder::Lrcp,
            layers: 1,
            mct: 0,
            decomposition_levels: 5,
            cb_width_exp: 4,
            cb_height_exp: 4,
            cb_style: CBSTYLE_TERMALL,
            transform: 1,
            precinct_sizes: Vec::new(),
        }
    }
}

impl J2kCod {
    pub fn code_block_width(&self) -> u32 {
        1 << (self.cb_width_exp + 2)
    }

    pub fn code_block_height(&self) -> u32 {
        1 << (self.cb_height_exp + 2)
    }

    pub fn uses_ht(&self) -> bool {
        self.cb_style & CBSTYLE_HT != 0
    }

    pub fn set_code_block_size(&mut self, width: u32, height: u32) -> Result<(), J2kError> {
        if !width.is_power_of_two() || !height.is_power_of_two() {
            return Err(J2kError::parameter("code-block sides must be powers of two"));
        }
        if !(4..=64).contains(&width) || !(4..=64).contains(&height) || width * height > 4096 {
            return Err(J2kError::parameter("code-block size out of range"));
        }
        self.cb_width_exp = width.trailing_zeros() as u8 - 2;
        self.cb_height_exp = height.trailing_zeros() as u8 - 2;
        Ok(())
    }
}

/// QCD / QCC quantization record.
#[derive(Debug, Clone, PartialEq)]
pub struct J2kQcd {
    pub style: QuantStyle,
    pub guard_bits: u8,
    pub step_sizes: Vec<StepSize>,
}

impl Default for J2kQcd {
    fn default() -> Self {
        Self {
            style: QuantStyle::None,
            guard_bits: 2,
            step_sizes: Vec::new(),
        }
    }
}

impl J2kQcd {
    /// Step size for subband index `b` (0 = LL, then HL/LH/HH per level,
    /// finest last). The derived style repeats the single signalled
    /// entry scaled by level.
    pub fn step_for_band(&self, band_index: usize) -> Option<StepSize> {
        match self.style {
            QuantStyle::ScalarDerived => self.step_sizes.first().copied(),
            _ => self.step_sizes.get(band_index).copied(),
        }
    }

    /// Magnitude bit-plane bound Mb = guard + exponent - 1.
    pub fn magnitude_bits(&self, band_index: usize) -> Result<u8, J2kError> {
        let step = self.step_for_band(band_index).ok_or_else(|| {
            J2kError::Corrupted(format!("no step size signalled for subband {band_index}"))
        })?;
        Ok((self.guard_bits + step.exponent).saturating_sub(1))
    }
}

/// CAP: extended capabilities. Pcap bit 14 declares Part-15 codestreams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct J2kCap {
    pub pcap: u32,
    pub ccap: Vec<u16>,
}

pub const PCAP_HTJ2K_BIT: u32 = 1 << 14;

impl J2kCap {
    pub fn htj2k() -> Self {
        Self {
            pcap: PCAP_HTJ2K_BIT,
            ccap: vec![0],
        }
    }

    pub fn declares_ht(&self) -> bool {
        self.pcap & PCAP_HTJ2K_BIT != 0
    }
}

/// RGN: ROI scaling shift for one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct J2kRgn {
    pub component: u16,
    pub style: u8,
    pub shift: u8,
}

/// One POC progression range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct J2kPocEntry {
    pub resolution_start: u8,
    pub component_start: u16,
    pub layer_end: u16,
    pub resolution_end: u8,
    pub component_end: u16,
    pub order: ProgressionOrder,
}

/// DCO: per-component DC offsets (Part-2, integer form).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct J2kDco {
    pub offsets: Vec<i32>,
}

/// MCT: decorrelation matrix segment (Part-2).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct J2kMct {
    pub index: u8,
    pub matrix: Vec<f32>,
}

/// MCC: component collection referencing an MCT matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct J2kMcc {
    pub index: u8,
    pub mct_index: u8,
    pub components: Vec<u16>,
}

/// MCO: transform application order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct J2kMco {
    pub collections: Vec<u8>,
}

/// ADS: arbitrary decomposition description (Part-2).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct J2kAds {
    pub horizontal_levels: u8,
    pub vertical_levels: u8,
    pub packet_masks: Vec<u8>,
}

/// SOT fixed payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct J2kSot {
    pub tile_index: u16,
    pub tile_part_length: u32,
    pub tile_part_index: u8,
    pub tile_part_count: u8,
}

/// Everything gathered from the main header.
#[derive(Debug, Clone, Default)]
pub struct J2kMainHeader {
    pub siz: J2kSiz,
    pub cod: Option<J2kCod>,
    pub qcd: Option<J2kQcd>,
    pub cap: Option<J2kCap>,
    pub coc: Vec<(u16, J2kCod)>,
    pub qcc: Vec<(u16, J2kQcd)>,
    pub rgn: Vec<J2kRgn>,
    pub poc: Vec<J2kPocEntry>,
    pub dco: Option<J2kDco>,
    pub mct: Vec<J2kMct>,
    pub mcc: Vec<J2kMcc>,
    pub mco: Option<J2kMco>,
    pub ads: Option<J2kAds>,
    /// Arbitrary wavelet kernel carried by an ATK segment (Part-2).
    pub atk: Option<WaveletKernel>,
    pub comments: Vec<String>,
}

impl J2kMainHeader {
    pub fn cod(&self) -> Result<&J2kCod, J2kError> {
        self.cod
            .as_ref()
            .ok_or_else(|| J2kError::Corrupted("main header is missing COD".to_string()))
    }

    pub fn qcd(&self) -> Result<&J2kQcd, J2kError> {
        self.qcd
            .as_ref()
            .ok_or_else(|| J2kError::Corrupted("main header is missing QCD".to_string()))
    }

    /// COD for a component, honouring a COC override.
    pub fn cod_for(&self, component: u16) -> Result<&J2kCod, J2kError> {
        if let Some((_, coc)) = self.coc.iter().find(|(c, _)| *c == component) {
            return Ok(coc);
        }
        self.cod()
    }

    /// QCD for a component, honouring a QCC override.
    pub fn qcd_for(&self, component: u16) -> Result<&J2kQcd, J2kError> {
        if let Some((_, qcc)) = self.qcc.iter().find(|(c, _)| *c == component) {
            return Ok(qcc);
        }
        self.qcd()
    }

    pub fn is_htj2k(&self) -> bool {
        self.cap.as_ref().is_some_and(J2kCap::declares_ht)
    }

    pub fn roi_shift_for(&self, component: u16) -> u8 {
        self.rgn
            .iter()
            .find(|r| r.component == component)
            .map_or(0, |r| r.shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_block_size_wire_form() {
        let mut cod = J2kCod::default();
        cod.set_code_block_size(32, 16).unwrap();
        assert_eq!(cod.cb_width_exp, 3);
        assert_eq!(cod.cb_height_exp, 2);
        assert_eq!(cod.code_block_width(), 32);
        assert_eq!(cod.code_block_height(), 16);
        assert!(cod.set_code_block_size(128, 4).is_err());
        assert!(cod.set_code_block_size(3, 4).is_err());
    }

    #[test]
    fn test_component_overrides() {
        let mut header = J2kMainHeader {
            cod: Some(J2kCod::default()),
            qcd: Some(J2kQcd::default()),
            ..Default::default()
        };
        let special = J2kCod {
            decomposition_levels: 2,
            ..J2kCod::default()
        };
        header.coc.push((1, special));
        assert_eq!(header.cod_for(0).unwrap().decomposition_levels, 5);
        assert_eq!(header.cod_for(1).unwrap().decomposition_levels, 2);
    }

    #[test]
    fn test_cap_declares_ht() {
        assert!(J2kCap::htj2k().declares_ht());
        assert!(!J2kCap::default().declares_ht());
        let header = J2kMainHeader {
            cap: Some(J2kCap::htj2k()),
            ..Default::default()
        };
        assert!(header.is_htj2k());
    }

    #[test]
    fn test_tile_grid_counts() {
        let siz = J2kSiz {
            width: 100,
            height: 70,
            tile_width: 32,
            tile_height: 32,
            ..Default::default()
        };
        assert_eq!(siz.tiles_across(), 4);
        assert_eq!(siz.tiles_down(), 3);
        assert_eq!(siz.tile_count(), 12);
    }

    #[test]
    fn test_magnitude_bits() {
        let qcd = J2kQcd {
            style: QuantStyle::None,
            guard_bits: 2,
            step_sizes: vec![StepSize::reversible(9)],
        };
        assert_eq!(qcd.magnitude_bits(0).unwrap(), 10);
        assert!(qcd.magnitude_bits(1).is_err());
    }
}
