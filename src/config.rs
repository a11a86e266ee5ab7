//! Encoder configuration, decode options and progress reporting.

use crate::dwt::decompose::DecompositionStructure;
use crate::dwt::kernel::WaveletKernel;
use crate::error::J2kError;
use crate::image::{Image, Region};
use crate::mct::MctMode;
use crate::rate_control::DistortionModel;
use crate::roi::RoiEncodeConfig;

/// Packet sequencing order (the outermost loop index comes first in the
/// name: Layer, Resolution, Component, Position/precinct).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ProgressionOrder {
    #[default]
    Lrcp = 0,
    Rlcp = 1,
    Rpcl = 2,
    Pcrl = 3,
    Cprl = 4,
}

impl ProgressionOrder {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Lrcp),
            1 => Some(Self::Rlcp),
            2 => Some(Self::Rpcl),
            3 => Some(Self::Pcrl),
            4 => Some(Self::Cprl),
            _ => None,
        }
    }
}

/// Encoder parameters. Validation runs before any buffer allocation.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Reversible path (5/3, RCT, identity quantizer).
    pub lossless: bool,
    /// Quality in [0, 1] for the irreversible path.
    pub quality: f32,
    /// Decomposition levels in [0, 10].
    pub decomposition_levels: u8,
    /// Quality layers in [1, 20].
    pub quality_layers: u8,
    pub progression_order: ProgressionOrder,
    /// Tile size (width, height); `None` encodes one tile.
    pub tile_size: Option<(u32, u32)>,
    /// Code-block size (width, height); powers of two, each in 4..=64,
    /// area at most 4096.
    pub code_block_size: (u32, u32),
    /// Use the Part-15 high-throughput block coder.
    pub use_htj2k: bool,
    pub enable_parallel_code_blocks: bool,
    /// Worker threads for block coding / tile transcoding (0 = ask the
    /// host for its parallelism).
    pub max_threads: usize,
    /// Per-component DC offsets (Part-2 DCO); empty means none.
    pub dc_offset: Vec<i32>,
    /// Accept bit depths in 17..=31 (sample storage stays i32).
    pub extended_precision: bool,
    pub mct: MctMode,
    /// Wavelet kernel override; `None` picks 5/3 or 9/7 from `lossless`.
    pub wavelet_kernel: Option<WaveletKernel>,
    /// Decomposition structure; `None` is the dyadic tree.
    pub decomposition_structure: Option<DecompositionStructure>,
    pub roi: Option<RoiEncodeConfig>,
    /// Target rate in bits per pixel; overrides quality-driven layering.
    pub target_bitrate: Option<f32>,
    /// Never exceed the target rate, truncating at pass boundaries.
    pub strict_rate: bool,
    /// Distortion model feeding PCRD.
    pub distortion_model: DistortionModel,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            lossless: true,
            quality: 1.0,
            decomposition_levels: 5,
            quality_layers: 1,
            progression_order: ProgressionOrder::Lrcp,
            tile_size: None,
            code_block_size: (64, 64),
            use_htj2k: false,
            enable_parallel_code_blocks: false,
            max_threads: 0,
            dc_offset: Vec::new(),
            extended_precision: false,
            mct: MctMode::None,
            wavelet_kernel: None,
            decomposition_structure: None,
            roi: None,
            target_bitrate: None,
            strict_rate: false,
            distortion_model: DistortionModel::NormBased,
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self, image: &Image) -> Result<(), J2kError> {
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(J2kError::parameter(format!(
                "quality {} outside [0, 1]",
                self.quality
            )));
        }
        if self.decomposition_levels > 10 {
            return Err(J2kError::parameter(format!(
                "decompositionLevels {} outside [0, 10]",
                self.decomposition_levels
            )));
        }
        if self.quality_layers < 1 || self.quality_layers > 20 {
            return Err(J2kError::parameter(format!(
                "qualityLayers {} outside [1, 20]",
                self.quality_layers
            )));
        }
        let (cbw, cbh) = self.code_block_size;
        if !cbw.is_power_of_two()
            || !cbh.is_power_of_two()
            || !(4..=64).contains(&cbw)
            || !(4..=64).contains(&cbh)
            || cbw * cbh > 4096
        {
            return Err(J2kError::parameter(format!(
                "code-block size {cbw}x{cbh} must be power-of-two sides in 4..=64 with area <= 4096"
            )));
        }
        if let Some((tw, th)) = self.tile_size {
            if tw == 0 || th == 0 {
                return Err(J2kError::parameter("tile size must be non-zero"));
            }
        }
        if let Some(rate) = self.target_bitrate {
            if rate <= 0.0 {
                return Err(J2kError::parameter(format!(
                    "targetBitrate {rate} must be positive"
                )));
            }
        }
        if !self.dc_offset.is_empty() && self.dc_offset.len() != image.components.len() {
            return Err(J2kError::data(format!(
                "dcOffset has {} entries for {} components",
                self.dc_offset.len(),
                image.components.len()
            )));
        }
        self.mct.validate(image.components.len())?;
        if matches!(self.mct, MctMode::Matrix(_)) && self.lossless {
            return Err(J2kError::parameter(
                "matrix MCT is irreversible and cannot be combined with lossless coding",
            ));
        }
        if let Some(kernel) = &self.wavelet_kernel {
            kernel.validate()?;
            if self.lossless && !kernel.is_reversible() {
                return Err(J2kError::parameter(
                    "lossless encoding requires a reversible wavelet kernel",
                ));
            }
        }
        if let Some(structure) = &self.decomposition_structure {
            structure.validate()?;
            match structure {
                DecompositionStructure::Dyadic { levels } => {
                    if *levels != self.decomposition_levels {
                        return Err(J2kError::parameter(format!(
                            "decomposition structure declares {levels} levels but \
                             decompositionLevels is {}",
                            self.decomposition_levels
                        )));
                    }
                }
                _ => {
                    return Err(J2kError::parameter(
                        "codestream encoding supports the dyadic decomposition; packet and \
                         anisotropic structures are available through the DWT engine API",
                    ));
                }
            }
        }
        if let Some(roi) = &self.roi {
            roi.validate(image.width, image.height)?;
        }
        for comp in &image.components {
            let max_depth = if self.extended_precision { 31 } else { 16 };
            if comp.bit_depth > max_depth {
                return Err(J2kError::parameter(format!(
                    "component {} bit depth {} exceeds {} (enable extendedPrecision for 17..=31; \
                     deeper samples do not fit i32 storage)",
                    comp.index, comp.bit_depth, max_depth
                )));
            }
        }
        Ok(())
    }

    /// Kernel actually used for the wavelet stage.
    pub fn effective_kernel(&self) -> WaveletKernel {
        match &self.wavelet_kernel {
            Some(k) => k.clone(),
            None if self.lossless => WaveletKernel::Reversible53,
            None => WaveletKernel::Irreversible97,
        }
    }

    pub fn worker_count(&self) -> usize {
        if !self.enable_parallel_code_blocks {
            return 1;
        }
        if self.max_threads > 0 {
            self.max_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// Partial-decode request (region, layer, resolution and component
/// subsetting).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOptions {
    /// Decode quality layers `0..=max_layer`; `None` takes all.
    pub max_layer: Option<u16>,
    /// Highest resolution level to reconstruct; `None` takes all.
    pub max_resolution_level: Option<u8>,
    /// Canvas region to reconstruct; `None` takes the full canvas.
    pub region: Option<Region>,
    /// Component subset; `None` takes every component.
    pub components: Option<Vec<u16>>,
    /// Let tier-2 stop parsing once the requested subset is complete.
    pub early_stop: bool,
}

impl DecodeOptions {
    /// Validate against the decoded main header's geometry.
    pub fn validate(
        &self,
        quality_layers: u16,
        decomposition_levels: u8,
        image_width: u32,
        image_height: u32,
        component_count: u16,
    ) -> Result<(), J2kError> {
        if let Some(max_layer) = self.max_layer {
            if max_layer >= quality_layers {
                return Err(J2kError::parameter(format!(
                    "maxLayer {max_layer} exceeds the {quality_layers} quality layers present"
                )));
            }
        }
        if let Some(level) = self.max_resolution_level {
            if level > decomposition_levels {
                return Err(J2kError::parameter(format!(
                    "maxResolutionLevel {level} exceeds decompositionLevels {decomposition_levels}"
                )));
            }
        }
        if let Some(region) = &self.region {
            region.validate_within(image_width, image_height)?;
        }
        if let Some(components) = &self.components {
            if components.is_empty() {
                return Err(J2kError::parameter("components list must be non-empty"));
            }
            for &c in components {
                if c >= component_count {
                    return Err(J2kError::parameter(format!(
                        "component index {c} exceeds component count {component_count}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Pipeline stage reported through progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Parsing,
    BlockCoding,
    RateControl,
    Assembling,
    Reconstructing,
    Transcoding,
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Parsing => "parsing",
            Self::BlockCoding => "block-coding",
            Self::RateControl => "rate-control",
            Self::Assembling => "assembling",
            Self::Reconstructing => "reconstructing",
            Self::Transcoding => "transcoding",
        };
        f.write_str(name)
    }
}

/// Progress sink: `(stage, stage_progress, overall_progress)`, with
/// overall progress non-decreasing and reaching 1.0 on success.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(ProgressStage, f32, f32);
