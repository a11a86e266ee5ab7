//! Scalar quantization.
//!
//! Dead-zone quantizer `q = sign(x) * floor(|x| / delta)` with the
//! reconstruction bias applied on dequantization. The reversible path is
//! the identity (delta = 1, bias 0). Step sizes travel in the QCD/QCC
//! exponent/mantissa form: `delta = 2^(R - eps) * (1 + mu / 2^11)`.

/// Dead-zone scalar quantization.
pub fn quantize_scalar(coeff: f32, step_size: f32) -> i32 {
    if step_size <= 0.0 {
        return coeff as i32;
    }
    let sign = if coeff >= 0.0 { 1.0 } else { -1.0 };
    (sign * (coeff.abs() / step_size).floor()) as i32
}

/// Reconstruction with bias `r` (0 for lossless, 0.5 for lossy).
pub fn dequantize_scalar(q: i32, step_size: f32, bias: f32) -> f32 {
    if q == 0 {
        return 0.0;
    }
    let sign = if q > 0 { 1.0 } else { -1.0 };
    (q.abs() as f32 + bias) * step_size * sign
}

/// Quantization style byte of QCD/QCC (low five bits of Sqcd).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantStyle {
    /// No quantization: reversible path, exponent-only step sizes.
    None,
    /// Scalar derived: one step size, others derived from the level.
    ScalarDerived,
    /// Scalar expounded: one step size per subband.
    ScalarExpounded,
}

impl QuantStyle {
    pub fn to_sqcd(self, guard_bits: u8) -> u8 {
        let style = match self {
            Self::None => 0x00,
            Self::ScalarDerived => 0x01,
            Self::ScalarExpounded => 0x02,
        };
        (guard_bits << 5) | style
    }

    pub fn from_sqcd(sqcd: u8) -> Option<(Self, u8)> {
        let guard_bits = sqcd >> 5;
        let style = match sqcd & 0x1F {
            0x00 => Self::None,
            0x01 => Self::ScalarDerived,
            0x02 => Self::ScalarExpounded,
            _ => return None,
        };
        Some((style, guard_bits))
    }
}

/// One signalled step size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSize {
    pub exponent: u8,
    pub mantissa: u16,
}

impl StepSize {
    /// Reversible form: exponent only (bit-depth growth), mantissa zero.
    pub fn reversible(exponent: u8) -> Self {
        Self {
            exponent,
            mantissa: 0,
        }
    }

    /// Encode a real step size for a subband with dynamic-range exponent
    /// `range_bits`, clamping into the signallable range.
    pub fn from_delta(delta: f32, range_bits: u8) -> Self {
        let delta = delta.max(1.0 / (1 << 16) as f32);
        // delta = 2^(R - eps) * (1 + mu/2^11)
        let mut exponent = range_bits as i32 - delta.log2().floor() as i32;
        let base = 2f32.powi(range_bits as i32 - exponent);
        let mut mantissa = ((delta / base - 1.0) * 2048.0).round() as i32;
        if mantissa < 0 {
            mantissa = 0;
        }
        if mantissa > 0x7FF {
            mantissa = 0x7FF;
        }
        if exponent < 0 {
            exponent = 0;
        }
        if exponent > 0x1F {
            exponent = 0x1F;
        }
        Self {
            exponent: exponent as u8,
            mantissa: mantissa as u16,
        }
    }

    /// Decode to a real step size given the dynamic-range exponent.
    pub fn delta(&self, range_bits: u8) -> f32 {
        2f32.powi(range_bits as i32 - self.exponent as i32)
            * (1.0 + self.mantissa as f32 / 2048.0)
    }

    /// 16-bit wire form: eeeeemmm mmmmmmmm.
    pub fn to_u16(self) -> u16 {
        ((self.exponent as u16) << 11) | (self.mantissa & 0x7FF)
    }

    pub fn from_u16(v: u16) -> Self {
        Self {
            exponent: (v >> 11) as u8,
            mantissa: v & 0x7FF,
        }
    }

    /// 8-bit wire form used by the reversible style: eeeeexxx.
    pub fn to_u8(self) -> u8 {
        self.exponent << 3
    }

    pub fn from_u8(v: u8) -> Self {
        Self {
            exponent: v >> 3,
            mantissa: 0,
        }
    }
}
