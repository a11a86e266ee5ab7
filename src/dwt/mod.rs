//! Discrete wavelet transforms.
//!
//! The specialised paths (`Dwt53`, `Dwt97`) implement the reversible 5/3
//! integer lifting and the irreversible 9/7 floating lifting used by the
//! codec pipeline. `kernel` holds the generalised arbitrary-kernel engine
//! and the process-wide descriptor cache; `decompose` builds multi-level
//! decompositions (dyadic, wavelet-packet, anisotropic).
//!
//! A signal of length N >= 2 splits into a lowpass of ceil(N/2) samples
//! and a highpass of floor(N/2) samples. Forward and inverse must agree
//! on the boundary extension policy.

pub mod decompose;
pub mod kernel;

use crate::error::J2kError;

/// Policy for sample indices outside `[0, N-1]`.
///
/// Symmetric whole-sample extension is the default and the only choice
/// used by the Part-1 5/3 and 9/7 transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryExtension {
    #[default]
    SymmetricWholeSample,
    Periodic,
    ZeroPadding,
}

/// Map a possibly out-of-range index into `[0, n-1]`, or `None` when the
/// policy substitutes a zero sample.
fn extend_index(i: isize, n: isize, policy: BoundaryExtension) -> Option<usize> {
    if i >= 0 && i < n {
        return Some(i as usize);
    }
    match policy {
        BoundaryExtension::ZeroPadding => None,
        BoundaryExtension::Periodic => Some(i.rem_euclid(n) as usize),
        BoundaryExtension::SymmetricWholeSample => {
            if n == 1 {
                return Some(0);
            }
            // Reflect about the edge samples with period 2(n-1).
            let period = 2 * (n - 1);
            let mut m = i.rem_euclid(period);
            if m >= n {
                m = period - m;
            }
            Some(m as usize)
        }
    }
}

fn check_split_sizes(low: usize, high: usize) -> Result<usize, J2kError> {
    let n = low + high;
    if n < 2 {
        return Err(J2kError::parameter("signal length must be >= 2"));
    }
    if low < high || low - high > 1 {
        return Err(J2kError::parameter(format!(
            "subband sizes {low}/{high} differ by more than one"
        )));
    }
    Ok(n)
}

fn at_i32(x: &[i32], i: isize, policy: BoundaryExtension) -> i32 {
    extend_index(i, x.len() as isize, policy).map_or(0, |j| x[j])
}

fn at_f32(x: &[f32], i: isize, policy: BoundaryExtension) -> f32 {
    extend_index(i, x.len() as isize, policy).map_or(0.0, |j| x[j])
}

/// Reversible 5/3 integer lifting transform. Perfect reconstruction over
/// the integers for every length and extension policy.
pub struct Dwt53;

impl Dwt53 {
    /// Forward 1-D transform: `signal` -> (lowpass, highpass).
    pub fn forward(
        signal: &[i32],
        policy: BoundaryExtension,
    ) -> Result<(Vec<i32>, Vec<i32>), J2kError> {
        let len = signal.len();
        if len < 2 {
            return Err(J2kError::parameter("signal length must be >= 2"));
        }
        let mut x = signal.to_vec();

        // Prediction: odd samples from even neighbours.
        for i in (1..len).step_by(2) {
            let l = at_i32(&x, i as isize - 1, policy);
            let r = at_i32(&x, i as isize + 1, policy);
            x[i] -= (l + r) >> 1;
        }
        // Update: even samples from odd neighbours.
        for i in (0..len).step_by(2) {
            let l = at_i32(&x, i as isize - 1, policy);
            let r = at_i32(&x, i as isize + 1, policy);
            x[i] += (l + r + 2) >> 2;
        }

        let low: Vec<i32> = x.iter().step_by(2).copied().collect();
        let high: Vec<i32> = x.iter().skip(1).step_by(2).copied().collect();
        Ok((low, high))
    }

    /// Inverse 1-D transform; output length is `low.len() + high.len()`.
    pub fn inverse(
        low: &[i32],
        high: &[i32],
        policy: BoundaryExtension,
    ) -> Result<Vec<i32>, J2kError> {
        let len = check_split_sizes(low.len(), high.len())?;
        let mut x = vec![0i32; len];
        for (k, &v) in low.iter().enumerate() {
            x[2 * k] = v;
        }
        for (k, &v) in high.iter().enumerate() {
            x[2 * k + 1] = v;
        }

        // Undo update.
        for i in (0..len).step_by(2) {
            let l = at_i32(&x, i as isize - 1, policy);
            let r = at_i32(&x, i as isize + 1, policy);
            x[i] -= (l + r + 2) >> 2;
        }
        // Undo prediction.
        for i in (1..len).step_by(2) {
            let l = at_i32(&x, i as isize - 1, policy);
            let r = at_i32(&x, i as isize + 1, policy);
            x[i] += (l + r) >> 1;
        }
        Ok(x)
    }

    /// Forward 2-D transform (rows then columns) into LL/HL/LH/HH.
    pub fn forward_2d(
        data: &[i32],
        width: usize,
        height: usize,
        policy: BoundaryExtension,
    ) -> Result<Subbands2d<i32>, J2kError> {
        forward_2d_impl(data, width, height, |row| Self::forward(row, policy))
    }

    /// Inverse 2-D transform reassembling `width x height` samples.
    pub fn inverse_2d(
        bands: &Subbands2d<i32>,
        policy: BoundaryExtension,
    ) -> Result<Vec<i32>, J2kError> {
        inverse_2d_impl(bands, |l, h| Self::inverse(l, h, policy))
    }
}

/// Irreversible 9/7 floating lifting transform.
pub struct Dwt97;

impl Dwt97 {
    pub const ALPHA: f32 = -1.586_134_3;
    pub const BETA: f32 = -0.052_980_118;
    pub const GAMMA: f32 = 0.882_911_1;
    pub const DELTA: f32 = 0.443_506_85;
    pub const K: f32 = 1.230_174_1;

    fn lift_odd(x: &mut [f32], w: f32, policy: BoundaryExtension) {
        for i in (1..x.len()).step_by(2) {
            let l = at_f32(x, i as isize - 1, policy);
            let r = at_f32(x, i as isize + 1, policy);
            x[i] += w * (l + r);
        }
    }

    fn lift_even(x: &mut [f32], w: f32, policy: BoundaryExtension) {
        for i in (0..x.len()).step_by(2) {
            let l = at_f32(x, i as isize - 1, policy);
            let r = at_f32(x, i as isize + 1, policy);
            x[i] += w * (l + r);
        }
    }

    pub fn forward(
        signal: &[f32],
        policy: BoundaryExtension,
    ) -> Result<(Vec<f32>, Vec<f32>), J2kError> {
        let len = signal.len();
        if len < 2 {
            return Err(J2kError::parameter("signal length must be >= 2"));
        }
        let mut x = signal.to_vec();
        Self::lift_odd(&mut x, Self::ALPHA, policy);
        Self::lift_even(&mut x, Self::BETA, policy);
        Self::lift_odd(&mut x, Self::GAMMA, policy);
        Self::lift_even(&mut x, Self::DELTA, policy);
        for (i, v) in x.iter_mut().enumerate() {
            if i % 2 == 0 {
                *v /= Self::K;
            } else {
                *v *= Self::K;
            }
        }
        let low: Vec<f32> = x.iter().step_by(2).copied().collect();
        let high: Vec<f32> = x.iter().skip(1).step_by(2).copied().collect();
        Ok((low, high))
    }

    pub fn inverse(
        low: &[f32],
        high: &[f32],
        policy: BoundaryExtension,
    ) -> Result<Vec<f32>, J2kError> {
        let len = check_split_sizes(low.len(), high.len())?;
        let mut x = vec![0.0f32; len];
        for (k, &v) in low.iter().enumerate() {
            x[2 * k] = v;
        }
        for (k, &v) in high.iter().enumerate() {
            x[2 * k + 1] = v;
        }
        for (i, v) in x.iter_mut().enumerate() {
            if i % 2 == 0 {
                *v *= Self::K;
            } else {
                *v /= Self::K;
            }
        }
        Self::lift_even(&mut x, -Self::DELTA, policy);
        Self::lift_odd(&mut x, -Self::GAMMA, policy);
        Self::lift_even(&mut x, -Self::BETA, policy);
        Self::lift_odd(&mut x, -Self::ALPHA, policy);
        Ok(x)
    }

    pub fn forward_2d(
        data: &[f32],
        width: usize,
        height: usize,
        policy: BoundaryExtension,
    ) -> Result<Subbands2d<f32>, J2kError> {
        forward_2d_impl(data, width, height, |row| Self::forward(row, policy))
    }

    pub fn inverse_2d(
        bands: &Subbands2d<f32>,
        policy: BoundaryExtension,
    ) -> Result<Vec<f32>, J2kError> {
        inverse_2d_impl(bands, |l, h| Self::inverse(l, h, policy))
    }
}

/// One level of 2-D subbands with ceil-half dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Subbands2d<T> {
    pub width: usize,
    pub height: usize,
    pub ll: Vec<T>,
    pub hl: Vec<T>,
    pub lh: Vec<T>,
    pub hh: Vec<T>,
}

impl<T> Subbands2d<T> {
    pub fn low_width(&self) -> usize {
        self.width.div_ceil(2)
    }

    pub fn high_width(&self) -> usize {
        self.width / 2
    }

    pub fn low_height(&self) -> usize {
        self.height.div_ceil(2)
    }

    pub fn high_height(&self) -> usize {
        self.height / 2
    }
}

fn forward_2d_impl<T, F>(
    data: &[T],
    width: usize,
    height: usize,
    transform: F,
) -> Result<Subbands2d<T>, J2kError>
where
    T: Copy + Default,
    F: Fn(&[T]) -> Result<(Vec<T>, Vec<T>), J2kError>,
{
    if width < 2 || height < 2 {
        return Err(J2kError::parameter("2-D transform needs both dims >= 2"));
    }
    if data.len() != width * height {
        return Err(J2kError::data(format!(
            "expected {} samples, got {}",
            width * height,
            data.len()
        )));
    }
    let lw = width.div_ceil(2);
    let hw = width / 2;
    let lh = height.div_ceil(2);
    let hh = height / 2;

    // Rows: left half lowpass, right half highpass.
    let mut temp = vec![T::default(); width * height];
    for y in 0..height {
        let (low, high) = transform(&data[y * width..(y + 1) * width])?;
        temp[y * width..y * width + lw].copy_from_slice(&low);
        temp[y * width + lw..(y + 1) * width].copy_from_slice(&high);
    }

    // Columns.
    let mut ll = vec![T::default(); lw * lh];
    let mut hl = vec![T::default(); hw * lh];
    let mut lh_band = vec![T::default(); lw * hh];
    let mut hh_band = vec![T::default(); hw * hh];
    let mut column = vec![T::default(); height];
    for x in 0..width {
        for y in 0..height {
            column[y] = temp[y * width + x];
        }
        let (low, high) = transform(&column)?;
        if x < lw {
            for (y, &v) in low.iter().enumerate() {
                ll[y * lw + x] = v;
            }
            for (y, &v) in high.iter().enumerate() {
                lh_band[y * lw + x] = v;
            }
        } else {
            let hx = x - lw;
            for (y, &v) in low.iter().enumerate() {
                hl[y * hw + hx] = v;
            }
            for (y, &v) in high.iter().enumerate() {
                hh_band[y * hw + hx] = v;
            }
        }
    }

    Ok(Subbands2d {
        width,
        height,
        ll,
        hl,
        lh: lh_band,
        hh: hh_band,
    })
}

fn inverse_2d_impl<T, F>(bands: &Subbands2d<T>, inverse: F) -> Result<Vec<T>, J2kError>
where
    T: Copy + Default,
    F: Fn(&[T], &[T]) -> Result<Vec<T>, J2kError>,
{
    let (w, h) = (bands.width, bands.height);
    let lw = bands.low_width();
    let hw = bands.high_width();
    let lh = bands.low_height();
    let hh = bands.high_height();
    if bands.ll.len() != lw * lh
        || bands.hl.len() != hw * lh
        || bands.lh.len() != lw * hh
        || bands.hh.len() != hw * hh
    {
        return Err(J2kError::data("subband sizes do not match dimensions".to_string()));
    }

    // Columns first: rebuild the row-transformed plane.
    let mut temp = vec![T::default(); w * h];
    let mut low_col = vec![T::default(); lh];
    let mut high_col = vec![T::default(); hh];
    for x in 0..w {
        if x < lw {
            for y in 0..lh {
                low_col[y] = bands.ll[y * lw + x];
            }
            for y in 0..hh {
                high_col[y] = bands.lh[y * lw + x];
            }
        } else {
            let hx = x - lw;
            for y in 0..lh {
                low_col[y] = bands.hl[y * hw + hx];
            }
            for y in 0..hh {
                high_col[y] = bands.hh[y * hw + hx];
            }
        }
        let col = inverse(&low_col, &high_col)?;
        for (y, &v) in col.iter().enumerate() {
            temp[y * w + x] = v;
        }
    }

    // Rows.
    let mut out = vec![T::default(); w * h];
    for y in 0..h {
        let row = &temp[y * w..(y + 1) * w];
        let rec = inverse(&row[..lw], &row[lw..])?;
        out[y * w..(y + 1) * w].copy_from_slice(&rec);
    }
    Ok(out)
}
