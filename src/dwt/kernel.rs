//! Generalised wavelet kernels.
//!
//! A kernel is either one of the two built-in filters or an arbitrary
//! description: a lifting factorisation (with per-step integer rounding
//! for reversible kernels) or explicit analysis/synthesis taps driven
//! through the convolution path. Prepared descriptors are cached
//! process-wide, keyed by a fingerprint of the kernel definition.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};

use super::{extend_index, BoundaryExtension, Dwt97};
use crate::error::J2kError;

/// Which parity class a lifting step rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftTarget {
    /// Prediction step: odd samples updated from even neighbours.
    Odd,
    /// Update step: even samples updated from odd neighbours.
    Even,
}

/// Integer rounding rule for a reversible lifting step:
/// `delta = (numerator * (left + right) + offset) >> shift`,
/// applied negated when `negate` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntLift {
    pub numerator: i32,
    pub offset: i32,
    pub shift: u32,
    pub negate: bool,
}

/// One symmetric lifting step.
#[derive(Debug, Clone, PartialEq)]
pub struct LiftStep {
    pub target: LiftTarget,
    /// Floating weight: `x += weight * (left + right)`.
    pub weight: f32,
    /// Integer rule used instead of `weight` on the reversible path.
    pub rounding: Option<IntLift>,
}

/// Symmetry class of an arbitrary kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymmetryClass {
    #[default]
    WholeSample,
    HalfSample,
    None,
}

/// Arbitrary kernel description.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelSpec {
    Lifting {
        steps: Vec<LiftStep>,
        low_scale: f32,
        high_scale: f32,
        reversible: bool,
        symmetry: SymmetryClass,
    },
    Taps {
        analysis_low: Vec<f32>,
        analysis_high: Vec<f32>,
        synthesis_low: Vec<f32>,
        synthesis_high: Vec<f32>,
        low_scale: f32,
        high_scale: f32,
        reversible: bool,
        symmetry: SymmetryClass,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArbitraryKernel {
    pub name: String,
    pub spec: KernelSpec,
}

/// Wavelet kernel selector; dispatch is by enum matching so the two hot
/// built-in paths stay specialised.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveletKernel {
    Reversible53,
    Irreversible97,
    Arbitrary(ArbitraryKernel),
}

impl Default for WaveletKernel {
    fn default() -> Self {
        Self::Reversible53
    }
}

impl WaveletKernel {
    pub fn is_reversible(&self) -> bool {
        match self {
            Self::Reversible53 => true,
            Self::Irreversible97 => false,
            Self::Arbitrary(k) => match &k.spec {
                KernelSpec::Lifting { reversible, .. } => *reversible,
                KernelSpec::Taps { reversible, .. } => *reversible,
            },
        }
    }

    /// Structural validation per the arbitrary-kernel contract: non-empty
    /// equal-length filter pairs and non-zero scaling factors.
    pub fn validate(&self) -> Result<(), J2kError> {
        let Self::Arbitrary(kernel) = self else {
            return Ok(());
        };
        match &kernel.spec {
            KernelSpec::Lifting {
                steps,
                low_scale,
                high_scale,
                reversible,
                ..
            } => {
                if steps.is_empty() {
                    return Err(J2kError::parameter("kernel lifting steps must be non-empty"));
                }
                if *low_scale == 0.0 || *high_scale == 0.0 {
                    return Err(J2kError::parameter("kernel scaling factors must be non-zero"));
                }
                if *reversible && steps.iter().any(|s| s.rounding.is_none()) {
                    return Err(J2kError::parameter(
                        "reversible kernel requires integer rounding on every step",
                    ));
                }
            }
            KernelSpec::Taps {
                analysis_low,
                analysis_high,
                synthesis_low,
                synthesis_high,
                low_scale,
                high_scale,
                ..
            } => {
                if analysis_low.is_empty() || analysis_high.is_empty() {
                    return Err(J2kError::parameter("kernel analysis filters must be non-empty"));
                }
                if synthesis_low.is_empty() || synthesis_high.is_empty() {
                    return Err(J2kError::parameter("kernel synthesis filters must be non-empty"));
                }
                if analysis_low.len() % 2 != analysis_high.len() % 2 {
                    return Err(J2kError::parameter(
                        "kernel analysis filters must have matching parity",
                    ));
                }
                if *low_scale == 0.0 || *high_scale == 0.0 {
                    return Err(J2kError::parameter("kernel scaling factors must be non-zero"));
                }
            }
        }
        Ok(())
    }

    /// The 5/3 kernel as a generic lifting description. Matches the
    /// specialised path exactly on the integer path.
    pub fn cdf53_as_arbitrary() -> Self {
        Self::Arbitrary(ArbitraryKernel {
            name: "cdf53".to_string(),
            spec: KernelSpec::Lifting {
                steps: vec![
                    LiftStep {
                        target: LiftTarget::Odd,
                        weight: -0.5,
                        rounding: Some(IntLift {
                            numerator: 1,
                            offset: 0,
                            shift: 1,
                            negate: true,
                        }),
                    },
                    LiftStep {
                        target: LiftTarget::Even,
                        weight: 0.25,
                        rounding: Some(IntLift {
                            numerator: 1,
                            offset: 2,
                            shift: 2,
                            negate: false,
                        }),
                    },
                ],
                low_scale: 1.0,
                high_scale: 1.0,
                reversible: true,
                symmetry: SymmetryClass::WholeSample,
            },
        })
    }

    /// The 9/7 kernel as a generic lifting description.
    pub fn cdf97_as_arbitrary() -> Self {
        let step = |target, weight| LiftStep {
            target,
            weight,
            rounding: None,
        };
        Self::Arbitrary(ArbitraryKernel {
            name: "cdf97".to_string(),
            spec: KernelSpec::Lifting {
                steps: vec![
                    step(LiftTarget::Odd, Dwt97::ALPHA),
                    step(LiftTarget::Even, Dwt97::BETA),
                    step(LiftTarget::Odd, Dwt97::GAMMA),
                    step(LiftTarget::Even, Dwt97::DELTA),
                ],
                low_scale: 1.0 / Dwt97::K,
                high_scale: Dwt97::K,
                reversible: false,
                symmetry: SymmetryClass::WholeSample,
            },
        })
    }

    /// Fingerprint for cache lookup: name, coefficients, scaling and
    /// reversibility all participate.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match self {
            Self::Reversible53 => 0x53u8.hash(&mut hasher),
            Self::Irreversible97 => 0x97u8.hash(&mut hasher),
            Self::Arbitrary(kernel) => {
                kernel.name.hash(&mut hasher);
                match &kernel.spec {
                    KernelSpec::Lifting {
                        steps,
                        low_scale,
                        high_scale,
                        reversible,
                        ..
                    } => {
                        for step in steps {
                            (step.target == LiftTarget::Odd).hash(&mut hasher);
                            step.weight.to_bits().hash(&mut hasher);
                            step.rounding.hash(&mut hasher);
                        }
                        low_scale.to_bits().hash(&mut hasher);
                        high_scale.to_bits().hash(&mut hasher);
                        reversible.hash(&mut hasher);
                    }
                    KernelSpec::Taps {
                        analysis_low,
                        analysis_high,
                        synthesis_low,
                        synthesis_high,
                        low_scale,
                        high_scale,
                        reversible,
                        ..
                    } => {
                        for taps in [analysis_low, analysis_high, synthesis_low, synthesis_high] {
                            for t in taps {
                                t.to_bits().hash(&mut hasher);
                            }
                            0xFEu8.hash(&mut hasher);
                        }
                        low_scale.to_bits().hash(&mut hasher);
                        high_scale.to_bits().hash(&mut hasher);
                        reversible.hash(&mut hasher);
                    }
                }
            }
        }
        hasher.finish()
    }
}

/// Prepared kernel descriptor held by the cache.
#[derive(Debug)]
pub struct PreparedKernel {
    pub kernel: WaveletKernel,
    pub reversible: bool,
}

fn cache() -> &'static Mutex<HashMap<u64, Arc<PreparedKernel>>> {
    static CACHE: OnceLock<Mutex<HashMap<u64, Arc<PreparedKernel>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Fetch (or validate and insert) the prepared form of a kernel.
pub fn prepare(kernel: &WaveletKernel) -> Result<Arc<PreparedKernel>, J2kError> {
    let key = kernel.fingerprint();
    if let Some(hit) = cache().lock().expect("kernel cache poisoned").get(&key) {
        return Ok(Arc::clone(hit));
    }
    kernel.validate()?;
    let prepared = Arc::new(PreparedKernel {
        kernel: kernel.clone(),
        reversible: kernel.is_reversible(),
    });
    cache()
        .lock()
        .expect("kernel cache poisoned")
        .insert(key, Arc::clone(&prepared));
    Ok(prepared)
}

/// Drop every cached descriptor.
pub fn clear_cache() {
    cache().lock().expect("kernel cache poisoned").clear();
}

/// Generic forward transform on the float path.
pub fn forward_f32(
    kernel: &WaveletKernel,
    signal: &[f32],
    policy: BoundaryExtension,
) -> Result<(Vec<f32>, Vec<f32>), J2kError> {
    if signal.len() < 2 {
        return Err(J2kError::parameter("signal length must be >= 2"));
    }
    let prepared = prepare(kernel)?;
    match &prepared.kernel {
        WaveletKernel::Reversible53 => {
            let ints: Vec<i32> = signal.iter().map(|&v| v as i32).collect();
            let (l, h) = super::Dwt53::forward(&ints, policy)?;
            Ok((
                l.into_iter().map(|v| v as f32).collect(),
                h.into_iter().map(|v| v as f32).collect(),
            ))
        }
        WaveletKernel::Irreversible97 => Dwt97::forward(signal, policy),
        WaveletKernel::Arbitrary(arb) => match &arb.spec {
            KernelSpec::Lifting {
                steps,
                low_scale,
                high_scale,
                ..
            } => Ok(lifting_forward_f32(signal, steps, *low_scale, *high_scale, policy)),
            KernelSpec::Taps {
                analysis_low,
                analysis_high,
                low_scale,
                high_scale,
                symmetry,
                ..
            } => Ok(taps_forward(
                signal,
                analysis_low,
                analysis_high,
                *low_scale,
                *high_scale,
                *symmetry,
                policy,
            )),
        },
    }
}

/// Generic inverse transform on the float path.
pub fn inverse_f32(
    kernel: &WaveletKernel,
    low: &[f32],
    high: &[f32],
    policy: BoundaryExtension,
) -> Result<Vec<f32>, J2kError> {
    super::check_split_sizes(low.len(), high.len())?;
    let prepared = prepare(kernel)?;
    match &prepared.kernel {
        WaveletKernel::Reversible53 => {
            let li: Vec<i32> = low.iter().map(|&v| v as i32).collect();
            let hi: Vec<i32> = high.iter().map(|&v| v as i32).collect();
            Ok(super::Dwt53::inverse(&li, &hi, policy)?
                .into_iter()
                .map(|v| v as f32)
                .collect())
        }
        WaveletKernel::Irreversible97 => Dwt97::inverse(low, high, policy),
        WaveletKernel::Arbitrary(arb) => match &arb.spec {
            KernelSpec::Lifting {
                steps,
                low_scale,
                high_scale,
                ..
            } => Ok(lifting_inverse_f32(low, high, steps, *low_scale, *high_scale, policy)),
            KernelSpec::Taps {
                synthesis_low,
                synthesis_high,
                low_scale,
                high_scale,
                symmetry,
                ..
            } => Ok(taps_inverse(
                low,
                high,
                synthesis_low,
                synthesis_high,
                *low_scale,
                *high_scale,
                *symmetry,
                policy,
            )),
        },
    }
}

/// Generic forward transform on the integer path (reversible kernels only).
pub fn forward_i32(
    kernel: &WaveletKernel,
    signal: &[i32],
    policy: BoundaryExtension,
) -> Result<(Vec<i32>, Vec<i32>), J2kError> {
    if signal.len() < 2 {
        return Err(J2kError::parameter("signal length must be >= 2"));
    }
    let prepared = prepare(kernel)?;
    if !prepared.reversible {
        return Err(J2kError::parameter("integer path requires a reversible kernel"));
    }
    match &prepared.kernel {
        WaveletKernel::Reversible53 => super::Dwt53::forward(signal, policy),
        WaveletKernel::Irreversible97 => unreachable!("not reversible"),
        WaveletKernel::Arbitrary(arb) => match &arb.spec {
            KernelSpec::Lifting { steps, .. } => Ok(lifting_forward_i32(signal, steps, policy)),
            KernelSpec::Taps { .. } => Err(J2kError::parameter(
                "reversible taps kernels must be given as a lifting factorisation",
            )),
        },
    }
}

/// Generic inverse transform on the integer path (reversible kernels only).
pub fn inverse_i32(
    kernel: &WaveletKernel,
    low: &[i32],
    high: &[i32],
    policy: BoundaryExtension,
) -> Result<Vec<i32>, J2kError> {
    super::check_split_sizes(low.len(), high.len())?;
    let prepared = prepare(kernel)?;
    if !prepared.reversible {
        return Err(J2kError::parameter("integer path requires a reversible kernel"));
    }
    match &prepared.kernel {
        WaveletKernel::Reversible53 => super::Dwt53::inverse(low, high, policy),
        WaveletKernel::Irreversible97 => unreachable!("not reversible"),
        WaveletKernel::Arbitrary(arb) => match &arb.spec {
            KernelSpec::Lifting { steps, .. } => Ok(lifting_inverse_i32(low, high, steps, policy)),
            KernelSpec::Taps { .. } => Err(J2kError::parameter(
                "reversible taps kernels must be given as a lifting factorisation",
            )),
        },
    }
}

fn int_delta(rule: &IntLift, left: i32, right: i32) -> i32 {
    let sum = (left as i64 + right as i64) * rule.numerator as i64;
    let delta = ((sum + rule.offset as i64) >> rule.shift) as i32;
    if rule.negate {
        -delta
    } else {
        delta
    }
}

fn apply_step_i32(x: &mut [i32], step: &LiftStep, invert: bool, policy: BoundaryExtension) {
    let rule = step.rounding.expect("reversible step has rounding");
    let start = match step.target {
        LiftTarget::Odd => 1,
        LiftTarget::Even => 0,
    };
    for i in (start..x.len()).step_by(2) {
        let l = super::at_i32(x, i as isize - 1, policy);
        let r = super::at_i32(x, i as isize + 1, policy);
        let d = int_delta(&rule, l, r);
        if invert {
            x[i] -= d;
        } else {
            x[i] += d;
        }
    }
}

fn apply_step_f32(x: &mut [f32], step: &LiftStep, invert: bool, policy: BoundaryExtension) {
    let start = match step.target {
        LiftTarget::Odd => 1,
        LiftTarget::Even => 0,
    };
    let w = if invert { -step.weight } else { step.weight };
    for i in (start..x.len()).step_by(2) {
        let l = super::at_f32(x, i as isize - 1, policy);
        let r = super::at_f32(x, i as isize + 1, policy);
        x[i] += w * (l + r);
    }
}

fn deinterleave_i32(x: &[i32]) -> (Vec<i32>, Vec<i32>) {
    (
        x.iter().step_by(2).copied().collect(),
        x.iter().skip(1).step_by(2).copied().collect(),
    )
}

fn interleave_i32(low: &[i32], high: &[i32]) -> Vec<i32> {
    let mut x = vec![0i32; low.len() + high.len()];
    for (k, &v) in low.iter().enumerate() {
        x[2 * k] = v;
    }
    for (k, &v) in high.iter().enumerate() {
        x[2 * k + 1] = v;
    }
    x
}

fn lifting_forward_i32(signal: &[i32], steps: &[LiftStep], policy: BoundaryExtension) -> (Vec<i32>, Vec<i32>) {
    let mut x = signal.to_vec();
    for step in steps {
        apply_step_i32(&mut x, step, false, policy);
    }
    deinterleave_i32(&x)
}

fn lifting_inverse_i32(low: &[i32], high: &[i32], steps: &[LiftStep], policy: BoundaryExtension) -> Vec<i32> {
    let mut x = interleave_i32(low, high);
    for step in steps.iter().rev() {
        apply_step_i32(&mut x, step, true, policy);
    }
    x
}

fn lifting_forward_f32(
    signal: &[f32],
    steps: &[LiftStep],
    low_scale: f32,
    high_scale: f32,
    policy: BoundaryExtension,
) -> (Vec<f32>, Vec<f32>) {
    let mut x = signal.to_vec();
    for step in steps {
        apply_step_f32(&mut x, step, false, policy);
    }
    for (i, v) in x.iter_mut().enumerate() {
        *v *= if i % 2 == 0 { low_scale } else { high_scale };
    }
    (
        x.iter().step_by(2).copied().collect(),
        x.iter().skip(1).step_by(2).copied().collect(),
    )
}

fn lifting_inverse_f32(
    low: &[f32],
    high: &[f32],
    steps: &[LiftStep],
    low_scale: f32,
    high_scale: f32,
    policy: BoundaryExtension,
) -> Vec<f32> {
    let mut x = vec![0.0f32; low.len() + high.len()];
    for (k, &v) in low.iter().enumerate() {
        x[2 * k] = v / low_scale;
    }
    for (k, &v) in high.iter().enumerate() {
        x[2 * k + 1] = v / high_scale;
    }
    for step in steps.iter().rev() {
        apply_step_f32(&mut x, step, true, policy);
    }
    x
}

fn filter_center(len: usize) -> isize {
    if len % 2 == 1 {
        (len as isize - 1) / 2
    } else {
        len as isize / 2 - 1
    }
}

/// Highpass sample base: whole-sample symmetric kernels centre the
/// highpass on odd positions, half-sample (even-length) kernels pair it
/// with the lowpass on even positions.
fn high_base(symmetry: SymmetryClass) -> isize {
    match symmetry {
        SymmetryClass::HalfSample => 0,
        _ => 1,
    }
}

fn taps_forward(
    signal: &[f32],
    analysis_low: &[f32],
    analysis_high: &[f32],
    low_scale: f32,
    high_scale: f32,
    symmetry: SymmetryClass,
    policy: BoundaryExtension,
) -> (Vec<f32>, Vec<f32>) {
    let n = signal.len() as isize;
    let lc = filter_center(analysis_low.len());
    let hc = filter_center(analysis_high.len());
    let hb = high_base(symmetry);
    let low_len = signal.len().div_ceil(2);
    let high_len = signal.len() / 2;

    let mut low = vec![0.0f32; low_len];
    for (k, out) in low.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (j, &t) in analysis_low.iter().enumerate() {
            let idx = 2 * k as isize + j as isize - lc;
            if let Some(src) = extend_index(idx, n, policy) {
                acc += t * signal[src];
            }
        }
        *out = acc * low_scale;
    }
    let mut high = vec![0.0f32; high_len];
    for (k, out) in high.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (j, &t) in analysis_high.iter().enumerate() {
            let idx = 2 * k as isize + hb + j as isize - hc;
            if let Some(src) = extend_index(idx, n, policy) {
                acc += t * signal[src];
            }
        }
        *out = acc * high_scale;
    }
    (low, high)
}

fn taps_inverse(
    low: &[f32],
    high: &[f32],
    synthesis_low: &[f32],
    synthesis_high: &[f32],
    low_scale: f32,
    high_scale: f32,
    symmetry: SymmetryClass,
    policy: BoundaryExtension,
) -> Vec<f32> {
    let len = low.len() + high.len();
    let n = len as isize;
    let lc = filter_center(synthesis_low.len());
    let hc = filter_center(synthesis_high.len());
    let hb = high_base(symmetry);
    let mut out = vec![0.0f32; len];

    let mut scatter = |pos: isize, v: f32| {
        if let Some(dst) = extend_index(pos, n, policy) {
            out[dst] += v;
        }
    };
    for (k, &v) in low.iter().enumerate() {
        let v = v / low_scale;
        for (j, &t) in synthesis_low.iter().enumerate() {
            scatter(2 * k as isize + j as isize - lc, t * v);
        }
    }
    for (k, &v) in high.iter().enumerate() {
        let v = v / high_scale;
        for (j, &t) in synthesis_high.iter().enumerate() {
            scatter(2 * k as isize + hb + j as isize - hc, t * v);
        }
    }
    out
}
