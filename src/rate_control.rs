//! Rate control (PCRD-opt).
//!
//! Every code-block offers truncation points at pass boundaries with
//! exact byte costs (per-pass termination) and estimated distortion
//! reductions. Layer assignment prunes each block to its convex hull in
//! rate-distortion space, then bisects a slope threshold per layer so
//! the included set meets the layer's byte budget. Thresholds decrease
//! across layers, which makes layers nested by construction.

use crate::error::J2kError;

/// Distortion model driving the per-pass estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionModel {
    /// Subband synthesis-gain weighted squared error.
    #[default]
    NormBased,
    /// Plain squared error in the coefficient domain.
    MseBased,
    /// Unweighted symbol counting.
    Simplified,
}

/// Allocation mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateControlMode {
    /// Hit a bit-rate; `strict` forbids exceeding it.
    TargetBitrate { bits_per_pixel: f32, strict: bool },
    /// Keep passes above a quality-derived slope threshold.
    ConstantQuality(f32),
    /// Include every pass.
    Lossless,
}

/// Rate/distortion data for one code-block.
#[derive(Debug, Clone, Default)]
pub struct BlockRateInfo {
    /// Byte length of each terminated pass segment.
    pub pass_lengths: Vec<usize>,
    /// Distortion reduction of each pass.
    pub pass_distortions: Vec<f64>,
}

/// Truncation table: `assignment[layer][block]` is the number of passes
/// included up to and including that layer.
pub type LayerAssignment = Vec<Vec<usize>>;

#[derive(Debug, Clone, Copy)]
struct HullPoint {
    passes: usize,
    bytes: usize,
    slope: f64,
}

/// Convex-hull truncation points with strictly decreasing slopes.
fn convex_hull(block: &BlockRateInfo) -> Vec<HullPoint> {
    let mut cumulative: Vec<(usize, usize, f64)> = Vec::new();
    let mut bytes = 0usize;
    let mut dist = 0.0f64;
    for (i, (&len, &d)) in block
        .pass_lengths
        .iter()
        .zip(block.pass_distortions.iter())
        .enumerate()
    {
        bytes += len;
        dist += d;
        cumulative.push((i + 1, bytes, dist));
    }

    let slope_between = |from: (usize, f64), to: (usize, f64)| -> f64 {
        let db = to.0.saturating_sub(from.0);
        if db == 0 {
            f64::INFINITY
        } else {
            (to.1 - from.1) / db as f64
        }
    };

    // Stack of accepted (passes, bytes, dist); a new point pops every
    // predecessor whose incoming slope it meets or beats.
    let mut stack: Vec<(usize, usize, f64)> = Vec::new();
    for &(passes, bytes, dist) in &cumulative {
        loop {
            let prev = stack.last().map_or((0, 0.0), |&(_, b, d)| (b, d));
            let slope = slope_between(prev, (bytes, dist));
            if stack.is_empty() {
                break;
            }
            let before_prev = if stack.len() >= 2 {
                let &(_, b, d) = &stack[stack.len() - 2];
                (b, d)
            } else {
                (0, 0.0)
            };
            let top_slope = slope_between(before_prev, prev);
            if slope >= top_slope {
                stack.pop();
            } else {
                break;
            }
        }
        stack.push((passes, bytes, dist));
    }

    let mut hull = Vec::with_capacity(stack.len());
    let mut prev = (0usize, 0.0f64);
    for &(passes, bytes, dist) in &stack {
        hull.push(HullPoint {
            passes,
            bytes,
            slope: slope_between(prev, (bytes, dist)),
        });
        prev = (bytes, dist);
    }
    hull
}

/// Passes included from a block at slope threshold `lambda` (prefix of
/// hull points with slope >= lambda), with the byte cost.
fn truncate_at(hull: &[HullPoint], lambda: f64) -> (usize, usize) {
    let mut passes = 0;
    let mut bytes = 0;
    for point in hull {
        if point.slope >= lambda {
            passes = point.passes;
            bytes = point.bytes;
        } else {
            break;
        }
    }
    (passes, bytes)
}

fn total_bytes_at(hulls: &[Vec<HullPoint>], lambda: f64) -> usize {
    hulls.iter().map(|h| truncate_at(h, lambda).1).sum()
}

fn slope_range(hulls: &[Vec<HullPoint>]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = 0.0f64;
    for hull in hulls {
        for p in hull {
            if p.slope.is_finite() {
                min = min.min(p.slope);
                max = max.max(p.slope);
            }
        }
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

/// Bisect the largest lambda whose included set fits `budget` bytes.
fn bisect_lambda(hulls: &[Vec<HullPoint>], budget: usize) -> f64 {
    let (min_slope, max_slope) = slope_range(hulls);
    if total_bytes_at(hulls, min_slope) <= budget {
        // Everything fits; the target was above the achievable rate.
        return min_slope;
    }
    let mut lo = min_slope;
    let mut hi = max_slope * 2.0 + 1.0;
    for _ in 0..64 {
        let mid = (lo + hi) / 2.0;
        if total_bytes_at(hulls, mid) <= budget {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

/// Assign coding passes to quality layers.
///
/// Returns `assignment[layer][block]`; pass counts are non-decreasing
/// across layers for every block.
pub fn assign_layers(
    blocks: &[BlockRateInfo],
    layers: usize,
    total_pixels: usize,
    mode: RateControlMode,
) -> Result<LayerAssignment, J2kError> {
    if layers == 0 {
        return Err(J2kError::parameter("layer count must be at least 1"));
    }
    let hulls: Vec<Vec<HullPoint>> = blocks.iter().map(convex_hull).collect();
    let (min_slope, max_slope) = slope_range(&hulls);
    let full_bytes: usize = hulls.iter().map(|h| h.last().map_or(0, |p| p.bytes)).sum();

    // Per-layer slope thresholds, strictly easing towards the final
    // target so layers nest.
    let mut thresholds = Vec::with_capacity(layers);
    match mode {
        RateControlMode::Lossless => {
            // Intermediate layers step through the slope range; the last
            // layer takes everything.
            for l in 0..layers {
                if l + 1 == layers {
                    thresholds.push(0.0);
                } else {
                    let t = (l + 1) as f64 / layers as f64;
                    // Geometric interpolation from max to min slope.
                    let slope = max_slope * (min_slope.max(1e-9) / max_slope.max(1e-9)).powf(t);
                    thresholds.push(slope);
                }
            }
        }
        RateControlMode::ConstantQuality(q) => {
            // The quantizer carries most of the quality mapping; slope
            // trimming only bites at the low end.
            let q = q.clamp(0.0, 1.0) as f64;
            let final_threshold = if q >= 0.9 {
                0.0
            } else {
                max_slope * (1.0 - q).powi(3) * 0.01
            };
            for l in 0..layers {
                if l + 1 == layers {
                    thresholds.push(final_threshold);
                } else {
                    let t = (l + 1) as f64 / layers as f64;
                    let slope = max_slope - (max_slope - final_threshold) * t;
                    thresholds.push(slope);
                }
            }
        }
        RateControlMode::TargetBitrate {
            bits_per_pixel,
            strict,
        } => {
            let final_budget = (bits_per_pixel as f64 * total_pixels as f64 / 8.0) as usize;
            for l in 0..layers {
                let budget = final_budget * (l + 1) / layers;
                let lambda = bisect_lambda(&hulls, budget);
                log::debug!(
                    "layer {l}: budget {budget}B lambda {lambda:.4} -> {}B",
                    total_bytes_at(&hulls, lambda)
                );
                thresholds.push(lambda);
            }
            if !strict && full_bytes <= final_budget {
                // Target above the achievable rate: nearest achievable
                // is everything.
                if let Some(last) = thresholds.last_mut() {
                    *last = 0.0;
                }
            }
        }
    }

    // Thresholds must not increase across layers.
    for l in 1..thresholds.len() {
        if thresholds[l] > thresholds[l - 1] {
            thresholds[l] = thresholds[l - 1];
        }
    }

    let mut assignment = vec![vec![0usize; blocks.len()]; layers];
    for (l, &lambda) in thresholds.iter().enumerate() {
        for (b, hull) in hulls.iter().enumerate() {
            let (passes, _) = if lambda <= 0.0 {
                hull.last().map_or((0, 0), |p| (p.passes, p.bytes))
            } else {
                truncate_at(hull, lambda)
            };
            assignment[l][b] = passes;
        }
    }
    // Enforce nesting against ties in floating comparisons.
    for l in 1..layers {
        for b in 0..blocks.len() {
            if assignment[l][b] < assignment[l - 1][b] {
                assignment[l][b] = assignment[l - 1][b];
            }
        }
    }
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(lengths: &[usize], dists: &[f64]) -> BlockRateInfo {
        BlockRateInfo {
            pass_lengths: lengths.to_vec(),
            pass_distortions: dists.to_vec(),
        }
    }

    #[test]
    fn test_lossless_includes_everything() {
        let blocks = vec![
            block(&[10, 5, 3], &[100.0, 30.0, 5.0]),
            block(&[7, 7], &[50.0, 10.0]),
        ];
        let assignment = assign_layers(&blocks, 1, 64, RateControlMode::Lossless).unwrap();
        assert_eq!(assignment[0], vec![3, 2]);
    }

    #[test]
    fn test_layers_are_nested() {
        let blocks = vec![
            block(&[10, 8, 6, 4], &[400.0, 120.0, 40.0, 8.0]),
            block(&[12, 6, 5], &[300.0, 90.0, 10.0]),
            block(&[3], &[25.0]),
        ];
        for mode in [
            RateControlMode::Lossless,
            RateControlMode::ConstantQuality(0.7),
            RateControlMode::TargetBitrate {
                bits_per_pixel: 2.0,
                strict: false,
            },
        ] {
            let assignment = assign_layers(&blocks, 4, 256, mode).unwrap();
            for l in 1..4 {
                for b in 0..blocks.len() {
                    assert!(
                        assignment[l][b] >= assignment[l - 1][b],
                        "{mode:?} layer {l} block {b}"
                    );
                }
            }
            // Lossless final layer covers all passes.
            if mode == RateControlMode::Lossless {
                assert_eq!(assignment[3], vec![4, 3, 1]);
            }
        }
    }

    #[test]
    fn test_strict_rate_never_exceeds_budget() {
        let blocks = vec![
            block(&[100, 80, 60], &[1000.0, 300.0, 50.0]),
            block(&[90, 70], &[800.0, 100.0]),
        ];
        let pixels = 1000usize;
        let bpp = 1.0f32; // budget 125 bytes
        let assignment = assign_layers(
            &blocks,
            1,
            pixels,
            RateControlMode::TargetBitrate {
                bits_per_pixel: bpp,
                strict: true,
            },
        )
        .unwrap();
        let budget = (bpp as f64 * pixels as f64 / 8.0) as usize;
        let mut spent = 0usize;
        for (b, blk) in blocks.iter().enumerate() {
            spent += blk.pass_lengths[..assignment[0][b]].iter().sum::<usize>();
        }
        assert!(spent <= budget, "spent {spent} budget {budget}");
    }

    #[test]
    fn test_infeasible_target_falls_back_to_full() {
        let blocks = vec![block(&[5, 3], &[50.0, 10.0])];
        let assignment = assign_layers(
            &blocks,
            1,
            1_000_000,
            RateControlMode::TargetBitrate {
                bits_per_pixel: 8.0,
                strict: false,
            },
        )
        .unwrap();
        assert_eq!(assignment[0], vec![2]);
    }

    #[test]
    fn test_quality_one_keeps_all_passes() {
        let blocks = vec![block(&[9, 9, 9], &[90.0, 9.0, 0.9])];
        let assignment =
            assign_layers(&blocks, 2, 64, RateControlMode::ConstantQuality(1.0)).unwrap();
        assert_eq!(assignment[1], vec![3]);
    }

    #[test]
    fn test_zero_layers_rejected() {
        assert!(assign_layers(&[], 0, 1, RateControlMode::Lossless).is_err());
    }

    #[test]
    fn test_convex_hull_prunes_bad_points() {
        // Middle pass has a worse slope than the one after it; the hull
        // merges them so truncation skips the non-hull point.
        let b = block(&[10, 10, 10], &[100.0, 1.0, 50.0]);
        let hull = convex_hull(&b);
        assert!(hull.iter().all(|p| p.passes != 2));
        let slopes: Vec<f64> = hull.iter().map(|p| p.slope).collect();
        for w in slopes.windows(2) {
            assert!(w[0] > w[1]);
        }
    }
}
