//! Multi-component transforms and sample-domain adjustments.
//!
//! The reversible colour transform (RCT) pairs with the 5/3 wavelet,
//! the irreversible one (ICT) with the 9/7. Part-2 adds an arbitrary
//! decorrelation matrix signalled through MCT/MCC/MCO marker segments,
//! and a per-component DC offset (DCO) applied after level shifting.

use crate::error::J2kError;

/// Component decorrelation selection.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MctMode {
    /// No inter-component transform.
    #[default]
    None,
    /// RCT for reversible coding, ICT for irreversible; requires at
    /// least three components with identical dimensions.
    Standard,
    /// Part-2 matrix decorrelation: a row-major `n x n` matrix applied
    /// across components per sample.
    Matrix(Vec<f32>),
}

impl MctMode {
    pub fn validate(&self, component_count: usize) -> Result<(), J2kError> {
        match self {
            Self::None => Ok(()),
            Self::Standard => {
                if component_count < 3 {
                    return Err(J2kError::parameter(
                        "standard MCT requires at least three components",
                    ));
                }
                Ok(())
            }
            Self::Matrix(m) => {
                if m.len() != component_count * component_count {
                    return Err(J2kError::parameter(format!(
                        "MCT matrix has {} entries, expected {}",
                        m.len(),
                        component_count * component_count
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Forward RCT in place over the first three planes.
pub fn forward_rct(planes: &mut [Vec<i32>]) {
    let (r, rest) = planes.split_at_mut(1);
    let (g, b) = rest.split_at_mut(1);
    let (r, g, b) = (&mut r[0], &mut g[0], &mut b[0]);
    for i in 0..r.len() {
        let (rv, gv, bv) = (r[i], g[i], b[i]);
        let y = (rv + 2 * gv + bv) >> 2;
        let cb = bv - gv;
        let cr = rv - gv;
        r[i] = y;
        g[i] = cb;
        b[i] = cr;
    }
}

/// Inverse RCT in place; exact inverse of [`forward_rct`].
pub fn inverse_rct(planes: &mut [Vec<i32>]) {
    let (y, rest) = planes.split_at_mut(1);
    let (cb, cr) = rest.split_at_mut(1);
    let (y, cb, cr) = (&mut y[0], &mut cb[0], &mut cr[0]);
    for i in 0..y.len() {
        let (yv, cbv, crv) = (y[i], cb[i], cr[i]);
        let g = yv - ((cbv + crv) >> 2);
        let r = crv + g;
        let b = cbv + g;
        y[i] = r;
        cb[i] = g;
        cr[i] = b;
    }
}

/// Forward ICT (YCbCr) over the first three float planes.
pub fn forward_ict(planes: &mut [Vec<f32>]) {
    let (r, rest) = planes.split_at_mut(1);
    let (g, b) = rest.split_at_mut(1);
    let (r, g, b) = (&mut r[0], &mut g[0], &mut b[0]);
    for i in 0..r.len() {
        let (rv, gv, bv) = (r[i], g[i], b[i]);
        let y = 0.299 * rv + 0.587 * gv + 0.114 * bv;
        let cb = -0.168_736 * rv - 0.331_264 * gv + 0.5 * bv;
        let cr = 0.5 * rv - 0.418_688 * gv - 0.081_312 * bv;
        r[i] = y;
        g[i] = cb;
        b[i] = cr;
    }
}

/// Inverse ICT.
pub fn inverse_ict(planes: &mut [Vec<f32>]) {
    let (y, rest) = planes.split_at_mut(1);
    let (cb, cr) = rest.split_at_mut(1);
    let (y, cb, cr) = (&mut y[0], &mut cb[0], &mut cr[0]);
    for i in 0..y.len() {
        let (yv, cbv, crv) = (y[i], cb[i], cr[i]);
        let r = yv + 1.402 * crv;
        let g = yv - 0.344_136 * cbv - 0.714_136 * crv;
        let b = yv + 1.772 * cbv;
        y[i] = r;
        cb[i] = g;
        cr[i] = b;
    }
}

/// Apply a row-major `n x n` decorrelation matrix across components.
pub fn forward_matrix(planes: &mut [Vec<f32>], matrix: &[f32]) -> Result<(), J2kError> {
    let n = planes.len();
    if matrix.len() != n * n {
        return Err(J2kError::parameter("MCT matrix dimension mismatch".to_string()));
    }
    let len = planes.first().map_or(0, |p| p.len());
    let mut sample = vec![0.0f32; n];
    for i in 0..len {
        for (c, plane) in planes.iter().enumerate() {
            sample[c] = plane[i];
        }
        for (c, plane) in planes.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (k, &s) in sample.iter().enumerate() {
                acc += matrix[c * n + k] * s;
            }
            plane[i] = acc;
        }
    }
    Ok(())
}

/// Invert the matrix by Gauss-Jordan elimination and apply it.
pub fn inverse_matrix(planes: &mut [Vec<f32>], matrix: &[f32]) -> Result<(), J2kError> {
    let n = planes.len();
    let inv = invert(matrix, n)?;
    forward_matrix(planes, &inv)
}

fn invert(matrix: &[f32], n: usize) -> Result<Vec<f32>, J2kError> {
    let mut a: Vec<f64> = matrix.iter().map(|&v| v as f64).collect();
    let mut inv = vec![0.0f64; n * n];
    for i in 0..n {
        inv[i * n + i] = 1.0;
    }
    for col in 0..n {
        // Partial pivoting.
        let pivot = (col..n)
            .max_by(|&a_row, &b_row| {
                a[a_row * n + col]
                    .abs()
                    .total_cmp(&a[b_row * n + col].abs())
            })
            .expect("non-empty range");
        if a[pivot * n + col].abs() < 1e-12 {
            return Err(J2kError::data("MCT matrix is singular".to_string()));
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
                inv.swap(col * n + k, pivot * n + k);
            }
        }
        let d = a[col * n + col];
        for k in 0..n {
            a[col * n + k] /= d;
            inv[col * n + k] /= d;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let f = a[row * n + col];
            if f == 0.0 {
                continue;
            }
            for k in 0..n {
                a[row * n + k] -= f * a[col * n + k];
                inv[row * n + k] -= f * inv[col * n + k];
            }
        }
    }
    Ok(inv.into_iter().map(|v| v as f32).collect())
}

/// Subtract per-component DC offsets (Part-2 DCO), applied after the
/// level shift on encode and re-added on decode.
pub fn apply_dc_offset(plane: &mut [i32], offset: i32) {
    if offset == 0 {
        return;
    }
    for v in plane.iter_mut() {
        *v -= offset;
    }
}

pub fn remove_dc_offset(plane: &mut [i32], offset: i32) {
    if offset == 0 {
        return;
    }
    for v in plane.iter_mut() {
        *v += offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rct_exact_roundtrip() {
        let mut planes = vec![
            vec![200, 0, -128, 127, 5],
            vec![100, 255, -1, 64, 5],
            vec![50, 17, 3, -64, 5],
        ];
        let original = planes.clone();
        forward_rct(&mut planes);
        inverse_rct(&mut planes);
        assert_eq!(planes, original);
    }

    #[test]
    fn test_ict_near_roundtrip() {
        let mut planes = vec![
            vec![200.0, 0.0, -128.0, 127.0],
            vec![100.0, 255.0, -1.0, 64.0],
            vec![50.0, 17.0, 3.0, -64.0],
        ];
        let original = planes.clone();
        forward_ict(&mut planes);
        inverse_ict(&mut planes);
        for (p, o) in planes.iter().zip(original.iter()) {
            for (a, b) in p.iter().zip(o.iter()) {
                assert!((a - b).abs() < 1e-2, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_matrix_roundtrip() {
        let matrix = vec![1.0, 0.5, 0.25, 0.0, 1.0, -0.5, 0.5, 0.0, 1.0];
        let mut planes = vec![
            vec![10.0, -4.0, 3.5],
            vec![0.0, 8.0, -2.0],
            vec![1.0, 1.0, 100.0],
        ];
        let original = planes.clone();
        forward_matrix(&mut planes, &matrix).unwrap();
        inverse_matrix(&mut planes, &matrix).unwrap();
        for (p, o) in planes.iter().zip(original.iter()) {
            for (a, b) in p.iter().zip(o.iter()) {
                assert!((a - b).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let matrix = vec![1.0, 2.0, 2.0, 4.0];
        let mut planes = vec![vec![1.0], vec![2.0]];
        assert!(inverse_matrix(&mut planes, &matrix).is_err());
    }

    #[test]
    fn test_mct_mode_validation() {
        assert!(MctMode::Standard.validate(2).is_err());
        assert!(MctMode::Standard.validate(3).is_ok());
        assert!(MctMode::Matrix(vec![1.0; 9]).validate(3).is_ok());
        assert!(MctMode::Matrix(vec![1.0; 8]).validate(3).is_err());
    }

    #[test]
    fn test_dc_offset_roundtrip() {
        let mut plane = vec![5, -3, 100];
        apply_dc_offset(&mut plane, 7);
        assert_eq!(plane, vec![-2, -10, 93]);
        remove_dc_offset(&mut plane, 7);
        assert_eq!(plane, vec![5, -3, 100]);
    }
}
