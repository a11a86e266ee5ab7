//! Sample-domain image model consumed and produced by the codec.

use crate::error::J2kError;

/// One image component: a plane of integer samples with its own bit-depth,
/// signedness and subsampling factors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageComponent {
    pub index: u16,
    /// Bit depth in [1, 38].
    pub bit_depth: u8,
    pub signed: bool,
    pub width: u32,
    pub height: u32,
    pub sub_x: u32,
    pub sub_y: u32,
    /// Row-major samples, `width * height` entries.
    pub samples: Vec<i32>,
}

impl ImageComponent {
    /// Smallest representable sample value for this depth/signedness.
    pub fn min_value(&self) -> i64 {
        if self.signed {
            -(1i64 << (self.bit_depth - 1))
        } else {
            0
        }
    }

    /// Largest representable sample value for this depth/signedness.
    pub fn max_value(&self) -> i64 {
        if self.signed {
            (1i64 << (self.bit_depth - 1)) - 1
        } else {
            (1i64 << self.bit_depth) - 1
        }
    }
}

/// Multi-component image. Component dimensions are tied to the canvas by
/// the subsampling invariant `comp.dim == ceil(image.dim / sub)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub components: Vec<ImageComponent>,
}

impl Image {
    /// Build an image and check the structural invariants.
    pub fn new(width: u32, height: u32, components: Vec<ImageComponent>) -> Result<Self, J2kError> {
        let image = Self {
            width,
            height,
            components,
        };
        image.validate()?;
        Ok(image)
    }

    /// Convenience constructor for a full-resolution unsigned grayscale plane.
    pub fn grayscale(width: u32, height: u32, bit_depth: u8, samples: Vec<i32>) -> Result<Self, J2kError> {
        Self::new(
            width,
            height,
            vec![ImageComponent {
                index: 0,
                bit_depth,
                signed: false,
                width,
                height,
                sub_x: 1,
                sub_y: 1,
                samples,
            }],
        )
    }

    pub fn validate(&self) -> Result<(), J2kError> {
        if self.width == 0 || self.height == 0 {
            return Err(J2kError::parameter("image dimensions must be non-zero"));
        }
        if self.components.is_empty() {
            return Err(J2kError::parameter("image must have at least one component"));
        }
        for comp in &self.components {
            if comp.bit_depth < 1 || comp.bit_depth > 38 {
                return Err(J2kError::parameter(format!(
                    "component {} bit depth {} outside [1, 38]",
                    comp.index, comp.bit_depth
                )));
            }
            if comp.sub_x == 0 || comp.sub_y == 0 {
                return Err(J2kError::parameter(format!(
                    "component {} subsampling must be >= 1",
                    comp.index
                )));
            }
            let expect_w = self.width.div_ceil(comp.sub_x);
            let expect_h = self.height.div_ceil(comp.sub_y);
            if comp.width != expect_w || comp.height != expect_h {
                return Err(J2kError::data(format!(
                    "component {} is {}x{}, expected {}x{} for subsampling {}x{}",
                    comp.index, comp.width, comp.height, expect_w, expect_h, comp.sub_x, comp.sub_y
                )));
            }
            let expected = comp.width as usize * comp.height as usize;
            if comp.samples.len() != expected {
                return Err(J2kError::data(format!(
                    "component {} has {} samples, expected {}",
                    comp.index,
                    comp.samples.len(),
                    expected
                )));
            }
        }
        Ok(())
    }
}

/// Axis-aligned rectangle on the image canvas, used for ROI masks and
/// partial decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Check containment within an image canvas; the parameter name is
    /// surfaced in the error message.
    pub fn validate_within(&self, image_width: u32, image_height: u32) -> Result<(), J2kError> {
        if self.width == 0 || self.height == 0 {
            return Err(J2kError::parameter("region width and height must be > 0"));
        }
        if self.right() > image_width || self.bottom() > image_height {
            return Err(J2kError::parameter(format!(
                "region {}x{}+{}+{} exceeds image bounds {}x{}",
                self.width, self.height, self.x, self.y, image_width, image_height
            )));
        }
        Ok(())
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsampling_invariant() {
        // 5x5 canvas with 2x2 subsampling gives a ceil(5/2) = 3x3 plane.
        let comp = ImageComponent {
            index: 0,
            bit_depth: 8,
            signed: false,
            width: 3,
            height: 3,
            sub_x: 2,
            sub_y: 2,
            samples: vec![0; 9],
        };
        assert!(Image::new(5, 5, vec![comp.clone()]).is_ok());

        let bad = ImageComponent {
            width: 2,
            samples: vec![0; 6],
            ..comp
        };
        assert!(Image::new(5, 5, vec![bad]).is_err());
    }

    #[test]
    fn test_sample_count_checked() {
        let comp = ImageComponent {
            index: 0,
            bit_depth: 8,
            signed: false,
            width: 4,
            height: 4,
            sub_x: 1,
            sub_y: 1,
            samples: vec![0; 15],
        };
        assert!(matches!(
            Image::new(4, 4, vec![comp]),
            Err(J2kError::InvalidData(_))
        ));
    }

    #[test]
    fn test_value_range() {
        let comp = ImageComponent {
            index: 0,
            bit_depth: 8,
            signed: true,
            width: 1,
            height: 1,
            sub_x: 1,
            sub_y: 1,
            samples: vec![0],
        };
        assert_eq!(comp.min_value(), -128);
        assert_eq!(comp.max_value(), 127);
    }

    #[test]
    fn test_region_bounds() {
        let r = Region::new(10, 10, 20, 20);
        assert!(r.validate_within(30, 30).is_ok());
        assert!(r.validate_within(29, 30).is_err());
        assert!(Region::new(0, 0, 0, 5).validate_within(10, 10).is_err());
    }

    #[test]
    fn test_region_intersection() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(9, 9, 5, 5);
        let c = Region::new(10, 10, 5, 5);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
