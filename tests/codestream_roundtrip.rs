//! End-to-end codestream tests: encode/decode round trips across
//! configurations, partial decoding, and malformed-input handling.

use j2c_rs::config::{DecodeOptions, EncoderConfig, ProgressionOrder};
use j2c_rs::error::J2kError;
use j2c_rs::image::{Image, ImageComponent, Region};
use j2c_rs::mct::MctMode;
use j2c_rs::roi::{RoiDecodeStrategy, RoiEncodeConfig};
use j2c_rs::{decode, decode_region, decode_resolution, decode_with_options, encode};

fn gray(width: u32, height: u32, f: impl Fn(u32, u32) -> i32) -> Image {
    let mut samples = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            samples.push(f(x, y));
        }
    }
    Image::grayscale(width, height, 8, samples).unwrap()
}

fn rgb(width: u32, height: u32, r: i32, g: i32, b: i32) -> Image {
    let n = (width * height) as usize;
    let comp = |index: u16, v: i32| ImageComponent {
        index,
        bit_depth: 8,
        signed: false,
        width,
        height,
        sub_x: 1,
        sub_y: 1,
        samples: vec![v; n],
    };
    Image::new(width, height, vec![comp(0, r), comp(1, g), comp(2, b)]).unwrap()
}

fn assert_lossless(image: &Image, config: &EncoderConfig) -> Vec<u8> {
    let bytes = encode(image, config).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0x4F], "starts with SOC");
    assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9], "ends with EOC");
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.width, image.width);
    assert_eq!(decoded.height, image.height);
    for (dc, oc) in decoded.components.iter().zip(image.components.iter()) {
        assert_eq!(dc.samples, oc.samples, "component {}", oc.index);
    }
    bytes
}

#[test]
fn test_flat_gray_lossless_and_compact() {
    // 32x32, every pixel 128: exact recovery, compressed below 1 KiB.
    let image = gray(32, 32, |_, _| 128);
    let bytes = assert_lossless(&image, &EncoderConfig::default());
    assert!(
        bytes.len() < 32 * 32,
        "flat image should compress below one byte per pixel, got {}",
        bytes.len()
    );
}

#[test]
fn test_gradient_lossless() {
    let image = gray(64, 64, |x, _| (x * 255 / 63) as i32);
    assert_lossless(&image, &EncoderConfig::default());
}

#[test]
fn test_noise_lossless() {
    let image = gray(57, 43, |x, y| ((x * 31 + y * 17) % 256) as i32 ^ (x as i32 & 0x2A));
    assert_lossless(&image, &EncoderConfig::default());
}

#[test]
fn test_gradient_lossy_error_bound() {
    // 64x64 horizontal gradient, q = 0.95: max error within 5.
    let image = gray(64, 64, |x, _| (x * 255 / 63) as i32);
    let config = EncoderConfig {
        lossless: false,
        quality: 0.95,
        ..Default::default()
    };
    let bytes = encode(&image, &config).unwrap();
    let decoded = decode(&bytes).unwrap();
    let max_err = decoded.components[0]
        .samples
        .iter()
        .zip(image.components[0].samples.iter())
        .map(|(a, b)| (a - b).abs())
        .max()
        .unwrap();
    assert!(max_err <= 5, "lossy max error {max_err} exceeds 5");
}

#[test]
fn test_rgb_lossless() {
    // 100x100 RGB constant planes recover exactly.
    let image = rgb(100, 100, 200, 100, 50);
    assert_lossless(&image, &EncoderConfig::default());
}

#[test]
fn test_rgb_lossless_with_rct() {
    let image = rgb(100, 100, 200, 100, 50);
    let config = EncoderConfig {
        mct: MctMode::Standard,
        ..Default::default()
    };
    assert_lossless(&image, &config);
}

#[test]
fn test_all_progression_orders_roundtrip() {
    let image = gray(48, 48, |x, y| ((x + 2 * y) % 256) as i32);
    for order in [
        ProgressionOrder::Lrcp,
        ProgressionOrder::Rlcp,
        ProgressionOrder::Rpcl,
        ProgressionOrder::Pcrl,
        ProgressionOrder::Cprl,
    ] {
        let config = EncoderConfig {
            progression_order: order,
            ..Default::default()
        };
        assert_lossless(&image, &config);
    }
}

#[test]
fn test_quality_layers_roundtrip() {
    let image = gray(64, 64, |x, y| ((x * y) % 256) as i32);
    let config = EncoderConfig {
        quality_layers: 5,
        ..Default::default()
    };
    let bytes = assert_lossless(&image, &config);

    // Truncated-by-layer decode stays within the image and never
    // overshoots the full-quality samples' range.
    let coarse = decode_with_options(
        &bytes,
        &DecodeOptions {
            max_layer: Some(0),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(coarse.width, 64);
    assert_eq!(coarse.components[0].samples.len(), 64 * 64);
}

#[test]
fn test_multi_tile_lossless() {
    let image = gray(100, 70, |x, y| ((x ^ y) % 256) as i32);
    let config = EncoderConfig {
        tile_size: Some((32, 32)),
        ..Default::default()
    };
    assert_lossless(&image, &config);
}

#[test]
fn test_small_code_blocks() {
    let image = gray(40, 40, |x, y| ((3 * x + y) % 256) as i32);
    let config = EncoderConfig {
        code_block_size: (16, 16),
        ..Default::default()
    };
    assert_lossless(&image, &config);
}

#[test]
fn test_signed_samples() {
    let mut samples = Vec::new();
    for i in 0..(24 * 24) {
        samples.push((i % 255) - 128);
    }
    let image = Image::new(
        24,
        24,
        vec![ImageComponent {
            index: 0,
            bit_depth: 8,
            signed: true,
            width: 24,
            height: 24,
            sub_x: 1,
            sub_y: 1,
            samples,
        }],
    )
    .unwrap();
    assert_lossless(&image, &EncoderConfig::default());
}

#[test]
fn test_subsampled_component() {
    let luma: Vec<i32> = (0..40 * 40).map(|i| (i % 256) as i32).collect();
    let chroma: Vec<i32> = (0..20 * 20).map(|i| ((i * 3) % 256) as i32).collect();
    let image = Image::new(
        40,
        40,
        vec![
            ImageComponent {
                index: 0,
                bit_depth: 8,
                signed: false,
                width: 40,
                height: 40,
                sub_x: 1,
                sub_y: 1,
                samples: luma,
            },
            ImageComponent {
                index: 1,
                bit_depth: 8,
                signed: false,
                width: 20,
                height: 20,
                sub_x: 2,
                sub_y: 2,
                samples: chroma,
            },
        ],
    )
    .unwrap();
    assert_lossless(&image, &EncoderConfig::default());
}

#[test]
fn test_dc_offset_roundtrip() {
    let image = gray(32, 32, |x, _| 100 + (x as i32 % 50));
    let config = EncoderConfig {
        dc_offset: vec![30],
        ..Default::default()
    };
    assert_lossless(&image, &config);
}

#[test]
fn test_roi_scaling_lossless() {
    let image = gray(64, 64, |x, y| ((x * 2 + y) % 256) as i32);
    let config = EncoderConfig {
        roi: Some(RoiEncodeConfig::rectangular(Region::new(16, 16, 24, 24), 12)),
        ..Default::default()
    };
    assert_lossless(&image, &config);
}

#[test]
fn test_zero_decomposition_levels() {
    let image = gray(30, 22, |x, y| ((x + y) % 256) as i32);
    let config = EncoderConfig {
        decomposition_levels: 0,
        ..Default::default()
    };
    assert_lossless(&image, &config);
}

#[test]
fn test_decode_resolution_halves_dimensions() {
    let image = gray(64, 64, |x, y| ((x + y) % 256) as i32);
    let bytes = encode(&image, &EncoderConfig::default()).unwrap();
    // Default encoding has 5 levels; asking for level 4 halves the
    // output once.
    let half = decode_resolution(&bytes, 4).unwrap();
    assert_eq!(half.width, 32);
    assert_eq!(half.height, 32);
    let tiny = decode_resolution(&bytes, 0).unwrap();
    assert_eq!(tiny.width, 2);
    assert_eq!(tiny.height, 2);
}

#[test]
fn test_decode_region_matches_full_decode() {
    let image = gray(64, 64, |x, y| ((5 * x + 3 * y) % 256) as i32);
    let bytes = encode(&image, &EncoderConfig::default()).unwrap();
    let full = decode(&bytes).unwrap();
    let region = Region::new(16, 8, 24, 32);
    for strategy in [
        RoiDecodeStrategy::Direct,
        RoiDecodeStrategy::FullImageExtraction,
        RoiDecodeStrategy::Cached,
    ] {
        let cropped = decode_region(&bytes, region, strategy).unwrap();
        assert_eq!(cropped.width, 24);
        assert_eq!(cropped.height, 32);
        for y in 0..32usize {
            for x in 0..24usize {
                let expect = full.components[0].samples[(y + 8) * 64 + (x + 16)];
                let got = cropped.components[0].samples[y * 24 + x];
                assert_eq!(got, expect, "{strategy:?} sample ({x},{y})");
            }
        }
    }
}

#[test]
fn test_component_subset_decode() {
    let image = rgb(32, 32, 10, 200, 90);
    let bytes = encode(&image, &EncoderConfig::default()).unwrap();
    let only_green = decode_with_options(
        &bytes,
        &DecodeOptions {
            components: Some(vec![1]),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(only_green.components.len(), 1);
    assert_eq!(only_green.components[0].index, 1);
    assert!(only_green.components[0].samples.iter().all(|&v| v == 200));
}

#[test]
fn test_decode_rejects_garbage() {
    // Empty input.
    assert_eq!(decode(&[]), Err(J2kError::Truncated));
    // Random bytes without SOC.
    let garbage = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFE];
    assert!(matches!(
        decode(&garbage),
        Err(J2kError::InvalidCodestream { .. })
    ));
    // A truncated prefix of a valid codestream.
    let image = gray(16, 16, |x, _| x as i32);
    let bytes = encode(&image, &EncoderConfig::default()).unwrap();
    assert!(decode(&bytes[..10]).is_err());
}

#[test]
fn test_max_layer_validation_names_parameter() {
    // A 5-layer image refuses maxLayer 10 with a message naming it.
    let image = gray(16, 16, |x, _| x as i32);
    let config = EncoderConfig {
        quality_layers: 5,
        ..Default::default()
    };
    let bytes = encode(&image, &config).unwrap();
    let err = decode_with_options(
        &bytes,
        &DecodeOptions {
            max_layer: Some(10),
            ..Default::default()
        },
    )
    .unwrap_err();
    match err {
        J2kError::InvalidParameter(message) => {
            assert!(message.contains("maxLayer"), "message: {message}");
        }
        other => panic!("expected InvalidParameter, got {other:?}"),
    }
}

#[test]
fn test_options_validated_before_decode_work() {
    let image = gray(16, 16, |x, _| x as i32);
    let bytes = encode(&image, &EncoderConfig::default()).unwrap();
    // Resolution level beyond the stream's decomposition depth.
    assert!(decode_with_options(
        &bytes,
        &DecodeOptions {
            max_resolution_level: Some(9),
            ..Default::default()
        },
    )
    .is_err());
    // Region outside the canvas.
    assert!(decode_with_options(
        &bytes,
        &DecodeOptions {
            region: Some(Region::new(8, 8, 16, 16)),
            ..Default::default()
        },
    )
    .is_err());
    // Empty component list.
    assert!(decode_with_options(
        &bytes,
        &DecodeOptions {
            components: Some(vec![]),
            ..Default::default()
        },
    )
    .is_err());
}

#[test]
fn test_custom_lifting_kernel_roundtrip() {
    // A custom reversible kernel travels through the ATK segment and
    // reconstructs exactly.
    let image = gray(48, 32, |x, y| ((x * 5 + y * 9) % 256) as i32);
    let config = EncoderConfig {
        wavelet_kernel: Some(j2c_rs::dwt::kernel::WaveletKernel::cdf53_as_arbitrary()),
        ..Default::default()
    };
    assert_lossless(&image, &config);
}

#[test]
fn test_incremental_buffer_decode() {
    use j2c_rs::concurrency::IncrementalBuffer;
    use j2c_rs::decode_incremental;

    let image = gray(32, 32, |x, y| ((x + y) % 256) as i32);
    let bytes = encode(&image, &EncoderConfig::default()).unwrap();

    let buffer = IncrementalBuffer::new();
    let options = DecodeOptions::default();
    assert!(decode_incremental(&buffer, &options, 64).unwrap().is_none());

    // Feed half: not decodable yet.
    buffer.append(&bytes[..bytes.len() / 2]);
    assert!(decode_incremental(&buffer, &options, usize::MAX)
        .unwrap()
        .is_none());

    // Feed the rest and mark complete.
    buffer.append(&bytes[bytes.len() / 2..]);
    buffer.mark_complete();
    let decoded = decode_incremental(&buffer, &options, 0)
        .unwrap()
        .expect("complete buffer decodes");
    assert_eq!(decoded.components[0].samples, image.components[0].samples);
}

#[test]
fn test_sixteen_bit_depth() {
    let samples: Vec<i32> = (0..32 * 32).map(|i| (i * 61) % 65536).collect();
    let image = Image::new(
        32,
        32,
        vec![ImageComponent {
            index: 0,
            bit_depth: 16,
            signed: false,
            width: 32,
            height: 32,
            sub_x: 1,
            sub_y: 1,
            samples,
        }],
    )
    .unwrap();
    assert_lossless(&image, &EncoderConfig::default());
}
