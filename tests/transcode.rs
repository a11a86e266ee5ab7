//! Transcoder tests: Part-1 <-> HTJ2K round trips, codestream
//! predicates, progress reporting and cancellation.

use j2c_rs::concurrency::CancellationToken;
use j2c_rs::config::EncoderConfig;
use j2c_rs::error::J2kError;
use j2c_rs::image::Image;
use j2c_rs::transcoder::TranscodeOptions;
use j2c_rs::{
    decode, encode, encode_with, is_htj2k, transcode, transcode_with, TranscodeDirection,
};

fn test_image() -> Image {
    let mut samples = Vec::with_capacity(64 * 64);
    for y in 0..64u32 {
        for x in 0..64u32 {
            samples.push(((x * 7 + y * 13) % 256) as i32);
        }
    }
    Image::grayscale(64, 64, 8, samples).unwrap()
}

#[test]
fn test_ht_encode_decode_roundtrip() {
    // Encoding with the HT coder is still lossless end to end.
    let image = test_image();
    let config = EncoderConfig {
        use_htj2k: true,
        ..Default::default()
    };
    let bytes = encode(&image, &config).unwrap();
    assert!(is_htj2k(&bytes).unwrap());
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.components[0].samples, image.components[0].samples);
}

#[test]
fn test_transcode_legacy_to_ht_and_back() {
    // encode -> transcode -> transcode back -> decode matches
    // encode -> decode exactly; transcoding introduces no loss.
    let image = test_image();
    let legacy = encode(&image, &EncoderConfig::default()).unwrap();
    let reference = decode(&legacy).unwrap();

    let ht = transcode(&legacy, TranscodeDirection::LegacyToHt).unwrap();
    assert!(is_htj2k(&ht.bytes).unwrap());
    assert_eq!(ht.direction, TranscodeDirection::LegacyToHt);
    assert_eq!(ht.tiles_processed, 1);
    assert!(ht.code_blocks_transcoded > 0);
    assert!(ht.metadata_preserved);

    // The HT rendition decodes to the same samples.
    let ht_decoded = decode(&ht.bytes).unwrap();
    assert_eq!(
        ht_decoded.components[0].samples,
        reference.components[0].samples
    );

    let back = transcode(&ht.bytes, TranscodeDirection::HtToLegacy).unwrap();
    assert!(!is_htj2k(&back.bytes).unwrap());
    let back_decoded = decode(&back.bytes).unwrap();
    assert_eq!(
        back_decoded.components[0].samples,
        reference.components[0].samples
    );
}

#[test]
fn test_transcode_ht_source_to_legacy() {
    // S4: HT-encoded image transcoded to legacy keeps dimensions and
    // samples within the lossless guarantee.
    let image = test_image();
    let config = EncoderConfig {
        use_htj2k: true,
        ..Default::default()
    };
    let ht_bytes = encode(&image, &config).unwrap();
    let legacy = transcode(&ht_bytes, TranscodeDirection::HtToLegacy).unwrap();
    let decoded = decode(&legacy.bytes).unwrap();
    assert_eq!(decoded.width, 64);
    assert_eq!(decoded.height, 64);
    assert_eq!(decoded.components[0].samples, image.components[0].samples);
}

#[test]
fn test_transcode_direction_mismatch() {
    let image = test_image();
    let legacy = encode(&image, &EncoderConfig::default()).unwrap();
    assert!(matches!(
        transcode(&legacy, TranscodeDirection::HtToLegacy),
        Err(J2kError::InvalidData(_))
    ));
    let ht = encode(
        &image,
        &EncoderConfig {
            use_htj2k: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(matches!(
        transcode(&ht, TranscodeDirection::LegacyToHt),
        Err(J2kError::InvalidData(_))
    ));
}

#[test]
fn test_transcode_multi_tile_parallel() {
    let mut samples = Vec::with_capacity(96 * 64);
    for y in 0..64u32 {
        for x in 0..96u32 {
            samples.push(((x ^ y) % 256) as i32);
        }
    }
    let image = Image::grayscale(96, 64, 8, samples).unwrap();
    let config = EncoderConfig {
        tile_size: Some((32, 32)),
        ..Default::default()
    };
    let legacy = encode(&image, &config).unwrap();
    let reference = decode(&legacy).unwrap();

    let options = TranscodeOptions {
        parallel_tiles: true,
        max_concurrency: 4,
    };
    let ht = transcode_with(
        &legacy,
        TranscodeDirection::LegacyToHt,
        &options,
        &CancellationToken::new(),
        None,
    )
    .unwrap();
    assert_eq!(ht.tiles_processed, 6);
    let decoded = decode(&ht.bytes).unwrap();
    assert_eq!(decoded.components[0].samples, reference.components[0].samples);
}

#[test]
fn test_transcode_progress_monotone_to_one() {
    let image = test_image();
    let legacy = encode(&image, &EncoderConfig::default()).unwrap();
    let mut seen: Vec<f32> = Vec::new();
    {
        let mut cb = |_stage: j2c_rs::ProgressStage, _sp: f32, overall: f32| {
            seen.push(overall);
        };
        transcode_with(
            &legacy,
            TranscodeDirection::LegacyToHt,
            &TranscodeOptions::default(),
            &CancellationToken::new(),
            Some(&mut cb),
        )
        .unwrap();
    }
    assert!(!seen.is_empty());
    for pair in seen.windows(2) {
        assert!(pair[1] >= pair[0], "progress went backwards: {seen:?}");
    }
    assert_eq!(*seen.last().unwrap(), 1.0);
}

#[test]
fn test_encode_progress_monotone_to_one() {
    let image = test_image();
    let mut seen: Vec<f32> = Vec::new();
    {
        let mut cb = |_stage: j2c_rs::ProgressStage, _sp: f32, overall: f32| {
            seen.push(overall);
        };
        encode_with(
            &image,
            &EncoderConfig::default(),
            &CancellationToken::new(),
            Some(&mut cb),
        )
        .unwrap();
    }
    assert!(!seen.is_empty());
    for pair in seen.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    assert_eq!(*seen.last().unwrap(), 1.0);
}

#[test]
fn test_cancellation_returns_no_output() {
    let image = test_image();
    let token = CancellationToken::new();
    token.cancel();
    assert_eq!(
        encode_with(&image, &EncoderConfig::default(), &token, None),
        Err(J2kError::Cancelled)
    );
    let legacy = encode(&image, &EncoderConfig::default()).unwrap();
    let res = transcode_with(
        &legacy,
        TranscodeDirection::LegacyToHt,
        &TranscodeOptions::default(),
        &token,
        None,
    );
    assert!(matches!(res, Err(J2kError::Cancelled)));
}

#[test]
fn test_transcode_preserves_layers_and_order() {
    // A layered source keeps its declared layer count; the extra layers
    // come back as valid empty packets.
    let image = test_image();
    let config = EncoderConfig {
        quality_layers: 4,
        ..Default::default()
    };
    let legacy = encode(&image, &config).unwrap();
    let reference = decode(&legacy).unwrap();
    let ht = transcode(&legacy, TranscodeDirection::LegacyToHt).unwrap();
    let decoded = decode(&ht.bytes).unwrap();
    assert_eq!(decoded.components[0].samples, reference.components[0].samples);
}

#[test]
fn test_transcode_elapsed_recorded() {
    let image = test_image();
    let legacy = encode(&image, &EncoderConfig::default()).unwrap();
    let result = transcode(&legacy, TranscodeDirection::LegacyToHt).unwrap();
    assert!(result.elapsed_seconds >= 0.0);
}
