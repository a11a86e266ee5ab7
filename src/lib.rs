/*!
# j2c-rs

Pure Rust JPEG 2000 codec: encoder, decoder, and lossless transcoder
between Part-1 (MQ block coded) and Part-15 (high-throughput)
codestreams, with the Part-2 extensions the codestream syntax carries
(arbitrary wavelet kernels, extended ROI, multi-component transforms,
DC offset).

The crate operates on raw codestreams (SOC..EOC); file-format
containers (JP2, MJ2, MXF) are out of scope.

- `parser` / `writer`: codestream syntax (markers, headers).
- `packet` / `tag_tree` / `progression`: tier-2 packets in every
  progression order.
- `image` / `tile`: sample model and canvas/tile/subband geometry.
- `mq_coder` / `bit_plane_coder`: the MQ arithmetic coder and the
  EBCOT bit-plane passes (tier-1).
- `ht_block_coder`: the Part-15 block coder behind the same interface.
- `dwt`: 5/3 and 9/7 lifting, arbitrary kernels, multi-level
  decomposition structures.
- `quantization` / `rate_control` / `roi` / `mct`: scalar quantization,
  PCRD-opt layering, region-of-interest, component transforms.
- `encoder` / `decoder` / `transcoder`: the pipelines.

## Example

```no_run
use j2c_rs::{encode, decode, EncoderConfig, Image};

let image = Image::grayscale(64, 64, 8, vec![128; 64 * 64]).unwrap();
let bytes = encode(&image, &EncoderConfig::default()).unwrap();
let roundtrip = decode(&bytes).unwrap();
assert_eq!(roundtrip.components[0].samples, image.components[0].samples);
```
*/

pub mod bit_io;
pub mod bit_plane_coder;
pub mod concurrency;
pub mod config;
pub mod decoder;
pub mod dwt;
pub mod encoder;
pub mod error;
pub mod headers;
pub mod ht_block_coder;
pub mod image;
pub mod marker;
pub mod mct;
pub mod mq_coder;
pub mod packet;
pub mod parser;
pub mod progression;
pub mod quantization;
pub mod rate_control;
pub mod roi;
pub mod stream_reader;
pub mod stream_writer;
pub mod tag_tree;
pub mod tile;
pub mod transcoder;
pub mod writer;

pub use config::{DecodeOptions, EncoderConfig, ProgressStage, ProgressionOrder};
pub use decoder::{
    decode, decode_incremental, decode_partial, decode_quality, decode_region,
    decode_resolution, decode_with_options, RegionDecoder,
};
pub use encoder::{encode, encode_with};
pub use error::J2kError;
pub use image::{Image, ImageComponent, Region};
pub use roi::RoiDecodeStrategy;
pub use transcoder::{is_htj2k, transcode, transcode_with, TranscodeDirection, TranscodeResult};
