//! Slipstream: lossless compression for fixed-rate multi-channel integer
//! sample streams.
//!
//! The codec targets synchronised streams from electrical-power
//! instrumentation: C signed 32-bit channels sampled at a fixed rate,
//! each sample carrying per-channel quality flags. A message holds up to
//! N samples and is built from:
//!
//! - multi-layer delta (or XOR) prediction across time (`delta`)
//! - optional spatial prediction across related channels (`stream`)
//! - zig-zag varints or simple8b bit-packing for the residuals
//!   (`varint`, `simple8b`), chosen by message size
//! - run-length compression of the quality stream (`quality`)
//! - an outer compression pass for large messages
//!
//! Producer and consumer agree on the stream parameters out of band and
//! exchange a 16-byte stream id so independent streams can be
//! multiplexed.
//!
//! # Quick start
//!
//! ```
//! use slipstream::{Decoder, Encoder, Sample};
//!
//! let id = [0x42u8; 16];
//! let mut encoder = Encoder::new(id, 2, 4000, 4);
//! let mut decoder = Decoder::new(id, 2, 4000, 4);
//!
//! let mut message = Vec::new();
//! for t in 0..4u64 {
//!     let sample = Sample {
//!         t,
//!         values: vec![t as i32 * 10, -(t as i32)],
//!         quality: vec![0, 0],
//!     };
//!     if let Some(bytes) = encoder.encode(&sample).unwrap() {
//!         message = bytes.to_vec();
//!     }
//! }
//!
//! decoder.decode(&message).unwrap();
//! assert_eq!(decoder.out[3].values, vec![30, -3]);
//! ```

pub mod decoder;
pub mod delta;
pub mod encoder;
pub mod quality;
pub mod simple8b;
pub mod stream;
pub mod varint;

pub use decoder::{DecodeError, Decoder};
pub use encoder::{EncodeError, Encoder};
pub use stream::{spatial_refs, Sample, StreamId};
