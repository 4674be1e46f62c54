// Stream encoder: accumulates samples into a message, applying spatial
// and multi-layer delta prediction, then variable-length or simple8b
// value packing, quality run-length coding, and an optional outer
// compression pass for large messages.
//
// Buffering notes:
//   - One scratch slab and one output slab per ping-pong side, sized at
//     construction; the hot path does not allocate
//   - The slice returned by a completed message points into the output
//     slab that is not reused until the next message completes

use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::delta::Predictor;
use crate::quality::QualityHistory;
use crate::simple8b::{self, Simple8bError};
use crate::stream::{
    delta_layers_for_rate, spatial_refs, Sample, StreamId, DEFLATE_THRESHOLD_SAMPLES,
    MAX_HEADER_SIZE, SIMPLE8B_THRESHOLD_SAMPLES,
};
use crate::varint;

// ---------------------------------------------------------------------------
// Encoder error
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum EncodeError {
    /// The outer compression pass failed to write.
    Deflate(io::Error),
    /// A packed value exceeded the simple8b width limit.
    Overflow(u64),
    /// The operation is not valid in the current encoder state.
    StateViolation(&'static str),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::Deflate(e) => write!(f, "outer compression failed: {e}"),
            EncodeError::Overflow(v) => write!(f, "value {v:#x} exceeds simple8b range"),
            EncodeError::StateViolation(msg) => write!(f, "state violation: {msg}"),
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<Simple8bError> for EncodeError {
    fn from(e: Simple8bError) -> Self {
        match e {
            Simple8bError::Overflow(v) => EncodeError::Overflow(v),
            Simple8bError::OutputFull => {
                EncodeError::StateViolation("simple8b word buffer exhausted")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Stream protocol encoder for one stream.
///
/// Created with fixed parameters, fed one sample per [`Encoder::encode`]
/// call, and emits a finalised message whenever the configured number of
/// samples has accumulated. Not safe for concurrent use: the `&mut self`
/// receivers give one caller at a time; wrap the instance in a lock to
/// share it across threads.
pub struct Encoder {
    id: StreamId,
    sampling_rate: u32,
    samples_per_message: usize,
    channel_count: usize,

    buf_a: Vec<u8>,
    buf_b: Vec<u8>,
    out_a: Vec<u8>,
    out_b: Vec<u8>,
    use_buf_a: bool,
    len: usize,
    encoded_samples: usize,

    using_simple8b: bool,
    simple8b_words: Vec<u64>,
    /// Per-channel zig-zag residuals (simple8b mode).
    diffs: Vec<Vec<u64>>,
    /// Per-sample residual rows (varint mode).
    values: Vec<Vec<i32>>,

    predictor: Predictor,
    quality: QualityHistory,
    spatial_ref: Vec<i32>,
}

impl Encoder {
    /// Create an encoder for a stream with `channel_count` int32 channels
    /// sampled at `sampling_rate` Hz, emitting `samples_per_message`
    /// samples per message.
    pub fn new(
        id: StreamId,
        channel_count: usize,
        sampling_rate: u32,
        samples_per_message: usize,
    ) -> Encoder {
        assert!(channel_count >= 1);
        assert!(samples_per_message >= 1);

        // Worst-case uncompressed message size.
        let buf_size = MAX_HEADER_SIZE + samples_per_message * channel_count * 8 + channel_count * 4;
        let using_simple8b = samples_per_message > SIMPLE8B_THRESHOLD_SAMPLES;

        Encoder {
            id,
            sampling_rate,
            samples_per_message,
            channel_count,
            buf_a: vec![0; buf_size],
            buf_b: vec![0; buf_size],
            out_a: Vec::with_capacity(buf_size),
            out_b: Vec::with_capacity(buf_size),
            use_buf_a: true,
            len: 0,
            encoded_samples: 0,
            using_simple8b,
            simple8b_words: vec![0; samples_per_message],
            diffs: if using_simple8b {
                vec![vec![0; samples_per_message]; channel_count]
            } else {
                Vec::new()
            },
            values: if using_simple8b {
                Vec::new()
            } else {
                vec![vec![0; channel_count]; samples_per_message]
            },
            predictor: Predictor::new(delta_layers_for_rate(sampling_rate), channel_count),
            quality: QualityHistory::new(channel_count),
            spatial_ref: vec![-1; channel_count],
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    pub fn samples_per_message(&self) -> usize {
        self.samples_per_message
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Use XOR deltas instead of arithmetic deltas. Must match the decoder.
    pub fn set_xor(&mut self, use_xor: bool) {
        self.predictor.set_xor(use_xor);
    }

    /// Map adjacent three-phase channel groups for spatial compression.
    /// Must match the decoder. See [`spatial_refs`].
    pub fn set_spatial_refs(
        &mut self,
        count: usize,
        count_v: usize,
        count_i: usize,
        include_neutral: bool,
    ) {
        self.spatial_ref = spatial_refs(count, count_v, count_i, include_neutral);
    }

    /// Feed the next sample. Returns the finalised message once the
    /// configured number of samples has accumulated, `None` otherwise.
    ///
    /// Samples must arrive in time order; `sample.values` and
    /// `sample.quality` must have `channel_count` entries.
    pub fn encode(&mut self, sample: &Sample) -> Result<Option<&[u8]>, EncodeError> {
        assert_eq!(sample.values.len(), self.channel_count);
        assert_eq!(sample.quality.len(), self.channel_count);

        if self.encoded_samples == 0 {
            // Message header: id and first timestamp. The encoded-samples
            // varint is appended at finish time, once the count is known.
            let buf = if self.use_buf_a {
                &mut self.buf_a
            } else {
                &mut self.buf_b
            };
            buf[..16].copy_from_slice(&self.id);
            buf[16..24].copy_from_slice(&sample.t.to_be_bytes());
            self.len = 24;
            self.quality.start(&sample.quality);
        } else {
            self.quality.record(&sample.quality);
        }

        let j = self.encoded_samples;
        for ch in 0..self.channel_count {
            let mut val = sample.values[ch];
            let r = self.spatial_ref[ch];
            if r >= 0 {
                val = val.wrapping_sub(sample.values[r as usize]);
            }
            let residual = self.predictor.residual(j, ch, val);
            if self.using_simple8b {
                self.diffs[ch][j] = varint::zigzag_encode64(i64::from(residual));
            } else {
                self.values[j][ch] = residual;
            }
        }

        self.encoded_samples += 1;
        if self.encoded_samples >= self.samples_per_message {
            return self.finish_message().map(Some);
        }
        Ok(None)
    }

    /// Flush the current partial message early. The header records the
    /// actual number of samples.
    pub fn end_encode(&mut self) -> Result<&[u8], EncodeError> {
        if self.encoded_samples == 0 {
            return Err(EncodeError::StateViolation("no samples to flush"));
        }
        self.finish_message()
    }

    /// Discard the current partial message without emitting anything.
    pub fn cancel_encode(&mut self) {
        self.quality.reset();
        self.encoded_samples = 0;
        self.len = 0;
    }

    /// Serialise the accumulated samples into a finalised message and
    /// swap the ping-pong buffers.
    fn finish_message(&mut self) -> Result<&[u8], EncodeError> {
        let mut len = self.len;
        let buf = if self.use_buf_a {
            &mut self.buf_a
        } else {
            &mut self.buf_b
        };

        len += varint::put_i32(&mut buf[len..], self.encoded_samples as i32);
        let header_len = len;

        // Values section.
        if self.using_simple8b {
            for diffs in &self.diffs {
                let words =
                    simple8b::encode_all(&mut self.simple8b_words, &diffs[..self.encoded_samples])?;
                for &word in &self.simple8b_words[..words] {
                    buf[len..len + 8].copy_from_slice(&word.to_be_bytes());
                    len += 8;
                }
            }
        } else {
            for row in &self.values[..self.encoded_samples] {
                for &value in row {
                    len += varint::put_i32(&mut buf[len..], value);
                }
            }
        }

        // Quality section.
        len = self.quality.write(buf, len);
        self.quality.reset();

        // Assemble the outgoing message, compressing the payload for
        // large message sizes. The header is never compressed.
        let out = if self.use_buf_a {
            &mut self.out_a
        } else {
            &mut self.out_b
        };
        out.clear();
        if self.samples_per_message > DEFLATE_THRESHOLD_SAMPLES {
            out.extend_from_slice(&buf[..header_len]);
            let mut gz = GzEncoder::new(&mut *out, Compression::best());
            gz.write_all(&buf[header_len..len])
                .map_err(EncodeError::Deflate)?;
            gz.finish().map_err(EncodeError::Deflate)?;
        } else {
            out.extend_from_slice(&buf[..len]);
        }

        self.encoded_samples = 0;
        self.len = 0;

        // Swap sides; the message just built stays valid until the side
        // is reused by the completion after next.
        let finished_a = self.use_buf_a;
        self.use_buf_a = !finished_a;
        Ok(if finished_a { &self.out_a } else { &self.out_b })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Sample;

    const ID: StreamId = [0xA5; 16];

    fn sample(t: u64, values: &[i32], quality: &[u32]) -> Sample {
        Sample {
            t,
            values: values.to_vec(),
            quality: quality.to_vec(),
        }
    }

    #[test]
    fn header_layout() {
        let mut enc = Encoder::new(ID, 1, 4000, 1);
        let msg = enc
            .encode(&sample(0x0102030405060708, &[0], &[0]))
            .unwrap()
            .expect("message completes at one sample")
            .to_vec();
        assert_eq!(&msg[..16], &ID);
        assert_eq!(&msg[16..24], &0x0102030405060708u64.to_be_bytes());
        // One encoded sample, zig-zag varint.
        assert_eq!(msg[24], 2);
        // Value 0 and quality pair (0, 0).
        assert_eq!(&msg[25..], &[0, 0, 0]);
    }

    #[test]
    fn no_message_until_count_reached() {
        let mut enc = Encoder::new(ID, 2, 4000, 3);
        for t in 0..2u64 {
            let done = enc.encode(&sample(t, &[1, 2], &[0, 0])).unwrap();
            assert!(done.is_none());
        }
        let done = enc.encode(&sample(2, &[1, 2], &[0, 0])).unwrap();
        assert!(done.is_some());
    }

    #[test]
    fn end_encode_without_samples_is_a_state_violation() {
        let mut enc = Encoder::new(ID, 1, 4000, 8);
        match enc.end_encode() {
            Err(EncodeError::StateViolation(_)) => {}
            other => panic!("expected StateViolation, got {other:?}"),
        }
    }

    #[test]
    fn cancel_discards_partial_state() {
        let mut enc = Encoder::new(ID, 1, 4000, 4);
        enc.encode(&sample(9, &[42], &[7])).unwrap();
        enc.cancel_encode();
        // A fresh message starts over with a new header and quality run.
        let mut last = None;
        for t in 0..4u64 {
            if let Some(msg) = enc.encode(&sample(t + 100, &[5], &[1])).unwrap() {
                last = Some(msg.to_vec());
            }
        }
        let msg = last.expect("four samples complete a message");
        assert_eq!(&msg[16..24], &100u64.to_be_bytes());
    }

    #[test]
    fn returned_message_survives_one_following_completion() {
        let mut enc = Encoder::new(ID, 1, 4000, 1);
        let first = enc.encode(&sample(1, &[10], &[0])).unwrap().unwrap().to_vec();
        // The next completion writes the other ping-pong side.
        let second = enc.encode(&sample(2, &[11], &[0])).unwrap().unwrap().to_vec();
        assert_ne!(&first[16..24], &second[16..24]);
    }

    #[test]
    fn mode_selection_follows_threshold() {
        let small = Encoder::new(ID, 1, 4000, SIMPLE8B_THRESHOLD_SAMPLES);
        assert!(!small.using_simple8b);
        let large = Encoder::new(ID, 1, 4000, SIMPLE8B_THRESHOLD_SAMPLES + 1);
        assert!(large.using_simple8b);
    }
}
