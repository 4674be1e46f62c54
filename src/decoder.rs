// Stream decoder: parses one complete message and reconstructs samples
// into a preallocated output array.
//
// Decode order mirrors the encoder exactly: header, values (channel-major
// simple8b words or sample-major varints), then the deferred spatial
// fixup, then quality runs. Spatial references are re-added only after
// all time-domain decoding has finished; applying them piecemeal would
// corrupt the previous-value history the delta chain replays.

use std::io::{self, Read};

use flate2::read::GzDecoder;

use crate::delta::Reconstructor;
use crate::simple8b;
use crate::stream::{
    delta_layers_for_rate, spatial_refs, Sample, StreamId, DEFLATE_THRESHOLD_SAMPLES,
    SIMPLE8B_THRESHOLD_SAMPLES,
};
use crate::varint::{self, VarIntError};

/// Smallest possible message: id, timestamp, one-byte sample count.
const MIN_MESSAGE_SIZE: usize = 16 + 8 + 1;

// ---------------------------------------------------------------------------
// Decoder error
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum DecodeError {
    /// The message header id does not match this decoder's stream id.
    IdMismatch,
    /// A varint or simple8b read ran past the end of the buffer.
    Truncated,
    /// A varint exceeded the 32-bit range or a count field is invalid.
    Overflow,
    /// The outer compression layer failed to read.
    Deflate(io::Error),
    /// The operation is not valid for this input.
    StateViolation(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IdMismatch => write!(f, "stream id mismatch"),
            DecodeError::Truncated => write!(f, "truncated input"),
            DecodeError::Overflow => write!(f, "value out of range"),
            DecodeError::Deflate(e) => write!(f, "outer decompression failed: {e}"),
            DecodeError::StateViolation(msg) => write!(f, "state violation: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<VarIntError> for DecodeError {
    fn from(e: VarIntError) -> Self {
        match e {
            VarIntError::Truncated => DecodeError::Truncated,
            VarIntError::Overflow => DecodeError::Overflow,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Stream protocol decoder for one stream.
///
/// [`Decoder::decode`] consumes one complete message and populates
/// [`Decoder::out`] in place; the hot path does not allocate once the
/// decoder is constructed. Not safe for concurrent use; wrap the
/// instance in a lock to share it across threads.
pub struct Decoder {
    id: StreamId,
    sampling_rate: u32,
    samples_per_message: usize,
    channel_count: usize,
    encoded_samples: usize,

    /// Decoded samples, valid in `out[..samples_decoded()]` after a
    /// successful [`Decoder::decode`].
    pub out: Vec<Sample>,

    gz_buf: Vec<u8>,
    using_simple8b: bool,
    reconstructor: Reconstructor,
    spatial_ref: Vec<i32>,
}

impl Decoder {
    /// Create a decoder with the same parameters as the peer encoder.
    pub fn new(
        id: StreamId,
        channel_count: usize,
        sampling_rate: u32,
        samples_per_message: usize,
    ) -> Decoder {
        assert!(channel_count >= 1);
        assert!(samples_per_message >= 1);

        let buf_size = samples_per_message * channel_count * 8 + channel_count * 4;

        Decoder {
            id,
            sampling_rate,
            samples_per_message,
            channel_count,
            encoded_samples: 0,
            out: vec![Sample::new(channel_count); samples_per_message],
            gz_buf: Vec::with_capacity(buf_size),
            using_simple8b: samples_per_message > SIMPLE8B_THRESHOLD_SAMPLES,
            reconstructor: Reconstructor::new(
                delta_layers_for_rate(sampling_rate),
                channel_count,
            ),
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

    /// Number of valid samples in [`Decoder::out`] after the last decode.
    pub fn samples_decoded(&self) -> usize {
        self.encoded_samples.min(self.samples_per_message)
    }

    /// Use XOR deltas instead of arithmetic deltas. Must match the encoder.
    pub fn set_xor(&mut self, use_xor: bool) {
        self.reconstructor.set_xor(use_xor);
    }

    /// Map adjacent three-phase channel groups for spatial compression.
    /// Must match the encoder. See [`spatial_refs`].
    pub fn set_spatial_refs(
        &mut self,
        count: usize,
        count_v: usize,
        count_i: usize,
        include_neutral: bool,
    ) {
        self.spatial_ref = spatial_refs(count, count_v, count_i, include_neutral);
    }

    /// Decode one complete message into [`Decoder::out`].
    ///
    /// On error the output array contents are unspecified and must not be
    /// consumed; the decoder itself remains usable for the next message.
    pub fn decode(&mut self, buf: &[u8]) -> Result<(), DecodeError> {
        if buf.len() < MIN_MESSAGE_SIZE {
            return Err(DecodeError::StateViolation("message shorter than header"));
        }
        if buf[..16] != self.id {
            return Err(DecodeError::IdMismatch);
        }

        let mut t_raw = [0u8; 8];
        t_raw.copy_from_slice(&buf[16..24]);
        self.out[0].t = u64::from_be_bytes(t_raw);

        let mut pos = 24;
        let (count, used) = varint::read_i32(&buf[pos..])?;
        pos += used;
        self.encoded_samples = usize::try_from(count).map_err(|_| DecodeError::Overflow)?;
        let actual_samples = self.encoded_samples.min(self.samples_per_message);

        // Samples after the first are re-timestamped by message-local
        // index; absolute time is derived from out[0].t by the consumer.
        for s in 1..actual_samples {
            self.out[s].t = s as u64;
        }

        // The outer pass is gated on the configured message size, shared
        // with the encoder, so early-flushed messages decode the same way.
        let deflated = self.samples_per_message > DEFLATE_THRESHOLD_SAMPLES;
        if deflated {
            self.gz_buf.clear();
            let mut gz = GzDecoder::new(&buf[pos..]);
            gz.read_to_end(&mut self.gz_buf).map_err(DecodeError::Deflate)?;
        }
        let payload: &[u8] = if deflated { &self.gz_buf } else { &buf[pos..] };
        let mut pos = 0;

        // Values section.
        if self.using_simple8b {
            // Channel-major: all residuals of channel 0, then channel 1, ...
            // Channel sequences end on word boundaries, so a flat value
            // count locates every channel in one pass over the words.
            let total = actual_samples * self.channel_count;
            let mut unpacker = simple8b::Unpacker::new(payload);
            let mut ch = 0;
            for counter in 0..total {
                let raw = unpacker.next().ok_or(DecodeError::Truncated)?;
                let index_ts = counter % actual_samples;
                if counter > 0 && index_ts == 0 {
                    ch += 1;
                }
                let value = varint::zigzag_decode64(raw) as i32;
                if index_ts == 0 {
                    self.out[0].values[ch] = value;
                } else {
                    let previous = self.out[index_ts - 1].values[ch];
                    self.out[index_ts].values[ch] =
                        self.reconstructor.advance(index_ts, ch, value, previous);
                }
            }
            pos += unpacker.words_consumed() * 8;
        } else {
            // Sample-major: C values at sample 0, then C residuals per row.
            if actual_samples > 0 {
                for ch in 0..self.channel_count {
                    let (value, used) = varint::read_i32(&payload[pos..])?;
                    pos += used;
                    self.out[0].values[ch] = value;
                }
            }
            for index_ts in 1..actual_samples {
                for ch in 0..self.channel_count {
                    let (residual, used) = varint::read_i32(&payload[pos..])?;
                    pos += used;
                    let previous = self.out[index_ts - 1].values[ch];
                    self.out[index_ts].values[ch] =
                        self.reconstructor.advance(index_ts, ch, residual, previous);
                }
            }
        }

        // Spatial fixup, strictly after all time-domain decoding.
        if actual_samples > 0 {
            for sample in &mut self.out {
                for ch in 0..self.channel_count {
                    let r = self.spatial_ref[ch];
                    if r >= 0 {
                        sample.values[ch] =
                            sample.values[ch].wrapping_add(sample.values[r as usize]);
                    }
                }
            }
        }

        // Quality section: per channel, (value, length) pairs where the
        // length is an absolute bound on the fill index and zero means
        // "runs to the end of the message".
        for ch in 0..self.channel_count {
            let mut sample_number = 0;
            while sample_number < actual_samples {
                let (value, used) = varint::read_u32(&payload[pos..])?;
                pos += used;
                self.out[sample_number].quality[ch] = value;
                let (length, used) = varint::read_u32(&payload[pos..])?;
                pos += used;

                if length == 0 {
                    for s in sample_number + 1..self.out.len() {
                        self.out[s].quality[ch] = value;
                    }
                    sample_number = actual_samples;
                } else {
                    let bound = (length as usize).min(self.out.len());
                    for s in sample_number + 1..bound {
                        self.out[s].quality[ch] = value;
                    }
                    sample_number += length as usize;
                }
            }
        }

        self.reconstructor.reset();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
