// Shared stream model: parameters, sample tuples, and the mode thresholds
// both sides derive from them.

/// Number of samples per message above which values are packed with
/// simple8b instead of per-sample varints.
pub const SIMPLE8B_THRESHOLD_SAMPLES: usize = 16;

/// Number of samples per message above which the payload gets an outer
/// compression pass. Both sides decide from this configured value, never
/// from the actually-encoded count, so early-flushed messages stay
/// decodable.
pub const DEFLATE_THRESHOLD_SAMPLES: usize = 4096;

/// Delta-encoding depth for standard sampling rates.
pub const DEFAULT_DELTA_LAYERS: usize = 3;

/// Delta-encoding depth for high sampling rates (> 100 kHz).
pub const HIGH_DELTA_LAYERS: usize = 3;

/// Upper bound on the message header: 16-byte id, 8-byte timestamp, and
/// the encoded-samples varint, with slack.
pub const MAX_HEADER_SIZE: usize = 36;

/// Opaque 16-byte stream identifier, agreed out of band.
pub type StreamId = [u8; 16];

/// One time instant of a stream: a timestamp, one `i32` per channel, and
/// one quality word per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample {
    pub t: u64,
    pub values: Vec<i32>,
    pub quality: Vec<u32>,
}

impl Sample {
    /// An all-zero sample with `channel_count` slots.
    pub fn new(channel_count: usize) -> Self {
        Sample {
            t: 0,
            values: vec![0; channel_count],
            quality: vec![0; channel_count],
        }
    }
}

/// Build a spatial-reference table mapping adjacent three-phase groups.
///
/// Channels are assumed laid out as `count_v` voltage groups followed by
/// `count_i` current groups, each group holding the three phases plus a
/// neutral channel when `include_neutral` is set. Every channel of a
/// group after the first references the matching channel of the previous
/// group; ungrouped channels get `-1` (no reference).
///
/// Encoder and decoder must be configured with identical tables.
pub fn spatial_refs(count: usize, count_v: usize, count_i: usize, include_neutral: bool) -> Vec<i32> {
    let mut refs = vec![-1i32; count];
    let inc = if include_neutral { 4 } else { 3 };

    for i in 0..count {
        if i >= inc {
            if i < count_v * inc {
                refs[i] = (i - inc) as i32;
            } else if i >= (count_v + 1) * inc && i < (count_v + count_i) * inc {
                refs[i] = (i - inc) as i32;
            }
        }
    }
    refs
}

/// Delta depth for a sampling rate. Currently constant, but the high-rate
/// branch is the hook for deeper chains should future rates need them.
pub(crate) fn delta_layers_for_rate(sampling_rate: u32) -> usize {
    if sampling_rate > 100_000 {
        HIGH_DELTA_LAYERS
    } else {
        DEFAULT_DELTA_LAYERS
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
