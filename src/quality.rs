// Run-length history for per-channel quality flags.
//
// Quality rarely changes within a message, so each channel keeps a vector
// of (value, samples) runs that is appended to as samples arrive. At
// flush time the final run's length is forced to zero on the wire, the
// sentinel for "value runs to the end of the message".

use crate::varint;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Run {
    value: u32,
    samples: u32,
}

pub struct QualityHistory {
    channels: Vec<Vec<Run>>,
}

/// Initial per-channel run capacity; grows only when quality churns.
const RUN_CAPACITY: usize = 16;

impl QualityHistory {
    pub fn new(channel_count: usize) -> Self {
        let mut channels = Vec::with_capacity(channel_count);
        for _ in 0..channel_count {
            let mut runs = Vec::with_capacity(RUN_CAPACITY);
            runs.push(Run { value: 0, samples: 0 });
            channels.push(runs);
        }
        QualityHistory { channels }
    }

    /// Record the first sample of a message: one run per channel.
    pub fn start(&mut self, quality: &[u32]) {
        for (runs, &q) in self.channels.iter_mut().zip(quality) {
            runs[0] = Run { value: q, samples: 1 };
        }
    }

    /// Record a subsequent sample, extending or starting runs.
    pub fn record(&mut self, quality: &[u32]) {
        for (runs, &q) in self.channels.iter_mut().zip(quality) {
            let last = runs.last_mut().unwrap();
            if last.value == q {
                last.samples += 1;
            } else {
                runs.push(Run { value: q, samples: 1 });
            }
        }
    }

    /// Serialise all channels into `buf` starting at `pos`, returning the
    /// new cursor. The final run of each channel is written with the zero
    /// length sentinel.
    pub fn write(&mut self, buf: &mut [u8], mut pos: usize) -> usize {
        for runs in &mut self.channels {
            runs.last_mut().unwrap().samples = 0;
            for run in runs.iter() {
                pos += varint::put_u32(&mut buf[pos..], run.value);
                pos += varint::put_u32(&mut buf[pos..], run.samples);
            }
        }
        pos
    }

    /// Drop accumulated runs, keeping one zeroed run per channel.
    pub fn reset(&mut self) {
        for runs in &mut self.channels {
            runs.truncate(1);
            runs[0] = Run { value: 0, samples: 0 };
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
