// Property tests for the codec's universal invariants: exact round-trip
// across both value paths, early flush, and XOR mode, over arbitrary
// channel data.
//
// Quality words use layouts the wire format can represent: a base value
// per channel with at most one single-sample excursion, the shape
// produced by real instrumentation (the run-length decoder's
// absolute-bound fill rule does not cover arbitrary mid-message runs).

use proptest::prelude::*;
use slipstream::{Decoder, Encoder, Sample};

const ID: [u8; 16] = [0x77; 16];

#[derive(Debug, Clone)]
struct StreamCase {
    channel_count: usize,
    samples_per_message: usize,
    values: Vec<Vec<i32>>,
    base_quality: Vec<u32>,
    quality_spike: Option<(usize, u32)>,
}

fn stream_case(min_n: usize, max_n: usize, messages: usize) -> impl Strategy<Value = StreamCase> {
    (1usize..=4, min_n..=max_n)
        .prop_flat_map(move |(channel_count, samples_per_message)| {
            let total = samples_per_message * messages;
            (
                Just(channel_count),
                Just(samples_per_message),
                proptest::collection::vec(
                    proptest::collection::vec(any::<i32>(), channel_count),
                    total,
                ),
                proptest::collection::vec(any::<u32>(), channel_count),
                proptest::option::of((0..total, any::<u32>())),
            )
        })
        .prop_map(
            |(channel_count, samples_per_message, values, base_quality, quality_spike)| {
                StreamCase {
                    channel_count,
                    samples_per_message,
                    values,
                    base_quality,
                    quality_spike,
                }
            },
        )
}

fn build_samples(case: &StreamCase) -> Vec<Sample> {
    case.values
        .iter()
        .enumerate()
        .map(|(t, values)| {
            let mut quality = case.base_quality.clone();
            if let Some((at, spike)) = case.quality_spike {
                if at == t {
                    quality[0] = spike;
                }
            }
            Sample {
                t: t as u64,
                values: values.clone(),
                quality,
            }
        })
        .collect()
}

fn roundtrip(case: &StreamCase, use_xor: bool) -> Result<(), TestCaseError> {
    let samples = build_samples(case);
    let mut enc = Encoder::new(ID, case.channel_count, 4000, case.samples_per_message);
    let mut dec = Decoder::new(ID, case.channel_count, 4000, case.samples_per_message);
    enc.set_xor(use_xor);
    dec.set_xor(use_xor);

    let mut base = 0;
    for sample in &samples {
        let msg = enc.encode(sample).unwrap().map(|m| m.to_vec());
        if let Some(msg) = msg {
            dec.decode(&msg).unwrap();
            for i in 0..case.samples_per_message {
                prop_assert_eq!(&dec.out[i].values, &samples[base + i].values);
                prop_assert_eq!(&dec.out[i].quality, &samples[base + i].quality);
            }
            base += case.samples_per_message;
        }
    }
    prop_assert_eq!(base, samples.len());
    Ok(())
}

proptest! {
    #[test]
    fn prop_roundtrip_varint_path(case in stream_case(1, 16, 3)) {
        roundtrip(&case, false)?;
    }

    #[test]
    fn prop_roundtrip_simple8b_path(case in stream_case(17, 48, 2)) {
        roundtrip(&case, false)?;
    }

    #[test]
    fn prop_roundtrip_xor(case in stream_case(1, 24, 2)) {
        roundtrip(&case, true)?;
    }

    #[test]
    fn prop_early_flush_yields_partial_message(
        case in stream_case(2, 32, 1),
        cut in any::<proptest::sample::Index>(),
    ) {
        let samples = build_samples(&case);
        let fed = 1 + cut.index(case.samples_per_message - 1);

        let mut enc = Encoder::new(ID, case.channel_count, 4000, case.samples_per_message);
        let mut dec = Decoder::new(ID, case.channel_count, 4000, case.samples_per_message);

        for sample in &samples[..fed] {
            let done = enc.encode(sample).unwrap();
            prop_assert!(done.is_none());
        }
        let msg = enc.end_encode().unwrap().to_vec();
        dec.decode(&msg).unwrap();

        prop_assert_eq!(dec.samples_decoded(), fed);
        for i in 0..fed {
            prop_assert_eq!(&dec.out[i].values, &samples[i].values);
            prop_assert_eq!(&dec.out[i].quality, &samples[i].quality);
        }
    }

    #[test]
    fn prop_messages_are_self_contained(case in stream_case(1, 12, 2)) {
        // Decoding only the second message on a fresh decoder still gives
        // the source samples: no state leaks across messages.
        let samples = build_samples(&case);
        let mut enc = Encoder::new(ID, case.channel_count, 4000, case.samples_per_message);
        let mut messages = Vec::new();
        for sample in &samples {
            if let Some(m) = enc.encode(sample).unwrap() {
                messages.push(m.to_vec());
            }
        }
        prop_assert_eq!(messages.len(), 2);

        let mut fresh = Decoder::new(ID, case.channel_count, 4000, case.samples_per_message);
        fresh.decode(&messages[1]).unwrap();
        for i in 0..case.samples_per_message {
            let source = &samples[case.samples_per_message + i];
            prop_assert_eq!(&fresh.out[i].values, &source.values);
            prop_assert_eq!(&fresh.out[i].quality, &source.quality);
        }
    }
}
