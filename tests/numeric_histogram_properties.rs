//! Property tests for the numeric kernel and the histogram layout.

use proptest::prelude::*;

use lattest::sampler::histogram::{MAX_BIN_COUNT, MAX_BIN_WIDTH_NS};
use lattest::{isqrt_rounded, signed_div, EdgePolicy, HistogramAccumulator, HistogramConfig};

fn layout() -> impl Strategy<Value = HistogramConfig> {
    (1..=MAX_BIN_COUNT, 1..=MAX_BIN_WIDTH_NS).prop_map(|(bins, width)| HistogramConfig::new(bins, width))
}

proptest! {
    #[test]
    fn bins_are_evenly_spaced(config in layout()) {
        for i in 0..(config.bin_count as usize - 1) {
            prop_assert_eq!(
                config.bin_lower_bound(i + 1) - config.bin_lower_bound(i),
                config.bin_width_ns as i64
            );
        }
    }

    #[test]
    fn bins_are_centered_on_zero(config in layout()) {
        let b = config.bin_count as usize;
        if b % 2 == 0 {
            prop_assert_eq!(config.bin_lower_bound(b / 2), 0);
        } else {
            // The middle bin straddles zero
            let lower = config.bin_lower_bound((b - 1) / 2);
            let width = config.bin_width_ns as i64;
            prop_assert!(lower <= 0 && lower + width > 0);
            if width % 2 == 0 {
                prop_assert_eq!(lower, -(width / 2));
            }
        }
    }

    #[test]
    fn no_sample_is_dropped(
        config in layout(),
        separate in any::<bool>(),
        samples in prop::collection::vec(any::<i64>(), 0..200),
    ) {
        let policy = if separate { EdgePolicy::Separate } else { EdgePolicy::Clamp };
        let mut histogram = HistogramAccumulator::new(config.with_edge_policy(policy)).unwrap();
        for &s in &samples {
            histogram.record(s);
        }
        let snapshot = histogram.snapshot();
        prop_assert_eq!(snapshot.total(), samples.len() as u64);
        prop_assert_eq!(snapshot.bins.len(), config.bin_count as usize);
        if !separate {
            prop_assert_eq!(snapshot.underflow + snapshot.overflow, 0);
        }
    }

    #[test]
    fn in_range_samples_land_in_their_bin(config in layout(), pick in any::<prop::sample::Index>(), offset in any::<u64>()) {
        let i = pick.index(config.bin_count as usize);
        let lower = config.bin_lower_bound(i);
        let sample = lower + (offset % config.bin_width_ns) as i64;
        let mut histogram = HistogramAccumulator::new(config).unwrap();
        histogram.record(sample);
        prop_assert_eq!(histogram.counts()[i], 1);
    }

    #[test]
    fn signed_div_truncates_toward_zero(n in -1_000_000_000_000i64..1_000_000_000_000, d in prop::num::i64::ANY) {
        prop_assume!(d != 0);
        prop_assert_eq!(signed_div(n, d), n / d);
        let remainder = n - signed_div(n, d) * d;
        prop_assert!(remainder.unsigned_abs() < d.unsigned_abs());
    }

    #[test]
    fn isqrt_is_nearest(x in any::<u64>()) {
        let r = isqrt_rounded(x) as u128;
        let x = x as u128;
        // r is nearest: (r - 1/2)^2 <= x < (r + 1/2)^2, scaled by 4
        prop_assert!(4 * x < (2 * r + 1) * (2 * r + 1));
        if r > 0 {
            prop_assert!((2 * r - 1) * (2 * r - 1) <= 4 * x);
        }
    }
}

#[test]
fn literal_examples() {
    assert_eq!(signed_div(-7, 2), -3);
    assert_eq!(signed_div(7, -2), -3);
    let expected = [(2, 1), (3, 2), (4, 2), (6, 2), (7, 3), (8, 3), (9, 3)];
    for (x, r) in expected {
        assert_eq!(isqrt_rounded(x), r, "isqrt_rounded({})", x);
    }
    println!("[TEST] ✓ numeric kernel literal examples");
}
