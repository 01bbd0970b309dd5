//! Property tests for the bounded-output and capacity invariants

use chrono::Utc;
use proptest::prelude::*;

use strainrs::buffer::SignalBufferStore;
use strainrs::config::{FusionWeights, ZoneThresholds};
use strainrs::fusion::FusionResolver;
use strainrs::models::{DeviceClass, Reading, SignalType};
use strainrs::zones::{TrafficZone, ZoneClassifier};

fn reading(value: f64, seq: i64) -> Reading {
    Reading::new(
        "dev-1",
        "u1",
        DeviceClass::SportsWatch,
        SignalType::HeartRate,
        value,
        Utc::now() + chrono::Duration::milliseconds(seq),
    )
}

proptest! {
    #[test]
    fn buffer_never_exceeds_capacity(capacity in 1usize..50, inserts in 0usize..200) {
        let buffer = SignalBufferStore::new(capacity);
        for i in 0..inserts {
            buffer.ingest(reading(60.0 + i as f64, i as i64)).unwrap();
        }
        prop_assert!(buffer.len("u1", SignalType::HeartRate) <= capacity);
    }

    #[test]
    fn buffer_keeps_exactly_the_last_n(capacity in 1usize..30, extra in 1usize..50) {
        let buffer = SignalBufferStore::new(capacity);
        let total = capacity + extra;
        for i in 0..total {
            buffer.ingest(reading(i as f64, i as i64)).unwrap();
        }
        let kept = buffer.recent("u1", SignalType::HeartRate, total);
        prop_assert_eq!(kept.len(), capacity);
        // Oldest-first eviction: the survivors are the last `capacity` values
        let expected: Vec<f64> = ((total - capacity)..total).map(|i| i as f64).collect();
        let actual: Vec<f64> = kept.iter().map(|r| r.value).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn composite_score_is_bounded(zones in prop::collection::vec(0u8..3, 0..10)) {
        let classifier = ZoneClassifier::new(ZoneThresholds::default());
        let zones: Vec<TrafficZone> = zones
            .into_iter()
            .map(|z| match z {
                0 => TrafficZone::Green,
                1 => TrafficZone::Yellow,
                _ => TrafficZone::Red,
            })
            .collect();
        let score = classifier.composite_score(&zones);
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn hr_zone_is_monotonic_in_delta(a in -20.0f64..40.0, b in -20.0f64..40.0) {
        let classifier = ZoneClassifier::new(ZoneThresholds::default());
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        // A larger delta never maps to a calmer zone
        prop_assert!(classifier.classify_hr_delta(lo) <= classifier.classify_hr_delta(hi));
    }

    #[test]
    fn fusion_confidence_is_bounded(mask in 0u8..32) {
        let mut per_device = std::collections::HashMap::new();
        let signals = [
            SignalType::Recovery,
            SignalType::Hrv,
            SignalType::Strain,
            SignalType::HeartRate,
            SignalType::Sleep,
        ];
        let readings: Vec<Reading> = signals
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(i, signal)| {
                Reading::new(
                    "watch",
                    "u1",
                    DeviceClass::SportsWatch,
                    *signal,
                    50.0 + i as f64,
                    Utc::now(),
                )
            })
            .collect();
        if !readings.is_empty() {
            per_device.insert("watch".to_string(), readings);
        }

        let snapshot = FusionResolver::new(FusionWeights::default()).fuse("u1", &per_device, Utc::now());
        prop_assert!((0.0..=1.0).contains(&snapshot.confidence));
        if mask == 0 {
            prop_assert_eq!(snapshot.confidence, 0.0);
        }
        if mask == 0b11111 {
            prop_assert!((snapshot.confidence - 1.0).abs() < 1e-9);
        }
        // Available plus missing always covers the five weighted metrics
        let available = (0..5).filter(|i| mask & (1 << i) != 0).count();
        prop_assert_eq!(available + snapshot.missing_metrics.len(), 5);
    }

    #[test]
    fn rejected_readings_never_mutate_the_buffer(
        value in prop_oneof![
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ],
    ) {
        let buffer = SignalBufferStore::new(16);
        buffer.ingest(reading(70.0, 0)).unwrap();
        let before = buffer.len("u1", SignalType::HeartRate);
        prop_assert!(buffer.ingest(reading(value, 1)).is_err());
        prop_assert_eq!(buffer.len("u1", SignalType::HeartRate), before);
    }
}
