// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use mcpwatch_core::{BucketClock, EstimatorConfig, ToolCallEvent, ToolOutcome, Window};
use mcpwatch_storage::{CallCounter, DDSketch, RingLayout, ToolMetricsTable};
use proptest::prelude::*;

const SEC: u64 = 1_000_000;
const NOW: u64 = 1_700_000_000 * SEC;

fn event(outcome_error: bool, duration_ms: u64, ts: u64) -> ToolCallEvent {
    if outcome_error {
        ToolCallEvent::error("search", duration_ms, ts, "failed")
    } else {
        ToolCallEvent::success("search", duration_ms, ts)
    }
}

proptest! {
    #[test]
    fn prop_count_conservation(calls in prop::collection::vec((any::<bool>(), 0u64..5_000), 1..200)) {
        let table = ToolMetricsTable::new(&EstimatorConfig::default());
        let clock = BucketClock::default();
        for (is_error, duration) in &calls {
            table.record_call(&event(*is_error, *duration, NOW), NOW);
        }
        let expected_errors = calls.iter().filter(|(e, _)| *e).count() as u64;

        for window in Window::ALL {
            let after = clock.lookback_start(window, NOW);
            let stats = table.tool_stats("search", after, u64::MAX);
            prop_assert_eq!(stats.requests(), calls.len() as u64);
            prop_assert_eq!(stats.successes + stats.errors, calls.len() as u64);
            prop_assert_eq!(stats.errors, expected_errors);
            prop_assert_eq!(stats.latency.count(), calls.len() as u64);
        }
    }

    #[test]
    fn prop_error_rate_bounded(
        calls in prop::collection::vec((any::<bool>(), 0u64..200_000), 0..100),
        query_offset in 0u64..200_000,
    ) {
        let table = ToolMetricsTable::new(&EstimatorConfig::default());
        let clock = BucketClock::default();
        for (is_error, age_s) in &calls {
            table.record_call(&event(*is_error, 1, NOW - age_s * SEC), NOW);
        }
        let now = NOW + query_offset * SEC;
        for window in Window::ALL {
            let stats = table.tool_stats("search", clock.lookback_start(window, now), u64::MAX);
            let rate = stats.error_rate();
            prop_assert!(rate.is_finite());
            prop_assert!((0.0..=1.0).contains(&rate));
            if stats.requests() == 0 {
                prop_assert_eq!(rate, 0.0);
            }
        }
    }

    #[test]
    fn prop_windows_monotonic(ages in prop::collection::vec(0u64..172_000, 0..300)) {
        let mut counter = CallCounter::new(RingLayout::default());
        let clock = BucketClock::default();
        for age in &ages {
            counter.increment(ToolOutcome::Success, NOW - age * SEC, NOW);
        }
        let five = counter.count_since(ToolOutcome::Success, clock.lookback_start(Window::FiveMin, NOW));
        let hour = counter.count_since(ToolOutcome::Success, clock.lookback_start(Window::OneHour, NOW));
        let day = counter.count_since(ToolOutcome::Success, clock.lookback_start(Window::TwentyFourHour, NOW));
        prop_assert!(five <= hour);
        prop_assert!(hour <= day);
        prop_assert!(day <= ages.len() as u64);
    }

    #[test]
    fn prop_eviction_within_tolerance(age_s in 0u64..100_000, window_idx in 0usize..3) {
        let window = Window::ALL[window_idx];
        let clock = BucketClock::default();
        let layout = RingLayout::default();
        let mut counter = CallCounter::new(layout);

        let t = NOW;
        counter.increment(ToolOutcome::Success, t, t);

        let now = t + age_s * SEC;
        let seen = counter.count_since(ToolOutcome::Success, clock.lookback_start(window, now));
        let window_us = clock.duration_us(window);
        let tolerance = if window == Window::TwentyFourHour { layout.coarse_us } else { layout.fine_us };

        if age_s * SEC < window_us {
            prop_assert_eq!(seen, 1);
        } else if age_s * SEC >= window_us + tolerance {
            prop_assert_eq!(seen, 0);
        }
    }

    #[test]
    fn prop_sketch_relative_error(mut values in prop::collection::vec(1.0f64..100_000.0, 1..500), q in 0.0f64..=1.0) {
        let mut sketch = DDSketch::new(0.01);
        for v in &values {
            sketch.add(*v);
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let rank = (q * (values.len() - 1) as f64).floor() as usize;
        let truth = values[rank];
        let estimate = sketch.quantile(q);
        prop_assert!((estimate - truth).abs() <= 0.01 * truth + 1e-6,
            "q={} estimate={} truth={}", q, estimate, truth);
    }
}
