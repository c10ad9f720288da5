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

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mcpwatch_core::{EstimatorConfig, ToolCallEvent};
use mcpwatch_storage::{DDSketch, ToolMetricsTable};

const SEC: u64 = 1_000_000;
const NOW: u64 = 1_700_000_000 * SEC;

fn bench_record_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_call");

    for tools in [1usize, 10, 100].iter() {
        let names: Vec<String> = (0..*tools).map(|i| format!("tool{}", i)).collect();
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::from_parameter(tools), tools, |b, _| {
            let table = ToolMetricsTable::new(&EstimatorConfig::default());
            let mut ts = NOW;
            b.iter(|| {
                for i in 0..1000u64 {
                    ts += 1_000;
                    let name = &names[(i as usize) % names.len()];
                    let event = ToolCallEvent::success(name.as_str(), i % 200, ts);
                    table.record_call(black_box(&event), ts);
                }
            });
        });
    }

    group.finish();
}

fn bench_window_query(c: &mut Criterion) {
    let table = ToolMetricsTable::new(&EstimatorConfig::default());

    // One call per second per tool over the last two hours.
    for s in 0..7_200u64 {
        let ts = NOW - 7_200 * SEC + s * SEC;
        for t in 0..20 {
            let event = ToolCallEvent::success(format!("tool{}", t), (s + t) % 500, ts);
            table.record_call(&event, ts);
        }
    }

    let mut group = c.benchmark_group("window_query");
    for (label, lookback) in [("5m", 300u64), ("1h", 3_600), ("24h", 86_400)] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let stats = table.overall_stats(black_box(NOW - lookback * SEC), u64::MAX);
                black_box(stats.latency.p95())
            });
        });
    }
    group.finish();
}

fn bench_sketch_insert(c: &mut Criterion) {
    c.bench_function("ddsketch_insert", |b| {
        let mut sketch = DDSketch::new(0.01);
        let mut v = 1.0f64;
        b.iter(|| {
            v = if v > 10_000.0 { 1.0 } else { v * 1.07 };
            sketch.add(black_box(v));
        });
    });
}

criterion_group!(benches, bench_record_call, bench_window_query, bench_sketch_insert);
criterion_main!(benches);
