use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use formula_frame::prelude::*;
use std::time::Duration;

fn bench_rows() -> usize {
    std::env::var("FORMULA_FRAME_GROUP_BY_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| (10_000..=5_000_000).contains(&v))
        .unwrap_or(500_000)
}

fn build_table(rows: usize) -> Table {
    let regions = ["north", "south", "east", "west", "central"];
    Table::new(vec![
        Column::from_strs(
            "region",
            (0..rows).map(|i| (i % 97 != 0).then(|| regions[i % regions.len()])),
        ),
        Column::from_i64s("customer", (0..rows).map(|i| Some((i % 10_000) as i64))),
        Column::from_f64s(
            "amount",
            (0..rows).map(|i| (i % 13 != 0).then(|| (i % 1_000) as f64 * 0.25)),
        ),
    ])
    .unwrap()
}

fn bench_group_by(c: &mut Criterion) {
    let rows = bench_rows();
    let table = build_table(rows);

    let mut group = c.benchmark_group("group_by");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(rows as u64));

    group.bench_with_input(BenchmarkId::new("low_cardinality", rows), &rows, |b, _| {
        b.iter(|| {
            let out = table
                .group_by(
                    ["region"],
                    [
                        sum("amount"),
                        col("amount").mean().alias("avg"),
                        len().alias("rows"),
                    ],
                )
                .unwrap();
            black_box(out);
        })
    });

    group.bench_with_input(BenchmarkId::new("high_cardinality", rows), &rows, |b, _| {
        b.iter(|| {
            let out = table
                .group_by(["customer"], [sum("amount"), col("amount").max().alias("peak")])
                .unwrap();
            black_box(out);
        })
    });

    for (label, config) in [
        ("lazy_sequential", EngineConfig::sequential()),
        ("lazy_default", EngineConfig::default()),
    ] {
        let plan = table
            .lazy()
            .with_config(config)
            .filter(col("amount").is_not_null())
            .group_by(["region"], [sum("amount"), col("customer").n_unique()]);
        group.bench_with_input(BenchmarkId::new(label, rows), &rows, |b, _| {
            b.iter(|| black_box(plan.collect().unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_group_by);
criterion_main!(benches);
