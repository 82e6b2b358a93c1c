use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use docstore_ingest::catalog::{diff, IndexCatalog};
use docstore_ingest::config::BatchLimits;
use docstore_ingest::mapping::map_documents;
use docstore_ingest::types::{DataSet, Schema, Value};
use docstore_ingest::writer::plan_batches;

fn climate_dataset(rows: usize, fields: usize) -> DataSet {
    let names: Vec<String> = std::iter::once("timestamp".to_string())
        .chain((0..fields).map(|i| format!("sensor_{i}")))
        .collect();
    let data = (0..rows)
        .map(|r| {
            std::iter::once(Value::Utf8(format!("2024-01-01T{:02}:{:02}:00Z", r / 60 % 24, r % 60)))
                .chain((0..fields).map(|f| Value::Utf8(format!("{}.{}", r % 40, f))))
                .collect()
        })
        .collect();
    DataSet::new(Schema::new(names), data)
}

fn bench_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_documents");
    for rows in [1_000usize, 10_000] {
        let ds = climate_dataset(rows, 8);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &ds, |b, ds| {
            b.iter(|| map_documents(black_box(ds)).unwrap())
        });
    }
    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let ds = climate_dataset(10_000, 8);
    let docs = map_documents(&ds).unwrap().documents;
    let limits = BatchLimits::default();
    c.bench_function("plan_batches/10000", |b| {
        b.iter(|| plan_batches(black_box(&docs), &limits).unwrap())
    });
}

fn bench_diff(c: &mut Criterion) {
    let ds = climate_dataset(1, 200);
    let catalog = IndexCatalog::new((0..100).map(|i| format!("sensor_{i}")));
    c.bench_function("diff/200_fields", |b| {
        b.iter(|| diff(black_box(&ds.schema), black_box(&catalog)))
    });
}

criterion_group!(benches, bench_mapping, bench_planning, bench_diff);
criterion_main!(benches);
