//! Throughput of the record pipeline and of a full delimited job.
//!
//! Run with: cargo bench --bench tabulate
use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use rust_data_tabulate::cache::MemoryCacheStore;
use rust_data_tabulate::config::ColumnGroups;
use rust_data_tabulate::descriptor::Descriptor;
use rust_data_tabulate::execution::{Coordinator, CoordinatorOptions};
use rust_data_tabulate::transform::{Disposition, OutputEncoding, Pipeline, TransformOptions};
use rust_data_tabulate::types::RawRecord;

const DESCRIPTOR: &str = r#"{
    "localfile": "bench.csv",
    "format": {"type": "csv", "delimiter": ",", "quote": "\""},
    "schema": {
        "name": "NAME",
        "street": ["NO", "STREET"],
        "city": "CITY",
        "country": "force:Canada"
    },
    "filter": {"STATUS": "^Active$"}
}"#;

fn groups() -> ColumnGroups {
    let mut g = ColumnGroups::new();
    g.insert(
        "business".to_string(),
        ["name", "street", "city", "country"].map(String::from).to_vec(),
    );
    g
}

fn records(n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| {
            [
                ("NAME", format!("  Café  number {i} ")),
                ("NO", (i % 900 + 1).to_string()),
                ("STREET", "Rue Sainte-Catherine".to_string()),
                ("CITY", "Montréal".to_string()),
                ("STATUS", if i % 10 == 0 { "Closed" } else { "Active" }.to_string()),
            ]
            .into_iter()
            .collect()
        })
        .collect()
}

fn csv_body(n: usize) -> String {
    let mut body = String::from("NAME,NO,STREET,CITY,STATUS\n");
    for i in 0..n {
        let status = if i % 10 == 0 { "Closed" } else { "Active" };
        body.push_str(&format!(
            "\"Café, number {i}\",{},Rue Sainte-Catherine,Montréal,{status}\n",
            i % 900 + 1
        ));
    }
    body
}

fn bench_pipeline(c: &mut Criterion) {
    let descriptor = Descriptor::parse(DESCRIPTOR.as_bytes(), &groups()).unwrap();
    let options = TransformOptions {
        clean_whitespace: true,
        output_encoding: OutputEncoding::Cp1252,
        ..Default::default()
    };

    let mut group = c.benchmark_group("pipeline");
    for n in [1_000usize, 10_000] {
        let input = records(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("apply_encode", n), &input, |b, input| {
            b.iter(|| {
                let mut pipeline = Pipeline::new(&descriptor, options, None).unwrap();
                let mut bytes = 0usize;
                for raw in input {
                    if let Disposition::Emit(record) = pipeline.apply(raw, &mut |_| {}) {
                        let fields = pipeline.encode(&record, &mut |_| {}).unwrap();
                        bytes += fields.iter().map(|f| f.len()).sum::<usize>();
                    }
                }
                black_box(bytes)
            })
        });
    }
    group.finish();
}

fn bench_job(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("input");
    let output_dir = dir.path().join("output");
    std::fs::create_dir_all(&input_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();

    let descriptor = Descriptor::parse(DESCRIPTOR.as_bytes(), &groups()).unwrap();
    let opts = CoordinatorOptions {
        workers: 1,
        input_dir: input_dir.clone(),
        output_dir,
        ignore_cache: true,
        ..Default::default()
    };
    let coordinator = Coordinator::new(opts, Arc::new(MemoryCacheStore::new())).unwrap();

    let mut group = c.benchmark_group("job");
    group.sample_size(20);
    for n in [10_000usize, 100_000] {
        std::fs::write(input_dir.join("bench.csv"), csv_body(n)).unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(BenchmarkId::new("delimited", n), |b| {
            b.iter(|| {
                let report = coordinator.run(std::slice::from_ref(&descriptor));
                assert!(report.all_ok());
                black_box(report)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_job);
criterion_main!(benches);
