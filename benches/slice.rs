/// Benchmarks for slice extraction.
use std::sync::Arc;

use clap::Parser;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ncserve::cli::CommandLineArgs;
use ncserve::dataset::MemoryDataset;
use ncserve::models::SliceRequest;
use ncserve::slice::SliceExtractor;

fn get_dataset(time: usize, ny: usize, nx: usize) -> MemoryDataset {
    let values = (0..time * ny * nx).map(|i| i as f64).collect();
    MemoryDataset::new()
        .with_dimension("time", time)
        .with_dimension("z", 1)
        .with_dimension("y", ny)
        .with_dimension("x", nx)
        .with_variable("y", &["y"], (0..ny).map(|i| i as f64).collect())
        .unwrap()
        .with_variable("x", &["x"], (0..nx).map(|j| j as f64).collect())
        .unwrap()
        .with_variable("concentration", &["time", "z", "y", "x"], values)
        .unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let args = CommandLineArgs::parse_from(["ncserve"]);
    for (ny, nx) in [(27, 36), (256, 256), (1024, 1024)] {
        let dataset = Arc::new(get_dataset(8, ny, nx));
        let extractor = SliceExtractor::new(dataset, &args);
        let request = SliceRequest::new(3, 0);
        let name = format!("extract({}x{})", ny, nx);
        c.bench_function(&name, |b| {
            b.iter(|| extractor.extract(black_box(&request)).unwrap())
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
