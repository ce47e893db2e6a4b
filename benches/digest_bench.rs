//! Benchmarks for alti-cli
//!
//! Run with: cargo bench

use alti_cli::cancel::CancelToken;
use alti_cli::content::{checksum_bytes, checksum_file};
use alti_cli::digest::ImageDigester;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use crossbeam_channel::unbounded;
use tempfile::tempdir;

fn benchmark_checksum(c: &mut Criterion) {
    let data = vec![0x5au8; 4 * 1024 * 1024];

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("sha1_4mb_in_memory", |b| {
        b.iter(|| black_box(checksum_bytes(black_box(&data))))
    });

    let dir = tempdir().unwrap();
    let path = dir.path().join("blob.bin");
    std::fs::write(&path, &data).unwrap();
    group.bench_function("sha1_4mb_file", |b| {
        b.iter(|| black_box(checksum_file(&path).unwrap()))
    });
    group.finish();
}

fn benchmark_digest(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frame.png");
    image::RgbImage::new(1024, 768).save(&path).unwrap();
    let digester = ImageDigester::new();

    c.bench_function("digest_png_1024x768", |b| {
        b.iter(|| black_box(digester.digest(&path)))
    });
}

fn benchmark_digest_pool(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let paths: Vec<_> = (0..64)
        .map(|i| {
            let path = dir.path().join(format!("img_{:02}.png", i));
            image::RgbImage::new(256, 256).save(&path).unwrap();
            path
        })
        .collect();
    let digester = ImageDigester::new();

    let mut group = c.benchmark_group("digest_pool");
    group.throughput(Throughput::Elements(paths.len() as u64));
    for workers in [1, 4] {
        group.bench_function(format!("64_images_{}_workers", workers), |b| {
            b.iter(|| {
                let (tx, rx) = unbounded();
                for p in &paths {
                    tx.send(p.clone()).unwrap();
                }
                drop(tx);
                let pool = digester.run(rx, workers, &CancelToken::new()).unwrap();
                let n = pool.results().iter().count();
                pool.join().unwrap();
                black_box(n)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_checksum, benchmark_digest, benchmark_digest_pool);
criterion_main!(benches);
