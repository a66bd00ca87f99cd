use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use stow_blob::{Bucket, ListOptions, WriterOptions};
use stow_fileblob::{FileBucket, escape};
use tempfile::TempDir;

fn open(rt: &tokio::runtime::Runtime, temp: &TempDir) -> Bucket {
    rt.block_on(async {
        Bucket::new(FileBucket::builder().root(temp.path()).open().await.unwrap())
    })
}

// ============================================================================
// Benchmark: Key Escaping
// ============================================================================

fn bench_escape(c: &mut Criterion) {
    let mut group = c.benchmark_group("escape");

    let keys = [
        ("plain", "photos/2024/cat.jpg"),
        ("traversal", "../../etc/passwd"),
        ("underscores", "a__b__c/__d__"),
    ];
    for (name, key) in keys {
        group.bench_with_input(BenchmarkId::new("encode", name), key, |b, key| {
            b.iter(|| black_box(escape::encode(key)));
        });
        let encoded = escape::encode(key);
        group.bench_with_input(BenchmarkId::new("decode", name), &encoded, |b, encoded| {
            b.iter(|| black_box(escape::decode(encoded)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Object I/O
// ============================================================================

fn bench_object_io(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_io");
    group.measurement_time(Duration::from_secs(10));

    let temp = TempDir::new().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bucket = open(&rt, &temp);

    let sizes = [("1KB", 1024), ("100KB", 100 * 1024), ("1MB", 1024 * 1024)];
    for (name, size) in sizes {
        let data: Vec<u8> = (0..size).map(|i| u8::try_from(i % 256).unwrap()).collect();
        group.throughput(Throughput::Bytes(u64::try_from(size).unwrap_or(u64::MAX)));

        let key = format!("bench/{name}.dat");
        group.bench_with_input(BenchmarkId::new("write_all", name), &data, |b, data| {
            b.to_async(&rt).iter(|| async {
                bucket.write_all(&key, data, WriterOptions::default()).await.unwrap();
            });
        });

        group.bench_function(BenchmarkId::new("read_all", name), |b| {
            b.to_async(&rt).iter(|| async {
                black_box(bucket.read_all(&key).await.unwrap());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Listing
// ============================================================================

fn bench_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("listing");

    let temp = TempDir::new().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bucket = open(&rt, &temp);
    rt.block_on(async {
        for dir in 0..10 {
            for file in 0..50 {
                let key = format!("d{dir:02}/f{file:03}");
                bucket.write_all(&key, b"x", WriterOptions::default()).await.unwrap();
            }
        }
    });

    group.bench_function("flat_500", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(bucket.list(ListOptions::default()).collect_all().await.unwrap());
        });
    });

    group.bench_function("delimited_top_level", |b| {
        b.to_async(&rt).iter(|| async {
            let opts = ListOptions::default().delimiter("/");
            black_box(bucket.list(opts).collect_all().await.unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_escape, bench_object_io, bench_listing);

criterion_main!(benches);
