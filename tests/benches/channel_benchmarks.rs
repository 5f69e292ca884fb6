//! # Uplink Channel Benchmarks
//!
//! | Operation | Target |
//! |-----------|--------|
//! | Scratch name derivation (PBKDF2, 4096 rounds) | < 5ms |
//! | Seal a 1 KiB reply to a 2048-bit key | < 1ms |
//! | Open a 1 KiB command with a 2048-bit key | < 5ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use uplink_crypto::{derive_name, KeyPair, SealedBox};

fn bench_derive_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdf");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("derive_name", |b| {
        b.iter(|| black_box(derive_name(black_box("file-token-1"), black_box("session-token-1"))))
    });

    group.finish();
}

fn bench_sealed_box(c: &mut Criterion) {
    let mut group = c.benchmark_group("sealed-box");
    let keypair = KeyPair::generate().expect("keygen");
    let public = keypair.public_key();

    for size in [256usize, 1024, 16 * 1024] {
        let payload = vec![0x5au8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("seal", size), &payload, |b, payload| {
            b.iter(|| black_box(SealedBox::seal(&public, payload).expect("seal")))
        });

        let sealed = SealedBox::seal(&public, &payload).expect("seal");
        group.bench_with_input(BenchmarkId::new("open", size), &sealed, |b, sealed| {
            b.iter(|| black_box(sealed.open(&keypair).expect("open")))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_derive_name, bench_sealed_box);
criterion_main!(benches);
