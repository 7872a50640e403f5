use bytes::BytesMut;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use mdp::overlay::{AddressCache, SID_SIZE, Sid, SubscriberRegistry};
use mdp::protocol::{Frame, FrameBuf, MdpAddr, minimal_length};

fn sids(count: u8) -> Vec<Sid> {
    (0..count)
        .map(|n| {
            let mut bytes = [n; SID_SIZE];
            bytes[0] = n.wrapping_mul(37);
            Sid::new(bytes)
        })
        .collect()
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");

    let tx = Frame::tx(MdpAddr::default(), MdpAddr::default(), vec![0u8; 1024]);
    let mut buf = FrameBuf::new();
    tx.write_into(&mut buf).unwrap();
    group.throughput(Throughput::Bytes(1024));
    group.bench_function("minimal_length_tx", |b| {
        b.iter(|| {
            black_box(minimal_length(black_box(&buf)).unwrap());
        });
    });

    let wire = tx.to_wire().unwrap();
    group.bench_function("parse_tx_1kb", |b| {
        b.iter(|| {
            black_box(Frame::parse(&wire).unwrap());
        });
    });

    group.finish();
}

fn bench_address(c: &mut Criterion) {
    let mut group = c.benchmark_group("address");
    let targets = sids(32);

    // Steady state: every address is already indexed on the link.
    let registry = SubscriberRegistry::new();
    let mut warm = AddressCache::new();
    let mut scratch = BytesMut::new();
    for sid in &targets {
        warm.encode(&mut scratch, &registry, sid).unwrap();
    }
    group.throughput(Throughput::Elements(targets.len() as u64));
    group.bench_function("encode_indexed_32", |b| {
        let mut buf = BytesMut::with_capacity(256);
        b.iter(|| {
            buf.clear();
            for sid in &targets {
                warm.encode(&mut buf, &registry, sid).unwrap();
            }
            black_box(buf.len());
        });
    });

    group.bench_function("roundtrip_new_link_32", |b| {
        let sender = SubscriberRegistry::new();
        let receiver = SubscriberRegistry::new();
        let mut buf = BytesMut::with_capacity(2048);
        b.iter(|| {
            let mut tx = AddressCache::new();
            let mut rx = AddressCache::new();
            buf.clear();
            for sid in &targets {
                tx.encode(&mut buf, &sender, sid).unwrap();
            }
            let mut input = buf.clone().freeze();
            for _ in &targets {
                black_box(rx.decode_subscriber(&mut input, &receiver).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_frame, bench_address);
criterion_main!(benches);
