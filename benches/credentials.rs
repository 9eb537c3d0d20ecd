use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use kdc::auth::crypto::{self, KEY_LEN};
use kdc::auth::{MasterKey, MessageBuilder, NonceCache, SessionKey, Ticket};
use kdc::protocol::{ClientHello, Message};

fn bench_ticket(c: &mut Criterion) {
    let mut group = c.benchmark_group("ticket");
    let master = MasterKey::from_array([0x5a; KEY_LEN]);
    let session_key = SessionKey::generate();

    group.bench_function("issue", |b| {
        b.iter(|| {
            black_box(
                Ticket::issue(
                    &master,
                    &session_key,
                    "alice",
                    "echo",
                    Duration::from_secs(60),
                )
                .unwrap(),
            );
        });
    });

    let ticket = Ticket::issue(&master, &session_key, "alice", "echo", Duration::from_secs(3600)).unwrap();
    group.bench_function("session_key", |b| {
        b.iter(|| {
            black_box(ticket.session_key(&master).unwrap());
        });
    });

    group.finish();
}

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("scrypt");
    group.sample_size(20);
    group.bench_function("derive_root_key", |b| {
        b.iter(|| {
            black_box(crypto::derive_root_key("alice", "s3cret").unwrap());
        });
    });
    group.finish();
}

fn bench_service_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("service_message");
    let session_key = SessionKey::generate();
    let sender = MessageBuilder::new(
        "echo",
        "alice",
        Arc::new(NonceCache::default()),
        session_key.clone(),
    );

    for size in [64usize, 1024, 16 * 1024] {
        let payload = vec![0x61u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("build_encode_{size}b"), |b| {
            b.iter(|| {
                let message = Message::from(sender.build(&payload).unwrap());
                black_box(message.encode().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let master = MasterKey::from_array([0x5a; KEY_LEN]);
    let ticket = Ticket::issue(&master, &SessionKey::generate(), "alice", "echo", Duration::from_secs(60)).unwrap();
    let hello = Message::from(ClientHello {
        ticket,
        nonce: vec![0x11; 32],
    });
    let encoded = hello.encode().unwrap();

    group.bench_function("encode_client_hello", |b| {
        b.iter(|| {
            black_box(hello.encode().unwrap());
        });
    });
    group.bench_function("decode_client_hello", |b| {
        b.iter(|| {
            black_box(Message::decode(&encoded).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_ticket,
    bench_key_derivation,
    bench_service_message,
    bench_codec
);
criterion_main!(benches);
