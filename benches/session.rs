//! Session hot-path benchmarks
//!
//! A full room is tiny, so these mostly guard against accidental
//! per-message allocations creeping into the reducer.
//!
//! Run with: cargo bench --bench session

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use peer_royale::game::constants::player::MAX_PLAYERS;
use peer_royale::net::protocol::PeerMessage;
use peer_royale::net::reducer::Origin;
use peer_royale::net::session::{Session, Visibility};
use peer_royale::util::vec3::Vec3;
use tokio::time::Instant;

/// Host in a started match with `bots` bots
fn running_host(bots: usize) -> Session {
    let mut session = Session::host("host".into(), "Nova".into(), Visibility::Offline, Some(7));
    session.seed_bots(bots);
    let _ = session.start_game(Instant::now());
    session
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("host_advance");
    group.sample_size(50);

    for bots in [1, 5, MAX_PLAYERS - 1] {
        group.throughput(Throughput::Elements(bots as u64));
        group.bench_with_input(BenchmarkId::from_parameter(bots), &bots, |b, &bots| {
            let mut session = running_host(bots);
            let now = Instant::now();
            b.iter(|| black_box(session.advance(now, 0.05)));
        });
    }

    group.finish();
}

fn bench_relay(c: &mut Criterion) {
    let mut session = Session::host("host".into(), "Nova".into(), Visibility::Private, Some(7));
    let now = Instant::now();
    let join = PeerMessage::Join {
        player: peer_royale::net::protocol::PlayerSnapshot {
            id: "peer".into(),
            name: "Luna".into(),
            position: Vec3::ZERO,
            rotation: 0.0,
            health: 100,
            is_bot: false,
        },
    };
    session.on_open("peer", now);
    session.handle(Origin::Remote("peer".into()), join, now);

    let mut x = 0.0f32;
    c.bench_function("host_relay_move", |b| {
        b.iter(|| {
            x += 0.01;
            let message = PeerMessage::PlayerMove {
                id: "peer".into(),
                position: Vec3::new(x, 0.0, x),
                rotation: x,
            };
            black_box(session.handle(Origin::Remote("peer".into()), message, now))
        })
    });
}

criterion_group!(benches, bench_advance, bench_relay);
criterion_main!(benches);
