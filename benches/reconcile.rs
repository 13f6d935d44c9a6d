use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use seat_lock_core::models::{FeedState, Lock, LockStatus, PerformanceId, SeatId, SeatOverride, SessionId};
use seat_lock_core::services::{reconcile, LockView, MapSeatExtractor};

fn venue(rows: usize, per_row: usize) -> serde_json::Value {
    let elements: Vec<_> = (0..rows * per_row)
        .map(|i| {
            json!({
                "_id": format!("S{}", i),
                "type": "silla",
                "x": (i % per_row) as f64 * 25.0,
                "y": (i / per_row) as f64 * 25.0,
            })
        })
        .collect();
    json!({ "contenido": elements })
}

fn bench_reconcile(c: &mut Criterion) {
    let performance_id = PerformanceId::new(1).unwrap();
    let me = SessionId::new();
    let other = SessionId::new();
    let mut group = c.benchmark_group("reconcile");

    for &size in &[500usize, 5_000] {
        let seats = MapSeatExtractor::default().extract(&venue(size / 50, 50));
        let overrides: HashMap<SeatId, SeatOverride> = seats
            .iter()
            .step_by(7)
            .enumerate()
            .map(|(i, seat)| {
                let owner = if i % 2 == 0 { me } else { other };
                (
                    seat.id.clone(),
                    SeatOverride::Locked(Lock {
                        seat_id: seat.id.clone(),
                        performance_id,
                        owner,
                        status: LockStatus::Selected,
                        locked_at: Utc::now(),
                    }),
                )
            })
            .collect();
        let view = LockView {
            version: 1,
            performance_id: Some(performance_id),
            feed_state: FeedState::Live,
            overrides: Arc::new(overrides),
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), &seats, |b, seats| {
            b.iter(|| black_box(reconcile(seats, &view, &me)).len())
        });
    }
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let document = venue(100, 50);
    c.bench_function("extract_5000_seats", |b| {
        b.iter(|| MapSeatExtractor::default().extract(black_box(&document)).len())
    });
}

criterion_group!(benches, bench_reconcile, bench_extract);
criterion_main!(benches);
