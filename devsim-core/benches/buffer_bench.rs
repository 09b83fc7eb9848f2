#[macro_use]
extern crate criterion;

use chrono::DateTime;
use criterion::Criterion;

use devsim_core::{DoorState, SensorReading, TelemetryBuffer};

fn bench_buffer_append_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_buffer_throughput");

    let reading = SensorReading {
        device_id: "bench".into(),
        door: DoorState::default(),
        temperature: 4.0,
        humidity: 60.0,
        collected_at: DateTime::from_timestamp_millis(0).unwrap_or_default(),
    };

    for capacity in [128, 1024, 16384] {
        group.throughput(criterion::Throughput::Elements(1));
        group.bench_function(format!("capacity_{}", capacity), |b| {
            let buffer = TelemetryBuffer::with_capacity(capacity);
            b.iter(|| {
                buffer.append(reading.clone());
                buffer.peek_head();
                buffer.remove_head(1);
            });
        });
        group.bench_function(format!("evicting_capacity_{}", capacity), |b| {
            let buffer = TelemetryBuffer::with_capacity(capacity);
            for _ in 0..capacity {
                buffer.append(reading.clone());
            }
            b.iter(|| buffer.append(reading.clone()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_buffer_append_drain);
criterion_main!(benches);
