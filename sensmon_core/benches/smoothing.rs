use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use sensmon_core::SmoothedChannel;

// Synthetic current trace with periodic dropouts (None every `drop_every`)
fn synth_trace(n: usize, drop_every: usize, seed: u32) -> Vec<Option<f64>> {
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    (0..n)
        .map(|i| {
            if drop_every > 0 && i % drop_every == 0 {
                None
            } else {
                Some(8.0 + (next_f64() * 2.0 - 1.0) * 0.5)
            }
        })
        .collect()
}

pub fn bench_update_get(c: &mut Criterion) {
    let mut g = c.benchmark_group("smoothing");
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p sensmon_core --bench smoothing
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let trace = synth_trace(10_000, 7, 0xC0FFEE);

    for &window in &[10usize, 50, 200] {
        g.bench_function(format!("update_get_window_{window}"), |b| {
            b.iter_batched(
                || SmoothedChannel::new(window),
                |mut ch| {
                    let mut acc = 0.0;
                    for &v in &trace {
                        ch.update(black_box(v));
                        acc += ch.get(-999.0);
                    }
                    black_box(acc);
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

criterion_group!(smoothing, bench_update_get);
criterion_main!(smoothing);
