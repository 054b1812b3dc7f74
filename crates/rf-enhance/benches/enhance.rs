//! Enhancement engine benchmarks

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rf_enhance::agc::AutoGainControl;
use rf_enhance::stft::StftProcessor;
use rf_enhance::{EnhancementConfig, EnhancementEngine, ProcessingMode};

fn test_signal(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * 0.0577).sin() * 0.4 + ((i * 7919 % 1000) as f32 / 1000.0 - 0.5) * 0.05)
        .collect()
}

fn bench_stft_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("stft_round_trip");
    let input = test_signal(1600);
    let mut output = vec![0.0; 1600];

    for window in [256, 480, 1024, 2048] {
        let mut stft = StftProcessor::new(window, window / 2);
        group.bench_with_input(BenchmarkId::from_parameter(window), &window, |b, _| {
            b.iter(|| {
                stft.process(black_box(&input), &mut output, |_, _| {})
                    .unwrap();
            })
        });
    }

    group.finish();
}

fn bench_engine_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_chunk_100ms");
    let input = test_signal(1600);

    let configs = [
        ("passthrough", EnhancementConfig::passthrough()),
        ("default", EnhancementConfig::default()),
        ("realtime_speech", EnhancementConfig::realtime_speech()),
        ("post_processing", EnhancementConfig::post_processing()),
    ];

    for (name, config) in configs {
        let config = EnhancementConfig {
            processing_mode: ProcessingMode::PostProcessing,
            ..config
        };
        let mut engine = EnhancementEngine::with_config(config).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                engine.process_audio(black_box(&input), 16000).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_agc(c: &mut Criterion) {
    let mut agc = AutoGainControl::new(16000, 0.3, 4.0, 100.0, 10.0, 200.0);
    let mut buffer = test_signal(1024);

    c.bench_function("agc_1024", |b| {
        b.iter(|| {
            agc.process(black_box(&mut buffer));
        })
    });
}

criterion_group!(benches, bench_stft_round_trip, bench_engine_chunk, bench_agc);
criterion_main!(benches);
