//! ATRAC 编码核心性能基准测试.
//!
//! 覆盖三个变体的单帧编码与缩放量化路径.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use atrac::codec::frame::ChannelSpectrum;
use atrac::codec::scale::Scaler;
use atrac::codec::tables::Atrac3PlusData;
use atrac::codec::{BlockSizeMode, CodecId, CodecParameters, MemoryOutput, SpectralFrame};

/// 创建带若干峰值的立体声频谱帧
fn make_frame(num_specs: usize) -> SpectralFrame {
    let ch = |offset: usize| {
        let specs = (0..num_specs)
            .map(|i| {
                let base = 0.05 * ((i + offset) as f32 * 0.021).sin();
                if i % 61 == 7 { base + 0.5 } else { base }
            })
            .collect();
        ChannelSpectrum::from_specs(specs)
    };
    SpectralFrame::new(vec![ch(0), ch(17)])
}

fn bench_encoder(c: &mut Criterion, name: &str, codec_id: CodecId, bit_rate: u64, num_specs: usize) {
    let registry = atrac::default_codec_registry();
    let frame = make_frame(num_specs);
    let params = CodecParameters::new(codec_id, 2, bit_rate);
    c.bench_function(name, |b| {
        let mut enc = registry.create_encoder(codec_id).unwrap();
        enc.open(&params).unwrap();
        let mut out = MemoryOutput::new(name, 2);
        b.iter(|| {
            enc.encode_frame(black_box(&frame), &mut out).unwrap();
            out.take_packets();
        });
    });
}

fn bench_atrac1_encode(c: &mut Criterion) {
    bench_encoder(c, "atrac1_encode_stereo", CodecId::Atrac1, 292_000, 512);
}

fn bench_atrac3_encode(c: &mut Criterion) {
    bench_encoder(c, "atrac3_encode_132k", CodecId::Atrac3, 132_300, 1024);
}

fn bench_atrac3plus_encode(c: &mut Criterion) {
    bench_encoder(c, "atrac3plus_encode_stereo", CodecId::Atrac3Plus, 0, 2048);
}

fn bench_scale_frame(c: &mut Criterion) {
    let frame = make_frame(2048);
    let scaler = Scaler::<Atrac3PlusData>::new();
    c.bench_function("atrac3plus_scale_frame", |b| {
        b.iter(|| {
            let blocks = scaler
                .scale_frame(black_box(&frame.channels[0].specs), &BlockSizeMode::long())
                .unwrap();
            black_box(blocks);
        });
    });
}

criterion_group!(
    benches,
    bench_atrac1_encode,
    bench_atrac3_encode,
    bench_atrac3plus_encode,
    bench_scale_frame
);
criterion_main!(benches);
