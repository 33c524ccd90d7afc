//! ATRAC3 编码端到端测试.

use atrac::codec::frame::{ChannelSpectrum, GainPoint};
use atrac::codec::tables::atrac3::{CONTAINER_PARAMS, SOUND_UNIT_ID};
use atrac::codec::{CodecId, CodecParameters, CodecParamsType, MemoryOutput, SpectralFrame};
use atrac::core::{AtracError, BitReader};

const NUM_SPECS: usize = 1024;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn music_specs(frame: usize) -> Vec<f32> {
    (0..NUM_SPECS)
        .map(|i| {
            let phase = (i * 13 + frame * 7) as f32 * 0.031;
            let tone = if i % 97 == 11 { 0.6 } else { 0.0 };
            tone + 0.05 * phase.sin() / (1.0 + i as f32 / 128.0)
        })
        .collect()
}

fn stereo_frame(frame: usize) -> SpectralFrame {
    SpectralFrame::new(vec![
        ChannelSpectrum::from_specs(music_specs(frame)),
        ChannelSpectrum::from_specs(music_specs(frame + 1)),
    ])
}

fn encode_frames(params: &CodecParameters, frames: &[SpectralFrame]) -> Vec<Vec<u8>> {
    let registry = atrac::default_codec_registry();
    let mut encoder = registry.create_encoder(CodecId::Atrac3).expect("创建 ATRAC3 编码器失败");
    encoder.open(params).expect("打开 ATRAC3 编码器失败");
    let mut out = MemoryOutput::new("atrac3", params.channels);
    for frame in frames {
        encoder.encode_frame(frame, &mut out).expect("编码失败");
    }
    out.packets().iter().map(|p| p.data.to_vec()).collect()
}

fn unit_header(unit: &[u8]) -> u32 {
    BitReader::new(unit).read_bits(6).expect("读取单元头失败")
}

#[test]
fn test_every_stereo_profile_keeps_frame_size() {
    init_log();
    let frames: Vec<SpectralFrame> = (0..3).map(stereo_frame).collect();
    for profile in CONTAINER_PARAMS.iter().filter(|p| !p.joint_stereo) {
        let params = CodecParameters::new(CodecId::Atrac3, 2, profile.bitrate as u64);
        let packets = encode_frames(&params, &frames);
        assert_eq!(packets.len(), frames.len());
        for data in &packets {
            assert_eq!(data.len(), profile.frame_size, "码率 {} 的帧长不符", profile.bitrate);
            let half = profile.frame_size / 2;
            assert_eq!(unit_header(&data[..half]), SOUND_UNIT_ID);
            assert_eq!(unit_header(&data[half..]), SOUND_UNIT_ID);
        }
    }
}

#[test]
fn test_bitrate_rounds_up_to_profile() {
    init_log();
    let params = CodecParameters::new(CodecId::Atrac3, 2, 120_000);
    let packets = encode_frames(&params, &[stereo_frame(0)]);
    assert_eq!(packets[0].len(), 384);
}

#[test]
fn test_unsupported_bitrates() {
    let registry = atrac::default_codec_registry();
    let mut encoder = registry.create_encoder(CodecId::Atrac3).expect("创建 ATRAC3 编码器失败");
    for bitrate in [66_150u64, 90_000, 400_000] {
        let params = CodecParameters::new(CodecId::Atrac3, 2, bitrate);
        assert!(
            matches!(encoder.open(&params), Err(AtracError::Unsupported(_))),
            "码率 {} 应被拒绝",
            bitrate
        );
    }
}

#[test]
fn test_tonal_extraction_can_be_disabled() {
    init_log();
    let frame = stereo_frame(0);
    let with_tonal = CodecParameters::new(CodecId::Atrac3, 2, 132_300);
    let mut without_tonal = with_tonal.clone();
    if let CodecParamsType::Atrac3(p) = &mut without_tonal.params {
        p.no_tonal_components = true;
    }

    let data = encode_frames(&without_tonal, std::slice::from_ref(&frame));
    let mut br = BitReader::new(&data[0]);
    // 单元头 6 + QMF 数 2 + 4 个频带的增益点数 4 * 3
    br.skip_bits(6 + 2 + 12).unwrap();
    assert_eq!(br.read_bits(5).unwrap(), 0, "关闭音调分量后分组数应为 0");

    let with = encode_frames(&with_tonal, std::slice::from_ref(&frame));
    assert_eq!(with[0].len(), data[0].len());
}

#[test]
fn test_gain_control_and_loudness_across_frames() {
    init_log();
    let params = CodecParameters::new(CodecId::Atrac3, 2, 176_400);
    let mut frames: Vec<SpectralFrame> = (0..4).map(stereo_frame).collect();
    frames[2].channels[0].gain_points = vec![
        vec![GainPoint { level: 3, location: 5 }, GainPoint { level: 6, location: 20 }],
        Vec::new(),
        vec![GainPoint { level: 4, location: 1 }],
        Vec::new(),
    ];
    let packets = encode_frames(&params, &frames);
    assert_eq!(packets.len(), 4);
    assert!(packets.iter().all(|p| p.len() == 512));

    let mut br = BitReader::new(&packets[2]);
    br.skip_bits(6 + 2).unwrap();
    assert_eq!(br.read_bits(3).unwrap(), 2);
    assert_eq!(br.read_bits(4).unwrap(), 3);
    assert_eq!(br.read_bits(5).unwrap(), 5);
}

#[test]
fn test_fresh_encoders_are_idempotent() {
    init_log();
    let params = CodecParameters::new(CodecId::Atrac3, 2, 132_300);
    let frames = [stereo_frame(5)];
    assert_eq!(encode_frames(&params, &frames), encode_frames(&params, &frames));
}
