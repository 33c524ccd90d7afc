//! ATRAC3 编码器.
//!
//! 帧长由码率档位决定, 每帧两个声音单元各占一半. 单声道输入复制到两半.
//! 联合立体声档位不支持.

pub mod bitstream;
pub mod tonal;

use atrac_core::{AtracError, AtracResult, BitWriter};
use log::debug;

use crate::codec_id::CodecId;
use crate::codec_parameters::{CodecParameters, SAMPLE_RATE};
use crate::compressed_io::CompressedOutput;
use crate::encoder::Encoder;
use crate::frame::{BlockSizeMode, ChannelSpectrum, SpectralFrame};
use crate::psy::{LoudnessTracker, analyze_scale_factor_spread, block_ath, create_loudness_curve, frame_loudness};
use crate::scale::{ScaledBlock, Scaler};
use crate::tables::atrac3::container_params_for_bitrate;
use crate::tables::{Atrac3Data, CodecData};

use self::bitstream::{AllocInput, allocate, gain_bits, validate_gain_points, write_sound_unit};
use self::tonal::{TonalGroups, extract_tonal};

/// 每个声音单元固定的头部比特 (单元标识 + QMF 频带数)
const UNIT_HEADER_BITS: usize = 6 + 2;

/// ATRAC3 编码器
pub struct Atrac3Encoder {
    scaler: Scaler<Atrac3Data>,
    loudness: LoudnessTracker,
    loudness_curve: Vec<f32>,
    ath: Vec<f32>,
    channels: usize,
    /// 帧字节数 (两个声音单元合计)
    frame_size: usize,
    bfu_const: Option<usize>,
    tonal_enabled: bool,
    opened: bool,
}

impl Atrac3Encoder {
    /// 创建 ATRAC3 编码器实例
    pub fn create() -> AtracResult<Box<dyn Encoder>> {
        Ok(Box::new(Self::new()))
    }

    pub fn new() -> Self {
        Self {
            scaler: Scaler::new(),
            loudness: LoudnessTracker::new(),
            loudness_curve: create_loudness_curve(Atrac3Data::NUM_SAMPLES),
            ath: Vec::new(),
            channels: 0,
            frame_size: 0,
            bfu_const: None,
            tonal_enabled: true,
            opened: false,
        }
    }

    /// 当前档位的帧字节数
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn unit_bits(&self) -> usize {
        self.frame_size / 2 * 8
    }

    /// 缩放频谱并求缩放因子分布
    fn scale_with_spread(&self, specs: &[f32]) -> AtracResult<(Vec<ScaledBlock>, f32)> {
        let blocks = self.scaler.scale_frame(specs, &BlockSizeMode::long())?;
        let spread = analyze_scale_factor_spread(&blocks);
        Ok((blocks, spread))
    }

    fn encode_unit(&self, ch: &ChannelSpectrum, loudness: f32) -> AtracResult<Vec<u8>> {
        validate_gain_points(&ch.gain_points)?;
        let mut specs = ch.specs.clone();
        let (blocks, spread) = self.scale_with_spread(&specs)?;

        let unit_bits = self.unit_bits();
        let available = unit_bits.saturating_sub(UNIT_HEADER_BITS + gain_bits(&ch.gain_points));
        let tonal = if self.tonal_enabled {
            extract_tonal(&mut specs, spread, available / 4)
        } else {
            TonalGroups::build(&[])
        };
        // 分配只看去掉音调分量后的残余频谱
        let (blocks, spread) = if tonal.is_empty() {
            (blocks, spread)
        } else {
            self.scale_with_spread(&specs)?
        };

        let coding = allocate(
            &AllocInput {
                blocks: &blocks,
                spread,
                ath: &self.ath,
                loudness,
                bfu_const: self.bfu_const,
            },
            available.saturating_sub(tonal.bits),
        );

        let mut bw = BitWriter::with_capacity(self.frame_size / 2);
        write_sound_unit(&ch.gain_points, &tonal, &blocks, &coding, &mut bw)?;
        if bw.bits_written() > unit_bits {
            return Err(AtracError::Internal(format!(
                "ATRAC3 声音单元超出预算: {} > {}",
                bw.bits_written(),
                unit_bits
            )));
        }
        bw.pad_to_bits(unit_bits);
        Ok(bw.finish())
    }
}

impl Default for Atrac3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for Atrac3Encoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Atrac3
    }

    fn name(&self) -> &str {
        "atrac3"
    }

    fn open(&mut self, params: &CodecParameters) -> AtracResult<()> {
        super::validate_common(params, CodecId::Atrac3)?;
        let p = params
            .atrac3()
            .ok_or_else(|| AtracError::InvalidArgument("缺少 ATRAC3 参数".into()))?;

        let bitrate = u32::try_from(params.bit_rate).unwrap_or(u32::MAX);
        let profile = container_params_for_bitrate(bitrate)
            .ok_or_else(|| AtracError::Unsupported(format!("没有不低于 {} bit/s 的 ATRAC3 档位", params.bit_rate)))?;
        if profile.joint_stereo {
            return Err(AtracError::Unsupported(format!(
                "不支持联合立体声档位: {} bit/s",
                profile.bitrate
            )));
        }

        self.bfu_const = match p.bfu_idx_const {
            None => None,
            Some(n @ 1..=32) => Some(n as usize),
            Some(n) => {
                return Err(AtracError::InvalidArgument(format!("BFU 数必须在 1..=32 之间: {}", n)));
            }
        };
        self.tonal_enabled = !p.no_tonal_components;
        self.frame_size = profile.frame_size;
        self.channels = params.channels;
        self.ath = block_ath::<Atrac3Data>(SAMPLE_RATE);
        self.loudness = LoudnessTracker::new();
        self.opened = true;
        debug!(
            "打开 ATRAC3 编码器: channels={}, bitrate={}, frame_size={}",
            self.channels, profile.bitrate, self.frame_size
        );
        Ok(())
    }

    fn encode_frame(&mut self, frame: &SpectralFrame, output: &mut dyn CompressedOutput) -> AtracResult<()> {
        if !self.opened {
            return Err(AtracError::Codec("ATRAC3 编码器未打开".into()));
        }
        if frame.channels.len() != self.channels {
            return Err(AtracError::InvalidArgument(format!(
                "声道数不匹配: 期望 {}, 实际 {}",
                self.channels,
                frame.channels.len()
            )));
        }

        let l: Vec<f32> = frame
            .channels
            .iter()
            .map(|ch| frame_loudness(&ch.specs, &self.loudness_curve))
            .collect();
        match l.as_slice() {
            [l0, l1] => self.loudness.track_stereo(*l0, *l1),
            [l0] => self.loudness.track_mono(*l0),
            _ => {}
        }
        let loudness = self.loudness.normalized();

        let mut data = Vec::with_capacity(self.frame_size);
        for ch in &frame.channels {
            data.extend_from_slice(&self.encode_unit(ch, loudness)?);
        }
        if self.channels == 1 {
            data.extend_from_within(..);
        }
        output.write_frame(&data)
    }

    fn reset(&mut self) {
        self.loudness = LoudnessTracker::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec_parameters::CodecParamsType;
    use crate::compressed_io::MemoryOutput;
    use crate::frame::GainPoint;
    use crate::tables::atrac3::SOUND_UNIT_ID;
    use atrac_core::BitReader;

    fn tone_specs() -> Vec<f32> {
        (0..1024)
            .map(|i| {
                if i == 130 || i == 402 {
                    0.6
                } else {
                    0.003 * ((i as f32) * 0.37).sin()
                }
            })
            .collect()
    }

    fn open(channels: usize, bitrate: u64) -> Atrac3Encoder {
        let mut enc = Atrac3Encoder::new();
        enc.open(&CodecParameters::new(CodecId::Atrac3, channels, bitrate)).unwrap();
        enc
    }

    #[test]
    fn test_spread_recomputed_on_residual() {
        // 恒定幅度底噪上两个强峰, 峰值被提取后各 BFU 缩放因子相同
        let mut specs: Vec<f32> = (0..1024)
            .map(|i| {
                if i == 130 || i == 402 {
                    0.9
                } else if i % 2 == 0 {
                    0.01
                } else {
                    -0.01
                }
            })
            .collect();
        let enc = open(2, 132300);
        let (_, before) = enc.scale_with_spread(&specs).unwrap();
        assert!(before > 0.0);

        let tonal = extract_tonal(&mut specs, before, 10_000);
        assert!(!tonal.is_empty());
        let (_, after) = enc.scale_with_spread(&specs).unwrap();
        assert_eq!(after, 0.0, "残余频谱的缩放因子分布应为 0");
    }

    #[test]
    fn test_rejects_joint_stereo_profile() {
        let mut enc = Atrac3Encoder::new();
        let err = enc.open(&CodecParameters::new(CodecId::Atrac3, 2, 66150)).unwrap_err();
        assert!(matches!(err, AtracError::Unsupported(_)));
        let err = enc.open(&CodecParameters::new(CodecId::Atrac3, 2, 500_000)).unwrap_err();
        assert!(matches!(err, AtracError::Unsupported(_)));
    }

    #[test]
    fn test_stereo_frame_layout() {
        let mut enc = open(2, 132300);
        assert_eq!(enc.frame_size(), 384);
        let frame = SpectralFrame::new(vec![ChannelSpectrum::from_specs(tone_specs()); 2]);
        let mut out = MemoryOutput::new("test", 2);
        enc.encode_frame(&frame, &mut out).unwrap();
        assert_eq!(out.packets().len(), 1);
        let data = &out.packets()[0].data;
        assert_eq!(data.len(), 384);

        for half in data.chunks(192) {
            let mut br = BitReader::new(half);
            assert_eq!(br.read_bits(6).unwrap(), SOUND_UNIT_ID);
            assert_eq!(br.read_bits(2).unwrap(), 3);
        }
    }

    #[test]
    fn test_mono_is_duplicated() {
        let mut enc = open(1, 104738);
        let frame = SpectralFrame::new(vec![ChannelSpectrum::from_specs(tone_specs())]);
        let mut out = MemoryOutput::new("test", 1);
        enc.encode_frame(&frame, &mut out).unwrap();
        let data = &out.packets()[0].data;
        assert_eq!(data.len(), 304);
        assert_eq!(data[..152], data[152..]);
    }

    #[test]
    fn test_gain_points_written() {
        let mut enc = open(1, 132300);
        let mut ch = ChannelSpectrum::from_specs(tone_specs());
        ch.gain_points = vec![vec![GainPoint { level: 9, location: 17 }]];
        let mut out = MemoryOutput::new("test", 1);
        enc.encode_frame(&SpectralFrame::new(vec![ch]), &mut out).unwrap();

        let data = &out.packets()[0].data;
        let mut br = BitReader::new(data);
        br.skip_bits(8).unwrap();
        assert_eq!(br.read_bits(3).unwrap(), 1);
        assert_eq!(br.read_bits(4).unwrap(), 9);
        assert_eq!(br.read_bits(5).unwrap(), 17);
        assert_eq!(br.read_bits(3).unwrap(), 0);
    }

    #[test]
    fn test_rejects_bad_gain_points() {
        let mut enc = open(1, 132300);
        let mut ch = ChannelSpectrum::from_specs(tone_specs());
        ch.gain_points = vec![vec![GainPoint { level: 3, location: 40 }]];
        let mut out = MemoryOutput::new("test", 1);
        let err = enc.encode_frame(&SpectralFrame::new(vec![ch]), &mut out).unwrap_err();
        assert!(matches!(err, AtracError::InvalidArgument(_)));
    }

    #[test]
    fn test_fresh_encoders_are_deterministic() {
        let frame = SpectralFrame::new(vec![ChannelSpectrum::from_specs(tone_specs()); 2]);
        let mut a = MemoryOutput::new("a", 2);
        let mut b = MemoryOutput::new("b", 2);
        open(2, 176400).encode_frame(&frame, &mut a).unwrap();
        open(2, 176400).encode_frame(&frame, &mut b).unwrap();
        assert_eq!(a.packets()[0].data, b.packets()[0].data);
    }

    #[test]
    fn test_fixed_bfu_count() {
        let mut enc = Atrac3Encoder::new();
        let mut params = CodecParameters::new(CodecId::Atrac3, 1, 132300);
        if let CodecParamsType::Atrac3(p) = &mut params.params {
            p.bfu_idx_const = Some(12);
            p.no_tonal_components = true;
        }
        enc.open(&params).unwrap();
        let mut out = MemoryOutput::new("test", 1);
        enc.encode_frame(&SpectralFrame::new(vec![ChannelSpectrum::from_specs(tone_specs())]), &mut out)
            .unwrap();

        let mut br = BitReader::new(&out.packets()[0].data);
        // 头部 8 位, 4 个空增益频带 12 位, 音调分组数 5 位
        br.skip_bits(8 + 12).unwrap();
        assert_eq!(br.read_bits(5).unwrap(), 0);
        assert_eq!(br.read_bits(5).unwrap(), 11);
    }

    #[test]
    fn test_open_rejects_bad_bfu_count() {
        let mut enc = Atrac3Encoder::new();
        let mut params = CodecParameters::new(CodecId::Atrac3, 2, 132300);
        if let CodecParamsType::Atrac3(p) = &mut params.params {
            p.bfu_idx_const = Some(33);
        }
        assert!(matches!(enc.open(&params), Err(AtracError::InvalidArgument(_))));
    }
}
