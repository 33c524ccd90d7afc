//! ATRAC3+ 编码器.
//!
//! 每帧一个声道单元, 帧长可配置 (默认 2048 字节). 正弦分量由外部 GHA
//! 分析提供, 编码器只负责打包.

pub mod bitstream;
pub mod tones;

use atrac_core::{AtracError, AtracResult, BitWriter};
use log::debug;

use crate::bs_encode::BitStreamEncoder;
use crate::codec_id::CodecId;
use crate::codec_parameters::{CodecParameters, SAMPLE_RATE};
use crate::compressed_io::CompressedOutput;
use crate::encoder::Encoder;
use crate::frame::{BlockSizeMode, SpectralFrame};
use crate::psy::{LoudnessTracker, analyze_scale_factor_spread, block_ath, create_loudness_curve, frame_loudness};
use crate::scale::Scaler;
use crate::tables::{Atrac3PlusData, CodecData};

use self::bitstream::{Atrac3PlusFrame, PlusChannel, create_stages, min_frame_bits};
use self::tones::validate_tone_bands;

/// 帧字节数的合法范围
const FRAME_SIZE_RANGE: std::ops::RangeInclusive<usize> = 8..=8192;

/// ATRAC3+ 编码器
pub struct Atrac3PlusEncoder {
    pipeline: BitStreamEncoder<Atrac3PlusFrame>,
    scaler: Scaler<Atrac3PlusData>,
    loudness: LoudnessTracker,
    loudness_curve: Vec<f32>,
    ath: Vec<f32>,
    channels: usize,
    frame_size: usize,
    opened: bool,
}

impl Atrac3PlusEncoder {
    /// 创建 ATRAC3+ 编码器实例
    pub fn create() -> AtracResult<Box<dyn Encoder>> {
        Ok(Box::new(Self::new()))
    }

    pub fn new() -> Self {
        Self {
            pipeline: BitStreamEncoder::new(create_stages()),
            scaler: Scaler::new(),
            loudness: LoudnessTracker::new(),
            loudness_curve: create_loudness_curve(Atrac3PlusData::NUM_SAMPLES),
            ath: Vec::new(),
            channels: 0,
            frame_size: 0,
            opened: false,
        }
    }
}

impl Default for Atrac3PlusEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for Atrac3PlusEncoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Atrac3Plus
    }

    fn name(&self) -> &str {
        "atrac3plus"
    }

    fn open(&mut self, params: &CodecParameters) -> AtracResult<()> {
        super::validate_common(params, CodecId::Atrac3Plus)?;
        let p = params
            .atrac3plus()
            .ok_or_else(|| AtracError::InvalidArgument("缺少 ATRAC3+ 参数".into()))?;
        if !FRAME_SIZE_RANGE.contains(&p.frame_size) {
            return Err(AtracError::InvalidArgument(format!(
                "ATRAC3+ 帧长 {} 不在 {:?} 之内",
                p.frame_size, FRAME_SIZE_RANGE
            )));
        }
        if p.frame_size * 8 < min_frame_bits(params.channels) {
            return Err(AtracError::InvalidArgument(format!(
                "ATRAC3+ 帧长 {} 字节放不下 {} 声道的固定开销",
                p.frame_size, params.channels
            )));
        }

        self.frame_size = p.frame_size;
        self.channels = params.channels;
        self.ath = block_ath::<Atrac3PlusData>(SAMPLE_RATE);
        self.loudness = LoudnessTracker::new();
        self.pipeline = BitStreamEncoder::new(create_stages());
        self.opened = true;
        debug!("打开 ATRAC3+ 编码器: channels={}, frame_size={}", self.channels, self.frame_size);
        Ok(())
    }

    fn encode_frame(&mut self, frame: &SpectralFrame, output: &mut dyn CompressedOutput) -> AtracResult<()> {
        if !self.opened {
            return Err(AtracError::Codec("ATRAC3+ 编码器未打开".into()));
        }
        if frame.channels.len() != self.channels {
            return Err(AtracError::InvalidArgument(format!(
                "声道数不匹配: 期望 {}, 实际 {}",
                self.channels,
                frame.channels.len()
            )));
        }

        let mut channels = Vec::with_capacity(self.channels);
        let mut l = Vec::with_capacity(self.channels);
        for ch in &frame.channels {
            validate_tone_bands(&ch.tone_bands)?;
            let scaled_blocks = self.scaler.scale_frame(&ch.specs, &BlockSizeMode::long())?;
            l.push(frame_loudness(&ch.specs, &self.loudness_curve));
            channels.push(PlusChannel {
                spread: analyze_scale_factor_spread(&scaled_blocks),
                scaled_blocks,
                tone_bands: ch.tone_bands.clone(),
            });
        }
        match l.as_slice() {
            [l0, l1] => self.loudness.track_stereo(*l0, *l1),
            [l0] => self.loudness.track_mono(*l0),
            _ => {}
        }

        let size_bits = self.frame_size * 8;
        let mut ctx = Atrac3PlusFrame::new(size_bits, channels, self.ath.clone(), self.loudness.normalized());
        let mut bw = BitWriter::with_capacity(self.frame_size);
        self.pipeline.encode(&mut ctx, &mut bw)?;
        if bw.bits_written() > size_bits {
            return Err(AtracError::Internal(format!(
                "ATRAC3+ 帧超出预算: {} > {}",
                bw.bits_written(),
                size_bits
            )));
        }
        bw.pad_to_bits(size_bits);
        output.write_frame(&bw.finish())
    }

    fn reset(&mut self) {
        self.loudness = LoudnessTracker::new();
    }
}
