//! ATRAC1 编码器.
//!
//! 每声道每帧输出一个 212 字节的声音单元. 响度估计跨帧保留,
//! 仅在所有频带都使用长窗时更新.

pub mod bitalloc;

use atrac_core::{AtracError, AtracResult, BitWriter};
use log::debug;

use crate::bs_encode::BitStreamEncoder;
use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::compressed_io::CompressedOutput;
use crate::encoder::Encoder;
use crate::frame::SpectralFrame;
use crate::psy::{LoudnessTracker, analyze_scale_factor_spread, create_loudness_curve, frame_loudness};
use crate::scale::Scaler;
use crate::tables::atrac1::{BFU_AMOUNT_TAB, MAX_LOG_COUNT};
use crate::tables::{Atrac1Data, CodecData};

use self::bitalloc::{Atrac1Frame, SOUND_UNIT_BITS, create_stages};

/// ATRAC1 编码器
pub struct Atrac1Encoder {
    /// 每声道一条流水线
    pipelines: Vec<BitStreamEncoder<Atrac1Frame>>,
    scaler: Scaler<Atrac1Data>,
    loudness: LoudnessTracker,
    loudness_curve: Vec<f32>,
    channels: usize,
    /// 初始 BFU 数表索引
    initial_bfu_idx: usize,
    opened: bool,
}

impl Atrac1Encoder {
    /// 创建 ATRAC1 编码器实例
    pub fn create() -> AtracResult<Box<dyn Encoder>> {
        Ok(Box::new(Self::new()))
    }

    pub fn new() -> Self {
        Self {
            pipelines: Vec::new(),
            scaler: Scaler::new(),
            loudness: LoudnessTracker::new(),
            loudness_curve: create_loudness_curve(Atrac1Data::NUM_SAMPLES),
            channels: 0,
            initial_bfu_idx: BFU_AMOUNT_TAB.len() - 1,
            opened: false,
        }
    }

    fn update_loudness(&mut self, frame: &SpectralFrame) {
        let l: Vec<f32> = frame
            .channels
            .iter()
            .map(|ch| frame_loudness(&ch.specs, &self.loudness_curve))
            .collect();
        let long0 = frame.channels[0].block_size.all_long();
        if self.channels == 2 && long0 && frame.channels[1].block_size.all_long() {
            self.loudness.track_stereo(l[0], l[1]);
        } else if long0 {
            self.loudness.track_mono(l[0]);
        }
    }
}

impl Default for Atrac1Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for Atrac1Encoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Atrac1
    }

    fn name(&self) -> &str {
        "atrac1"
    }

    fn open(&mut self, params: &CodecParameters) -> AtracResult<()> {
        super::validate_common(params, CodecId::Atrac1)?;
        let p = params
            .atrac1()
            .ok_or_else(|| AtracError::InvalidArgument("缺少 ATRAC1 参数".into()))?;

        self.initial_bfu_idx = match p.bfu_idx_const {
            None => BFU_AMOUNT_TAB.len() - 1,
            Some(idx @ 1..=8) => idx as usize - 1,
            Some(idx) => {
                return Err(AtracError::InvalidArgument(format!(
                    "BFU 数表索引必须在 1..=8 之间: {}",
                    idx
                )));
            }
        };
        self.channels = params.channels;
        self.pipelines = (0..params.channels)
            .map(|_| BitStreamEncoder::new(create_stages(p.bfu_idx_const, p.fast_bfu_num_search)))
            .collect();
        self.loudness = LoudnessTracker::new();
        self.opened = true;
        debug!(
            "打开 ATRAC1 编码器: channels={}, bfu_idx={}",
            self.channels, self.initial_bfu_idx
        );
        Ok(())
    }

    fn encode_frame(&mut self, frame: &SpectralFrame, output: &mut dyn CompressedOutput) -> AtracResult<()> {
        if !self.opened {
            return Err(AtracError::Codec("ATRAC1 编码器未打开".into()));
        }
        if frame.channels.len() != self.channels {
            return Err(AtracError::InvalidArgument(format!(
                "声道数不匹配: 期望 {}, 实际 {}",
                self.channels,
                frame.channels.len()
            )));
        }
        for ch in &frame.channels {
            let lc = &ch.block_size.log_count;
            if lc.iter().zip(&MAX_LOG_COUNT).any(|(c, max)| c > max) || lc[3] != 0 {
                return Err(AtracError::InvalidArgument(format!("ATRAC1 窗长模式无效: {:?}", lc)));
            }
        }

        self.update_loudness(frame);
        let loudness = self.loudness.normalized();

        for (ch, pipeline) in frame.channels.iter().zip(&mut self.pipelines) {
            let scaled_blocks = self.scaler.scale_frame(&ch.specs, &ch.block_size)?;
            let mut ctx = Atrac1Frame {
                spread: analyze_scale_factor_spread(&scaled_blocks),
                scaled_blocks,
                block_size: ch.block_size,
                loudness,
                bfu_idx: self.initial_bfu_idx,
                available_bits: 0,
            };

            let mut bw = BitWriter::with_capacity(SOUND_UNIT_BITS / 8);
            pipeline.encode(&mut ctx, &mut bw)?;
            bw.pad_to_bits(SOUND_UNIT_BITS);
            output.write_frame(&bw.finish())?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.loudness = LoudnessTracker::new();
    }
}
