//! 编码器参数.
//!
//! 描述打开编码器时的配置, 各 ATRAC 变体的专有选项放在 `CodecParamsType` 中.

use crate::codec_id::CodecId;

/// 唯一支持的采样率
pub const SAMPLE_RATE: u32 = 44100;

/// 编码器参数
#[derive(Debug, Clone)]
pub struct CodecParameters {
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 采样率 (Hz), 仅支持 44100
    pub sample_rate: u32,
    /// 声道数
    pub channels: usize,
    /// 码率 (bits/s), ATRAC3 用于选择容器档位
    pub bit_rate: u64,
    /// 变体专有参数
    pub params: CodecParamsType,
}

/// 变体专有参数
#[derive(Debug, Clone)]
pub enum CodecParamsType {
    /// ATRAC1 参数
    Atrac1(Atrac1Params),
    /// ATRAC3 参数
    Atrac3(Atrac3Params),
    /// ATRAC3+ 参数
    Atrac3Plus(Atrac3PlusParams),
}

/// ATRAC1 参数
#[derive(Debug, Clone, Default)]
pub struct Atrac1Params {
    /// 固定 BFU 数表索引 (1..=8), `None` 表示自动缩减
    pub bfu_idx_const: Option<u8>,
    /// 自动缩减时直接跳到检测到的最小 BFU 数, 而非逐级递减
    pub fast_bfu_num_search: bool,
}

/// ATRAC3 参数
#[derive(Debug, Clone, Default)]
pub struct Atrac3Params {
    /// 固定 BFU 数 (1..=32), `None` 表示按分配结果缩减
    pub bfu_idx_const: Option<u8>,
    /// 关闭音调分量提取
    pub no_tonal_components: bool,
}

/// ATRAC3+ 参数
#[derive(Debug, Clone)]
pub struct Atrac3PlusParams {
    /// 每帧字节数 (所有声道合计)
    pub frame_size: usize,
}

impl Default for Atrac3PlusParams {
    fn default() -> Self {
        Self { frame_size: 2048 }
    }
}

impl CodecParameters {
    /// 以默认专有参数创建
    pub fn new(codec_id: CodecId, channels: usize, bit_rate: u64) -> Self {
        let params = match codec_id {
            CodecId::Atrac1 => CodecParamsType::Atrac1(Atrac1Params::default()),
            CodecId::Atrac3 => CodecParamsType::Atrac3(Atrac3Params::default()),
            CodecId::Atrac3Plus => CodecParamsType::Atrac3Plus(Atrac3PlusParams::default()),
        };
        Self {
            codec_id,
            sample_rate: SAMPLE_RATE,
            channels,
            bit_rate,
            params,
        }
    }

    /// 获取 ATRAC1 参数
    pub fn atrac1(&self) -> Option<&Atrac1Params> {
        match &self.params {
            CodecParamsType::Atrac1(p) => Some(p),
            _ => None,
        }
    }

    /// 获取 ATRAC3 参数
    pub fn atrac3(&self) -> Option<&Atrac3Params> {
        match &self.params {
            CodecParamsType::Atrac3(p) => Some(p),
            _ => None,
        }
    }

    /// 获取 ATRAC3+ 参数
    pub fn atrac3plus(&self) -> Option<&Atrac3PlusParams> {
        match &self.params {
            CodecParamsType::Atrac3Plus(p) => Some(p),
            _ => None,
        }
    }
}
