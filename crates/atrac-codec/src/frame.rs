//! 编码器输入帧.
//!
//! QMF 分析与 MDCT 在编码核心之外完成, 编码器每次接收一帧已变换的频谱数据,
//! 以及瞬态检测得到的窗长选择、ATRAC3 增益控制点和 ATRAC3+ 正弦参数.

/// 窗长模式
///
/// 每个 QMF 频带一个 `log_count`: 0 表示长窗, 非 0 表示短窗
/// (ATRAC1 低/中频带为 2, 高频带为 3, 即 4/4/8 个短块).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockSizeMode {
    /// 各频带的短窗 log2 数量
    pub log_count: [u8; 4],
}

impl BlockSizeMode {
    /// 全部长窗
    pub const fn long() -> Self {
        Self { log_count: [0; 4] }
    }

    /// 按 ATRAC1 的低/中/高三个频带构造
    pub const fn atrac1(low_short: bool, mid_short: bool, high_short: bool) -> Self {
        Self {
            log_count: [
                if low_short { 2 } else { 0 },
                if mid_short { 2 } else { 0 },
                if high_short { 3 } else { 0 },
                0,
            ],
        }
    }

    /// 指定频带是否使用短窗
    pub fn is_short(&self, band: usize) -> bool {
        self.log_count.get(band).is_some_and(|&c| c != 0)
    }

    /// 是否所有频带都使用长窗
    pub fn all_long(&self) -> bool {
        self.log_count.iter().all(|&c| c == 0)
    }
}

/// ATRAC3 增益控制点 (电平 4 位, 位置 5 位)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainPoint {
    pub level: u8,
    pub location: u8,
}

/// ATRAC3+ 单个正弦分量的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveParam {
    /// 频率索引 (10 位)
    pub freq_index: u16,
    /// 幅度缩放因子索引 (6 位)
    pub amp_sf: u8,
    /// 相位索引 (5 位)
    pub phase_index: u8,
}

impl WaveParam {
    pub const fn new(freq_index: u16, amp_sf: u8, phase_index: u8) -> Self {
        Self {
            freq_index,
            amp_sf,
            phase_index,
        }
    }
}

/// ATRAC3+ 正弦包络的起止位置 (5 位, 单位为 4 个采样)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaveEnvelope {
    pub start: Option<u8>,
    pub stop: Option<u8>,
}

/// ATRAC3+ 一个音调频带内的正弦分量
///
/// `waves` 必须按 `freq_index` 升序排列.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToneBand {
    pub waves: Vec<WaveParam>,
    pub envelope: WaveEnvelope,
}

/// 单声道频谱
#[derive(Debug, Clone, Default)]
pub struct ChannelSpectrum {
    /// MDCT 频谱 (长度由编解码器决定: 512/1024/2048)
    pub specs: Vec<f32>,
    /// 窗长模式
    pub block_size: BlockSizeMode,
    /// ATRAC3 每个 QMF 频带的增益控制点 (最多 7 个)
    pub gain_points: Vec<Vec<GainPoint>>,
    /// ATRAC3+ 外部正弦提取结果, 按音调频带排列
    pub tone_bands: Vec<ToneBand>,
}

impl ChannelSpectrum {
    /// 仅含频谱、全部长窗的声道数据
    pub fn from_specs(specs: Vec<f32>) -> Self {
        Self {
            specs,
            ..Self::default()
        }
    }
}

/// 一帧多声道频谱
#[derive(Debug, Clone, Default)]
pub struct SpectralFrame {
    pub channels: Vec<ChannelSpectrum>,
}

impl SpectralFrame {
    pub fn new(channels: Vec<ChannelSpectrum>) -> Self {
        Self { channels }
    }
}
