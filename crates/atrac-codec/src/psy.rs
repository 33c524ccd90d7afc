//! 心理声学辅助函数.
//!
//! 包括缩放因子离散度分析、绝对听阈 (ATH) 曲线、响度加权曲线
//! 以及跨帧的响度跟踪.

use crate::scale::ScaledBlock;
use crate::tables::CodecData;

/// 离散度的上限 (缩放因子索引标准差)
const MAX_SPREAD_SIGMA: f32 = 14.0;

/// ATH 曲线从 dB SPL 换算到归一化频谱能量的偏移
const ATH_OFFSET_DB: f32 = 100.0;

/// 响度归一化因子, 分配时使用 `loudness / LOUD_FACTOR`
pub const LOUD_FACTOR: f32 = 0.006;

/// 缩放因子索引的离散度
///
/// 返回 0 (类噪声) 到 1 (类音调) 之间的值, 空输入返回 0.
pub fn analyze_scale_factor_spread(blocks: &[ScaledBlock]) -> f32 {
    if blocks.is_empty() {
        return 0.0;
    }
    let n = blocks.len() as f32;
    let mean = blocks.iter().map(|b| b.scale_factor_index as f32).sum::<f32>() / n;
    let variance = blocks
        .iter()
        .map(|b| {
            let d = b.scale_factor_index as f32 - mean;
            d * d
        })
        .sum::<f32>()
        / n;
    variance.sqrt().min(MAX_SPREAD_SIGMA) / MAX_SPREAD_SIGMA
}

/// 按 Terhardt 近似计算 `len` 条频谱线的绝对听阈 (dB)
pub fn calc_ath(len: usize, sample_rate: u32) -> Vec<f32> {
    let mf = sample_rate as f32 / 2000.0;
    (0..len)
        .map(|i| {
            let f = (i + 1) as f32 * mf / len as f32;
            let trh = 3.64 * f.powf(-0.8) - 6.5 * (-0.6 * (f - 3.3) * (f - 3.3)).exp() + 0.001 * f.powi(4);
            trh - ATH_OFFSET_DB
        })
        .collect()
}

/// 各块的线性 ATH 能量 (取块内最小值, 长窗布局)
pub fn block_ath<D: CodecData>(sample_rate: u32) -> Vec<f32> {
    let ath = calc_ath(D::NUM_SAMPLES, sample_rate);
    (0..D::MAX_BFUS)
        .map(|blk| {
            let start = D::SPECS_START_LONG[blk];
            let min = ath[start..start + D::SPECS_PER_BLOCK[blk]]
                .iter()
                .fold(f32::INFINITY, |m, &x| m.min(x));
            10.0f32.powf(0.1 * min)
        })
        .collect()
}

/// 响度加权曲线 (中频权重最大)
pub fn create_loudness_curve(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let f = (i + 3) as f32 * 0.5 * 44100.0 / size as f32;
            let mut t = f.log10() - 3.5;
            t = -10.0 * t * t + 3.0 - f / 3000.0;
            10.0f32.powf(0.1 * t)
        })
        .collect()
}

/// 一帧频谱的加权能量
pub fn frame_loudness(specs: &[f32], curve: &[f32]) -> f32 {
    specs.iter().zip(curve).map(|(s, c)| s * s * c).sum()
}

/// 跨帧响度估计 (时间常数约 50 帧的一阶低通)
#[derive(Debug, Clone, Copy)]
pub struct LoudnessTracker {
    loudness: f32,
}

impl LoudnessTracker {
    pub fn new() -> Self {
        Self {
            loudness: LOUD_FACTOR,
        }
    }

    /// 用单声道响度更新
    pub fn track_mono(&mut self, l: f32) {
        self.loudness = 0.98 * self.loudness + 0.02 * l;
    }

    /// 用双声道响度更新
    pub fn track_stereo(&mut self, l0: f32, l1: f32) {
        self.loudness = 0.98 * self.loudness + 0.01 * (l0 + l1);
    }

    pub fn value(&self) -> f32 {
        self.loudness
    }

    /// 分配使用的相对响度
    pub fn normalized(&self) -> f32 {
        self.loudness / LOUD_FACTOR
    }
}

impl Default for LoudnessTracker {
    fn default() -> Self {
        Self::new()
    }
}
