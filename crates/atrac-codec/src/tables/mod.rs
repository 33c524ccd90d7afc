//! ATRAC 各变体的常量表.
//!
//! 每个变体以一个零大小类型实现 `CodecData`, 向缩放、比特分配和序列化
//! 提供统一的块布局描述.

pub mod atrac1;
pub mod atrac3;
pub mod atrac3plus;

pub use atrac1::Atrac1Data;
pub use atrac3::Atrac3Data;
pub use atrac3plus::Atrac3PlusData;

/// 缩放因子表的条目数 (6 位索引)
pub const NUM_SCALE_FACTORS: usize = 64;

/// 变体块布局
///
/// "块" 在 ATRAC1 中称为 BFU, 在 ATRAC3+ 中称为量化单元 (QU).
pub trait CodecData {
    /// 每帧每声道的频谱线数
    const NUM_SAMPLES: usize;
    /// QMF 频带数
    const NUM_QMF: usize;
    /// 最大块数
    const MAX_BFUS: usize;
    /// 每块的频谱线数
    const SPECS_PER_BLOCK: &'static [usize];
    /// 各 QMF 频带的首块索引, 长度为 `NUM_QMF + 1`
    const BLOCKS_PER_BAND: &'static [usize];
    /// 长窗下每块的起始频谱线
    const SPECS_START_LONG: &'static [usize];
    /// 短窗下每块的起始频谱线 (无短窗的变体与长窗相同)
    const SPECS_START_SHORT: &'static [usize];

    /// 64 级缩放因子表 (单调递增)
    fn scale_table() -> &'static [f32; NUM_SCALE_FACTORS];

    /// 块所在的 QMF 频带
    fn bfu_to_band(bfu: usize) -> usize {
        Self::BLOCKS_PER_BAND[1..]
            .iter()
            .position(|&end| bfu < end)
            .unwrap_or(Self::NUM_QMF - 1)
    }
}

/// 按 `2^(i/3 - 21)` 生成的缩放因子表, ATRAC1 与 ATRAC3 共用
pub(crate) fn build_pow2_scale_table() -> [f32; NUM_SCALE_FACTORS] {
    let mut table = [0.0f32; NUM_SCALE_FACTORS];
    for (i, v) in table.iter_mut().enumerate() {
        *v = 2.0f64.powf(i as f64 / 3.0 - 21.0) as f32;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_layout<D: CodecData>() {
        assert_eq!(D::SPECS_PER_BLOCK.len(), D::MAX_BFUS);
        assert_eq!(D::SPECS_START_LONG.len(), D::MAX_BFUS);
        assert_eq!(D::SPECS_START_SHORT.len(), D::MAX_BFUS);
        assert_eq!(D::BLOCKS_PER_BAND.len(), D::NUM_QMF + 1);
        assert_eq!(D::BLOCKS_PER_BAND[D::NUM_QMF], D::MAX_BFUS);
        let total: usize = D::SPECS_PER_BLOCK.iter().sum();
        assert_eq!(total, D::NUM_SAMPLES);
        for i in 1..D::MAX_BFUS {
            assert_eq!(
                D::SPECS_START_LONG[i],
                D::SPECS_START_LONG[i - 1] + D::SPECS_PER_BLOCK[i - 1]
            );
        }
        let table = D::scale_table();
        assert!(table.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_layouts_are_consistent() {
        check_layout::<Atrac1Data>();
        check_layout::<Atrac3Data>();
        check_layout::<Atrac3PlusData>();
    }

    #[test]
    fn test_bfu_to_band() {
        assert_eq!(Atrac1Data::bfu_to_band(0), 0);
        assert_eq!(Atrac1Data::bfu_to_band(19), 0);
        assert_eq!(Atrac1Data::bfu_to_band(20), 1);
        assert_eq!(Atrac1Data::bfu_to_band(51), 2);
        assert_eq!(Atrac3Data::bfu_to_band(31), 3);
        assert_eq!(Atrac3PlusData::bfu_to_band(23), 7);
    }

    #[test]
    fn test_pow2_scale_table_bounds() {
        let t = build_pow2_scale_table();
        assert!((t[63] - 1.0).abs() < 1e-6);
        assert!((t[60] - 0.5).abs() < 1e-6);
    }
}
