//! ATRAC3 声音单元序列化与比特分配.
//!
//! 声音单元布局:
//!
//! ```text
//! 6  单元标识 0x28
//! 2  QMF 频带数 - 1
//!    每频带: 3 位增益点数, 每点 4 位电平 + 5 位位置
//!    音调分量 (见 tonal 模块)
//! 5  BFU 数 - 1
//! 1  编码模式 (1 = CLC, 0 = VLC)
//! 3  每 BFU 的量化选择子
//! 6  每个非零 BFU 的缩放因子
//!    尾数
//! ```

use atrac_core::{AtracError, AtracResult, BitWriter};
use log::debug;

use crate::bitalloc::{Allocation, blend_word_len, search_shift};
use crate::frame::GainPoint;
use crate::scale::ScaledBlock;
use crate::tables::CodecData;
use crate::tables::atrac3::{
    Atrac3Data, CLC_LENGTH_TAB, MAX_GAIN_POINTS, MAX_QUANT, SOUND_UNIT_ID, huff_symbol, huff_table,
    mantissa_to_clc_idx, mantissas_to_vlc_index,
};

use super::tonal::TonalGroups;

/// 最大量化选择子
pub const MAX_SELECTOR: u32 = 7;

/// 写入码流的 QMF 频带数
const CODED_QMF_BANDS: usize = 4;

pub(crate) const FIXED_BIT_ALLOC_TABLE: [f32; 32] = [
    4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, //
    3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, //
    2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, //
    1.0, 1.0, 1.0, 1.0, //
    0.0, 0.0,
];

/// 按量化选择子把归一化值量化为尾数
pub fn quantize(values: &[f32], selector: u32) -> Vec<i32> {
    let mul = MAX_QUANT[selector.min(MAX_SELECTOR) as usize];
    values.iter().map(|&v| (v * mul).round() as i32).collect()
}

/// CLC 编码比特数
pub fn clc_bits(selector: u32, count: usize) -> usize {
    let bits = CLC_LENGTH_TAB[selector as usize] as usize;
    if selector > 1 { bits * count } else { bits * count / 2 }
}

/// VLC 编码比特数, 超出码表范围时返回 `None`
pub fn vlc_bits(selector: u32, mantissas: &[i32]) -> Option<usize> {
    let table = huff_table(selector as usize);
    if selector > 1 {
        mantissas
            .iter()
            .map(|&m| table.get(huff_symbol(m)).map(|e| e.bits as usize))
            .sum()
    } else {
        mantissas
            .chunks(2)
            .map(|pair| {
                let b = pair.get(1).copied().unwrap_or(0);
                mantissas_to_vlc_index(pair[0], b).map(|i| table[i].bits as usize)
            })
            .sum()
    }
}

/// CLC 写出
pub fn write_clc(selector: u32, mantissas: &[i32], bw: &mut BitWriter) -> AtracResult<()> {
    let bits = CLC_LENGTH_TAB[selector as usize];
    if selector > 1 {
        for &m in mantissas {
            bw.write_bits_signed(m, bits);
        }
        return Ok(());
    }
    for pair in mantissas.chunks(2) {
        let b = pair.get(1).copied().unwrap_or(0);
        let (Some(hi), Some(lo)) = (mantissa_to_clc_idx(pair[0]), mantissa_to_clc_idx(b)) else {
            return Err(AtracError::Internal(format!("CLC 尾数越界: {:?}", pair)));
        };
        bw.write_bits((hi << 2) | lo, bits);
    }
    Ok(())
}

/// VLC 写出
pub fn write_vlc(selector: u32, mantissas: &[i32], bw: &mut BitWriter) -> AtracResult<()> {
    let table = huff_table(selector as usize);
    let out_of_range = || AtracError::Internal(format!("VLC 尾数超出码表 (选择子 {})", selector));
    if selector > 1 {
        for &m in mantissas {
            let e = table.get(huff_symbol(m)).ok_or_else(out_of_range)?;
            bw.write_bits(e.code, e.bits);
        }
        return Ok(());
    }
    for pair in mantissas.chunks(2) {
        let b = pair.get(1).copied().unwrap_or(0);
        let idx = mantissas_to_vlc_index(pair[0], b).ok_or_else(out_of_range)?;
        bw.write_bits(table[idx].code, table[idx].bits);
    }
    Ok(())
}

/// 频谱部分的编码决策
#[derive(Debug, Clone, PartialEq)]
pub struct SpecsCoding {
    /// 每 BFU 的量化选择子
    pub selectors: Vec<u32>,
    /// 每 BFU 的尾数 (选择子为 0 时为空)
    pub mantissas: Vec<Vec<i32>>,
    /// true 为 CLC
    pub clc: bool,
    /// 频谱部分总比特 (含 BFU 数、模式与选择子字段)
    pub bits: usize,
}

impl SpecsCoding {
    /// 量化并选择更省的编码模式
    pub fn new(blocks: &[ScaledBlock], selectors: &[u32]) -> Self {
        let mut clc_total = 0usize;
        let mut vlc_total = Some(0usize);
        let mut mantissas = Vec::with_capacity(selectors.len());
        for (block, &sel) in blocks.iter().zip(selectors) {
            if sel == 0 {
                mantissas.push(Vec::new());
                continue;
            }
            let m = quantize(&block.values, sel);
            clc_total += 6 + clc_bits(sel, m.len());
            vlc_total = vlc_total.zip(vlc_bits(sel, &m)).map(|(t, b)| t + 6 + b);
            mantissas.push(m);
        }
        let (clc, spec_bits) = match vlc_total {
            Some(vlc) if vlc < clc_total => (false, vlc),
            _ => (true, clc_total),
        };
        Self {
            selectors: selectors.to_vec(),
            mantissas,
            clc,
            bits: 5 + 1 + 3 * selectors.len() + spec_bits,
        }
    }

    pub fn write(&self, blocks: &[ScaledBlock], bw: &mut BitWriter) -> AtracResult<()> {
        let num_bfu = self.selectors.len();
        if num_bfu == 0 || num_bfu > Atrac3Data::MAX_BFUS {
            return Err(AtracError::Internal(format!("BFU 数越界: {}", num_bfu)));
        }
        bw.write_bits(num_bfu as u32 - 1, 5);
        bw.write_bits(self.clc as u32, 1);
        for &sel in &self.selectors {
            bw.write_bits(sel, 3);
        }
        for (block, &sel) in blocks.iter().zip(&self.selectors) {
            if sel != 0 {
                bw.write_bits(block.scale_factor_index as u32, 6);
            }
        }
        for (m, &sel) in self.mantissas.iter().zip(&self.selectors) {
            if sel == 0 {
                continue;
            }
            if self.clc {
                write_clc(sel, m, bw)?;
            } else {
                write_vlc(sel, m, bw)?;
            }
        }
        Ok(())
    }
}

/// 增益控制数据的比特数
pub fn gain_bits(gain_points: &[Vec<GainPoint>]) -> usize {
    (0..CODED_QMF_BANDS)
        .map(|band| 3 + gain_points.get(band).map_or(0, |p| p.len() * 9))
        .sum()
}

/// 校验增益控制点
pub fn validate_gain_points(gain_points: &[Vec<GainPoint>]) -> AtracResult<()> {
    if gain_points.len() > CODED_QMF_BANDS {
        return Err(AtracError::InvalidArgument(format!(
            "增益控制频带数 {} 超过 {}",
            gain_points.len(),
            CODED_QMF_BANDS
        )));
    }
    for points in gain_points {
        if points.len() > MAX_GAIN_POINTS {
            return Err(AtracError::InvalidArgument(format!("增益控制点过多: {}", points.len())));
        }
        if points.iter().any(|p| p.level > 15 || p.location > 31) {
            return Err(AtracError::InvalidArgument("增益控制点越界".into()));
        }
    }
    Ok(())
}

/// 按 shift 计算前 `num_bfu` 个块的量化选择子
pub fn calc_bits_allocation(
    blocks: &[ScaledBlock],
    num_bfu: usize,
    spread: f32,
    shift: f32,
    ath: &[f32],
    loudness: f32,
) -> Vec<u32> {
    (0..num_bfu)
        .map(|i| {
            if blocks[i].max_energy < ath[i] * loudness {
                return 0;
            }
            clamp_selector(blend_word_len(
                spread,
                blocks[i].scale_factor_index,
                FIXED_BIT_ALLOC_TABLE[i],
                shift,
            ))
        })
        .collect()
}

/// 把混合公式结果钳位为量化选择子, 0 提升为 1
pub(crate) fn clamp_selector(t: i32) -> u32 {
    match t {
        t if t > MAX_SELECTOR as i32 => MAX_SELECTOR,
        t if t < 0 => 0,
        0 => 1,
        t => t as u32,
    }
}

/// 单声道分配输入
pub struct AllocInput<'a> {
    pub blocks: &'a [ScaledBlock],
    pub spread: f32,
    pub ath: &'a [f32],
    pub loudness: f32,
    /// 固定 BFU 数, `None` 时按尾部零块缩减
    pub bfu_const: Option<usize>,
}

/// 在预算内求频谱部分的编码决策
///
/// 外层循环缩减 BFU 数, 内层对分 shift.
pub fn allocate(input: &AllocInput<'_>, target_bits: usize) -> SpecsCoding {
    let mut num_bfu = input
        .bfu_const
        .unwrap_or_else(|| Atrac3Data::MAX_BFUS.min(target_bits.saturating_sub(6) / 3))
        .clamp(1, Atrac3Data::MAX_BFUS);

    loop {
        let mut best = None;
        let alloc = search_shift(target_bits, 0, num_bfu, |shift| {
            let selectors =
                calc_bits_allocation(input.blocks, num_bfu, input.spread, shift, input.ath, input.loudness);
            let coding = SpecsCoding::new(input.blocks, &selectors);
            let bits = coding.bits;
            best = Some(coding);
            Allocation {
                word_lens: selectors,
                bits,
            }
        });

        let coding = match best {
            Some(c) if c.selectors == alloc.word_lens => c,
            _ => SpecsCoding::new(input.blocks, &alloc.word_lens),
        };

        let used = coding
            .selectors
            .iter()
            .rposition(|&s| s != 0)
            .map_or(1, |p| p + 1);
        if input.bfu_const.is_some() || used >= num_bfu {
            debug!("ATRAC3 分配: bfu={}, bits={}/{}", num_bfu, coding.bits, target_bits);
            return coding;
        }
        num_bfu = used;
    }
}

/// 写出一个声音单元
pub fn write_sound_unit(
    gain_points: &[Vec<GainPoint>],
    tonal: &TonalGroups,
    blocks: &[ScaledBlock],
    coding: &SpecsCoding,
    bw: &mut BitWriter,
) -> AtracResult<()> {
    bw.write_bits(SOUND_UNIT_ID, 6);
    bw.write_bits(CODED_QMF_BANDS as u32 - 1, 2);

    for band in 0..CODED_QMF_BANDS {
        let points = gain_points.get(band).map_or(&[][..], |p| p.as_slice());
        bw.write_bits(points.len() as u32, 3);
        for p in points {
            bw.write_bits(p.level as u32, 4);
            bw.write_bits(p.location as u32, 5);
        }
    }

    tonal.write(bw)?;
    coding.write(blocks, bw)
}
