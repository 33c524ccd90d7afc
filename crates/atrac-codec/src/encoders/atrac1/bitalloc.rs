//! ATRAC1 比特分配与声音单元序列化.
//!
//! 流水线只有两个阶段: `Configure` 按当前 BFU 数设定预算,
//! `BfuAlloc` 对分 shift 求字长, 必要时缩减 BFU 数, 最后用
//! `BitsBooster` 把剩余比特补给中频块.

use std::sync::OnceLock;

use atrac_core::{AtracError, AtracResult, BitWriter};
use log::debug;

use crate::bitalloc::{MAX_SHIFT, MIN_SHIFT, blend_word_len, mantissa_bits, trim_to_budget};
use crate::bs_encode::{BitAllocHandler, BitStreamPartEncoder, EncodeStatus};
use crate::frame::BlockSizeMode;
use crate::psy::block_ath;
use crate::scale::ScaledBlock;
use crate::tables::atrac1::{
    BFU_AMOUNT_TAB, BITS_PER_BFU_AMOUNT_TAB_IDX, BITS_PER_IDSF, BITS_PER_IDWL, MAX_LOG_COUNT, MAX_WORD_LEN,
    SOUND_UNIT_SIZE, mantissa_multiplier, word_len_to_field,
};
use crate::tables::{Atrac1Data, CodecData};

/// 声音单元总比特数
pub const SOUND_UNIT_BITS: usize = SOUND_UNIT_SIZE * 8;

/// 消耗低于预算不超过此值时直接接受
const ACCEPT_SLACK: usize = 110;

/// 声音单元头部比特 (窗长 6 + 保留 2 + BFU 数 3 + 保留 5)
const HEADER_BITS: usize = 16;
/// 声音单元尾部保留比特
const TRAILER_BITS: usize = 24;

const FIXED_BIT_ALLOC_TABLE_LONG: [f32; 52] = [
    7.0, 7.0, 7.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, //
    6.0, 6.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 4.0, //
    4.0, 4.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 2.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0,
];

const FIXED_BIT_ALLOC_TABLE_SHORT: [f32; 52] = [
    6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, //
    6.0, 6.0, 6.0, 6.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, //
    4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// 可以追加比特的块
const BIT_BOOST_MASK: [bool; 52] = {
    let mut mask = [false; 52];
    let mut i = 18;
    while i <= 22 {
        mask[i] = true;
        i += 1;
    }
    i = 32;
    while i <= 38 {
        mask[i] = true;
        i += 1;
    }
    mask
};

/// 除字长/缩放因子外可用于尾数的比特数
pub fn available_bits_for_bfus(bfu_num: usize) -> usize {
    SOUND_UNIT_BITS
        - BITS_PER_BFU_AMOUNT_TAB_IDX as usize
        - 32
        - 2
        - 3
        - bfu_num * (BITS_PER_IDWL + BITS_PER_IDSF) as usize
}

fn ath_long() -> &'static [f32] {
    static ATH: OnceLock<Vec<f32>> = OnceLock::new();
    ATH.get_or_init(|| block_ath::<Atrac1Data>(crate::codec_parameters::SAMPLE_RATE))
}

/// 按 shift 计算前 `bfu_num` 个块的字长
pub fn calc_bits_allocation(
    blocks: &[ScaledBlock],
    bfu_num: usize,
    spread: f32,
    shift: f32,
    block_size: &BlockSizeMode,
    loudness: f32,
) -> Vec<u32> {
    let ath = ath_long();
    (0..bfu_num)
        .map(|i| {
            let short = block_size.is_short(Atrac1Data::bfu_to_band(i));
            let fixed = if short {
                FIXED_BIT_ALLOC_TABLE_SHORT[i]
            } else {
                FIXED_BIT_ALLOC_TABLE_LONG[i]
            };
            if !short && blocks[i].max_energy < ath[i] * loudness {
                return 0;
            }
            match blend_word_len(spread, blocks[i].scale_factor_index, fixed, shift) {
                t if t > MAX_WORD_LEN as i32 => MAX_WORD_LEN,
                t if t < 2 => 0,
                t => t as u32,
            }
        })
        .collect()
}

/// 仍有非零字长的最高 BFU 数表索引
///
/// 最低档 (20 个 BFU) 即使全为零也不再缩减.
pub fn max_used_bfu_idx(word_lens: &[u32]) -> usize {
    let mut idx = BFU_AMOUNT_TAB
        .iter()
        .rposition(|&n| n <= word_lens.len())
        .unwrap_or(0);
    while idx > 0 {
        let tier = &word_lens[BFU_AMOUNT_TAB[idx - 1]..BFU_AMOUNT_TAB[idx]];
        if tier.iter().any(|&wl| wl != 0) {
            break;
        }
        idx -= 1;
    }
    idx
}

/// 剩余比特再分配
///
/// 按每块频谱线数 (即每加 1 位字长的代价) 从小到大, 对可提升的块逐个
/// 加 1 位 (字长为 0 时一次加 2 位), 直到剩余比特不够任何一块.
#[derive(Debug, Clone)]
pub struct BitsBooster {
    /// (频谱线数, 块索引), 按频谱线数稳定排序
    boost_map: Vec<(usize, usize)>,
    max_bits_per_iteration: usize,
    min_key: usize,
}

impl BitsBooster {
    pub fn new() -> Self {
        let mut boost_map: Vec<(usize, usize)> = (0..Atrac1Data::MAX_BFUS)
            .filter(|&i| BIT_BOOST_MASK[i])
            .map(|i| (Atrac1Data::SPECS_PER_BLOCK[i], i))
            .collect();
        boost_map.sort_by_key(|&(n, _)| n);
        let max_bits_per_iteration = boost_map.last().map_or(0, |&(n, _)| n);
        let min_key = boost_map.first().map_or(0, |&(n, _)| n);
        Self {
            boost_map,
            max_bits_per_iteration,
            min_key,
        }
    }

    /// 返回分配后仍剩余的比特
    pub fn apply_boost(&self, word_lens: &mut [u32], cur: usize, target: usize) -> usize {
        let mut surplus = target.saturating_sub(cur);
        let key = surplus.min(self.max_bits_per_iteration);
        let candidates = self.boost_map.partition_point(|&(n, _)| n <= key);
        if candidates == 0 {
            return surplus;
        }

        while surplus >= self.min_key {
            let mut done = true;
            for &(cost, pos) in &self.boost_map[..candidates] {
                let Some(wl) = word_lens.get_mut(pos) else {
                    continue;
                };
                if *wl == MAX_WORD_LEN {
                    continue;
                }
                let step = if *wl == 0 { 2 } else { 1 };
                if cost * step as usize > surplus {
                    continue;
                }
                *wl += step;
                surplus -= cost * step as usize;
                done = false;
            }
            if done {
                break;
            }
        }
        surplus
    }
}

impl Default for BitsBooster {
    fn default() -> Self {
        Self::new()
    }
}

/// 单声道一帧的编码上下文
#[derive(Debug, Clone)]
pub struct Atrac1Frame {
    pub scaled_blocks: Vec<ScaledBlock>,
    pub block_size: BlockSizeMode,
    /// 相对响度 (`loudness / LOUD_FACTOR`)
    pub loudness: f32,
    /// 当前 BFU 数表索引
    pub bfu_idx: usize,
    pub spread: f32,
    /// 当前 BFU 数下的预算
    pub available_bits: usize,
}

/// 按 BFU 数设定预算
struct Configure;

impl BitStreamPartEncoder<Atrac1Frame> for Configure {
    fn encode(&mut self, frame: &mut Atrac1Frame, handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        let bfu_num = BFU_AMOUNT_TAB
            .get(frame.bfu_idx)
            .copied()
            .ok_or_else(|| AtracError::Internal(format!("BFU 数表索引越界: {}", frame.bfu_idx)))?;
        frame.available_bits = available_bits_for_bfus(bfu_num);
        handler.start(frame.available_bits, MIN_SHIFT, MAX_SHIFT);
        Ok(EncodeStatus::Ok)
    }

    fn dump(&self, _frame: &Atrac1Frame, _bw: &mut BitWriter) -> AtracResult<()> {
        Ok(())
    }

    fn consumption(&self) -> usize {
        0
    }
}

/// 字长搜索与声音单元写出
struct BfuAlloc {
    auto_bfu: bool,
    fast_bfu_num_search: bool,
    booster: BitsBooster,
    word_lens: Vec<u32>,
}

impl BitStreamPartEncoder<Atrac1Frame> for BfuAlloc {
    fn encode(&mut self, frame: &mut Atrac1Frame, handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        let shift = handler.continue_search();
        let bfu_num = BFU_AMOUNT_TAB[frame.bfu_idx];
        let mut alloc = calc_bits_allocation(
            &frame.scaled_blocks,
            bfu_num,
            frame.spread,
            shift,
            &frame.block_size,
            frame.loudness,
        );
        let mut bits_used = mantissa_bits(&alloc, Atrac1Data::SPECS_PER_BLOCK);
        let target = handler.target_bits();

        let in_window = bits_used <= target && bits_used + ACCEPT_SLACK >= target;
        if !in_window && !handler.submit(bits_used) {
            return Ok(EncodeStatus::Ok);
        }
        if bits_used > target {
            // 最省的 shift 仍超预算
            let trimmed = trim_to_budget(&mut alloc, Atrac1Data::SPECS_PER_BLOCK, target);
            debug!("ATRAC1 分配超预算 {} > {}, 截去高频块后 {}", bits_used, target, trimmed);
            bits_used = trimmed;
        }

        if self.auto_bfu {
            let used = max_used_bfu_idx(&alloc);
            if used < frame.bfu_idx {
                frame.bfu_idx = if self.fast_bfu_num_search {
                    used
                } else {
                    frame.bfu_idx - 1
                };
                debug!("BFU 数缩减到 {}", BFU_AMOUNT_TAB[frame.bfu_idx]);
                return Ok(EncodeStatus::Repeat);
            }
        }

        self.word_lens = alloc;
        let surplus = self
            .booster
            .apply_boost(&mut self.word_lens, bits_used, frame.available_bits);
        debug!(
            "ATRAC1 分配完成: shift={:.3}, bfu={}, bits={}, 剩余={}",
            shift, bfu_num, bits_used, surplus
        );
        Ok(EncodeStatus::Ok)
    }

    fn dump(&self, frame: &Atrac1Frame, bw: &mut BitWriter) -> AtracResult<()> {
        let start = bw.bits_written();

        for (band, &max) in MAX_LOG_COUNT.iter().enumerate() {
            let log_count = frame.block_size.log_count[band];
            if log_count > max {
                return Err(AtracError::Internal(format!("频带 {} 的短窗数 {} 越界", band, log_count)));
            }
            bw.write_bits((max - log_count) as u32, 2);
        }
        bw.write_bits(0, 2);
        bw.write_bits(frame.bfu_idx as u32, BITS_PER_BFU_AMOUNT_TAB_IDX);
        bw.write_bits(0, 2);
        bw.write_bits(0, 3);

        for &wl in &self.word_lens {
            bw.write_bits(word_len_to_field(wl), BITS_PER_IDWL);
        }
        for block in &frame.scaled_blocks[..self.word_lens.len()] {
            bw.write_bits(block.scale_factor_index as u32, BITS_PER_IDSF);
        }
        for (block, &wl) in frame.scaled_blocks.iter().zip(&self.word_lens) {
            if wl < 2 {
                continue;
            }
            let multiplier = mantissa_multiplier(wl);
            for &v in &block.values {
                bw.write_bits_signed((v * multiplier).round() as i32, wl);
            }
        }
        bw.write_zeros(TRAILER_BITS);

        let written = bw.bits_written() - start;
        if written > SOUND_UNIT_BITS {
            return Err(AtracError::Internal(format!(
                "声音单元溢出: {} > {} 比特",
                written, SOUND_UNIT_BITS
            )));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.word_lens.clear();
    }

    fn consumption(&self) -> usize {
        HEADER_BITS
            + self.word_lens.len() * (BITS_PER_IDWL + BITS_PER_IDSF) as usize
            + mantissa_bits(&self.word_lens, Atrac1Data::SPECS_PER_BLOCK)
            + TRAILER_BITS
    }
}

/// 创建 ATRAC1 流水线的阶段
pub(crate) fn create_stages(
    bfu_idx_const: Option<u8>,
    fast_bfu_num_search: bool,
) -> Vec<Box<dyn BitStreamPartEncoder<Atrac1Frame>>> {
    vec![
        Box::new(Configure),
        Box::new(BfuAlloc {
            auto_bfu: bfu_idx_const.is_none(),
            fast_bfu_num_search,
            booster: BitsBooster::new(),
            word_lens: Vec::new(),
        }),
    ]
}
