//! ATRAC1 常量.
//!
//! 一帧 512 条频谱线, 分为低 (0-128)、中 (128-256)、高 (256-512) 三个 QMF 频带,
//! 共 52 个 BFU. 每声道一个 212 字节的声音单元.

use std::sync::OnceLock;

use super::{CodecData, NUM_SCALE_FACTORS, build_pow2_scale_table};

/// ATRAC1 块布局
#[derive(Debug, Clone, Copy)]
pub struct Atrac1Data;

/// 声音单元字节数
pub const SOUND_UNIT_SIZE: usize = 212;
/// BFU 数表索引位数
pub const BITS_PER_BFU_AMOUNT_TAB_IDX: u32 = 3;
/// 字长字段位数
pub const BITS_PER_IDWL: u32 = 4;
/// 缩放因子索引位数
pub const BITS_PER_IDSF: u32 = 6;
/// 可选的 BFU 数
pub const BFU_AMOUNT_TAB: [usize; 8] = [20, 28, 32, 36, 40, 44, 48, 52];
/// 单块最大字长
pub const MAX_WORD_LEN: u32 = 16;
/// 各频带短窗 log2 数量的上限 (低, 中, 高)
pub const MAX_LOG_COUNT: [u8; 3] = [2, 2, 3];

const SPECS_PER_BLOCK: [usize; 52] = [
    8, 8, 8, 8, 4, 4, 4, 4, 8, 8, 8, 8, 6, 6, 6, 6, 6, 6, 6, 6, //
    6, 6, 6, 6, 7, 7, 7, 7, 9, 9, 9, 9, 10, 10, 10, 10, //
    12, 12, 12, 12, 12, 12, 12, 12, 20, 20, 20, 20, 20, 20, 20, 20,
];

const BLOCKS_PER_BAND: [usize; 4] = [0, 20, 36, 52];

const SPECS_START_LONG: [usize; 52] = [
    0, 8, 16, 24, 32, 36, 40, 44, 48, 56, 64, 72, 80, 86, 92, 98, 104, 110, 116, 122, //
    128, 134, 140, 146, 152, 159, 166, 173, 180, 189, 198, 207, 216, 226, 236, 246, //
    256, 268, 280, 292, 304, 316, 328, 340, 352, 372, 392, 412, 432, 452, 472, 492,
];

const SPECS_START_SHORT: [usize; 52] = [
    0, 32, 64, 96, 8, 40, 72, 104, 12, 44, 76, 108, 20, 52, 84, 116, 26, 58, 90, 122, //
    128, 160, 192, 224, 134, 166, 198, 230, 141, 173, 205, 237, 150, 182, 214, 246, //
    256, 288, 320, 352, 384, 416, 448, 480, 268, 300, 332, 364, 396, 428, 460, 492,
];

impl CodecData for Atrac1Data {
    const NUM_SAMPLES: usize = 512;
    const NUM_QMF: usize = 3;
    const MAX_BFUS: usize = 52;
    const SPECS_PER_BLOCK: &'static [usize] = &SPECS_PER_BLOCK;
    const BLOCKS_PER_BAND: &'static [usize] = &BLOCKS_PER_BAND;
    const SPECS_START_LONG: &'static [usize] = &SPECS_START_LONG;
    const SPECS_START_SHORT: &'static [usize] = &SPECS_START_SHORT;

    fn scale_table() -> &'static [f32; NUM_SCALE_FACTORS] {
        static TABLE: OnceLock<[f32; NUM_SCALE_FACTORS]> = OnceLock::new();
        TABLE.get_or_init(build_pow2_scale_table)
    }
}

/// 字长 `wl` 下尾数的最大量化值 `(1 << (wl - 1)) - 1`
pub fn mantissa_multiplier(word_len: u32) -> f32 {
    if word_len < 2 {
        return 0.0;
    }
    ((1u32 << (word_len - 1)) - 1) as f32
}

/// 码流中的字长字段还原为实际字长 (0 表示不传输, 其余为字段值 + 1)
pub fn word_len_from_field(field: u32) -> u32 {
    if field == 0 { 0 } else { field + 1 }
}

/// 实际字长写入码流时的字段值
pub fn word_len_to_field(word_len: u32) -> u32 {
    word_len.saturating_sub(1)
}
