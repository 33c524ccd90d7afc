//! ATRAC3 常量与 Huffman 表.
//!
//! 一帧 1024 条频谱线, 4 个 QMF 频带, 最多 32 个 BFU.

use std::sync::OnceLock;

use super::{CodecData, NUM_SCALE_FACTORS, build_pow2_scale_table};

/// ATRAC3 块布局
#[derive(Debug, Clone, Copy)]
pub struct Atrac3Data;

/// 块边界表 (33 项, 最后一项为 1024)
pub const BLOCK_SIZE_TAB: [usize; 33] = [
    0, 8, 16, 24, 32, 40, 48, 56, //
    64, 80, 96, 112, 128, 144, 160, 176, //
    192, 224, 256, 288, 320, 352, 384, 416, //
    448, 480, 512, 576, 640, 704, 768, 896, //
    1024,
];

const SPECS_PER_BLOCK: [usize; 32] = [
    8, 8, 8, 8, 8, 8, 8, 8, //
    16, 16, 16, 16, 16, 16, 16, 16, //
    32, 32, 32, 32, 32, 32, 32, 32, //
    32, 32, 64, 64, 64, 64, 128, 128,
];

const SPECS_START: [usize; 32] = {
    let mut out = [0usize; 32];
    let mut i = 0;
    while i < 32 {
        out[i] = BLOCK_SIZE_TAB[i];
        i += 1;
    }
    out
};

const BLOCKS_PER_BAND: [usize; 5] = [0, 18, 26, 30, 32];

/// 各量化选择子 (0-7) 对应的最大量化值
pub const MAX_QUANT: [f32; 8] = [0.0, 1.5, 2.5, 3.5, 4.5, 7.5, 15.5, 31.5];

/// CLC 模式下各选择子的位宽 (选择子 1 为两个系数共用 4 位)
pub const CLC_LENGTH_TAB: [u32; 8] = [0, 4, 3, 3, 4, 4, 5, 6];

/// 声音单元标识
pub const SOUND_UNIT_ID: u32 = 0x28;

/// 单个 QMF 频带的最大增益控制点数
pub const MAX_GAIN_POINTS: usize = 7;

impl CodecData for Atrac3Data {
    const NUM_SAMPLES: usize = 1024;
    const NUM_QMF: usize = 4;
    const MAX_BFUS: usize = 32;
    const SPECS_PER_BLOCK: &'static [usize] = &SPECS_PER_BLOCK;
    const BLOCKS_PER_BAND: &'static [usize] = &BLOCKS_PER_BAND;
    const SPECS_START_LONG: &'static [usize] = &SPECS_START;
    const SPECS_START_SHORT: &'static [usize] = &SPECS_START;

    fn scale_table() -> &'static [f32; NUM_SCALE_FACTORS] {
        static TABLE: OnceLock<[f32; NUM_SCALE_FACTORS]> = OnceLock::new();
        TABLE.get_or_init(build_pow2_scale_table)
    }
}

/// Huffman 码字
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HuffEntry {
    pub code: u32,
    pub bits: u32,
}

const fn h(code: u32, bits: u32) -> HuffEntry {
    HuffEntry { code, bits }
}

/// 选择子 1 (成对编码) 与选择子 4 共用
const HUFF_TABLE_1: [HuffEntry; 9] = [
    h(0x0, 1),
    h(0x4, 3),
    h(0x5, 3),
    h(0xC, 4),
    h(0xD, 4),
    h(0x1C, 5),
    h(0x1D, 5),
    h(0x1E, 5),
    h(0x1F, 5),
];

const HUFF_TABLE_2: [HuffEntry; 5] = [h(0x0, 1), h(0x4, 3), h(0x5, 3), h(0x6, 3), h(0x7, 3)];

const HUFF_TABLE_3: [HuffEntry; 7] = [
    h(0x0, 1),
    h(0x4, 3),
    h(0x5, 3),
    h(0xC, 4),
    h(0xD, 4),
    h(0xE, 4),
    h(0xF, 4),
];

const HUFF_TABLE_5: [HuffEntry; 15] = [
    h(0x0, 2),
    h(0x2, 3),
    h(0x3, 3),
    h(0x8, 4),
    h(0x9, 4),
    h(0xA, 4),
    h(0xB, 4),
    h(0x1C, 5),
    h(0x1D, 5),
    h(0x3C, 6),
    h(0x3D, 6),
    h(0x3E, 6),
    h(0x3F, 6),
    h(0xC, 4),
    h(0xD, 4),
];

const HUFF_TABLE_6: [HuffEntry; 31] = [
    h(0x0, 3),
    h(0x2, 4),
    h(0x3, 4),
    h(0x4, 4),
    h(0x5, 4),
    h(0x6, 4),
    h(0x7, 4),
    h(0x14, 5),
    h(0x15, 5),
    h(0x16, 5),
    h(0x17, 5),
    h(0x18, 5),
    h(0x19, 5),
    h(0x34, 6),
    h(0x35, 6),
    h(0x36, 6),
    h(0x37, 6),
    h(0x38, 6),
    h(0x39, 6),
    h(0x3A, 6),
    h(0x3B, 6),
    h(0x78, 7),
    h(0x79, 7),
    h(0x7A, 7),
    h(0x7B, 7),
    h(0x7C, 7),
    h(0x7D, 7),
    h(0x7E, 7),
    h(0x7F, 7),
    h(0x8, 4),
    h(0x9, 4),
];

const HUFF_TABLE_7: [HuffEntry; 63] = [
    h(0x0, 3),
    h(0x8, 5),
    h(0x9, 5),
    h(0xA, 5),
    h(0xB, 5),
    h(0xC, 5),
    h(0xD, 5),
    h(0xE, 5),
    h(0xF, 5),
    h(0x10, 5),
    h(0x11, 5),
    h(0x24, 6),
    h(0x25, 6),
    h(0x26, 6),
    h(0x27, 6),
    h(0x28, 6),
    h(0x29, 6),
    h(0x2A, 6),
    h(0x2B, 6),
    h(0x2C, 6),
    h(0x2D, 6),
    h(0x2E, 6),
    h(0x2F, 6),
    h(0x30, 6),
    h(0x31, 6),
    h(0x32, 6),
    h(0x33, 6),
    h(0x68, 7),
    h(0x69, 7),
    h(0x6A, 7),
    h(0x6B, 7),
    h(0x6C, 7),
    h(0x6D, 7),
    h(0x6E, 7),
    h(0x6F, 7),
    h(0x70, 7),
    h(0x71, 7),
    h(0x72, 7),
    h(0x73, 7),
    h(0x74, 7),
    h(0x75, 7),
    h(0xEC, 8),
    h(0xED, 8),
    h(0xEE, 8),
    h(0xEF, 8),
    h(0xF0, 8),
    h(0xF1, 8),
    h(0xF2, 8),
    h(0xF3, 8),
    h(0xF4, 8),
    h(0xF5, 8),
    h(0xF6, 8),
    h(0xF7, 8),
    h(0xF8, 8),
    h(0xF9, 8),
    h(0xFA, 8),
    h(0xFB, 8),
    h(0xFC, 8),
    h(0xFD, 8),
    h(0xFE, 8),
    h(0xFF, 8),
    h(0x2, 4),
    h(0x3, 4),
];

/// 按量化选择子 (1-7) 取 Huffman 表
pub fn huff_table(selector: usize) -> &'static [HuffEntry] {
    match selector {
        1 | 4 => &HUFF_TABLE_1,
        2 => &HUFF_TABLE_2,
        3 => &HUFF_TABLE_3,
        5 => &HUFF_TABLE_5,
        6 => &HUFF_TABLE_6,
        _ => &HUFF_TABLE_7,
    }
}

/// 单个系数在 Huffman 表中的索引
///
/// 正数映射为 `2m - 1`, 负数映射为 `2|m|`, 0 映射为 0.
pub fn huff_symbol(mantissa: i32) -> usize {
    let s = if mantissa < 0 {
        ((mantissa.unsigned_abs() as usize) << 1) | 1
    } else {
        (mantissa as usize) << 1
    };
    s.saturating_sub(1)
}

/// 选择子 1 的 CLC 模式: 单个系数 (-2..=1) 的 2 位码
pub fn mantissa_to_clc_idx(mantissa: i32) -> Option<u32> {
    const RTAB: [u32; 4] = [2, 3, 0, 1];
    usize::try_from(mantissa + 2)
        .ok()
        .and_then(|i| RTAB.get(i).copied())
}

/// 选择子 1 的 VLC 模式: 一对系数 (各为 -1..=1) 的 Huffman 索引
pub fn mantissas_to_vlc_index(a: i32, b: i32) -> Option<usize> {
    const RTAB: [usize; 9] = [8, 4, 7, 2, 0, 1, 6, 3, 5];
    if !(-1..=1).contains(&a) || !(-1..=1).contains(&b) {
        return None;
    }
    Some(RTAB[(3 * (a + 1) + (b + 1)) as usize])
}

/// 容器码率档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerParams {
    /// 码率 (bits/s)
    pub bitrate: u32,
    /// 帧字节数 (两个声道合计)
    pub frame_size: usize,
    /// 是否为联合立体声档位
    pub joint_stereo: bool,
}

/// 按码率升序排列的档位表
pub const CONTAINER_PARAMS: [ContainerParams; 8] = [
    ContainerParams { bitrate: 66150, frame_size: 192, joint_stereo: true },
    ContainerParams { bitrate: 93713, frame_size: 272, joint_stereo: true },
    ContainerParams { bitrate: 104738, frame_size: 304, joint_stereo: false },
    ContainerParams { bitrate: 132300, frame_size: 384, joint_stereo: false },
    ContainerParams { bitrate: 146081, frame_size: 424, joint_stereo: false },
    ContainerParams { bitrate: 176400, frame_size: 512, joint_stereo: false },
    ContainerParams { bitrate: 264600, frame_size: 768, joint_stereo: false },
    ContainerParams { bitrate: 352800, frame_size: 1024, joint_stereo: false },
];

/// 取码率不低于 `bitrate` 的第一个档位
pub fn container_params_for_bitrate(bitrate: u32) -> Option<&'static ContainerParams> {
    let idx = CONTAINER_PARAMS.partition_point(|p| p.bitrate < bitrate);
    CONTAINER_PARAMS.get(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_prefix_free(table: &[HuffEntry]) -> bool {
        for (i, a) in table.iter().enumerate() {
            for (j, b) in table.iter().enumerate() {
                if i == j || a.bits > b.bits {
                    continue;
                }
                if b.code >> (b.bits - a.bits) == a.code {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn test_huff_tables_prefix_free() {
        for sel in 1..8 {
            assert!(is_prefix_free(huff_table(sel)), "选择子 {} 的码表非前缀码", sel);
        }
    }

    #[test]
    fn test_huff_symbol_fits_table() {
        for sel in 2..8 {
            let max = (MAX_QUANT[sel] * 0.99999).round() as i32;
            assert!(huff_symbol(max) < huff_table(sel).len());
            assert!(huff_symbol(-max) < huff_table(sel).len());
        }
        assert_eq!(huff_symbol(0), 0);
        assert_eq!(huff_symbol(1), 1);
        assert_eq!(huff_symbol(-1), 2);
    }

    #[test]
    fn test_mantissa_index_helpers() {
        assert_eq!(mantissa_to_clc_idx(-2), Some(2));
        assert_eq!(mantissa_to_clc_idx(1), Some(1));
        assert_eq!(mantissa_to_clc_idx(2), None);
        assert_eq!(mantissas_to_vlc_index(0, 0), Some(0));
        assert_eq!(mantissas_to_vlc_index(-1, -1), Some(8));
        assert_eq!(mantissas_to_vlc_index(2, 0), None);
    }

    #[test]
    fn test_container_lookup() {
        assert_eq!(container_params_for_bitrate(132300).map(|p| p.frame_size), Some(384));
        assert_eq!(container_params_for_bitrate(100000).map(|p| p.frame_size), Some(304));
        assert_eq!(container_params_for_bitrate(1).map(|p| p.frame_size), Some(192));
        assert!(container_params_for_bitrate(400000).is_none());
    }
}
