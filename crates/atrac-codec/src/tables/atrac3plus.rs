//! ATRAC3+ 常量与变长码表.
//!
//! 一帧 2048 条频谱线, 16 个 128 线子带, 最多 32 个量化单元 (QU).

use std::sync::OnceLock;

use atrac_core::{AtracError, AtracResult};

use super::{CodecData, NUM_SCALE_FACTORS};

/// ATRAC3+ 块布局
#[derive(Debug, Clone, Copy)]
pub struct Atrac3PlusData;

/// 量化单元的频谱起点 (33 项, 最后一项为 2048)
pub const QU_TO_SPEC_POS: [usize; 33] = [
    0, 16, 32, 48, 64, 80, 96, 112, //
    128, 160, 192, 224, 256, 288, 320, 352, //
    384, 448, 512, 576, 640, 704, 768, 896, //
    1024, 1152, 1280, 1408, 1536, 1664, 1792, 1920, //
    2048,
];

const SPECS_PER_BLOCK: [usize; 32] = {
    let mut out = [0usize; 32];
    let mut i = 0;
    while i < 32 {
        out[i] = QU_TO_SPEC_POS[i + 1] - QU_TO_SPEC_POS[i];
        i += 1;
    }
    out
};

const SPECS_START: [usize; 32] = {
    let mut out = [0usize; 32];
    let mut i = 0;
    while i < 32 {
        out[i] = QU_TO_SPEC_POS[i];
        i += 1;
    }
    out
};

/// 各 128 线子带的首个量化单元
const BLOCKS_PER_BAND: [usize; 17] = [0, 8, 12, 16, 18, 20, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32];

/// 量化单元数字段允许的最大值 (29-31 为保留值)
pub const MAX_CODED_QUANT_UNITS: usize = 28;

/// 各字长对应的 CLC 位宽
pub const CLC_BITS: [u32; 8] = [0, 2, 3, 3, 4, 4, 5, 6];

/// 最大音调频带数
pub const MAX_TONE_BANDS: usize = 16;

impl CodecData for Atrac3PlusData {
    const NUM_SAMPLES: usize = 2048;
    const NUM_QMF: usize = 16;
    const MAX_BFUS: usize = 32;
    const SPECS_PER_BLOCK: &'static [usize] = &SPECS_PER_BLOCK;
    const BLOCKS_PER_BAND: &'static [usize] = &BLOCKS_PER_BAND;
    const SPECS_START_LONG: &'static [usize] = &SPECS_START;
    const SPECS_START_SHORT: &'static [usize] = &SPECS_START;

    /// 以 16 位 PCM 刻度的 `2^((i - 15.5) / 3)` 归一化到单位幅度
    fn scale_table() -> &'static [f32; NUM_SCALE_FACTORS] {
        static TABLE: OnceLock<[f32; NUM_SCALE_FACTORS]> = OnceLock::new();
        TABLE.get_or_init(|| {
            let mut table = [0.0f32; NUM_SCALE_FACTORS];
            for (i, v) in table.iter_mut().enumerate() {
                *v = (2.0f64.powf((i as f64 - 15.5) / 3.0) / 32768.0) as f32;
            }
            table
        })
    }
}

/// 量化单元数写入码流时的合法值: 1..=28 或 32
pub fn coded_quant_units(used: usize) -> usize {
    if used > MAX_CODED_QUANT_UNITS {
        Atrac3PlusData::MAX_BFUS
    } else {
        used.max(1)
    }
}

/// 变长码字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VlcElement {
    pub code: u16,
    pub len: u8,
}

const fn v(code: u16, len: u8) -> Option<VlcElement> {
    Some(VlcElement { code, len })
}

/// 字长差值 (模 8) 的 4 张变长码表, `None` 表示该表无法编码此值
pub const WORD_LEN_VLC: [[Option<VlcElement>; 8]; 4] = [
    [v(0, 1), v(0b10, 2), None, None, None, None, None, v(0b11, 2)],
    [v(0, 1), v(4, 3), v(5, 3), None, None, None, v(6, 3), v(7, 3)],
    [v(0, 1), v(4, 3), v(0xC, 4), v(0x1E, 5), v(0x1F, 5), v(0xD, 4), v(0xE, 4), v(5, 3)],
    [v(0, 1), v(4, 3), v(0xC, 4), v(0xD, 4), v(0x1E, 5), v(0x1F, 5), v(0xE, 4), v(5, 3)],
];

/// 音调频带数码表: 各码长 (1-12 位) 的码字数
const TONE_BANDS_CBS: [u8; 12] = [0, 1, 2, 3, 6, 4, 0, 0, 0, 0, 0, 0];

/// 音调频带数码表: 按码字顺序排列的符号 (频带数 - 1)
const TONE_BANDS_XLAT: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// 由码长分布与符号表生成规范 Huffman 编码表
///
/// 符号超出 `out_len` 说明表数据有误, 返回内部错误.
pub fn gen_huffman_enc_table(cbs: &[u8], xlat: &[u8], out_len: usize) -> AtracResult<Vec<VlcElement>> {
    let mut out = vec![VlcElement::default(); out_len];
    let mut index = 0usize;
    let mut code: u16 = 0;
    for (b, &count) in cbs.iter().enumerate() {
        for _ in 0..count {
            let val = *xlat.get(index).ok_or_else(|| {
                AtracError::Internal(format!("Huffman 符号表长度不足: index={}", index))
            })? as usize;
            let slot = out.get_mut(val).ok_or_else(|| {
                AtracError::Internal(format!("Huffman 符号越界: {} >= {}", val, out_len))
            })?;
            *slot = VlcElement {
                code,
                len: (b + 1) as u8,
            };
            index += 1;
            code += 1;
        }
        code <<= 1;
    }
    Ok(out)
}

/// 音调频带数的编码表 (进程内只生成一次)
pub fn num_tone_bands_table() -> AtracResult<&'static [VlcElement]> {
    static TABLE: OnceLock<Result<Vec<VlcElement>, String>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            gen_huffman_enc_table(&TONE_BANDS_CBS, &TONE_BANDS_XLAT, MAX_TONE_BANDS)
                .map_err(|e| e.to_string())
        })
        .as_deref()
        .map_err(|e| AtracError::Internal(e.clone()))
}
