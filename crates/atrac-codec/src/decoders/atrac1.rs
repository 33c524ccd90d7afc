//! ATRAC1 反量化.
//!
//! 解析一个 212 字节的声音单元, 还原窗长模式与频谱.
//! 逆 MDCT 与 QMF 合成不在此处完成.

use atrac_core::{AtracError, AtracResult, BitReader};

use crate::frame::BlockSizeMode;
use crate::tables::atrac1::{
    BFU_AMOUNT_TAB, BITS_PER_BFU_AMOUNT_TAB_IDX, BITS_PER_IDSF, BITS_PER_IDWL, MAX_LOG_COUNT, SOUND_UNIT_SIZE,
    mantissa_multiplier, word_len_from_field,
};
use crate::tables::{Atrac1Data, CodecData};

/// 解出的一个声音单元
#[derive(Debug, Clone)]
pub struct DequantisedUnit {
    pub block_size: BlockSizeMode,
    /// BFU 数表索引
    pub bfu_idx: usize,
    /// 各 BFU 的字长 (未传输的 BFU 为 0)
    pub word_lens: Vec<u32>,
    /// 各 BFU 的缩放因子索引
    pub scale_factors: Vec<u8>,
    /// 512 条频谱
    pub specs: Vec<f32>,
}

/// ATRAC1 反量化器
#[derive(Debug, Clone, Copy, Default)]
pub struct Atrac1Dequantiser;

impl Atrac1Dequantiser {
    pub fn new() -> Self {
        Self
    }

    /// 解析声音单元
    pub fn dequantise(&self, data: &[u8]) -> AtracResult<DequantisedUnit> {
        if data.len() < SOUND_UNIT_SIZE {
            return Err(AtracError::InvalidData(format!(
                "声音单元过短: {} < {}",
                data.len(),
                SOUND_UNIT_SIZE
            )));
        }
        let mut br = BitReader::new(&data[..SOUND_UNIT_SIZE]);

        let mut block_size = BlockSizeMode::long();
        for (band, &max) in MAX_LOG_COUNT.iter().enumerate() {
            let field = br.read_bits(2)? as u8;
            block_size.log_count[band] = max.checked_sub(field).ok_or_else(|| {
                AtracError::InvalidData(format!("频带 {} 的窗长字段无效: {}", band, field))
            })?;
        }
        br.skip_bits(2)?;

        let bfu_idx = br.read_bits(BITS_PER_BFU_AMOUNT_TAB_IDX)? as usize;
        let bfu_num = BFU_AMOUNT_TAB[bfu_idx];
        br.skip_bits(2)?;
        br.skip_bits(3)?;

        let mut word_lens = vec![0u32; Atrac1Data::MAX_BFUS];
        for wl in &mut word_lens[..bfu_num] {
            *wl = word_len_from_field(br.read_bits(BITS_PER_IDWL)?);
        }
        let mut scale_factors = vec![0u8; Atrac1Data::MAX_BFUS];
        for sf in &mut scale_factors[..bfu_num] {
            *sf = br.read_bits(BITS_PER_IDSF)? as u8;
        }

        let table = Atrac1Data::scale_table();
        let mut specs = vec![0.0f32; Atrac1Data::NUM_SAMPLES];
        for band in 0..Atrac1Data::NUM_QMF {
            let starts = if block_size.is_short(band) {
                Atrac1Data::SPECS_START_SHORT
            } else {
                Atrac1Data::SPECS_START_LONG
            };
            for bfu in Atrac1Data::BLOCKS_PER_BAND[band]..Atrac1Data::BLOCKS_PER_BAND[band + 1] {
                let wl = word_lens[bfu];
                if wl == 0 {
                    continue;
                }
                let start = starts[bfu];
                let scale = table[scale_factors[bfu] as usize] / mantissa_multiplier(wl);
                for v in &mut specs[start..start + Atrac1Data::SPECS_PER_BLOCK[bfu]] {
                    *v = scale * br.read_bits_signed(wl)? as f32;
                }
            }
        }

        Ok(DequantisedUnit {
            block_size,
            bfu_idx,
            word_lens,
            scale_factors,
            specs,
        })
    }
}
