//! ATRAC3+ 码流阶段.
//!
//! 一帧只含一个声道单元:
//!
//! ```text
//! 1  起始位 0
//! 2  声道单元类型 (0 单声道, 1 立体声)
//!    Configure           无输出, 启动 lambda 搜索
//!    BfuAlloc            5 位 QU 数 - 1, 1 位静音标志
//!    WordLenEncoder      每声道字长
//!    SfIdxEncoder        每声道缩放因子
//!    CodeTabEncoder      每 QU 的频谱码表选择
//!    QuantUnitsEncoder   尾数
//!    StereoFlagsEncoder  交换/取反/窗形/增益标志
//!    TonalComponentEncoder
//!    Terminator          1 位噪声标志, 2 位终止符 3
//! ```
//!
//! 每个阶段先把 (值, 位宽) 缓存在 `BitBuf` 里, 所有阶段通过后统一写出.

use atrac_core::{AtracError, AtracResult, BitWriter};
use log::{debug, trace};

use crate::bitalloc::{MAX_SHIFT, MIN_SHIFT, blend_word_len};
use crate::bs_encode::{BitAllocHandler, BitStreamPartEncoder, EncodeStatus};
use crate::frame::ToneBand;
use crate::scale::ScaledBlock;
use crate::tables::atrac3::{MAX_QUANT, huff_symbol, huff_table};
use crate::tables::atrac3plus::{Atrac3PlusData, CLC_BITS, WORD_LEN_VLC, coded_quant_units};
use crate::tables::CodecData;

use super::tones::pack_tonal_block;

/// 最大字长
const MAX_WORD_LEN: u32 = 7;

/// 各 QU 的固定字长表
const FIXED_BIT_ALLOC_TABLE: [f32; 32] = [
    7.0, 7.0, 7.0, 7.0, 7.0, 7.0, 7.0, 7.0, //
    6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, //
    5.0, 5.0, 5.0, 5.0, 5.0, 5.0, //
    4.0, 4.0, 4.0, //
    3.0, 3.0, //
    2.0, 2.0, //
    1.0, 0.0, 0.0,
];

/// 帧尾的噪声标志与终止符
const TERMINATOR_BITS: usize = 1 + 2;

/// 码表选择: 定长
const CODE_TAB_CLC: u32 = 0;
/// 码表选择: Huffman
const CODE_TAB_VLC: u32 = 1;

/// (值, 位宽) 缓冲
#[derive(Debug, Clone, Default)]
pub struct BitBuf {
    entries: Vec<(u32, u32)>,
    bits: usize,
}

impl BitBuf {
    pub fn insert(&mut self, value: u32, nbits: u32) {
        self.entries.push((value, nbits));
        self.bits += nbits as usize;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bits = 0;
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn write_to(&self, bw: &mut BitWriter) {
        for &(value, nbits) in &self.entries {
            bw.write_bits(value, nbits);
        }
    }
}

/// 单声道输入
#[derive(Debug, Clone, Default)]
pub struct PlusChannel {
    pub scaled_blocks: Vec<ScaledBlock>,
    pub spread: f32,
    pub tone_bands: Vec<ToneBand>,
}

/// 阶段间共享的帧上下文
#[derive(Debug, Clone, Default)]
pub struct Atrac3PlusFrame {
    /// 帧比特数
    pub size_bits: usize,
    pub channels: Vec<PlusChannel>,
    /// 各 QU 的 ATH 能量
    pub ath: Vec<f32>,
    pub loudness: f32,
    /// 写入码流的 QU 数
    pub num_quant_units: usize,
    /// 最后一个非零字长 QU + 1
    pub used_quant_units: usize,
    /// 允许非零字长的 QU 上限, 帧内超预算时逐步收缩
    pub qu_limit: usize,
    /// 每声道字长, 长度为 `num_quant_units`
    pub word_lens: Vec<Vec<u32>>,
    /// 每声道每 QU 的码表选择
    pub code_tabs: Vec<Vec<u32>>,
    /// 每声道每 QU 的尾数
    pub mantissas: Vec<Vec<Vec<i32>>>,
}

impl Atrac3PlusFrame {
    pub fn new(size_bits: usize, channels: Vec<PlusChannel>, ath: Vec<f32>, loudness: f32) -> Self {
        Self {
            size_bits,
            channels,
            ath,
            loudness,
            qu_limit: Atrac3PlusData::MAX_BFUS,
            ..Self::default()
        }
    }
}

/// 立体声与窗形/增益标志的比特数 (全部为"无标志")
fn stereo_flags_bits(channels: usize) -> usize {
    let stereo = if channels == 2 { 2 } else { 0 };
    stereo + 2 * channels
}

/// 全部字长为零时一帧的最小比特数 (不含正弦分量)
///
/// 起始位与单元类型 3, QU 数与静音标志 6, 每声道定长字长 5,
/// 标志位, 1 位正弦分量标志, 噪声标志与终止符.
pub fn min_frame_bits(channels: usize) -> usize {
    3 + 6 + 5 * channels + stereo_flags_bits(channels) + 1 + TERMINATOR_BITS
}

fn tonal_buf(frame: &Atrac3PlusFrame) -> AtracResult<BitBuf> {
    let bands: Vec<&[ToneBand]> = frame.channels.iter().map(|c| c.tone_bands.as_slice()).collect();
    let mut buf = BitBuf::default();
    pack_tonal_block(&bands, &mut buf)?;
    Ok(buf)
}

/// 字长对应的 Huffman 表 (字长 1 与 2 共用 3 级表)
fn vlc_table(word_len: u32) -> usize {
    if word_len == 1 { 2 } else { word_len as usize }
}

fn quantize(values: &[f32], word_len: u32) -> Vec<i32> {
    let mul = MAX_QUANT[word_len as usize];
    values.iter().map(|&v| (v * mul).round() as i32).collect()
}

fn vlc_cost(word_len: u32, mantissas: &[i32]) -> Option<usize> {
    let table = huff_table(vlc_table(word_len));
    mantissas
        .iter()
        .map(|&m| table.get(huff_symbol(m)).map(|e| e.bits as usize))
        .sum()
}

/// 给定 lambda 下单声道 32 个 QU 的字长
pub fn calc_word_lens(ch: &PlusChannel, shift: f32, ath: &[f32], loudness: f32) -> Vec<u32> {
    ch.scaled_blocks
        .iter()
        .enumerate()
        .map(|(qu, block)| {
            if block.max_energy < ath[qu] * loudness {
                return 0;
            }
            blend_word_len(ch.spread, block.scale_factor_index, FIXED_BIT_ALLOC_TABLE[qu], shift)
                .clamp(0, MAX_WORD_LEN as i32) as u32
        })
        .collect()
}

macro_rules! buffered_dump {
    () => {
        fn dump(&self, _frame: &Atrac3PlusFrame, bw: &mut BitWriter) -> AtracResult<()> {
            self.buf.write_to(bw);
            Ok(())
        }

        fn reset(&mut self) {
            self.buf.clear();
        }

        fn consumption(&self) -> usize {
            self.buf.bits()
        }
    };
}

/// 写起始位与声道单元类型, 扣除尾部开销后启动 lambda 搜索
#[derive(Default)]
pub struct Configure {
    buf: BitBuf,
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for Configure {
    fn encode(&mut self, frame: &mut Atrac3PlusFrame, handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        self.buf.clear();
        self.buf.insert(0, 1);
        self.buf.insert(frame.channels.len() as u32 - 1, 2);

        let tonal_bits = tonal_buf(frame)?.bits();
        let least = min_frame_bits(frame.channels.len()) - 1 + tonal_bits;
        if least > frame.size_bits {
            return Err(AtracError::InvalidArgument(format!(
                "正弦分量放不进帧: 至少 {} 比特, 帧长 {} 比特",
                least, frame.size_bits
            )));
        }

        let tail = stereo_flags_bits(frame.channels.len()) + tonal_bits + TERMINATOR_BITS;
        handler.start(frame.size_bits.saturating_sub(tail), MIN_SHIFT, MAX_SHIFT);
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 按 lambda 计算字长并确定 QU 数
#[derive(Default)]
pub struct BfuAlloc {
    buf: BitBuf,
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for BfuAlloc {
    fn encode(&mut self, frame: &mut Atrac3PlusFrame, handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        let lambda = handler.continue_search();
        let mut word_lens: Vec<Vec<u32>> = frame
            .channels
            .iter()
            .map(|ch| calc_word_lens(ch, lambda, &frame.ath, frame.loudness))
            .collect();
        for wl in &mut word_lens {
            wl.iter_mut().skip(frame.qu_limit).for_each(|w| *w = 0);
        }

        let used = word_lens
            .iter()
            .filter_map(|wl| wl.iter().rposition(|&w| w != 0))
            .max()
            .map_or(0, |last| last + 1);
        let num_qu = coded_quant_units(used);
        for wl in &mut word_lens {
            wl.resize(num_qu, 0);
        }
        trace!("ATRAC3+ lambda={:.3}, used_qu={}, num_qu={}", lambda, used, num_qu);

        frame.word_lens = word_lens;
        frame.used_quant_units = used;
        frame.num_quant_units = num_qu;

        self.buf.clear();
        self.buf.insert(num_qu as u32 - 1, 5);
        // mute_flag
        self.buf.insert(0, 1);
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 字长编码
///
/// 第一声道在定长 (模式 0) 与首值加差分 VLC (模式 3) 间取优,
/// 第二声道在定长与相对第一声道的差分 VLC (模式 1) 间取优.
#[derive(Default)]
pub struct WordLenEncoder {
    buf: BitBuf,
}

impl WordLenEncoder {
    /// 差分序列在最省的码表下的 (表索引, 比特数)
    fn best_vlc_table(deltas: &[usize]) -> Option<(usize, usize)> {
        WORD_LEN_VLC
            .iter()
            .enumerate()
            .filter_map(|(idx, table)| {
                deltas
                    .iter()
                    .map(|&d| table[d].map(|e| e.len as usize))
                    .sum::<Option<usize>>()
                    .map(|bits| (idx, bits))
            })
            .min_by_key(|&(_, bits)| bits)
    }

    fn vl_encode(&mut self, table: usize, deltas: &[usize]) {
        for &d in deltas {
            if let Some(e) = WORD_LEN_VLC[table][d] {
                self.buf.insert(e.code as u32, e.len as u32);
            }
        }
    }

    fn encode_fixed(&mut self, wl: &[u32]) {
        self.buf.insert(0, 2);
        for &w in wl {
            self.buf.insert(w, 3);
        }
    }
}

fn wrap_delta(a: u32, b: u32) -> usize {
    (a.wrapping_sub(b) & 7) as usize
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for WordLenEncoder {
    fn encode(&mut self, frame: &mut Atrac3PlusFrame, _handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        self.buf.clear();
        let num_qu = frame.num_quant_units;
        let fixed_bits = 2 + 3 * num_qu;

        for (ch, wl) in frame.word_lens.iter().enumerate() {
            let wl = &wl[..num_qu];
            if ch == 0 {
                let deltas: Vec<usize> = wl.windows(2).map(|p| wrap_delta(p[1], p[0])).collect();
                match Self::best_vlc_table(&deltas) {
                    Some((table, bits)) if 2 + 2 + 2 + 2 + 3 + bits < fixed_bits => {
                        self.buf.insert(3, 2);
                        // weight_idx, fill_mode
                        self.buf.insert(0, 2);
                        self.buf.insert(0, 2);
                        self.buf.insert(table as u32, 2);
                        self.buf.insert(wl[0], 3);
                        self.vl_encode(table, &deltas);
                    }
                    _ => self.encode_fixed(wl),
                }
            } else {
                let master = &frame.word_lens[0];
                let deltas: Vec<usize> = wl.iter().zip(master).map(|(&w, &m)| wrap_delta(w, m)).collect();
                match Self::best_vlc_table(&deltas) {
                    Some((table, bits)) if 2 + 2 + 2 + bits < fixed_bits => {
                        self.buf.insert(1, 2);
                        // fill_mode
                        self.buf.insert(0, 2);
                        self.buf.insert(table as u32, 2);
                        self.vl_encode(table, &deltas);
                    }
                    _ => self.encode_fixed(wl),
                }
            }
        }
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 缩放因子: 模式 0, 每个已用 QU 6 位
#[derive(Default)]
pub struct SfIdxEncoder {
    buf: BitBuf,
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for SfIdxEncoder {
    fn encode(&mut self, frame: &mut Atrac3PlusFrame, _handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        self.buf.clear();
        if frame.used_quant_units == 0 {
            return Ok(EncodeStatus::Ok);
        }
        for ch in &frame.channels {
            self.buf.insert(0, 2);
            for block in &ch.scaled_blocks[..frame.used_quant_units] {
                self.buf.insert(block.scale_factor_index as u32, 6);
            }
        }
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 量化每个 QU 并在定长与 Huffman 之间选择
#[derive(Default)]
pub struct CodeTabEncoder {
    buf: BitBuf,
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for CodeTabEncoder {
    fn encode(&mut self, frame: &mut Atrac3PlusFrame, _handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        self.buf.clear();
        let used = frame.used_quant_units;
        let nch = frame.channels.len();
        frame.code_tabs = vec![vec![CODE_TAB_CLC; used]; nch];
        frame.mantissas = vec![vec![Vec::new(); used]; nch];
        if used == 0 {
            return Ok(EncodeStatus::Ok);
        }

        for (ch, chan) in frame.channels.iter().enumerate() {
            for qu in 0..used {
                let wl = frame.word_lens[ch][qu];
                if wl == 0 {
                    continue;
                }
                let m = quantize(&chan.scaled_blocks[qu].values, wl);
                let clc = CLC_BITS[wl as usize] as usize * m.len();
                if vlc_cost(wl, &m).is_some_and(|vlc| vlc < clc) {
                    frame.code_tabs[ch][qu] = CODE_TAB_VLC;
                }
                frame.mantissas[ch][qu] = m;
            }
        }

        // use_full_table
        self.buf.insert(0, 1);
        for ch in 0..nch {
            // table_type, 模式 0, 覆盖全部已用 QU
            self.buf.insert(0, 1);
            self.buf.insert(0, 2);
            self.buf.insert(0, 1);
            for qu in 0..used {
                if frame.word_lens[ch][qu] != 0 {
                    self.buf.insert(frame.code_tabs[ch][qu], 2);
                } else if ch > 0 && frame.word_lens[0][qu] != 0 {
                    // 不复制主声道系数
                    self.buf.insert(1, 1);
                }
            }
        }
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 尾数, 并向 lambda 搜索提交当前消耗
#[derive(Default)]
pub struct QuantUnitsEncoder {
    buf: BitBuf,
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for QuantUnitsEncoder {
    fn encode(&mut self, frame: &mut Atrac3PlusFrame, handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        self.buf.clear();
        for (ch, units) in frame.mantissas.iter().enumerate() {
            for (qu, m) in units.iter().enumerate() {
                let wl = frame.word_lens[ch][qu];
                if wl == 0 {
                    continue;
                }
                if frame.code_tabs[ch][qu] == CODE_TAB_CLC {
                    let bits = CLC_BITS[wl as usize];
                    for &v in m {
                        self.buf.insert((v as u32) & ((1 << bits) - 1), bits);
                    }
                } else {
                    let table = huff_table(vlc_table(wl));
                    for &v in m {
                        if let Some(e) = table.get(huff_symbol(v)) {
                            self.buf.insert(e.code, e.bits);
                        }
                    }
                }
            }
        }
        let total = handler.cur_global_consumption() + self.buf.bits();
        if handler.submit(total) && total > handler.target_bits() && frame.used_quant_units > 0 {
            // lambda 已到上界仍超预算, 收缩 QU 上限后整帧重来
            frame.qu_limit = frame.used_quant_units - 1;
            debug!(
                "ATRAC3+ 分配超预算 {} > {}, QU 上限收缩到 {}",
                total,
                handler.target_bits(),
                frame.qu_limit
            );
            return Ok(EncodeStatus::Repeat);
        }
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 交换/取反 (仅立体声)、窗形与增益标志, 均为"无标志"
#[derive(Default)]
pub struct StereoFlagsEncoder {
    buf: BitBuf,
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for StereoFlagsEncoder {
    fn encode(&mut self, frame: &mut Atrac3PlusFrame, _handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        self.buf.clear();
        let nch = frame.channels.len();
        if nch == 2 {
            self.buf.insert(0, 1);
            self.buf.insert(0, 1);
        }
        for _ in 0..nch {
            self.buf.insert(0, 1);
        }
        for _ in 0..nch {
            self.buf.insert(0, 1);
        }
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 正弦分量边信息
#[derive(Default)]
pub struct TonalComponentEncoder {
    buf: BitBuf,
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for TonalComponentEncoder {
    fn encode(&mut self, frame: &mut Atrac3PlusFrame, _handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        self.buf = tonal_buf(frame)?;
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 噪声标志与终止符
#[derive(Default)]
pub struct Terminator {
    buf: BitBuf,
}

impl BitStreamPartEncoder<Atrac3PlusFrame> for Terminator {
    fn encode(&mut self, _frame: &mut Atrac3PlusFrame, _handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus> {
        self.buf.clear();
        // noise_present
        self.buf.insert(0, 1);
        self.buf.insert(3, 2);
        Ok(EncodeStatus::Ok)
    }

    buffered_dump!();
}

/// 完整的阶段序列
pub fn create_stages() -> Vec<Box<dyn BitStreamPartEncoder<Atrac3PlusFrame>>> {
    vec![
        Box::new(Configure::default()),
        Box::new(BfuAlloc::default()),
        Box::new(WordLenEncoder::default()),
        Box::new(SfIdxEncoder::default()),
        Box::new(CodeTabEncoder::default()),
        Box::new(QuantUnitsEncoder::default()),
        Box::new(StereoFlagsEncoder::default()),
        Box::new(TonalComponentEncoder::default()),
        Box::new(Terminator::default()),
    ]
}

/// QU 数是否为码流允许的值
pub fn is_valid_num_quant_units(n: usize) -> bool {
    (1..=28).contains(&n) || n == Atrac3PlusData::MAX_BFUS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bs_encode::BitStreamEncoder;

    fn wordlen_frame(num_qu: usize, wl: [u32; 2]) -> Atrac3PlusFrame {
        let mut frame = Atrac3PlusFrame::new(444, vec![PlusChannel::default(); 2], Vec::new(), 1.0);
        frame.num_quant_units = num_qu;
        frame.word_lens = vec![vec![wl[0]; num_qu], vec![wl[1]; num_qu]];
        frame
    }

    fn run_word_len(frame: &mut Atrac3PlusFrame) -> usize {
        let mut enc = BitStreamEncoder::new(vec![Box::new(WordLenEncoder::default())]);
        let mut bw = BitWriter::new();
        enc.encode(frame, &mut bw).unwrap();
        bw.bits_written()
    }

    #[test]
    fn test_word_len_encoder_fixture() {
        let mut frame = wordlen_frame(6, [6, 6]);
        assert_eq!(run_word_len(&mut frame), 28);
    }

    #[test]
    fn test_word_len_single_unit_uses_fixed() {
        let mut frame = wordlen_frame(1, [3, 0]);
        assert_eq!(run_word_len(&mut frame), 2 * (2 + 3));
    }

    #[test]
    fn test_word_len_second_channel_delta() {
        // 第二声道与第一声道差 1, 在码表 0 中为 2 位
        let mut frame = wordlen_frame(10, [5, 6]);
        let bits = run_word_len(&mut frame);
        // 第一声道: 11 + 9; 第二声道: 6 + 10 * 2
        assert_eq!(bits, 20 + 26);
    }

    #[test]
    fn test_bit_buf() {
        let mut buf = BitBuf::default();
        buf.insert(5, 3);
        buf.insert(1, 1);
        assert_eq!(buf.bits(), 4);
        let mut bw = BitWriter::new();
        buf.write_to(&mut bw);
        assert_eq!(bw.finish(), vec![0b1011_0000]);
        buf.clear();
        assert_eq!(buf.bits(), 0);
    }

    fn block(sfi: u8, value: f32, n: usize) -> ScaledBlock {
        ScaledBlock {
            scale_factor_index: sfi,
            values: vec![value; n],
            max_energy: 1.0,
        }
    }

    fn loud_channel() -> PlusChannel {
        PlusChannel {
            scaled_blocks: (0..32)
                .map(|qu| block(50, 0.4, Atrac3PlusData::SPECS_PER_BLOCK[qu]))
                .collect(),
            spread: 0.5,
            tone_bands: Vec::new(),
        }
    }

    #[test]
    fn test_calc_word_lens_gating_and_clamp() {
        let ch = loud_channel();
        let wl = calc_word_lens(&ch, MIN_SHIFT, &[0.0; 32], 1.0);
        assert!(wl.iter().all(|&w| w == 7));
        let wl = calc_word_lens(&ch, MAX_SHIFT, &[0.0; 32], 1.0);
        assert!(wl.iter().all(|&w| w == 0));
        let wl = calc_word_lens(&ch, 0.0, &[2.0; 32], 1.0);
        assert!(wl.iter().all(|&w| w == 0));
    }

    #[test]
    fn test_full_pipeline_fits_frame() {
        let size_bits = 2048 * 8;
        let mut frame = Atrac3PlusFrame::new(size_bits, vec![loud_channel(), loud_channel()], vec![0.0; 32], 1.0);
        let mut enc = BitStreamEncoder::new(create_stages());
        let mut bw = BitWriter::new();
        enc.encode(&mut frame, &mut bw).unwrap();

        assert!(bw.bits_written() <= size_bits);
        assert_eq!(bw.bits_written(), enc.consumption());
        assert!(is_valid_num_quant_units(frame.num_quant_units));
        assert!(frame.used_quant_units > 0);
        // 大量比特可用时, 消耗应接近帧长
        assert!(bw.bits_written() > size_bits / 2);
    }

    #[test]
    fn test_valid_num_quant_units() {
        assert!(is_valid_num_quant_units(1));
        assert!(is_valid_num_quant_units(28));
        assert!(!is_valid_num_quant_units(29));
        assert!(is_valid_num_quant_units(32));
        assert!(!is_valid_num_quant_units(0));
    }
}
