//! ATRAC3 音调分量.
//!
//! 明显高出所在 BFU 中位数的谱线被单独提取, 按 (量化选择子, 连续线数)
//! 分组编码, 原位置清零后再进入主频谱的缩放与分配.
//!
//! 码流布局:
//!
//! ```text
//! 5  分组数
//! 2  编码模式 (0 = VLC, 1 = CLC), 仅在分组数非零时出现
//!    每组:
//! 4    各 QMF 频带是否含分量
//! 3    每分量的系数个数 - 1
//! 3    量化选择子
//!      每个被标记频带的 4 个 64 线窗口:
//! 3      分量数
//!        每分量: 6 位缩放因子, 6 位窗内位置, 尾数
//! ```

use std::collections::BTreeMap;

use atrac_core::{AtracResult, BitWriter};
use log::debug;

use crate::bitalloc::blend_word_len;
use crate::scale::{ScaledBlock, Scaler};
use crate::tables::atrac3::{Atrac3Data, BLOCK_SIZE_TAB, CLC_LENGTH_TAB};
use crate::tables::CodecData;

use super::bitstream::{FIXED_BIT_ALLOC_TABLE, clamp_selector, quantize, vlc_bits, write_clc, write_vlc};

/// 每帧最多提取的分量数
pub const MAX_TONAL_COMPONENTS: usize = 31;
/// 每分量最多连续谱线数
pub const MAX_CODED_VALUES: usize = 8;
/// 每组每个窗口的分量上限 (3 位字段)
const MAX_COMPONENTS_PER_WINDOW: usize = 7;
/// 分组数上限 (5 位字段)
const MAX_GROUPS: usize = 31;
const WINDOW_SIZE: usize = 64;
const WINDOWS_PER_BAND: usize = 4;

/// 各 QMF 频带的峰值/中位数阈值倍数
const PEAK_FACTORS: [f32; 4] = [10.0, 8.0, 8.0, 6.0];
/// 低于此幅度的峰不提取
const MIN_PEAK: f32 = 1e-4;

/// 已量化的音调分量
#[derive(Debug, Clone, PartialEq)]
pub struct TonalComponent {
    /// 首条谱线位置
    pub pos: usize,
    /// 所在 BFU
    pub bfu: usize,
    pub quant: u32,
    pub scaled: ScaledBlock,
    pub mantissas: Vec<i32>,
}

impl TonalComponent {
    fn window(&self) -> usize {
        self.pos / WINDOW_SIZE
    }

    fn peak(&self) -> f32 {
        self.scaled.max_energy
    }
}

/// 同一 (量化选择子, 系数个数) 的分量组
#[derive(Debug, Clone, PartialEq)]
pub struct TonalGroup {
    pub quant: u32,
    pub coded_values: usize,
    /// 按位置升序
    pub components: Vec<TonalComponent>,
}

impl TonalGroup {
    fn band_used(&self, band: usize) -> bool {
        self.components.iter().any(|c| c.window() / WINDOWS_PER_BAND == band)
    }

    fn window_count(&self, window: usize) -> usize {
        self.components.iter().filter(|c| c.window() == window).count()
    }

    fn side_bits(&self) -> usize {
        let bands = (0..Atrac3Data::NUM_QMF).filter(|&b| self.band_used(b)).count();
        Atrac3Data::NUM_QMF + 3 + 3 + bands * WINDOWS_PER_BAND * 3 + self.components.len() * 12
    }
}

/// 一个声音单元的全部音调分量
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TonalGroups {
    pub groups: Vec<TonalGroup>,
    /// true 为 CLC
    pub clc: bool,
    /// 音调部分总比特
    pub bits: usize,
}

impl TonalGroups {
    /// 按 (量化选择子, 系数个数) 分组, 窗口满员时开新组
    pub fn build(components: &[TonalComponent]) -> Self {
        let mut by_key: BTreeMap<(u32, usize), Vec<TonalComponent>> = BTreeMap::new();
        for c in components {
            by_key
                .entry((c.quant, c.mantissas.len()))
                .or_default()
                .push(c.clone());
        }

        let mut groups: Vec<TonalGroup> = Vec::new();
        for ((quant, coded_values), mut list) in by_key {
            list.sort_by_key(|c| c.pos);
            let first = groups.len();
            for c in list {
                let w = c.window();
                let slot = groups[first..]
                    .iter()
                    .position(|g| g.window_count(w) < MAX_COMPONENTS_PER_WINDOW);
                match slot {
                    Some(i) => groups[first + i].components.push(c),
                    None => groups.push(TonalGroup {
                        quant,
                        coded_values,
                        components: vec![c],
                    }),
                }
            }
        }
        groups.truncate(MAX_GROUPS);

        let mut out = Self {
            groups,
            clc: true,
            bits: 5,
        };
        if out.groups.is_empty() {
            return out;
        }

        let mut clc = 0usize;
        let mut vlc = Some(0usize);
        let mut side = 2usize;
        for g in &out.groups {
            side += g.side_bits();
            for c in &g.components {
                clc += CLC_LENGTH_TAB[g.quant as usize] as usize * c.mantissas.len();
                vlc = vlc.zip(vlc_bits(g.quant, &c.mantissas)).map(|(t, b)| t + b);
            }
        }
        let (use_clc, mantissa_bits) = match vlc {
            Some(v) if v < clc => (false, v),
            _ => (true, clc),
        };
        out.clc = use_clc;
        out.bits += side + mantissa_bits;
        out
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn component_count(&self) -> usize {
        self.groups.iter().map(|g| g.components.len()).sum()
    }

    pub fn write(&self, bw: &mut BitWriter) -> AtracResult<()> {
        bw.write_bits(self.groups.len() as u32, 5);
        if self.groups.is_empty() {
            return Ok(());
        }
        bw.write_bits(self.clc as u32, 2);

        for g in &self.groups {
            for band in 0..Atrac3Data::NUM_QMF {
                bw.write_bits(g.band_used(band) as u32, 1);
            }
            bw.write_bits(g.coded_values as u32 - 1, 3);
            bw.write_bits(g.quant, 3);

            for band in (0..Atrac3Data::NUM_QMF).filter(|&b| g.band_used(b)) {
                for w in band * WINDOWS_PER_BAND..(band + 1) * WINDOWS_PER_BAND {
                    bw.write_bits(g.window_count(w) as u32, 3);
                    for c in g.components.iter().filter(|c| c.window() == w) {
                        bw.write_bits(c.scaled.scale_factor_index as u32, 6);
                        bw.write_bits((c.pos % WINDOW_SIZE) as u32, 6);
                        if self.clc {
                            write_clc(g.quant, &c.mantissas, bw)?;
                        } else {
                            write_vlc(g.quant, &c.mantissas, bw)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn median_abs(values: &[f32]) -> f32 {
    let mut abs: Vec<f32> = values.iter().map(|v| v.abs()).collect();
    abs.sort_by(f32::total_cmp);
    abs[abs.len() / 2]
}

/// 分量的量化选择子: 比主频谱在 shift 0 时的选择子高一级, 至少为 2
fn component_quant(spread: f32, scaled: &ScaledBlock, bfu: usize) -> u32 {
    let wl = clamp_selector(blend_word_len(
        spread,
        scaled.scale_factor_index,
        FIXED_BIT_ALLOC_TABLE[bfu],
        0.0,
    ));
    (wl + 1).clamp(2, 7)
}

/// 在频谱中查找音调分量并把对应谱线清零
///
/// 每个 BFU 至多一个分量, 结果按峰值降序排列.
pub fn extract_components(specs: &mut [f32], spread: f32) -> Vec<TonalComponent> {
    let scaler = Scaler::<Atrac3Data>::new();
    let mut found = Vec::new();

    for bfu in 0..Atrac3Data::MAX_BFUS {
        let start = BLOCK_SIZE_TAB[bfu];
        let end = BLOCK_SIZE_TAB[bfu + 1].min(specs.len());
        if start >= end {
            break;
        }
        let block = &specs[start..end];
        let Some((peak_off, peak)) = block
            .iter()
            .map(|v| v.abs())
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        let threshold = PEAK_FACTORS[Atrac3Data::bfu_to_band(bfu)] * median_abs(block).max(f32::MIN_POSITIVE);
        if peak <= threshold || peak <= MIN_PEAK {
            continue;
        }

        let pos = start + peak_off;
        let mut len = 1;
        while len < MAX_CODED_VALUES && pos + len < specs.len() && specs[pos + len].abs() > threshold {
            len += 1;
        }

        let scaled = scaler.scale(&specs[pos..pos + len]);
        let quant = component_quant(spread, &scaled, bfu);
        let mantissas = quantize(&scaled.values, quant);
        specs[pos..pos + len].fill(0.0);
        found.push(TonalComponent {
            pos,
            bfu,
            quant,
            scaled,
            mantissas,
        });
    }

    found.sort_by(|a, b| b.peak().total_cmp(&a.peak()));
    if found.len() > MAX_TONAL_COMPONENTS {
        let dropped = found.split_off(MAX_TONAL_COMPONENTS);
        restore(specs, &dropped);
    }
    found
}

fn restore(specs: &mut [f32], dropped: &[TonalComponent]) {
    let table = Atrac3Data::scale_table();
    for c in dropped {
        let scale = table[c.scaled.scale_factor_index as usize];
        for (i, v) in c.scaled.values.iter().enumerate() {
            specs[c.pos + i] = v * scale;
        }
    }
}

/// 提取音调分量并保证其开销不超过 `budget_bits`
///
/// 超出预算时按峰值从小到大丢弃分量, 被丢弃的谱线写回频谱.
pub fn extract_tonal(specs: &mut [f32], spread: f32, budget_bits: usize) -> TonalGroups {
    let components = extract_components(specs, spread);

    let mut keep = components.len();
    let groups = loop {
        let groups = TonalGroups::build(&components[..keep]);
        if groups.bits <= budget_bits || keep == 0 {
            break groups;
        }
        keep -= 1;
    };

    let coded = groups.component_count();
    if coded < components.len() {
        let mut dropped: Vec<TonalComponent> = components[keep..].to_vec();
        // 分组数溢出时被截掉的分量也要写回
        dropped.extend(
            components[..keep]
                .iter()
                .filter(|c| !groups.groups.iter().any(|g| g.components.iter().any(|k| k.pos == c.pos)))
                .cloned(),
        );
        restore(specs, &dropped);
    }
    if !groups.is_empty() {
        debug!("ATRAC3 音调分量: {} 个, {} 组, {} 位", coded, groups.groups.len(), groups.bits);
    }
    groups
}
