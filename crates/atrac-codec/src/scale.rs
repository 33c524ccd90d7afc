//! 缩放因子量化.
//!
//! 对每个块取最大绝对值, 选出表中不小于它的最小缩放因子, 并把块内频谱
//! 归一化到 (-1, 1).

use std::marker::PhantomData;

use atrac_core::{AtracError, AtracResult};
use log::warn;

use crate::frame::BlockSizeMode;
use crate::tables::{CodecData, NUM_SCALE_FACTORS};

/// 归一化后的上限, 超出时钳位
const MAX_NORMALIZED: f32 = 0.99999;

/// 缩放后的块
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledBlock {
    /// 缩放因子索引 (0..=63)
    pub scale_factor_index: u8,
    /// 归一化频谱
    pub values: Vec<f32>,
    /// 块内最大能量 (未归一化的 `max(v^2)`)
    pub max_energy: f32,
}

/// 缩放器
#[derive(Debug, Clone, Copy, Default)]
pub struct Scaler<D: CodecData> {
    _data: PhantomData<D>,
}

impl<D: CodecData> Scaler<D> {
    pub fn new() -> Self {
        Self { _data: PhantomData }
    }

    /// 不小于 `max_abs` 的最小缩放因子索引, 溢出时取最大值
    pub fn scale_factor_index(max_abs: f32) -> u8 {
        let table = D::scale_table();
        let idx = table.partition_point(|&s| s < max_abs);
        if idx >= NUM_SCALE_FACTORS {
            warn!("缩放因子溢出: max={}, 钳位到 {}", max_abs, NUM_SCALE_FACTORS - 1);
            return (NUM_SCALE_FACTORS - 1) as u8;
        }
        idx as u8
    }

    /// 缩放一段频谱
    pub fn scale(&self, input: &[f32]) -> ScaledBlock {
        let max_abs = input.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let index = Self::scale_factor_index(max_abs);
        let scale = D::scale_table()[index as usize];

        let values = input
            .iter()
            .map(|&v| {
                let t = v / scale;
                if t.abs() >= 1.0 {
                    warn!("归一化值越界: {} (scale_idx={}), 钳位", t, index);
                    MAX_NORMALIZED.copysign(t)
                } else {
                    t
                }
            })
            .collect();

        ScaledBlock {
            scale_factor_index: index,
            values,
            max_energy: max_abs * max_abs,
        }
    }

    /// 按窗长模式把一帧频谱切块并缩放
    pub fn scale_frame(&self, specs: &[f32], mode: &BlockSizeMode) -> AtracResult<Vec<ScaledBlock>> {
        if specs.len() != D::NUM_SAMPLES {
            return Err(AtracError::InvalidArgument(format!(
                "频谱长度 {} 与帧长 {} 不符",
                specs.len(),
                D::NUM_SAMPLES
            )));
        }
        let mut blocks = Vec::with_capacity(D::MAX_BFUS);
        for band in 0..D::NUM_QMF {
            let starts = if mode.is_short(band) {
                D::SPECS_START_SHORT
            } else {
                D::SPECS_START_LONG
            };
            for blk in D::BLOCKS_PER_BAND[band]..D::BLOCKS_PER_BAND[band + 1] {
                let start = starts[blk];
                blocks.push(self.scale(&specs[start..start + D::SPECS_PER_BLOCK[blk]]));
            }
        }
        Ok(blocks)
    }
}
