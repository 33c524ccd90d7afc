//! 比特分配公用逻辑.
//!
//! 三个变体都用同一个混合公式决定每块的字长:
//!
//! `spread * sfi / 3.2 + (1 - spread) * fixed - shift`
//!
//! `spread` 越大越依赖缩放因子, 越小越依赖固定表. `shift` 由对分搜索
//! 决定, 越大分配的比特越少.

use log::debug;

/// shift 下界
pub const MIN_SHIFT: f32 = -3.0;
/// shift 上界
pub const MAX_SHIFT: f32 = 15.0;
/// 对分步长
const SHIFT_STEP: f32 = 0.01;
/// 区间宽度低于此值视为收敛
const CONVERGED_WIDTH: f32 = 0.1;

/// 混合公式的原始结果 (向零取整)
pub fn blend_word_len(spread: f32, scale_factor_index: u8, fixed: f32, shift: f32) -> i32 {
    (spread * (scale_factor_index as f32 / 3.2) + (1.0 - spread) * fixed - shift) as i32
}

/// 按每块频谱线数统计尾数总比特
pub fn mantissa_bits(word_lens: &[u32], specs_per_block: &[usize]) -> usize {
    word_lens
        .iter()
        .zip(specs_per_block)
        .map(|(&wl, &n)| wl as usize * n)
        .sum()
}

/// 从最高块起逐块置零, 直到尾数比特不超过 `target`
///
/// 返回置零后的尾数比特数. 最省的 shift 仍超预算时用它收尾.
pub fn trim_to_budget(word_lens: &mut [u32], specs_per_block: &[usize], target: usize) -> usize {
    let mut bits = mantissa_bits(word_lens, specs_per_block);
    for (wl, &n) in word_lens.iter_mut().zip(specs_per_block).rev() {
        if bits <= target {
            break;
        }
        bits -= *wl as usize * n;
        *wl = 0;
    }
    bits
}

/// 一次试分配的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub word_lens: Vec<u32>,
    pub bits: usize,
}

/// 在 `[MIN_SHIFT, MAX_SHIFT]` 上对分 shift, 使消耗落在 `[target - slack, target]`
///
/// `eval` 返回给定 shift 下的分配与消耗. 区间收敛时接受最后一次未超预算的
/// 结果, 整个区间都超预算时回退到全零分配.
pub fn search_shift<F>(target: usize, slack: usize, block_count: usize, mut eval: F) -> Allocation
where
    F: FnMut(f32) -> Allocation,
{
    let mut min_shift = MIN_SHIFT;
    let mut max_shift = MAX_SHIFT;
    let mut best: Option<Allocation> = None;

    loop {
        let shift = (max_shift + min_shift) / 2.0;
        let alloc = eval(shift);

        if alloc.bits > target {
            min_shift = shift + SHIFT_STEP;
        } else if alloc.bits + slack >= target || max_shift - min_shift < CONVERGED_WIDTH {
            debug!("分配收敛: shift={:.3}, bits={}/{}", shift, alloc.bits, target);
            return alloc;
        } else {
            max_shift = shift - SHIFT_STEP;
            best = Some(alloc);
        }

        if max_shift < min_shift {
            return best.unwrap_or_else(|| {
                debug!("分配无法满足预算 {}, 全部置零", target);
                Allocation {
                    word_lens: vec![0; block_count],
                    bits: 0,
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_word_len_truncates() {
        assert_eq!(blend_word_len(0.0, 0, 7.0, 0.5), 6);
        assert_eq!(blend_word_len(1.0, 35, 0.0, 0.0), 10);
        assert_eq!(blend_word_len(0.0, 0, 1.0, 1.5), 0);
        assert_eq!(blend_word_len(0.0, 0, 1.0, 3.0), -2);
    }

    #[test]
    fn test_mantissa_bits() {
        assert_eq!(mantissa_bits(&[2, 0, 4], &[8, 8, 4]), 32);
    }

    #[test]
    fn test_trim_to_budget_zeroes_high_blocks() {
        let mut wl = vec![4u32, 4, 4, 4];
        let bits = trim_to_budget(&mut wl, &[8, 8, 8, 8], 70);
        assert_eq!(bits, 64);
        assert_eq!(wl, vec![4, 4, 0, 0]);

        // 已在预算内时不改动
        let mut wl = vec![3u32, 2];
        assert_eq!(trim_to_budget(&mut wl, &[4, 4], 100), 20);
        assert_eq!(wl, vec![3, 2]);

        let mut wl = vec![5u32; 3];
        assert_eq!(trim_to_budget(&mut wl, &[16, 16, 16], 0), 0);
        assert!(wl.iter().all(|&w| w == 0));
    }

    fn linear(shift: f32) -> Allocation {
        // 10 个块, 每块 8 条线, 字长随 shift 线性下降
        let wl = (8.0 - shift).clamp(0.0, 16.0) as u32;
        let word_lens = vec![wl; 10];
        let bits = mantissa_bits(&word_lens, &[8; 10]);
        Allocation { word_lens, bits }
    }

    #[test]
    fn test_search_shift_hits_window() {
        let alloc = search_shift(500, 100, 10, linear);
        assert!(alloc.bits <= 500);
        assert!(alloc.bits >= 400);
    }

    #[test]
    fn test_search_shift_under_budget_converges() {
        // shift 不会低于 -3, 字长最多到 10
        let alloc = search_shift(1000, 0, 10, linear);
        assert_eq!(alloc.bits, 800);
    }

    #[test]
    fn test_search_shift_impossible_budget() {
        let alloc = search_shift(10, 0, 10, |_| Allocation {
            word_lens: vec![1; 10],
            bits: 80,
        });
        assert_eq!(alloc.bits, 0);
        assert_eq!(alloc.word_lens, vec![0; 10]);
    }
}
