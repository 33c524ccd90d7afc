//! 多阶段码流编码框架.
//!
//! 一帧的序列化被拆成若干有序阶段 (`BitStreamPartEncoder`). 各阶段在
//! `encode` 中只做试算并把决策保存在自身或帧上下文里, 所有阶段都通过后
//! 才依次调用 `dump` 写入真正的码流. 阶段之间通过 `BitAllocHandler`
//! 共享一个对分搜索的 lambda 参数:
//!
//! - `start` 设定目标比特数与 lambda 区间
//! - `continue_search` 取区间中点, 并记录需要从哪个阶段重跑
//! - `submit` 比较实际消耗, 收紧区间并请求重跑
//!
//! 阶段自身也可以返回 `EncodeStatus::Repeat`, 此时之前的阶段全部复位,
//! 从第一个阶段重新开始.

use atrac_core::{AtracError, AtracResult, BitWriter};
use log::trace;

/// 对分步长
const LAMBDA_STEP: f32 = 0.01;

/// 单帧最多允许的阶段执行次数
const MAX_STAGE_RUNS: usize = 100_000;

/// 阶段编码结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStatus {
    /// 继续下一阶段
    Ok,
    /// 复位之前的阶段并从头开始
    Repeat,
}

/// 码流编码阶段
pub trait BitStreamPartEncoder<F>: Send {
    /// 试算本阶段的决策
    fn encode(&mut self, frame: &mut F, handler: &mut BitAllocHandler) -> AtracResult<EncodeStatus>;

    /// 把最近一次成功的决策写入码流
    fn dump(&self, frame: &F, bw: &mut BitWriter) -> AtracResult<()>;

    /// 清空本阶段的决策
    fn reset(&mut self) {}

    /// 本阶段决策占用的比特数
    fn consumption(&self) -> usize;
}

/// 阶段间共享的比特分配对分状态
#[derive(Debug, Clone, Default)]
pub struct BitAllocHandler {
    target_bits: usize,
    min_lambda: f32,
    max_lambda: f32,
    cur_lambda: f32,
    last_lambda: f32,
    need_repeat: bool,
    cur_enc_pos: usize,
    repeat_enc_pos: usize,
    global_consumption: usize,
}

impl BitAllocHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始一轮对分搜索
    ///
    /// 区间收敛前没有可接受的 lambda 时, 以 `max_lambda` (最省比特) 兜底.
    pub fn start(&mut self, target_bits: usize, min_lambda: f32, max_lambda: f32) {
        self.target_bits = target_bits;
        self.min_lambda = min_lambda;
        self.max_lambda = max_lambda;
        self.cur_lambda = max_lambda;
        self.last_lambda = max_lambda;
    }

    /// 取下一个待尝试的 lambda
    ///
    /// 区间已收敛时返回最后一次未超预算的 lambda, 不修改状态.
    pub fn continue_search(&mut self) -> f32 {
        if self.max_lambda <= self.min_lambda {
            return self.last_lambda;
        }
        self.cur_lambda = (self.max_lambda + self.min_lambda) / 2.0;
        self.repeat_enc_pos = self.cur_enc_pos;
        self.cur_lambda
    }

    /// 提交当前 lambda 下的实际消耗, 返回是否无需重跑
    pub fn submit(&mut self, got_bits: usize) -> bool {
        if self.max_lambda <= self.min_lambda {
            self.need_repeat = false;
        } else if got_bits < self.target_bits {
            self.last_lambda = self.cur_lambda;
            self.max_lambda = self.cur_lambda - LAMBDA_STEP;
            self.need_repeat = true;
        } else if got_bits > self.target_bits {
            self.min_lambda = self.cur_lambda + LAMBDA_STEP;
            self.need_repeat = true;
        } else {
            // 精确命中同样记为最后一个未超预算的 lambda
            self.last_lambda = self.cur_lambda;
            self.need_repeat = false;
        }
        !self.need_repeat
    }

    /// 消耗是否低于目标
    pub fn check(&self, got_bits: usize) -> bool {
        got_bits < self.target_bits
    }

    pub fn target_bits(&self) -> usize {
        self.target_bits
    }

    /// 当前阶段之前所有阶段的消耗之和
    pub fn cur_global_consumption(&self) -> usize {
        self.global_consumption
    }
}

/// 有序阶段流水线
pub struct BitStreamEncoder<F> {
    stages: Vec<Box<dyn BitStreamPartEncoder<F>>>,
    handler: BitAllocHandler,
}

impl<F> BitStreamEncoder<F> {
    pub fn new(stages: Vec<Box<dyn BitStreamPartEncoder<F>>>) -> Self {
        Self {
            stages,
            handler: BitAllocHandler::new(),
        }
    }

    /// 编码一帧并写入码流
    ///
    /// 每帧开始时复位所有阶段, 上一帧遗留的重跑位置不会带入本帧.
    pub fn encode(&mut self, frame: &mut F, bw: &mut BitWriter) -> AtracResult<()> {
        for stage in &mut self.stages {
            stage.reset();
        }
        self.handler.repeat_enc_pos = 0;
        self.handler.need_repeat = false;

        let mut pos = 0;
        let mut runs = 0;
        while pos < self.stages.len() {
            runs += 1;
            if runs > MAX_STAGE_RUNS {
                return Err(AtracError::Internal(format!("码流阶段未收敛: pos={}", pos)));
            }

            self.handler.cur_enc_pos = pos;
            self.handler.global_consumption = self.stages[..pos].iter().map(|s| s.consumption()).sum();
            let status = self.stages[pos].encode(frame, &mut self.handler)?;

            if self.handler.need_repeat {
                self.handler.need_repeat = false;
                trace!("阶段 {} 请求对分重跑, 回到阶段 {}", pos, self.handler.repeat_enc_pos);
                pos = self.handler.repeat_enc_pos;
                continue;
            }

            if status == EncodeStatus::Repeat {
                trace!("阶段 {} 请求整体重跑", pos);
                for stage in &mut self.stages[..pos] {
                    stage.reset();
                }
                self.handler.repeat_enc_pos = 0;
                pos = 0;
                continue;
            }

            pos += 1;
        }

        for stage in &self.stages {
            stage.dump(frame, bw)?;
        }
        Ok(())
    }

    /// 所有阶段的总消耗
    pub fn consumption(&self) -> usize {
        self.stages.iter().map(|s| s.consumption()).sum()
    }
}
