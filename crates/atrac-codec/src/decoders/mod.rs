//! 解码路径.
//!
//! 目前只有 ATRAC1 反量化, 用于核对编码器输出.

pub mod atrac1;
