//! 统一错误类型定义.
//!
//! 所有 atrac crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// ATRAC 编码器统一错误类型
#[derive(Debug, Error)]
pub enum AtracError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作 (如未知码率档位)
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 编解码器错误
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// I/O 错误, 原样透传给调用方
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达码流末尾
    #[error("已到达码流末尾")]
    Eof,

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 未找到指定的编解码器
    #[error("未找到编解码器: {0}")]
    CodecNotFound(String),

    /// 内部一致性错误 (不应发生, 例如比特预算溢出)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// ATRAC 编码器统一 Result 类型
pub type AtracResult<T> = Result<T, AtracError>;
