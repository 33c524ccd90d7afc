//! 编解码器标识符.
//!
//! 为 ATRAC 家族的每个变体分配唯一标识.

use std::fmt;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// ATRAC1 (MiniDisc, 每声道 212 字节帧)
    Atrac1,
    /// ATRAC3 (LP2/LP4, 按码率档位确定帧长)
    Atrac3,
    /// ATRAC3+ (可配置帧长)
    Atrac3Plus,
}

impl CodecId {
    /// 获取编解码器名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Atrac1 => "atrac1",
            Self::Atrac3 => "atrac3",
            Self::Atrac3Plus => "atrac3plus",
        }
    }

    /// 每帧每声道的频谱线数 (即 MDCT 输出长度)
    pub const fn frame_samples(&self) -> usize {
        match self {
            Self::Atrac1 => 512,
            Self::Atrac3 => 1024,
            Self::Atrac3Plus => 2048,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_id_display() {
        assert_eq!(CodecId::Atrac3Plus.to_string(), "atrac3plus");
        assert_eq!(CodecId::Atrac1.frame_samples(), 512);
    }
}
