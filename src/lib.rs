//! # atrac
//!
//! 纯 Rust 实现的 ATRAC 家族编码核心.
//!
//! 输入为已完成 QMF 分析与 MDCT 的频谱帧, 输出为定长压缩帧:
//! - **ATRAC1**: 212 字节声音单元, 3 个 QMF 频带, 52 个 BFU
//! - **ATRAC3**: 按码率档位决定帧长, 含音调分量与增益控制
//! - **ATRAC3+**: 可配置帧长, 32 个 QU, 含 GHA 正弦分量边信息
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use atrac::codec::{CodecId, CodecParameters, MemoryOutput, SpectralFrame};
//! use atrac::codec::frame::ChannelSpectrum;
//!
//! let registry = atrac::default_codec_registry();
//! let mut encoder = registry.create_encoder(CodecId::Atrac3).unwrap();
//! encoder.open(&CodecParameters::new(CodecId::Atrac3, 2, 132_300)).unwrap();
//!
//! let channel = ChannelSpectrum::from_specs(vec![0.0; 1024]);
//! let frame = SpectralFrame::new(vec![channel.clone(), channel]);
//! let mut out = MemoryOutput::new("demo", 2);
//! encoder.encode_frame(&frame, &mut out).unwrap();
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `atrac-core` | 比特读写与错误类型 |
//! | `atrac-codec` | 量化、比特分配与帧序列化 |

pub mod logging;

/// 核心类型与工具
pub use atrac_core as core;

/// 编码器框架
pub use atrac_codec as codec;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置编码器的注册表
pub fn default_codec_registry() -> atrac_codec::CodecRegistry {
    let mut registry = atrac_codec::CodecRegistry::new();
    atrac_codec::register_all(&mut registry);
    registry
}
