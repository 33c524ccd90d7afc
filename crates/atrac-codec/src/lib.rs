//! # atrac-codec
//!
//! ATRAC 家族 (ATRAC1 / ATRAC3 / ATRAC3+) 编码核心.
//!
//! 输入为已完成 QMF 与 MDCT 的频谱帧, 输出为定长压缩帧. 核心包括:
//!
//! - 缩放因子量化与离散度分析
//! - 以 shift/lambda 对分搜索为核心的比特分配
//! - 多阶段码流编码框架 (`bs_encode`)
//! - 三个变体的帧序列化
//!
//! ## 使用示例
//!
//! ```rust
//! use atrac_codec::{CodecId, CodecParameters, CodecRegistry, MemoryOutput, SpectralFrame};
//! use atrac_codec::frame::ChannelSpectrum;
//!
//! let mut reg = CodecRegistry::new();
//! atrac_codec::register_all(&mut reg);
//!
//! let mut encoder = reg.create_encoder(CodecId::Atrac1).unwrap();
//! encoder.open(&CodecParameters::new(CodecId::Atrac1, 1, 146_000)).unwrap();
//!
//! let frame = SpectralFrame::new(vec![ChannelSpectrum::from_specs(vec![0.0; 512])]);
//! let mut out = MemoryOutput::new("demo", 1);
//! encoder.encode_frame(&frame, &mut out).unwrap();
//! assert_eq!(out.packets()[0].size(), 212);
//! ```

pub mod bitalloc;
pub mod bs_encode;
pub mod codec_id;
pub mod codec_parameters;
pub mod compressed_io;
pub mod decoders;
pub mod encoder;
pub mod encoders;
pub mod frame;
pub mod packet;
pub mod psy;
pub mod registry;
pub mod scale;
pub mod tables;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{Atrac1Params, Atrac3Params, Atrac3PlusParams, CodecParameters, CodecParamsType};
pub use compressed_io::{CompressedOutput, MemoryOutput, RawOutput};
pub use decoders::atrac1::{Atrac1Dequantiser, DequantisedUnit};
pub use encoder::Encoder;
pub use frame::{BlockSizeMode, SpectralFrame};
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置编码器
pub fn register_all(registry: &mut CodecRegistry) {
    encoders::register_all_encoders(registry);
}
