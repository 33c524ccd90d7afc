//! # atrac-core
//!
//! ATRAC 编码器核心库, 提供错误类型与按位读写工具.
//!
//! 上层的 `atrac-codec` 在此之上实现比特分配与帧序列化.

pub mod bitreader;
pub mod bitwriter;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{AtracError, AtracResult};
