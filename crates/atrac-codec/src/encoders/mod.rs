//! 编码器实现模块.

pub mod atrac1;
pub mod atrac3;
pub mod atrac3plus;

use atrac_core::{AtracError, AtracResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::{CodecParameters, SAMPLE_RATE};
use crate::registry::CodecRegistry;

/// 注册所有内置编码器
pub fn register_all_encoders(registry: &mut CodecRegistry) {
    registry.register_encoder(CodecId::Atrac1, "atrac1", atrac1::Atrac1Encoder::create);
    registry.register_encoder(CodecId::Atrac3, "atrac3", atrac3::Atrac3Encoder::create);
    registry.register_encoder(
        CodecId::Atrac3Plus,
        "atrac3plus",
        atrac3plus::Atrac3PlusEncoder::create,
    );
}

/// 三个编码器共用的参数校验: 编解码器标识、采样率与声道数
pub(crate) fn validate_common(params: &CodecParameters, expected: CodecId) -> AtracResult<()> {
    if params.codec_id != expected {
        return Err(AtracError::InvalidArgument(format!(
            "编解码器不匹配: 期望 {}, 实际 {}",
            expected, params.codec_id
        )));
    }
    if params.sample_rate != SAMPLE_RATE {
        return Err(AtracError::Unsupported(format!(
            "{} 只支持 {} Hz, 实际 {} Hz",
            expected, SAMPLE_RATE, params.sample_rate
        )));
    }
    if !(1..=2).contains(&params.channels) {
        return Err(AtracError::InvalidArgument(format!(
            "{} 只支持 1 或 2 声道, 实际 {}",
            expected, params.channels
        )));
    }
    Ok(())
}
