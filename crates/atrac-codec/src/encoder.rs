//! 编码器 trait 定义.
//!
//! 所有 ATRAC 编码器实现必须实现 `Encoder` trait.

use atrac_core::AtracResult;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::compressed_io::CompressedOutput;
use crate::frame::SpectralFrame;

/// 编码器 trait
///
/// 编码流程:
/// 1. 调用 `open()` 提供参数并完成校验
/// 2. 按顺序对每帧频谱调用 `encode_frame()`, 每次向输出写入一个定长帧
/// 3. 切换到新的音频流前调用 `reset()` 清空跨帧状态 (响度估计等)
pub trait Encoder: Send {
    /// 获取编码器标识
    fn codec_id(&self) -> CodecId;

    /// 获取编码器名称
    fn name(&self) -> &str;

    /// 使用参数配置编码器
    fn open(&mut self, params: &CodecParameters) -> AtracResult<()>;

    /// 编码一帧频谱并写入输出
    ///
    /// # 返回
    /// - `Ok(())`: 帧已写入
    /// - `Err(AtracError::Codec)`: 编码器尚未打开
    /// - `Err(AtracError::InvalidArgument)`: 声道数、窗长模式或边信息与参数不符
    /// - `Err(AtracError::Internal)`: 分配结果超出帧容量
    fn encode_frame(&mut self, frame: &SpectralFrame, output: &mut dyn CompressedOutput) -> AtracResult<()>;

    /// 清空跨帧状态
    fn reset(&mut self);
}
