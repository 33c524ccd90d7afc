//! 编码器注册表.
//!
//! 按 CodecId 查找并实例化编码器.

use std::collections::HashMap;

use atrac_core::{AtracError, AtracResult};

use crate::codec_id::CodecId;
use crate::encoder::Encoder;

/// 编码器工厂函数类型
pub type EncoderFactory = fn() -> AtracResult<Box<dyn Encoder>>;

/// 编码器注册表
pub struct CodecRegistry {
    /// 编码器工厂映射
    encoders: HashMap<CodecId, Vec<EncoderEntry>>,
}

/// 编码器注册条目
struct EncoderEntry {
    /// 编码器名称
    name: String,
    /// 工厂函数
    factory: EncoderFactory,
}

impl CodecRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            encoders: HashMap::new(),
        }
    }

    /// 注册一个编码器
    pub fn register_encoder(&mut self, codec_id: CodecId, name: impl Into<String>, factory: EncoderFactory) {
        self.encoders
            .entry(codec_id)
            .or_default()
            .push(EncoderEntry {
                name: name.into(),
                factory,
            });
    }

    /// 创建指定编解码器 ID 的编码器实例
    pub fn create_encoder(&self, codec_id: CodecId) -> AtracResult<Box<dyn Encoder>> {
        let entry = self
            .encoders
            .get(&codec_id)
            .and_then(|entries| entries.first())
            .ok_or_else(|| AtracError::CodecNotFound(format!("未找到 {} 的编码器", codec_id)))?;
        (entry.factory)()
    }

    /// 获取所有已注册的编码器名称
    pub fn list_encoders(&self) -> Vec<(CodecId, &str)> {
        let mut result = Vec::new();
        for (id, entries) in &self.encoders {
            for entry in entries {
                result.push((*id, entry.name.as_str()));
            }
        }
        result
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
