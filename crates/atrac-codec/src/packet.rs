//! 压缩数据包 (Packet).
//!
//! 表示编码器产出的一帧定长压缩数据.

use bytes::Bytes;

/// 压缩数据包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 帧序号 (从 0 开始)
    pub pts: i64,
}

impl Packet {
    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>, pts: i64) -> Self {
        Self {
            data: data.into(),
            pts,
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
