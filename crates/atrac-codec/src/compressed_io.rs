//! 压缩输出接口.
//!
//! 容器格式 (AEA/OMA/RM 等) 不在编码核心之内, 编码器只通过
//! `CompressedOutput` 逐帧交付定长数据.

use atrac_core::AtracResult;

use crate::packet::Packet;

/// 压缩数据输出端
pub trait CompressedOutput {
    /// 写入一帧序列化后的数据
    ///
    /// I/O 失败以 `AtracError::Io` 原样返回.
    fn write_frame(&mut self, data: &[u8]) -> AtracResult<()>;

    /// 容器声道数
    fn channel_num(&self) -> usize;

    /// 容器中记录的节目名称
    fn name(&self) -> &str;
}

/// 内存输出端, 收集全部帧
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    name: String,
    channels: usize,
    packets: Vec<Packet>,
}

impl MemoryOutput {
    pub fn new(name: impl Into<String>, channels: usize) -> Self {
        Self {
            name: name.into(),
            channels,
            packets: Vec::new(),
        }
    }

    /// 已收集的数据包
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// 取出已收集的数据包
    pub fn take_packets(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.packets)
    }
}

impl CompressedOutput for MemoryOutput {
    fn write_frame(&mut self, data: &[u8]) -> AtracResult<()> {
        let pts = self.packets.len() as i64;
        self.packets
            .push(Packet::from_data(bytes::Bytes::copy_from_slice(data), pts));
        Ok(())
    }

    fn channel_num(&self) -> usize {
        self.channels
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 直接写入任意 `std::io::Write` 的输出端 (无容器头)
pub struct RawOutput<W: std::io::Write> {
    writer: W,
    name: String,
    channels: usize,
}

impl<W: std::io::Write> RawOutput<W> {
    pub fn new(writer: W, name: impl Into<String>, channels: usize) -> Self {
        Self {
            writer,
            name: name.into(),
            channels,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: std::io::Write> CompressedOutput for RawOutput<W> {
    fn write_frame(&mut self, data: &[u8]) -> AtracResult<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn channel_num(&self) -> usize {
        self.channels
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_output_collects_frames() {
        let mut out = MemoryOutput::new("test", 2);
        out.write_frame(&[1, 2, 3]).unwrap();
        out.write_frame(&[4]).unwrap();
        assert_eq!(out.channel_num(), 2);
        assert_eq!(out.name(), "test");
        assert_eq!(out.packets().len(), 2);
        assert_eq!(out.packets()[1].pts, 1);
        assert_eq!(out.packets()[0].size(), 3);
    }

    #[test]
    fn test_raw_output_concatenates_frames() {
        let mut out = RawOutput::new(Vec::new(), "raw", 1);
        out.write_frame(&[1, 2]).unwrap();
        out.write_frame(&[3]).unwrap();
        assert_eq!(out.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_raw_output_passes_io_error() {
        struct Broken;
        impl std::io::Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut out = RawOutput::new(Broken, "x", 1);
        let err = out.write_frame(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, atrac_core::AtracError::Io(_)));
    }
}
