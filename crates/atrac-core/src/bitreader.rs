//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区读取数据, 供 ATRAC1 反量化路径使用.

use crate::{AtracError, AtracResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use atrac_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> AtracResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(AtracError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(AtracError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取有符号整数 (二进制补码, 符号扩展)
    pub fn read_bits_signed(&mut self, n: u32) -> AtracResult<i32> {
        let val = self.read_bits(n)?;
        Ok(sign_extend(val, n))
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> AtracResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(AtracError::Eof);
        }

        let total_bits = self.bit_pos as u32 + n;
        self.byte_pos += (total_bits / 8) as usize;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }
}

/// 将 N 位二进制补码值符号扩展为 i32
pub fn sign_extend(val: u32, n: u32) -> i32 {
    if n == 0 {
        return 0;
    }
    if n >= 32 {
        return val as i32;
    }
    if (val >> (n - 1)) & 1 != 0 {
        val as i32 | !((1i32 << n) - 1)
    } else {
        val as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_cross_byte() {
        let data = [0b10110000, 0b00010000];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(3).unwrap(), 0b101);
        assert_eq!(br.read_bits(9).unwrap(), 0b1_0000_0001);
        assert_eq!(br.bits_read(), 12);
        assert_eq!(br.bits_left(), 4);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0xAB];
        let mut br = BitReader::new(&data);
        assert!(matches!(br.read_bits(9), Err(AtracError::Eof)));
        br.skip_bits(6).unwrap();
        assert_eq!(br.read_bits(2).unwrap(), 0b11);
        assert!(matches!(br.skip_bits(1), Err(AtracError::Eof)));
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b1111, 4), -1);
        assert_eq!(sign_extend(0b0111, 4), 7);
        assert_eq!(sign_extend(0b1000, 4), -8);
        assert_eq!(sign_extend(0b10, 2), -2);
        assert_eq!(sign_extend(0, 0), 0);
    }
}
