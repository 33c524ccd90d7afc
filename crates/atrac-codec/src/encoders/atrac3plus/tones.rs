//! ATRAC3+ 正弦分量 (GHA) 边信息.
//!
//! 每个音调频带写出包络、分量数、频率、幅度与相位. 频率按升序或降序
//! 差分打包, 取总比特更少的方向.

use atrac_core::{AtracError, AtracResult};

use crate::frame::{ToneBand, WaveParam};
use crate::tables::atrac3plus::{MAX_TONE_BANDS, num_tone_bands_table};

use super::bitstream::BitBuf;

/// 每个频带最多的正弦分量数 (4 位字段)
pub const MAX_WAVES_PER_BAND: usize = 15;
/// 每声道每帧最多的正弦分量数
pub const MAX_WAVES_PER_CHANNEL: usize = 48;

/// 频率打包方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TonePackOrder {
    Asc,
    Desc,
}

/// 打包后的单个频率码字
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TonePackEntry {
    pub code: u16,
    pub bits: u16,
}

/// 一个频带的频率打包结果 (不含方向位)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TonePackResult {
    /// 按写出顺序排列
    pub data: Vec<TonePackEntry>,
    pub used_bits: usize,
    pub order: TonePackOrder,
}

/// `floor(log2(v))`, 0 按 0 处理
fn log2_floor(v: u16) -> u16 {
    if v == 0 { 0 } else { 15 - v.leading_zeros() as u16 }
}

fn pack_asc(waves: &[WaveParam]) -> Vec<TonePackEntry> {
    let mut out = Vec::with_capacity(waves.len());
    let mut prev: Option<u16> = None;
    for w in waves {
        let f = w.freq_index;
        let entry = match prev {
            Some(p) if p >= 512 => {
                let bits = log2_floor(1023 - p) + 1;
                TonePackEntry {
                    code: f + (1 << bits) - 1024,
                    bits,
                }
            }
            _ => TonePackEntry { code: f, bits: 10 },
        };
        out.push(entry);
        prev = Some(f);
    }
    out
}

fn pack_desc(waves: &[WaveParam]) -> Vec<TonePackEntry> {
    let mut out = Vec::with_capacity(waves.len());
    let mut prev: Option<u16> = None;
    for w in waves.iter().rev() {
        let f = w.freq_index;
        let bits = match prev {
            None => 10,
            Some(p) => log2_floor(p) + 1,
        };
        out.push(TonePackEntry { code: f, bits });
        prev = Some(f);
    }
    out
}

/// 频率打包, 两个方向比特相同时取降序
///
/// `waves` 必须按频率升序排列.
pub fn create_freq_bit_pack(waves: &[WaveParam]) -> TonePackResult {
    let total = |d: &[TonePackEntry]| d.iter().map(|e| e.bits as usize).sum::<usize>();
    let asc = pack_asc(waves);
    let asc_bits = total(&asc);
    if waves.len() > 1 {
        let desc = pack_desc(waves);
        let desc_bits = total(&desc);
        if desc_bits <= asc_bits {
            return TonePackResult {
                data: desc,
                used_bits: desc_bits,
                order: TonePackOrder::Desc,
            };
        }
    }
    TonePackResult {
        data: asc,
        used_bits: asc_bits,
        order: TonePackOrder::Asc,
    }
}

/// 校验单声道的正弦参数
pub fn validate_tone_bands(bands: &[ToneBand]) -> AtracResult<()> {
    if bands.len() > MAX_TONE_BANDS {
        return Err(AtracError::InvalidArgument(format!(
            "音调频带数 {} 超过 {}",
            bands.len(),
            MAX_TONE_BANDS
        )));
    }
    let mut total = 0;
    for (i, band) in bands.iter().enumerate() {
        if band.waves.len() > MAX_WAVES_PER_BAND {
            return Err(AtracError::InvalidArgument(format!(
                "频带 {} 的正弦分量过多: {}",
                i,
                band.waves.len()
            )));
        }
        total += band.waves.len();
        if band.waves.windows(2).any(|w| w[0].freq_index > w[1].freq_index) {
            return Err(AtracError::InvalidArgument(format!("频带 {} 的频率未按升序排列", i)));
        }
        if band
            .waves
            .iter()
            .any(|w| w.freq_index > 1023 || w.amp_sf > 63 || w.phase_index > 31)
        {
            return Err(AtracError::InvalidArgument(format!("频带 {} 的正弦参数越界", i)));
        }
        let env = &band.envelope;
        if env.start.is_some_and(|s| s > 31) || env.stop.is_some_and(|s| s > 31) {
            return Err(AtracError::InvalidArgument(format!("频带 {} 的包络位置越界", i)));
        }
    }
    if total > MAX_WAVES_PER_CHANNEL {
        return Err(AtracError::InvalidArgument(format!("正弦分量总数 {} 超过 {}", total, MAX_WAVES_PER_CHANNEL)));
    }
    Ok(())
}

/// 写出全零的子带标志
fn write_no_subband_flags(buf: &mut BitBuf) {
    buf.insert(0, 1);
}

/// 全部声道的正弦边信息
///
/// 第二声道不与第一声道共享任何频带, 各字段均使用定长模式.
pub fn pack_tonal_block(channels: &[&[ToneBand]], buf: &mut BitBuf) -> AtracResult<()> {
    let num_bands = channels
        .iter()
        .filter_map(|bands| bands.iter().rposition(|b| !b.waves.is_empty()))
        .max()
        .map(|last| last + 1);

    let Some(num_bands) = num_bands else {
        // tones_present
        buf.insert(0, 1);
        return Ok(());
    };

    buf.insert(1, 1);
    // amplitude_mode
    buf.insert(1, 1);
    let vlc = num_tone_bands_table()?[num_bands - 1];
    buf.insert(vlc.code as u32, vlc.len as u32);

    if channels.len() == 2 {
        // 共享、主声道、相位反转标志
        for _ in 0..3 {
            write_no_subband_flags(buf);
        }
    }

    let empty = ToneBand::default();
    for (ch, bands) in channels.iter().enumerate() {
        let band = |i: usize| bands.get(i).unwrap_or(&empty);

        if ch > 0 {
            buf.insert(0, 1);
        }
        for i in 0..num_bands {
            let env = band(i).envelope;
            match env.start {
                Some(s) => {
                    buf.insert(1, 1);
                    buf.insert(s as u32, 5);
                }
                None => buf.insert(0, 1),
            }
            match env.stop {
                Some(s) => {
                    buf.insert(1, 1);
                    buf.insert(s as u32, 5);
                }
                None => buf.insert(0, 1),
            }
        }

        buf.insert(0, ch as u32 + 1);
        for i in 0..num_bands {
            buf.insert(band(i).waves.len() as u32, 4);
        }

        if ch > 0 {
            buf.insert(0, 1);
        }
        for i in 0..num_bands {
            let waves = &band(i).waves;
            if waves.is_empty() {
                continue;
            }
            let pack = create_freq_bit_pack(waves);
            if waves.len() > 1 {
                buf.insert((pack.order == TonePackOrder::Desc) as u32, 1);
            }
            for e in &pack.data {
                buf.insert(e.code as u32, e.bits as u32);
            }
        }

        buf.insert(0, ch as u32 + 1);
        for i in 0..num_bands {
            for w in &band(i).waves {
                buf.insert(w.amp_sf as u32, 6);
            }
        }

        for i in 0..num_bands {
            for w in &band(i).waves {
                buf.insert(w.phase_index as u32, 5);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::WaveEnvelope;

    fn waves(freqs: &[u16]) -> Vec<WaveParam> {
        freqs.iter().map(|&f| WaveParam::new(f, 0, 0)).collect()
    }

    fn entries(r: &TonePackResult) -> Vec<(u16, u16)> {
        r.data.iter().map(|e| (e.code, e.bits)).collect()
    }

    #[test]
    fn test_freq_bit_pack_single() {
        let r = create_freq_bit_pack(&waves(&[1]));
        assert_eq!(r.used_bits, 10);
        assert_eq!(r.order, TonePackOrder::Asc);
        assert_eq!(entries(&r), vec![(1, 10)]);
    }

    #[test]
    fn test_freq_bit_pack_512_1020_1023() {
        let r = create_freq_bit_pack(&waves(&[512, 1020, 1023]));
        assert_eq!(r.used_bits, 21);
        assert_eq!(r.order, TonePackOrder::Asc);
        assert_eq!(entries(&r), vec![(512, 10), (508, 9), (3, 2)]);
    }

    #[test]
    fn test_freq_bit_pack_1_2_3() {
        let r = create_freq_bit_pack(&waves(&[1, 2, 3]));
        assert_eq!(r.used_bits, 14);
        assert_eq!(r.order, TonePackOrder::Desc);
        assert_eq!(entries(&r), vec![(3, 10), (2, 2), (1, 2)]);
    }

    #[test]
    fn test_freq_bit_pack_1_2_3_1020_1021_1022() {
        let r = create_freq_bit_pack(&waves(&[1, 2, 3, 1020, 1021, 1022]));
        assert_eq!(r.used_bits, 44);
        assert_eq!(r.order, TonePackOrder::Desc);
        assert_eq!(
            entries(&r),
            vec![(1022, 10), (1021, 10), (1020, 10), (3, 10), (2, 2), (1, 2)]
        );
    }

    #[test]
    fn test_freq_bit_pack_1_2_1020_1021_1022() {
        let r = create_freq_bit_pack(&waves(&[1, 2, 1020, 1021, 1022]));
        assert_eq!(r.used_bits, 34);
        assert_eq!(r.order, TonePackOrder::Asc);
        assert_eq!(entries(&r), vec![(1, 10), (2, 10), (1020, 10), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_freq_bit_pack_zero_predecessor() {
        let r = create_freq_bit_pack(&waves(&[0, 0]));
        assert_eq!(r.order, TonePackOrder::Desc);
        assert_eq!(entries(&r), vec![(0, 10), (0, 1)]);
    }

    #[test]
    fn test_no_tones_is_one_bit() {
        let mut buf = BitBuf::default();
        pack_tonal_block(&[&[], &[ToneBand::default()]], &mut buf).unwrap();
        assert_eq!(buf.bits(), 1);
    }

    #[test]
    fn test_mono_tone_block_bits() {
        let band = ToneBand {
            waves: vec![WaveParam::new(100, 40, 7), WaveParam::new(700, 30, 3)],
            envelope: WaveEnvelope {
                start: Some(4),
                stop: None,
            },
        };
        let bands = [band];
        let mut buf = BitBuf::default();
        pack_tonal_block(&[&bands], &mut buf).unwrap();

        let pack = create_freq_bit_pack(&bands[0].waves);
        // 标志 2 + 频带数 2 + 包络 7 + 分量数 1+4 + 方向 1 + 频率 + 幅度 1+12 + 相位 10
        assert_eq!(buf.bits(), 2 + 2 + 7 + 5 + 1 + pack.used_bits + 13 + 10);
    }

    #[test]
    fn test_validate_tone_bands() {
        let ok = vec![ToneBand {
            waves: waves(&[3, 9]),
            envelope: WaveEnvelope::default(),
        }];
        assert!(validate_tone_bands(&ok).is_ok());

        let unsorted = vec![ToneBand {
            waves: waves(&[9, 3]),
            envelope: WaveEnvelope::default(),
        }];
        assert!(validate_tone_bands(&unsorted).is_err());

        let too_many = vec![ToneBand::default(); MAX_TONE_BANDS + 1];
        assert!(validate_tone_bands(&too_many).is_err());

        let bad_env = vec![ToneBand {
            waves: Vec::new(),
            envelope: WaveEnvelope {
                start: Some(32),
                stop: None,
            },
        }];
        assert!(validate_tone_bands(&bad_env).is_err());
    }
}
