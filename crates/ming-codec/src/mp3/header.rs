//! MP3 帧头解析与帧几何推导
//!
//! 帧头结构 (32 位):
//! ```text
//! AAAA AAAA  AAAB BCCD  EEEE FFGH  IIJJ KLMM
//! A = 同步位 (11 bit, 全 1)  B = MPEG 版本    C = 层
//! D = CRC 保护               E = 码率索引      F = 采样率索引
//! G = 填充位                 H = 私有位        I = 声道模式
//! J = 模式扩展               K = 版权          L = 原始/复制
//! M = 强调
//! ```
//!
//! 单个 [`FrameHeader`] 实例按帧原地重解析; 解析循环在帧尺寸自洽且
//! 下一帧起点得到佐证之前不会接受候选帧.

use log::debug;
use ming_core::{MingError, MingResult};

use super::bitstream::{Bitstream, SyncMode};

/// MPEG 版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

/// 声道模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    SingleChannel,
}

/// 48kHz 一档的采样率索引
const SAMPLE_FREQUENCY_FORTY_EIGHT: usize = 1;
/// 32kHz 一档的采样率索引
const SAMPLE_FREQUENCY_THIRTY_TWO: usize = 2;

/// MP3 帧头
///
/// 各字段仅在一次成功的 `read_frame` 与对应的 `close_frame` 之间有效.
#[derive(Debug)]
pub struct FrameHeader {
    version: MpegVersion,
    mode: ChannelMode,
    protection_bit: bool,
    padding_bit: bool,
    bitrate_index: usize,
    sample_frequency: usize,
    mode_extension: u32,
    number_of_subbands: u32,
    intensity_stereo_bound: u32,
    sync_mode: SyncMode,
    /// 帧负载字节数 (不含 4 字节帧头); 自由格式码率下可为负
    frame_size: i32,
    /// 主数据槽位数 (帧负载去掉侧边信息与 CRC)
    slots: i32,
    vbr: bool,
}

impl FrameHeader {
    pub fn new() -> Self {
        Self {
            version: MpegVersion::Mpeg1,
            mode: ChannelMode::Stereo,
            protection_bit: false,
            padding_bit: false,
            bitrate_index: 0,
            sample_frequency: 0,
            mode_extension: 0,
            number_of_subbands: 0,
            intensity_stereo_bound: 0,
            sync_mode: SyncMode::Initial,
            frame_size: -1,
            slots: 0,
            vbr: false,
        }
    }

    /// 同步并解析下一个帧头, 读入帧负载.
    ///
    /// 返回 `Ok(true)` 表示帧被接受且位游标已定位; `Ok(false)` 表示
    /// 帧负载短读, 调用方应重置后继续搜索; 保留字段组合与流结束以
    /// 错误形式返回.
    pub(crate) fn read_header(&mut self, stream: &mut Bitstream) -> MingResult<bool> {
        loop {
            let header_word = stream.sync_header(self.sync_mode)?;
            if self.sync_mode == SyncMode::Initial {
                // 版本位 20-19: 11 = MPEG1, 10 = MPEG2, 00 = MPEG2.5, 01 保留
                self.version = match ((header_word >> 20) & 1, (header_word >> 19) & 1) {
                    (1, 1) => MpegVersion::Mpeg1,
                    (1, 0) => MpegVersion::Mpeg2,
                    (0, 0) => MpegVersion::Mpeg25,
                    _ => {
                        return Err(MingError::Unsupported(format!(
                            "保留的 MPEG 版本组合: 0x{header_word:08X}"
                        )));
                    }
                };
                // 采样率索引在首次锁定时确定, 之后由严格模板钉死
                self.sample_frequency = ((header_word >> 10) & 3) as usize;
                if self.sample_frequency == 3 {
                    return Err(MingError::Unsupported("保留的采样率索引: 3".into()));
                }
            }
            let layer = 4 - ((header_word >> 17) & 3);
            if layer != 3 {
                return Err(MingError::Unsupported(format!(
                    "仅支持 Layer III, 实际为 Layer {layer}"
                )));
            }
            self.protection_bit = (header_word >> 16) & 1 != 0;
            self.bitrate_index = ((header_word >> 12) & 0xF) as usize;
            self.padding_bit = (header_word >> 9) & 1 != 0;
            self.mode = match (header_word >> 6) & 3 {
                0 => ChannelMode::Stereo,
                1 => ChannelMode::JointStereo,
                2 => ChannelMode::DualChannel,
                _ => ChannelMode::SingleChannel,
            };
            self.mode_extension = (header_word >> 4) & 3;
            self.intensity_stereo_bound = if self.mode == ChannelMode::JointStereo {
                (self.mode_extension << 2) + 4
            } else {
                0
            };

            // 子带数按 (每声道码率桶, 采样率档) 查表
            let mut channel_bitrate = self.bitrate_index as i32;
            if self.mode != ChannelMode::SingleChannel {
                if channel_bitrate == 4 {
                    channel_bitrate = 1;
                } else {
                    channel_bitrate -= 4;
                }
            }
            self.number_of_subbands = if channel_bitrate == 1 || channel_bitrate == 2 {
                if self.sample_frequency == SAMPLE_FREQUENCY_THIRTY_TWO {
                    12
                } else {
                    8
                }
            } else if self.sample_frequency == SAMPLE_FREQUENCY_FORTY_EIGHT
                || (3..=5).contains(&channel_bitrate)
            {
                27
            } else {
                30
            };
            if self.intensity_stereo_bound > self.number_of_subbands {
                self.intensity_stereo_bound = self.number_of_subbands;
            }

            self.calculate_frame_size();
            let loaded = stream.read_frame_data(self.frame_size)?;
            if self.frame_size >= 0 && loaded != self.frame_size as usize {
                // 负载短读: 帧不可信, 由调用方重置后继续搜索
                return Ok(false);
            }
            // 佐证: 帧尾紧跟的 4 字节也得像一个帧头, 排除伪同步
            if stream.is_sync_current_position(self.sync_mode)? {
                if self.sync_mode == SyncMode::Initial {
                    self.sync_mode = SyncMode::Strict;
                    stream.set_sync_word(header_word & 0xFFF8_0CC0);
                    debug!(
                        "首帧锁定, 切换严格同步: 模板 0x{:08X}, 版本 {:?}, {} Hz",
                        header_word & 0xFFF8_0C00,
                        self.version,
                        self.frequency()
                    );
                }
                break;
            }
            stream.unread_frame()?;
        }
        stream.parse_frame();
        if !self.protection_bit {
            // CRC 校验和: 16 位, 读出后丢弃
            stream.get_bits(16);
        }
        Ok(true)
    }

    /// 首帧 VBR 探测: 在版本/声道模式决定的固定偏移上比对
    /// "Xing", 再在固定偏移 32 上比对 "VBRI". 偏移越界说明首帧
    /// 声明的尺寸不可信, 按损坏的 VBR 头报错.
    pub(crate) fn parse_vbr(&mut self, frame_data: &[u8]) -> MingResult<()> {
        let xing_offset = match (self.version, self.mode) {
            (MpegVersion::Mpeg1, ChannelMode::SingleChannel) => 21 - 4,
            (MpegVersion::Mpeg1, _) => 36 - 4,
            (_, ChannelMode::SingleChannel) => 13 - 4,
            (_, _) => 21 - 4,
        };
        if xing_offset + 4 > frame_data.len() {
            return Err(MingError::CorruptVbrHeader(format!(
                "Xing 探测偏移 {xing_offset} 超出帧负载 {} 字节",
                frame_data.len()
            )));
        }
        if &frame_data[xing_offset..xing_offset + 4] == b"Xing" {
            self.vbr = true;
        }
        let vbri_offset = 36 - 4;
        if vbri_offset + 4 > frame_data.len() {
            return Err(MingError::CorruptVbrHeader(format!(
                "VBRI 探测偏移 {vbri_offset} 超出帧负载 {} 字节",
                frame_data.len()
            )));
        }
        if &frame_data[vbri_offset..vbri_offset + 4] == b"VBRI" {
            self.vbr = true;
        }
        if self.vbr {
            debug!("首帧带 VBR 标记");
        }
        Ok(())
    }

    /// 帧负载字节数 = 144 * 码率 / 采样率, LSF 减半, 填充加一,
    /// 再扣掉已消费的 4 字节帧头. 同时算出主数据槽位数.
    fn calculate_frame_size(&mut self) {
        let mut size = (144 * self.bitrate() / self.frequency()) as i32;
        if self.version != MpegVersion::Mpeg1 {
            size >>= 1;
        }
        if self.padding_bit {
            size += 1;
        }
        size -= 4;
        self.frame_size = size;

        let side_info = if self.version == MpegVersion::Mpeg1 {
            if self.mode == ChannelMode::SingleChannel { 17 } else { 32 }
        } else if self.mode == ChannelMode::SingleChannel {
            9
        } else {
            17
        };
        self.slots = self.frame_size - side_info - if self.protection_bit { 0 } else { 2 };
    }

    pub fn version(&self) -> MpegVersion {
        self.version
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn mode_extension(&self) -> u32 {
        self.mode_extension
    }

    /// 采样率 (Hz)
    pub fn frequency(&self) -> u32 {
        match self.version {
            MpegVersion::Mpeg1 => [44100, 48000, 32000][self.sample_frequency],
            MpegVersion::Mpeg2 => [22050, 24000, 16000][self.sample_frequency],
            MpegVersion::Mpeg25 => [11025, 12000, 8000][self.sample_frequency],
        }
    }

    /// 码率 (bps); 自由格式与保留索引返回 0
    pub fn bitrate(&self) -> u32 {
        const V1_L3: [u32; 16] = [
            0, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000,
            192_000, 224_000, 256_000, 320_000, 0,
        ];
        const V2_L3: [u32; 16] = [
            0, 8_000, 16_000, 24_000, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000,
            112_000, 128_000, 144_000, 160_000, 0,
        ];
        match self.version {
            MpegVersion::Mpeg1 => V1_L3[self.bitrate_index],
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => V2_L3[self.bitrate_index],
        }
    }

    /// 每帧采样数 (每声道)
    pub fn samples_per_frame(&self) -> u32 {
        if self.version == MpegVersion::Mpeg1 { 1152 } else { 576 }
    }

    /// 帧负载字节数 (不含帧头)
    pub fn frame_size(&self) -> i32 {
        self.frame_size
    }

    /// 主数据槽位数
    pub fn slots(&self) -> i32 {
        self.slots
    }

    pub fn number_of_subbands(&self) -> u32 {
        self.number_of_subbands
    }

    pub fn intensity_stereo_bound(&self) -> u32 {
        self.intensity_stereo_bound
    }

    pub fn protection_bit(&self) -> bool {
        self.protection_bit
    }

    pub fn padding_bit(&self) -> bool {
        self.padding_bit
    }

    /// 首帧是否带有 Xing/VBRI 标记
    pub fn vbr(&self) -> bool {
        self.vbr
    }
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with(version: MpegVersion, mode: ChannelMode, bitrate_index: usize, sample_frequency: usize, padding: bool) -> FrameHeader {
        let mut h = FrameHeader::new();
        h.version = version;
        h.mode = mode;
        h.bitrate_index = bitrate_index;
        h.sample_frequency = sample_frequency;
        h.padding_bit = padding;
        h.protection_bit = true;
        h
    }

    #[test]
    fn test_帧大小_mpeg1_128k_44100() {
        let mut h = header_with(MpegVersion::Mpeg1, ChannelMode::Stereo, 9, 0, false);
        h.calculate_frame_size();
        // 144 * 128000 / 44100 = 417, 减 4 字节帧头
        assert_eq!(h.frame_size(), 413);
        // 负载 - 32 字节侧边信息
        assert_eq!(h.slots(), 413 - 32);
    }

    #[test]
    fn test_帧大小_填充位() {
        let mut h = header_with(MpegVersion::Mpeg1, ChannelMode::Stereo, 9, 0, true);
        h.calculate_frame_size();
        assert_eq!(h.frame_size(), 414);
    }

    #[test]
    fn test_帧大小_lsf_减半() {
        let mut h = header_with(MpegVersion::Mpeg2, ChannelMode::SingleChannel, 4, 1, false);
        h.protection_bit = false;
        h.calculate_frame_size();
        // 144 * 32000 / 24000 = 192, LSF 减半 96, 减 4
        assert_eq!(h.frame_size(), 92);
        // 单声道 LSF 侧边信息 9 字节, 无 CRC 保护时再扣 2 字节校验和
        assert_eq!(h.slots(), 92 - 9 - 2);
    }

    #[test]
    fn test_帧大小_mpeg25() {
        let mut h = header_with(MpegVersion::Mpeg25, ChannelMode::SingleChannel, 1, 2, false);
        h.calculate_frame_size();
        // 144 * 8000 / 8000 = 144, 减半 72, 减 4
        assert_eq!(h.frame_size(), 68);
    }

    #[test]
    fn test_vbr_探测_xing() {
        let mut h = header_with(MpegVersion::Mpeg1, ChannelMode::Stereo, 9, 0, false);
        h.calculate_frame_size();
        let mut frame = vec![0u8; h.frame_size() as usize];
        frame[32..36].copy_from_slice(b"Xing");
        h.parse_vbr(&frame).unwrap();
        assert!(h.vbr());
    }

    #[test]
    fn test_vbr_探测_vbri() {
        let mut h = header_with(MpegVersion::Mpeg2, ChannelMode::SingleChannel, 4, 1, false);
        h.calculate_frame_size();
        let mut frame = vec![0u8; h.frame_size() as usize];
        frame[32..36].copy_from_slice(b"VBRI");
        h.parse_vbr(&frame).unwrap();
        assert!(h.vbr());
    }

    #[test]
    fn test_vbr_探测_偏移越界报错() {
        let mut h = header_with(MpegVersion::Mpeg1, ChannelMode::Stereo, 9, 0, false);
        h.frame_size = 20;
        let frame = [0u8; 20];
        assert!(matches!(
            h.parse_vbr(&frame),
            Err(MingError::CorruptVbrHeader(_))
        ));
    }
}
