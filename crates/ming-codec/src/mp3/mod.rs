//! MP3 (MPEG-1/2/2.5 Layer III) 位流前端.
//!
//! 文件结构:
//! ```text
//! [ID3v2 标签 (可选)]
//! [MPEG 音频帧 #0]
//!   ├── 帧同步码 (11 bit, 全 1)
//!   ├── 帧头 (版本, 层, 码率, 采样率, 声道模式等)
//!   └── 帧负载 (侧边信息 + 主数据)
//! [MPEG 音频帧 #1]
//! ...
//! ```
//!
//! 本模块覆盖到熵解码为止的位流层: 帧同步与帧头解析
//! ([`Bitstream`]/[`FrameHeader`]), 跨帧比特储备 ([`BitReservoir`]),
//! 以及谱系数的 Huffman 解码 ([`HuffmanTables`]). 反量化、立体声
//! 还原、IMDCT 与合成滤波属于下游协作者, 它们通过帧头访问器、储备
//! 库读取接口与 Huffman 解码入口消费这里产出的数据.

mod bit_reservoir;
mod bitstream;
mod header;
mod huffman;
mod tables;

pub use bit_reservoir::BitReservoir;
pub use bitstream::{Bitstream, SyncMode};
pub use header::{ChannelMode, FrameHeader, MpegVersion};
pub use huffman::{HuffmanTable, HuffmanTables, HuffmanValue};

use bytes::Bytes;
use ming_core::{MingError, MingResult, PushbackSource};

/// MP3 帧读取会话
///
/// 持有位流同步器和按帧原地重解析的帧头. 解码按单线程同步顺序推进:
/// 一帧完整地同步、校验、消费之后才开始下一帧的同步.
pub struct Mp3FrameReader {
    stream: Bitstream,
    header: FrameHeader,
    first_frame: bool,
}

impl Mp3FrameReader {
    /// 接管字节源并完成初始化 (含 ID3v2 跳过)
    pub fn new(source: PushbackSource) -> Self {
        Self {
            stream: Bitstream::new(source),
            header: FrameHeader::new(),
            first_frame: true,
        }
    }

    /// 打开文件并创建会话
    pub fn open(path: &str) -> MingResult<Self> {
        Ok(Self::new(PushbackSource::open_file(path)?))
    }

    /// 同步并解析下一帧.
    ///
    /// 返回 `Ok(None)` 表示流结束; 尾部残缺的帧同样按流结束处理.
    /// 在调用 [`close_frame`](Self::close_frame) 之前重复调用不会
    /// 推进流, 返回同一帧的帧头.
    pub fn read_frame(&mut self) -> MingResult<Option<&FrameHeader>> {
        if self.stream.frame_size() == -1 {
            loop {
                match self.header.read_header(&mut self.stream) {
                    Ok(true) => break,
                    Ok(false) => self.stream.close_frame(),
                    Err(MingError::Eof) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }
        }
        if self.first_frame {
            self.header.parse_vbr(self.stream.frame_data())?;
            self.first_frame = false;
        }
        Ok(Some(&self.header))
    }

    /// 结束当前帧: 重置位游标到未定位状态.
    /// 无论该帧的后续解码成败, 每帧之后都必须走到这里.
    pub fn close_frame(&mut self) {
        self.stream.close_frame();
    }

    /// 当前帧的帧头
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// 位流访问 (侧边信息与主数据搬运用)
    pub fn bitstream(&mut self) -> &mut Bitstream {
        &mut self.stream
    }

    /// 流开头的 ID3v2 标签原始字节 (若有)
    pub fn id3v2_tag(&self) -> Option<&Bytes> {
        self.stream.id3v2_tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造 MPEG1 Layer III 帧头字
    fn header_word(bitrate_idx: u32, sr_idx: u32, padding: bool, mode: u32) -> u32 {
        // 同步 11 位 + 版本 MPEG1 (11) + Layer III (01) + 无 CRC (1)
        let mut word = 0xFFFB_0000u32;
        word |= (bitrate_idx & 0xF) << 12;
        word |= (sr_idx & 0x3) << 10;
        if padding {
            word |= 1 << 9;
        }
        word |= (mode & 0x3) << 6;
        word
    }

    /// 按帧头算出的长度构造完整帧 (负载填 0)
    fn build_frame(bitrate_idx: u32, sr_idx: u32, padding: bool, mode: u32) -> Vec<u8> {
        let word = header_word(bitrate_idx, sr_idx, padding, mode);
        let bitrate = [
            0u32, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000,
            160_000, 192_000, 224_000, 256_000, 320_000, 0,
        ][bitrate_idx as usize];
        let freq = [44100u32, 48000, 32000][sr_idx as usize];
        let mut size = (144 * bitrate / freq) as usize;
        if padding {
            size += 1;
        }
        let mut frame = vec![0u8; size];
        frame[0..4].copy_from_slice(&word.to_be_bytes());
        frame
    }

    fn reader_of(data: Vec<u8>) -> Mp3FrameReader {
        Mp3FrameReader::new(PushbackSource::from_bytes(data))
    }

    #[test]
    fn test_三帧流逐帧读取() {
        let frame = build_frame(9, 0, false, 0);
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend_from_slice(&frame);
        }
        let mut reader = reader_of(data);
        for _ in 0..3 {
            let header = reader.read_frame().unwrap().expect("应读出帧");
            assert_eq!(header.frequency(), 44100);
            assert_eq!(header.mode(), ChannelMode::Stereo);
            assert_eq!(header.frame_size(), 413);
            assert_eq!(header.bitrate(), 128_000);
            reader.close_frame();
        }
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_未关帧时重复读取不推进() {
        let frame = build_frame(9, 0, false, 0);
        let mut data = frame.clone();
        data.extend_from_slice(&frame);
        let mut reader = reader_of(data);
        assert!(reader.read_frame().unwrap().is_some());
        // 不 close_frame 再读: 仍是同一帧, 流不动
        assert!(reader.read_frame().unwrap().is_some());
        reader.close_frame();
        assert!(reader.read_frame().unwrap().is_some());
        reader.close_frame();
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_前导垃圾字节后锁定() {
        let frame = build_frame(9, 0, false, 0);
        let mut data = vec![0x00, 0x42];
        data.extend_from_slice(&frame);
        data.extend_from_slice(&frame);
        let mut reader = reader_of(data);
        let header = reader.read_frame().unwrap().expect("应跳过垃圾字节后锁定");
        assert_eq!(header.frame_size(), 413);
    }

    #[test]
    fn test_id3v2_后正常解析() {
        let frame = build_frame(9, 0, false, 0);
        let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x64".to_vec();
        data.extend(std::iter::repeat_n(0u8, 100));
        data.extend_from_slice(&frame);
        data.extend_from_slice(&frame);
        let mut reader = reader_of(data);
        assert_eq!(reader.id3v2_tag().unwrap().len(), 110);
        assert!(reader.read_frame().unwrap().is_some());
    }

    #[test]
    fn test_首帧_xing_标记() {
        let mut frame = build_frame(9, 0, false, 0);
        frame[4 + 32..4 + 36].copy_from_slice(b"Xing");
        let mut data = frame.clone();
        data.extend_from_slice(&build_frame(9, 0, false, 0));
        let mut reader = reader_of(data);
        let header = reader.read_frame().unwrap().unwrap();
        assert!(header.vbr());
    }

    #[test]
    fn test_单声道帧() {
        let frame = build_frame(9, 0, false, 3);
        let mut data = frame.clone();
        data.extend_from_slice(&frame);
        let mut reader = reader_of(data);
        let header = reader.read_frame().unwrap().unwrap();
        assert_eq!(header.mode(), ChannelMode::SingleChannel);
        assert_eq!(header.slots(), 413 - 17 - 2);
    }

    #[test]
    fn test_强度立体声边界推导() {
        // 联合立体声, 模式扩展 0 -> 边界 4
        let frame = build_frame(9, 0, false, 1);
        let mut data = frame.clone();
        data.extend_from_slice(&frame);
        let mut reader = reader_of(data);
        let header = reader.read_frame().unwrap().unwrap();
        assert_eq!(header.mode(), ChannelMode::JointStereo);
        assert_eq!(header.intensity_stereo_bound(), 4);
        assert_eq!(header.number_of_subbands(), 30);
    }

    #[test]
    fn test_截断末帧按流结束() {
        let frame = build_frame(9, 0, false, 0);
        let mut data = Vec::new();
        data.extend_from_slice(&frame);
        data.extend_from_slice(&frame[..100]); // 残缺的第二帧
        let mut reader = reader_of(data);
        assert!(reader.read_frame().unwrap().is_some());
        reader.close_frame();
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_帧头后按位读取侧边信息区() {
        let mut frame = build_frame(9, 0, false, 0);
        frame[4] = 0b1010_1100; // 负载首字节
        let mut data = frame.clone();
        data.extend_from_slice(&build_frame(9, 0, false, 0));
        let mut reader = reader_of(data);
        reader.read_frame().unwrap().unwrap();
        // 帧头无 CRC 保护位为 1, 不跳 CRC, 直接落在负载起点
        assert_eq!(reader.bitstream().get_bits(8), 0b1010_1100);
    }
}
