//! MP3 位流同步器
//!
//! 把任意字节流变成一串尺寸精确的 Layer III 帧: 跳过开头的 ID3v2
//! 标签, 用滚动的 32 位窗口搜索同步字, 按帧头声明的长度截取原始帧
//! 字节, 再把它们按大端 32 位字重排供逐位读取.
//!
//! 同步谓词分两级: 首次锁定前只要求 11 位同步模式与各保留字段合法
//! (宽松); 锁定成功后改用从首帧捕获的模板 (严格), 避免流中途漂移到
//! 一个碰巧像帧头的字节组合上.

use bytes::Bytes;
use log::{debug, warn};
use ming_core::{MingError, MingResult, PushbackSource};

/// 帧缓冲区大小 (32 位字数), 覆盖最大帧 1732 字节
pub(crate) const BUFFER_WORD_COUNT: usize = 433;

/// 按位宽取低位的掩码表 (单次读取上限 17 比特)
const BITMASK: [u32; 18] = [
    0, 0x0000_0001, 0x0000_0003, 0x0000_0007, 0x0000_000F, 0x0000_001F, 0x0000_003F, 0x0000_007F,
    0x0000_00FF, 0x0000_01FF, 0x0000_03FF, 0x0000_07FF, 0x0000_0FFF, 0x0000_1FFF, 0x0000_3FFF,
    0x0000_7FFF, 0x0000_FFFF, 0x0001_FFFF,
];

/// 同步模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// 首次锁定前的宽松谓词
    Initial,
    /// 锁定后的严格模板匹配
    Strict,
}

/// 位流同步器
///
/// 独占底层字节源. 每帧的原始字节先进入 `frame_bytes`, 接受后重排进
/// `frame_buffer`; 两个游标以 -1 表示"未定位"(帧间状态).
pub struct Bitstream {
    source: PushbackSource,
    frame_bytes: Box<[u8; BUFFER_WORD_COUNT * 4]>,
    frame_buffer: Box<[u32; BUFFER_WORD_COUNT]>,
    /// 当前帧的负载字节数; -1 表示没有已读入的帧
    frame_size: i32,
    word_pointer: i32,
    bit_index: i32,
    sync_word: u32,
    single_ch_mode: bool,
    sync_buffer: [u8; 4],
    raw_id3v2: Option<Bytes>,
}

impl Bitstream {
    pub fn new(source: PushbackSource) -> Self {
        let mut stream = Self {
            source,
            frame_bytes: Box::new([0u8; BUFFER_WORD_COUNT * 4]),
            frame_buffer: Box::new([0u32; BUFFER_WORD_COUNT]),
            frame_size: -1,
            word_pointer: -1,
            bit_index: -1,
            sync_word: 0,
            single_ch_mode: false,
            sync_buffer: [0u8; 4],
            raw_id3v2: None,
        };
        stream.load_id3v2();
        stream.close_frame();
        stream
    }

    /// 流开头的 ID3v2 标签 (若有), 原始字节, 含 10 字节标签头.
    /// 本层不解释其内容, 仅供外部元数据读取器使用.
    pub fn id3v2_tag(&self) -> Option<&Bytes> {
        self.raw_id3v2.as_ref()
    }

    /// 尝试读取流开头的 ID3v2 标签.
    ///
    /// 标签头: "ID3" + 版本/标志 3 字节 + 4 字节 syncsafe 长度 (每字节
    /// 7 位有效). 没有合法标签时把读到的字节退回, 流位置不变; 标签
    /// 被截断时保留已读到的部分. 这里任何失败都不致命.
    fn load_id3v2(&mut self) {
        let mut head = [0u8; 10];
        let n = match self.source.read_bytes(&mut head) {
            Ok(n) => n,
            Err(_) => return,
        };
        if n < 10 || &head[0..3] != b"ID3" {
            let _ = self.source.unread(&head[..n]);
            return;
        }
        let size = (usize::from(head[6] & 0x7F) << 21)
            | (usize::from(head[7] & 0x7F) << 14)
            | (usize::from(head[8] & 0x7F) << 7)
            | usize::from(head[9] & 0x7F);
        let mut tag = vec![0u8; size + 10];
        tag[..10].copy_from_slice(&head);
        let read = self.source.read_bytes(&mut tag[10..]).unwrap_or(0);
        tag.truncate(10 + read);
        debug!("跳过 ID3v2 标签, 共 {} 字节", tag.len());
        self.raw_id3v2 = Some(Bytes::from(tag));
    }

    /// 重置帧间状态; 每帧结束后必须回到这一状态,
    /// 下一次 read_frame 才会从干净的游标开始.
    pub fn close_frame(&mut self) {
        self.frame_size = -1;
        self.word_pointer = -1;
        self.bit_index = -1;
    }

    pub(crate) fn frame_size(&self) -> i32 {
        self.frame_size
    }

    /// 当前帧的原始负载字节
    pub(crate) fn frame_data(&self) -> &[u8] {
        &self.frame_bytes[..self.frame_size.max(0) as usize]
    }

    /// 检查当前位置是否正好是一个候选帧头 (不消费字节).
    ///
    /// 剩余不足 4 字节按"已同步"处理: 尺寸精确的末帧之后跟着的
    /// 零散尾字节属于截断尾部, 不构成否定证据.
    pub(crate) fn is_sync_current_position(&mut self, mode: SyncMode) -> MingResult<bool> {
        let mut buf = [0u8; 4];
        let read = self.source.read_bytes(&mut buf)?;
        self.source.unread(&buf[..read])?;
        if read < 4 {
            return Ok(true);
        }
        let header_word = u32::from_be_bytes(buf);
        Ok(self.is_sync_mark(header_word, mode))
    }

    /// 搜索下一个满足同步谓词的 32 位窗口.
    ///
    /// 先读 3 字节, 然后逐字节滚动窗口直到命中; 搜索始终向前消费
    /// 字节, 失败的候选窗口的代价不可回收. 源耗尽返回 Eof.
    pub(crate) fn sync_header(&mut self, mode: SyncMode) -> MingResult<u32> {
        let mut buf = self.sync_buffer;
        if self.source.read_bytes(&mut buf[0..3])? != 3 {
            return Err(MingError::Eof);
        }
        let mut header_word = (u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2]);
        loop {
            header_word <<= 8;
            if self.source.read_bytes(&mut buf[3..4])? != 1 {
                return Err(MingError::Eof);
            }
            header_word |= u32::from(buf[3]);
            if self.is_sync_mark(header_word, mode) {
                self.sync_buffer = buf;
                return Ok(header_word);
            }
        }
    }

    fn is_sync_mark(&self, header_word: u32, mode: SyncMode) -> bool {
        let mut sync = match mode {
            SyncMode::Initial => (header_word & 0xFFE0_0000) == 0xFFE0_0000,
            SyncMode::Strict => {
                (header_word & 0xFFF8_0C00) == self.sync_word
                    && ((header_word & 0x0000_00C0) == 0x0000_00C0) == self.single_ch_mode
            }
        };
        // 保留字段一票否决: 采样率索引 3, layer 0, 版本 01
        if sync {
            sync = (header_word >> 10) & 3 != 3;
        }
        if sync {
            sync = (header_word >> 17) & 3 != 0;
        }
        if sync {
            sync = (header_word >> 19) & 3 != 1;
        }
        sync
    }

    /// 读取恰好 `byte_size` 字节的帧负载 (短读零填充), 返回实际读取数.
    /// 负的 `byte_size` (自由格式码率算出的几何) 按空帧处理.
    pub(crate) fn read_frame_data(&mut self, byte_size: i32) -> MingResult<usize> {
        let len = byte_size.max(0) as usize;
        let loaded = self.source.read_padded(&mut self.frame_bytes[..len])?;
        self.frame_size = byte_size;
        self.word_pointer = -1;
        self.bit_index = -1;
        Ok(loaded)
    }

    /// 把刚读入的帧负载退回字节源 (帧头校验失败后重试用).
    /// 仅在帧尚未定位 (未调用 parse_frame) 时有效.
    pub(crate) fn unread_frame(&mut self) -> MingResult<()> {
        if self.word_pointer == -1 && self.bit_index == -1 && self.frame_size > 0 {
            self.source
                .unread(&self.frame_bytes[..self.frame_size as usize])?;
        }
        Ok(())
    }

    /// 把帧负载按大端 32 位字重排, 越过末尾的部分补零, 并把位游标
    /// 定位到缓冲区起点.
    pub(crate) fn parse_frame(&mut self) {
        let byte_size = self.frame_size.max(0) as usize;
        for (word, chunk) in self
            .frame_buffer
            .iter_mut()
            .zip(self.frame_bytes[..byte_size].chunks(4))
        {
            let mut quad = [0u8; 4];
            quad[..chunk.len()].copy_from_slice(chunk);
            *word = u32::from_be_bytes(quad);
        }
        self.word_pointer = 0;
        self.bit_index = 0;
    }

    /// 从帧缓冲区按 MSB 在前取 n 比特 (1..=17).
    ///
    /// 跨字边界时拼接当前字的低 16 位与下一字的高 16 位. 游标未定位
    /// 时钳制到缓冲区起点, 这是可恢复状态而非致命错误.
    pub fn get_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n >= 1 && n <= 17);
        if self.word_pointer < 0 || self.bit_index < 0 {
            warn!("帧位游标未定位, 钳制到缓冲区起点");
            self.word_pointer = 0;
            self.bit_index = 0;
        }
        let sum = self.bit_index + n as i32;
        let wp = self.word_pointer as usize;
        if sum <= 32 {
            let value = (self.frame_buffer[wp] >> (32 - sum)) & BITMASK[n as usize];
            self.bit_index = sum;
            if self.bit_index == 32 {
                self.bit_index = 0;
                self.word_pointer += 1;
            }
            return value;
        }
        let right = self.frame_buffer[wp] & 0x0000_FFFF;
        self.word_pointer += 1;
        let left = self.frame_buffer[self.word_pointer as usize] & 0xFFFF_0000;
        let mut value = (right << 16) | (left >> 16);
        value >>= 48 - sum;
        value &= BITMASK[n as usize];
        self.bit_index = sum - 32;
        value
    }

    /// 捕获严格同步模板.
    ///
    /// 模板保留版本/采样率等跨帧不变的字段, 刻意排除码率与填充位
    /// (VBR 流逐帧变化); 声道模式归并为单/双声道标志单独比对.
    pub(crate) fn set_sync_word(&mut self, header_word: u32) {
        self.sync_word = header_word & 0xFFFF_FF3F;
        self.single_ch_mode = (header_word & 0x0000_00C0) == 0x0000_00C0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG1 Layer III, 128kbps, 44.1kHz, 立体声, 无 CRC
    const HDR: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];

    fn stream_of(data: Vec<u8>) -> Bitstream {
        Bitstream::new(PushbackSource::from_bytes(data))
    }

    #[test]
    fn test_id3v2_跳过并暴露原始字节() {
        let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x0A".to_vec();
        data.extend_from_slice(&[0x55; 10]); // 标签负载
        data.extend_from_slice(&HDR);
        let stream = stream_of(data);
        let tag = stream.id3v2_tag().expect("应识别出 ID3v2 标签");
        assert_eq!(tag.len(), 20);
        assert_eq!(&tag[0..3], b"ID3");
    }

    #[test]
    fn test_无标签时流位置不变() {
        let mut data = HDR.to_vec();
        data.extend_from_slice(&[0u8; 8]);
        let mut stream = stream_of(data);
        assert!(stream.id3v2_tag().is_none());
        let word = stream.sync_header(SyncMode::Initial).unwrap();
        assert_eq!(word, u32::from_be_bytes(HDR));
    }

    #[test]
    fn test_同步搜索跳过前导垃圾() {
        let mut data = vec![0x12, 0x34];
        data.extend_from_slice(&HDR);
        let mut stream = stream_of(data);
        let word = stream.sync_header(SyncMode::Initial).unwrap();
        assert_eq!(word, u32::from_be_bytes(HDR));
    }

    #[test]
    fn test_源耗尽返回_eof() {
        let mut stream = stream_of(vec![0x00, 0x11, 0x22, 0x33]);
        assert!(matches!(
            stream.sync_header(SyncMode::Initial),
            Err(MingError::Eof)
        ));
    }

    #[test]
    fn test_严格模板_忽略填充与码率() {
        let mut stream = stream_of(vec![]);
        let base = u32::from_be_bytes(HDR);
        stream.set_sync_word(base & 0xFFF8_0CC0);
        // 只改填充位
        assert!(stream.is_sync_mark(base ^ (1 << 9), SyncMode::Strict));
        // 只改码率索引
        assert!(stream.is_sync_mark((base & !0x0000_F000) | (0x5 << 12), SyncMode::Strict));
        // 改采样率索引: 模板不匹配
        assert!(!stream.is_sync_mark(base ^ (1 << 10), SyncMode::Strict));
    }

    #[test]
    fn test_严格模板_单双声道标志() {
        let mut stream = stream_of(vec![]);
        let stereo = u32::from_be_bytes(HDR); // 声道模式 00 (立体声)
        stream.set_sync_word(stereo & 0xFFF8_0CC0);
        // 换成单声道 (11): 标志不一致, 拒绝
        assert!(!stream.is_sync_mark(stereo | 0x0000_00C0, SyncMode::Strict));
        // 联合立体声 (01): 仍是双声道类, 接受
        assert!(stream.is_sync_mark(stereo | 0x0000_0040, SyncMode::Strict));
    }

    #[test]
    fn test_宽松谓词拒绝保留字段() {
        let stream = stream_of(vec![]);
        let base = u32::from_be_bytes(HDR);
        assert!(stream.is_sync_mark(base, SyncMode::Initial));
        // 采样率索引 3
        assert!(!stream.is_sync_mark(base | (3 << 10), SyncMode::Initial));
        // layer 保留值 00
        assert!(!stream.is_sync_mark(base & !(3 << 17), SyncMode::Initial));
        // 版本保留组合 01
        assert!(!stream.is_sync_mark((base & !(3 << 19)) | (1 << 19), SyncMode::Initial));
    }

    #[test]
    fn test_取位跨字边界() {
        let mut stream = stream_of(vec![0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67, 0x89]);
        stream.read_frame_data(8).unwrap();
        stream.parse_frame();
        assert_eq!(stream.get_bits(12), 0xABC);
        assert_eq!(stream.get_bits(8), 0xDE);
        // 跨越第一个 32 位字的边界: 首字剩余 12 位 + 次字高 5 位
        assert_eq!(stream.get_bits(17), 0b1111_0000_0001_00100);
        assert_eq!(stream.get_bits(3), 0b011);
    }

    #[test]
    fn test_短读零填充() {
        let mut stream = stream_of(vec![0xFF, 0xEE]);
        let loaded = stream.read_frame_data(6).unwrap();
        assert_eq!(loaded, 2);
        stream.parse_frame();
        assert_eq!(stream.get_bits(16), 0xFFEE);
        assert_eq!(stream.get_bits(16), 0x0000);
    }

    #[test]
    fn test_游标未定位时钳制() {
        let mut stream = stream_of(vec![]);
        stream.frame_buffer[0] = 0x8000_0000;
        stream.close_frame();
        // 未 parse_frame 直接取位: 回到缓冲区起点而不是崩溃
        assert_eq!(stream.get_bits(1), 1);
    }

    #[test]
    fn test_帧回退后可重读() {
        let mut data = HDR.to_vec();
        data.extend_from_slice(&[9, 8, 7, 6, 5, 4]);
        let mut stream = stream_of(data);
        stream.sync_header(SyncMode::Initial).unwrap();
        stream.read_frame_data(6).unwrap();
        stream.unread_frame().unwrap();
        let mut buf = [0u8; 6];
        stream.source.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7, 6, 5, 4]);
    }
}
