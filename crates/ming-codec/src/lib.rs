//! # ming-codec
//!
//! MP3 (MPEG-1/2/2.5 Layer III) 位流解析与熵解码前端.
//!
//! 覆盖解码链路中位精确的前半段: 字节流同步、帧头解释、跨帧比特
//! 储备库与谱数据的 Huffman 解码. 反量化、立体声还原、IMDCT 与
//! 合成滤波不在本 crate 范围内, 它们作为下游协作者通过这里暴露的
//! 接口消费位流.
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use ming_codec::mp3::Mp3FrameReader;
//!
//! let mut reader = Mp3FrameReader::open("input.mp3").unwrap();
//! while let Some(header) = reader.read_frame().unwrap() {
//!     println!("{} Hz, {} 字节", header.frequency(), header.frame_size());
//!     reader.close_frame();
//! }
//! ```

pub mod mp3;

// 重导出常用类型
pub use mp3::{
    BitReservoir, Bitstream, ChannelMode, FrameHeader, HuffmanTables, HuffmanValue,
    Mp3FrameReader, MpegVersion, SyncMode,
};
