//! # Ming (鸣)
//!
//! 纯 Rust 实现的 MP3 (MPEG-1/2/2.5 Layer III) 位流解析与熵解码前端.
//!
//! Ming 覆盖 MP3 解码链路中位精确的前半段:
//! - **帧同步**: 在任意字节流中定位帧边界, 跳过 ID3v2 标签,
//!   首次锁定后收紧同步谓词
//! - **帧头解析**: 解释 32 位帧头并推导帧几何 (帧长、子带数、槽位数)
//! - **比特储备库**: 跨帧环形比特缓冲, 支撑 Layer III 的比特借贷
//! - **Huffman 解码**: 34 张解码树, 含逃逸码与 count1 四元组
//!
//! 反量化、立体声还原、IMDCT、合成滤波与 PCM 输出属于下游协作者,
//! 不在本仓库范围内.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use ming::codec::mp3::Mp3FrameReader;
//!
//! let mut reader = Mp3FrameReader::open("input.mp3").unwrap();
//! while let Some(header) = reader.read_frame().unwrap() {
//!     println!("{} Hz, {} 字节", header.frequency(), header.frame_size());
//!     reader.close_frame();
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `ming-core` | 统一错误类型与字节源抽象 |
//! | `ming-codec` | 帧同步、帧头、比特储备库、Huffman 解码 |

/// 核心类型与字节源
pub use ming_core as core;

/// MP3 位流前端
pub use ming_codec as codec;
