//! 字节源抽象层.
//!
//! 为帧同步器提供顺序读取与回退 (unread) 能力, 支持文件、内存缓冲区
//! 等不同后端. 同步器在确认一个候选帧不可信时, 需要把整帧字节退回
//! 字节源重新搜索, 因此回退容量必须覆盖一个最大帧加上同步前瞻.

use std::collections::VecDeque;
use std::io::Read;

use crate::error::{MingError, MingResult};

/// 回退缓冲区容量: 一个最大帧 (1732 字节) + 4 字节同步前瞻
pub const PUSHBACK_CAPACITY: usize = 1732 + 4;

/// 字节源后端 trait
///
/// 实现此 trait 以支持不同的字节来源 (文件、内存、网络流等).
/// 只要求顺序读取; 回退能力由 [`PushbackSource`] 统一提供.
pub trait ByteSourceBackend: Send {
    /// 读取数据到缓冲区, 返回实际读取的字节数 (0 表示流结束)
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// 文件后端
pub struct FileBackend {
    file: std::fs::File,
}

impl FileBackend {
    pub fn new(file: std::fs::File) -> Self {
        Self { file }
    }

    /// 从文件路径打开 (只读)
    pub fn open(path: &str) -> MingResult<Self> {
        Ok(Self {
            file: std::fs::File::open(path)?,
        })
    }
}

impl ByteSourceBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

/// 内存缓冲区后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSourceBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }
}

/// 带回退能力的字节源
///
/// 封装底层后端, 提供两种读取语义与 `unread`:
/// - [`read_bytes`](Self::read_bytes): 尽力读取, 流结束时返回实际读到的字节数;
/// - [`read_padded`](Self::read_padded): 读满缓冲区, 不足的尾部以零填充
///   (容忍被截断的末帧);
/// - [`unread`](Self::unread): 把字节退回源头, 下次读取原样返回.
pub struct PushbackSource {
    inner: Box<dyn ByteSourceBackend>,
    /// 被退回的字节, 队头是下一个将被读出的字节
    pushback: VecDeque<u8>,
}

impl PushbackSource {
    pub fn new(backend: Box<dyn ByteSourceBackend>) -> Self {
        Self {
            inner: backend,
            pushback: VecDeque::with_capacity(PUSHBACK_CAPACITY),
        }
    }

    /// 从文件路径打开 (只读)
    pub fn open_file(path: &str) -> MingResult<Self> {
        Ok(Self::new(Box::new(FileBackend::open(path)?)))
    }

    /// 从内存数据创建 (用于测试)
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data)))
    }

    /// 尽力读取: 反复向后端要数据直到读满或流结束, 返回实际读取数
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> MingResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            if let Some(b) = self.pushback.pop_front() {
                buf[total] = b;
                total += 1;
                continue;
            }
            let n = self.inner.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// 读满缓冲区, 流结束时剩余部分以零填充, 返回实际读取数
    pub fn read_padded(&mut self, buf: &mut [u8]) -> MingResult<usize> {
        let n = self.read_bytes(buf)?;
        buf[n..].fill(0);
        Ok(n)
    }

    /// 把 `data` 退回字节源, 下次读取按原顺序返回这些字节
    pub fn unread(&mut self, data: &[u8]) -> MingResult<()> {
        if self.pushback.len() + data.len() > PUSHBACK_CAPACITY {
            return Err(MingError::InvalidData(format!(
                "回退缓冲区溢出: {} + {} > {PUSHBACK_CAPACITY}",
                self.pushback.len(),
                data.len()
            )));
        }
        for &b in data.iter().rev() {
            self.pushback.push_front(b);
        }
        Ok(())
    }
}
