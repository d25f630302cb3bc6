//! 统一错误类型定义.
//!
//! 所有 Ming crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Ming 统一错误类型
#[derive(Debug, Error)]
pub enum MingError {
    /// 不支持的格式 (错误的 layer, 保留的版本或采样率组合).
    /// 对当前解码会话是致命的: 无法推导出合法的帧几何.
    #[error("不支持的格式: {0}")]
    Unsupported(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// VBR 头损坏: 首帧声明的帧大小不可信
    #[error("VBR 头损坏: {0}")]
    CorruptVbrHeader(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,
}

/// Ming 统一 Result 类型
pub type MingResult<T> = Result<T, MingError>;
