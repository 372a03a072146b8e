//! # SdGyro Protocol
//!
//! DSU（Cemuhook）运动数据协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `crc`: 包校验（CRC-32，校验字段置零后计算）
//! - `header`: 固定包头与事件类型
//! - `message`: 请求解析、应答构建
//! - `motion`: 运动数据负载
//!
//! ## 字节序
//!
//! 所有多字节字段均为小端（little-endian），与 DSU 客户端（模拟器）保持一致。
//!
//! ## 包布局
//!
//! ```text
//! 0      4        6       8       12     16          20
//! | magic | version | length | crc32 | id | eventType | payload...
//! ```
//!
//! `length` 不含前 16 字节，包含 `eventType`。

pub mod crc;
pub mod header;
pub mod message;
pub mod motion;

pub use crc::{packet_crc, seal, verify};
pub use header::{EventType, Header};
pub use message::*;
pub use motion::MotionData;

use thiserror::Error;

/// 服务端魔数（server → client）
pub const MAGIC_SERVER: [u8; 4] = *b"DSUS";

/// 客户端魔数（client → server）
pub const MAGIC_CLIENT: [u8; 4] = *b"DSUC";

/// 协议版本（线上约定，固定值）
pub const PROTOCOL_VERSION: u16 = 1001;

/// 默认 UDP 端口
pub const DEFAULT_PORT: u16 = 26760;

/// 本设备占用的控制器槽位
pub const DECK_SLOT: u8 = 0;

/// DSU 最多 4 个控制器槽位
pub const MAX_SLOTS: usize = 4;

/// 协议解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid magic: {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("Unknown event type: 0x{0:X}")]
    UnknownEventType(u32),

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Unexpected event type: expected {expected:?}, got {actual:?}")]
    UnexpectedEvent {
        expected: EventType,
        actual: EventType,
    },
}

/// 确保 `buf` 至少有 `needed` 字节
pub(crate) fn ensure_len(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        return Err(ProtocolError::Truncated {
            expected: needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

pub(crate) fn write_u16_le(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
