//! 包头与事件类型

use crate::{
    MAGIC_CLIENT, MAGIC_SERVER, PROTOCOL_VERSION, ProtocolError, ensure_len, read_u16_le,
    read_u32_le, write_u16_le, write_u32_le,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum EventType {
    /// 协议版本信息
    Version = 0x100000,
    /// 控制器槽位信息
    Info = 0x100001,
    /// 控制器数据（订阅 / 推送）
    Data = 0x100002,
}

/// 固定包头（含 eventType 共 20 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version: u16,
    /// 负载长度：不含前 16 字节，包含 eventType
    pub length: u16,
    pub crc32: u32,
    /// 客户端关联 ID，应答原样回显
    pub id: u32,
    pub event_type: EventType,
}

impl Header {
    /// 编码后长度（含 eventType）
    pub const SIZE: usize = 20;

    /// `length` 字段不计入的前缀长度
    pub const LENGTH_BASE: usize = 16;

    /// 创建服务端包头，`total_len` 为整包长度
    pub fn server(event_type: EventType, id: u32, total_len: usize) -> Self {
        Self {
            magic: MAGIC_SERVER,
            version: PROTOCOL_VERSION,
            length: (total_len - Self::LENGTH_BASE) as u16,
            crc32: 0,
            id,
            event_type,
        }
    }

    /// 创建客户端包头，`total_len` 为整包长度
    pub fn client(event_type: EventType, id: u32, total_len: usize) -> Self {
        Self {
            magic: MAGIC_CLIENT,
            ..Self::server(event_type, id, total_len)
        }
    }

    /// 是否来自客户端
    pub fn is_client(&self) -> bool {
        self.magic == MAGIC_CLIENT
    }

    /// 解析包头（不校验 CRC 与魔数方向）
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(buf, Self::SIZE)?;

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != MAGIC_CLIENT && magic != MAGIC_SERVER {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let raw_event = read_u32_le(buf, 16);
        let event_type = EventType::try_from(raw_event)
            .map_err(|_| ProtocolError::UnknownEventType(raw_event))?;

        Ok(Self {
            magic,
            version: read_u16_le(buf, 4),
            length: read_u16_le(buf, 6),
            crc32: read_u32_le(buf, 8),
            id: read_u32_le(buf, 12),
            event_type,
        })
    }

    /// 编码到 `buf[..20]`
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::BufferTooSmall {
                needed: Self::SIZE,
                available: buf.len(),
            });
        }
        buf[0..4].copy_from_slice(&self.magic);
        write_u16_le(buf, 4, self.version);
        write_u16_le(buf, 6, self.length);
        write_u32_le(buf, 8, self.crc32);
        write_u32_le(buf, 12, self.id);
        write_u32_le(buf, 16, self.event_type.into());
        Ok(())
    }
}

/// 只改写包内 id 字段（偏移 12..16）
pub fn set_id(packet: &mut [u8], id: u32) {
    if packet.len() >= 16 {
        write_u32_le(packet, 12, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_values() {
        assert_eq!(u32::from(EventType::Version), 0x100000);
        assert_eq!(u32::from(EventType::Info), 0x100001);
        assert_eq!(u32::from(EventType::Data), 0x100002);
        assert!(EventType::try_from(0x100003u32).is_err());
    }

    #[test]
    fn test_header_layout() {
        let header = Header::server(EventType::Version, 0x01020304, 22);
        let mut buf = [0u8; 20];
        header.encode(&mut buf).unwrap();

        assert_eq!(&buf[0..4], b"DSUS");
        assert_eq!(&buf[4..6], &1001u16.to_le_bytes());
        assert_eq!(&buf[6..8], &6u16.to_le_bytes());
        assert_eq!(&buf[12..16], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[16..20], &[0x00, 0x00, 0x10, 0x00]);

        let decoded = Header::decode(&buf).unwrap();
        assert_eq!(decoded, header);
        assert!(!decoded.is_client());
    }

    #[test]
    fn test_header_decode_rejects_bad_magic() {
        let mut buf = [0u8; 20];
        buf[0..4].copy_from_slice(b"XXXX");
        assert_eq!(
            Header::decode(&buf),
            Err(ProtocolError::InvalidMagic(*b"XXXX"))
        );
    }

    #[test]
    fn test_header_decode_rejects_unknown_event() {
        let mut buf = [0u8; 20];
        Header::client(EventType::Info, 1, 20).encode(&mut buf).unwrap();
        buf[16..20].copy_from_slice(&0x200000u32.to_le_bytes());
        assert_eq!(
            Header::decode(&buf),
            Err(ProtocolError::UnknownEventType(0x200000))
        );
    }

    #[test]
    fn test_header_encode_small_buffer() {
        let header = Header::client(EventType::Data, 7, 28);
        let mut buf = [0u8; 10];
        assert!(matches!(
            header.encode(&mut buf),
            Err(ProtocolError::BufferTooSmall { needed: 20, .. })
        ));
    }

    #[test]
    fn test_set_id() {
        let mut buf = [0u8; 20];
        set_id(&mut buf, 0xDEADBEEF);
        assert_eq!(read_u32_le(&buf, 12), 0xDEADBEEF);
    }
}
