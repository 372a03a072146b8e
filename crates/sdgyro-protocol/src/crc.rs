//! 包校验
//!
//! CRC-32（IEEE，反射多项式 0xEDB88320，初值 0xFFFFFFFF，结果取反），
//! 覆盖整个包，计算时 `crc32` 字段（偏移 8..12）视为 0。

use crate::{read_u32_le, write_u32_le};

/// `crc32` 字段在包头中的偏移
pub const CRC_OFFSET: usize = 8;

const CRC_END: usize = CRC_OFFSET + 4;

/// 计算整包 CRC（校验字段视为 0，不修改输入）
///
/// 包长度不足 12 字节时按实际内容计算。
pub fn packet_crc(packet: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    if packet.len() < CRC_END {
        hasher.update(packet);
        return hasher.finalize();
    }
    hasher.update(&packet[..CRC_OFFSET]);
    hasher.update(&[0u8; 4]);
    hasher.update(&packet[CRC_END..]);
    hasher.finalize()
}

/// 计算并写入校验值
pub fn seal(packet: &mut [u8]) {
    if packet.len() < CRC_END {
        return;
    }
    let crc = packet_crc(packet);
    write_u32_le(packet, CRC_OFFSET, crc);
}

/// 校验包内存储的 CRC
pub fn verify(packet: &[u8]) -> bool {
    packet.len() >= CRC_END && read_u32_le(packet, CRC_OFFSET) == packet_crc(packet)
}
