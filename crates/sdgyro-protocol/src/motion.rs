//! 运动数据负载

use crate::{ProtocolError, ensure_len};

/// 运动数据（32 字节）
///
/// - `timestamp`: 设备时钟推导的时间戳（微秒）
/// - `accel_*`: 加速度（单位 g）
/// - `pitch/yaw/roll`: 角速度（度/秒）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionData {
    pub timestamp: u64,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl MotionData {
    pub const SIZE: usize = 32;

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        let channels = [
            self.accel_x,
            self.accel_y,
            self.accel_z,
            self.pitch,
            self.yaw,
            self.roll,
        ];
        for (i, value) in channels.iter().enumerate() {
            let offset = 8 + i * 4;
            buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(buf, Self::SIZE)?;
        let f = |offset: usize| {
            f32::from_le_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ])
        };
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&buf[0..8]);
        Ok(Self {
            timestamp: u64::from_le_bytes(timestamp),
            accel_x: f(8),
            accel_y: f(12),
            accel_z: f(16),
            pitch: f(20),
            yaw: f(24),
            roll: f(28),
        })
    }
}
