//! Steam Deck 输入报告解析
//!
//! 只解析运动换算需要的前 36 字节（小端）：
//!
//! | 偏移 | 字段 |
//! |---|---|
//! | 0 | 报告头 u32 |
//! | 4 | 帧计数 u32 |
//! | 8 / 12 | 按键位 u32 ×2 |
//! | 16..24 | 左右触摸板 X/Y i16 |
//! | 24..30 | 加速度 右→左 / 上→下 / 前→后 i16 |
//! | 30..36 | 陀螺仪 右→左 / 上→下 / 前→后 i16 |

use crate::DsuError;

/// 解析所需的最小报告长度
pub const DECK_REPORT_MIN_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Axes {
    pub right_to_left: i16,
    pub top_to_bottom: i16,
    pub front_to_back: i16,
}

impl Axes {
    fn decode(buf: &[u8]) -> Self {
        Self {
            right_to_left: i16::from_le_bytes([buf[0], buf[1]]),
            top_to_bottom: i16::from_le_bytes([buf[2], buf[3]]),
            front_to_back: i16::from_le_bytes([buf[4], buf[5]]),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.right_to_left == 0 && self.top_to_bottom == 0 && self.front_to_back == 0
    }
}

/// 一帧报告
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeckReport {
    pub header: u32,
    pub increment: u32,
    pub buttons: [u32; 2],
    pub left_trackpad: (i16, i16),
    pub right_trackpad: (i16, i16),
    pub accel: Axes,
    pub gyro: Axes,
}

impl DeckReport {
    pub fn decode(buf: &[u8]) -> Result<Self, DsuError> {
        if buf.len() < DECK_REPORT_MIN_LEN {
            return Err(DsuError::ShortReport {
                expected: DECK_REPORT_MIN_LEN,
                actual: buf.len(),
            });
        }

        let u32_at = |o: usize| u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]]);
        let i16_at = |o: usize| i16::from_le_bytes([buf[o], buf[o + 1]]);

        Ok(Self {
            header: u32_at(0),
            increment: u32_at(4),
            buttons: [u32_at(8), u32_at(12)],
            left_trackpad: (i16_at(16), i16_at(18)),
            right_trackpad: (i16_at(20), i16_at(22)),
            accel: Axes::decode(&buf[24..30]),
            gyro: Axes::decode(&buf[30..36]),
        })
    }

    /// 六个 IMU 通道全部为零：传感器很可能被关闭
    pub fn imu_is_zero(&self) -> bool {
        self.accel.is_zero() && self.gyro.is_zero()
    }
}
