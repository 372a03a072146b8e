//! 陀螺仪标定辅助
//!
//! 录制一段绕右→左轴的匀速转动：加速度计前→后分量给出起止倾角，
//! 倾角变化除以录制时长得到真实角速度，再与陀螺仪读数的平均值相比，
//! 得到"每 °/s 对应的原始值"。

use crate::deck::DeckReport;
use std::time::Duration;

/// 标定时使用的 1g 原始值
pub const CALIBRATION_ACCEL_1G: f64 = 16500.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Mark {
    increment: u32,
    accel: i16,
}

/// 陀螺仪刻度估计器
#[derive(Debug, Clone)]
pub struct GyroCalibrator {
    device_period: Duration,
    start: Option<Mark>,
    last: Option<Mark>,
    gyro_sum: i64,
    gyro_count: u64,
}

impl GyroCalibrator {
    pub fn new(device_period: Duration) -> Self {
        Self {
            device_period,
            start: None,
            last: None,
            gyro_sum: 0,
            gyro_count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.start = None;
        self.last = None;
        self.gyro_sum = 0;
        self.gyro_count = 0;
    }

    /// 录入一帧；首帧只记录起点，重复帧忽略
    pub fn process(&mut self, report: &DeckReport) {
        let mark = Mark {
            increment: report.increment,
            accel: report.accel.front_to_back,
        };
        let Some(start) = self.start else {
            self.start = Some(mark);
            return;
        };
        let previous = self.last.unwrap_or(start).increment;
        if report.increment == previous {
            return;
        }

        self.last = Some(mark);
        self.gyro_sum += i64::from(report.gyro.right_to_left);
        self.gyro_count += 1;
    }

    /// 已录入的陀螺仪样本数
    pub fn samples(&self) -> u64 {
        self.gyro_count
    }

    /// 录制时长（按帧计数推算）
    pub fn elapsed(&self) -> Duration {
        match (self.start, self.last) {
            (Some(start), Some(last)) => {
                self.device_period * last.increment.wrapping_sub(start.increment)
            },
            _ => Duration::ZERO,
        }
    }

    /// 估计每 °/s 的陀螺仪原始值；数据不足或没有转动时返回 `None`
    pub fn estimate(&self) -> Option<f64> {
        let (start, last) = (self.start?, self.last?);
        let seconds = self.elapsed().as_secs_f64();
        if self.gyro_count == 0 || seconds <= 0.0 {
            return None;
        }

        let degrees = tilt_degrees(last.accel) - tilt_degrees(start.accel);
        let actual_dps = degrees / seconds;
        let gyro_avg = self.gyro_sum as f64 / self.gyro_count as f64;

        let ratio = gyro_avg / actual_dps;
        ratio.is_finite().then_some(ratio)
    }
}

fn tilt_degrees(accel: i16) -> f64 {
    (f64::from(accel) / CALIBRATION_ACCEL_1G).clamp(-1.0, 1.0).acos().to_degrees()
}
