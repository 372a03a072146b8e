//! 采集管线配置
//!
//! 默认值来自 Steam Deck 控制器的实测时序（报告周期约 4ms）。

use crate::error::DriverError;
use std::ops::RangeInclusive;
use std::time::Duration;

/// 采集管线配置
///
/// # Example
///
/// ```
/// use sdgyro_driver::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig {
///     scan_period: Duration::from_micros(3900),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// 一帧报告的字节数
    pub frame_len: usize,
    /// 初始扫描周期
    pub scan_period: Duration,
    /// 扫描周期允许范围，超出范围的调整请求被拒绝
    pub scan_period_band: RangeInclusive<Duration>,
    /// 读取截止时间 = 系数 × 当前扫描周期
    pub read_timeout_factor: u32,
    /// 提取线程等待数据的上限，超时视为读取卡死
    pub stuck_timeout: Duration,
    /// 卡死后协作式重启读取线程的等待时间
    pub restart_timeout: Duration,
    /// 停止每个阶段的等待时间
    pub stop_timeout: Duration,
    /// 漏取诊断的报告周期
    pub missed_tick_report_period: u32,
    /// 备用记录头下需要匹配的帧起始字节（为空则不接受备用记录头）
    pub start_marker: Vec<u8>,
    /// 重新启用运动传感器的报告（仅可写传输）
    pub enable_motion_report: Vec<u8>,
    pub loss: LossAnalysisConfig,
}

/// Steam 控制器 `SET_SETTINGS_VALUES`：IMU 模式 = 原始加速度 + 陀螺仪
pub const DEFAULT_ENABLE_MOTION_REPORT: [u8; 6] = [0x00, 0x87, 0x03, 0x30, 0x18, 0x00];

/// 报告写出时的长度（含报告 ID）
pub const ENABLE_MOTION_REPORT_LEN: usize = 65;

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut enable_motion_report = DEFAULT_ENABLE_MOTION_REPORT.to_vec();
        enable_motion_report.resize(ENABLE_MOTION_REPORT_LEN, 0);

        Self {
            frame_len: 64,
            scan_period: Duration::from_micros(4000),
            scan_period_band: Duration::from_micros(3700)..=Duration::from_micros(4000),
            read_timeout_factor: 2,
            stuck_timeout: Duration::from_millis(6),
            restart_timeout: Duration::from_micros(500),
            stop_timeout: Duration::from_secs(10),
            missed_tick_report_period: 250,
            start_marker: Vec::new(),
            enable_motion_report,
            loss: LossAnalysisConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 检查配置的一致性
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.frame_len < 8 {
            return Err(DriverError::InvalidConfig(format!(
                "frame_len must hold the frame counter (>= 8), got {}",
                self.frame_len
            )));
        }
        if self.scan_period.is_zero() {
            return Err(DriverError::InvalidConfig(
                "scan_period must be non-zero".to_string(),
            ));
        }
        if !self.scan_period_band.contains(&self.scan_period) {
            return Err(DriverError::InvalidConfig(format!(
                "scan_period {:?} outside band {:?}",
                self.scan_period, self.scan_period_band
            )));
        }
        if self.read_timeout_factor == 0 {
            return Err(DriverError::InvalidConfig(
                "read_timeout_factor must be non-zero".to_string(),
            ));
        }
        if self.start_marker.len() > self.frame_len {
            return Err(DriverError::InvalidConfig(format!(
                "start_marker longer than a frame ({} > {})",
                self.start_marker.len(),
                self.frame_len
            )));
        }
        Ok(())
    }

    /// 单次读取的截止时间
    pub fn read_timeout(&self, scan_period: Duration) -> Duration {
        scan_period * self.read_timeout_factor
    }
}

/// 丢帧分析参数
#[derive(Debug, Clone, PartialEq)]
pub struct LossAnalysisConfig {
    /// 无丢帧超过此帧数后退出丢帧跟踪
    pub max_loss_period: u32,
    /// 无卡死超过此帧数后退出卡死跟踪
    pub max_stuck_period: u32,
    /// 两次分析之间的最小间隔
    pub analysis_window: Duration,
    /// 卡死 / 错位后归因于重启的帧数
    pub read_stuck_hold: u32,
    /// 大丢帧阈值（帧计数差）
    pub big_loss_threshold: i64,
    /// 可接受的最大帧计数差，超过则不做分析
    pub max_loss_accepted: i64,
    /// 修正量计算的基准帧数
    pub correction_base: i64,
}

impl Default for LossAnalysisConfig {
    fn default() -> Self {
        Self {
            max_loss_period: 10_000,
            max_stuck_period: 2_000,
            analysis_window: Duration::from_secs(1),
            read_stuck_hold: 10,
            big_loss_threshold: 25,
            max_loss_accepted: 1_000,
            correction_base: 6_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.frame_len, 64);
        assert_eq!(config.scan_period, Duration::from_micros(4000));
        assert_eq!(*config.scan_period_band.start(), Duration::from_micros(3700));
        assert_eq!(*config.scan_period_band.end(), Duration::from_micros(4000));
        assert_eq!(config.read_timeout_factor, 2);
        assert_eq!(config.stuck_timeout, Duration::from_millis(6));
        assert_eq!(config.restart_timeout, Duration::from_micros(500));
        assert_eq!(config.stop_timeout, Duration::from_secs(10));
        assert_eq!(config.missed_tick_report_period, 250);
        assert!(config.start_marker.is_empty());
        assert_eq!(config.enable_motion_report.len(), ENABLE_MOTION_REPORT_LEN);
        assert_eq!(&config.enable_motion_report[..6], &DEFAULT_ENABLE_MOTION_REPORT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_loss_config_default() {
        let loss = LossAnalysisConfig::default();
        assert_eq!(loss.max_loss_period, 10_000);
        assert_eq!(loss.max_stuck_period, 2_000);
        assert_eq!(loss.analysis_window, Duration::from_secs(1));
        assert_eq!(loss.read_stuck_hold, 10);
        assert_eq!(loss.big_loss_threshold, 25);
        assert_eq!(loss.max_loss_accepted, 1_000);
        assert_eq!(loss.correction_base, 6_000);
    }

    #[test]
    fn test_read_timeout() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.read_timeout(Duration::from_micros(3800)),
            Duration::from_micros(7600)
        );
    }

    #[test]
    fn test_validate_rejects() {
        let config = PipelineConfig {
            frame_len: 4,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DriverError::InvalidConfig(_))));

        let config = PipelineConfig {
            scan_period: Duration::from_micros(5000),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            start_marker: vec![0; 65],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
