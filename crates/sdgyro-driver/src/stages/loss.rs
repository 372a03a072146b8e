//! LossAnalyzer：根据帧计数差闭环调节扫描周期
//!
//! - 大丢帧且已在跟踪：缩短周期，距上次丢帧越久修正越小
//! - 小丢帧且已在跟踪：延长周期 1us
//! - 读取重启（卡死 / 错位）后的丢帧单独归因，按更粗的步长延长周期
//!
//! 两次有效分析之间至少间隔一个分析窗口，避免逐帧修正造成振荡。

use crate::config::LossAnalysisConfig;
use crate::pipe::Recv;
use crate::scan::ScanPeriod;
use crate::stages::Channels;
use crate::task::{Operation, StopToken};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 丢帧跟踪状态机
#[derive(Debug)]
pub(crate) struct LossTracker {
    config: LossAnalysisConfig,
    band: RangeInclusive<Duration>,
    current: Duration,
    /// 距上次丢帧的帧数
    loss_period: i64,
    /// 距上次重启后丢帧的帧数
    no_stuck_period: i64,
    loss_tracking: bool,
    stuck_tracking: bool,
    last_analysis: Instant,
    passed_window: bool,
    read_stuck_left: u32,
}

impl LossTracker {
    pub fn new(
        config: LossAnalysisConfig,
        current: Duration,
        band: RangeInclusive<Duration>,
        now: Instant,
    ) -> Self {
        Self {
            config,
            band,
            current,
            loss_period: 0,
            no_stuck_period: 0,
            loss_tracking: false,
            stuck_tracking: false,
            last_analysis: now,
            passed_window: false,
            read_stuck_left: 0,
        }
    }

    /// 读取线程刚被重启（卡死或错位）
    pub fn restart_observed(&mut self) {
        self.read_stuck_left = self.config.read_stuck_hold;
        debug!("LossAnalyzer: read stuck, start monitoring");
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    #[cfg(test)]
    pub fn is_loss_tracking(&self) -> bool {
        self.loss_tracking
    }

    #[cfg(test)]
    pub fn is_stuck_tracking(&self) -> bool {
        self.stuck_tracking
    }

    /// 处理一个帧计数差，需要调整时返回新的扫描周期
    pub fn observe(&mut self, diff: i64, now: Instant) -> Option<Duration> {
        if self.read_stuck_left > 0 {
            self.read_stuck_left -= 1;
            if diff > 1 {
                return self.observe_restart_loss(diff);
            }
            if self.read_stuck_left == 0 {
                debug!("LossAnalyzer: read stuck monitoring stopped");
            }
        } else if self.stuck_tracking {
            self.no_stuck_period += 1;
            if self.no_stuck_period > i64::from(self.config.max_stuck_period) {
                debug!(
                    "LossAnalyzer: over {} frames since last reading restart",
                    self.config.max_stuck_period
                );
                self.no_stuck_period = 0;
                self.stuck_tracking = false;
            }
        }

        if !self.passed_window && now.duration_since(self.last_analysis) <= self.config.analysis_window
        {
            return None;
        }
        self.passed_window = true;

        if self.loss_tracking {
            self.loss_period += 1;
            if self.loss_period > i64::from(self.config.max_loss_period) {
                debug!(
                    "LossAnalyzer: over {} frames since last frame loss",
                    self.config.max_loss_period
                );
                self.loss_period = 0;
                self.loss_tracking = false;
            }
        }

        if diff <= 1 || diff >= self.config.max_loss_accepted {
            return None;
        }

        let mut analyzed = false;
        let mut proposal = None;

        if diff > self.config.big_loss_threshold {
            if self.loss_tracking {
                info!(
                    "LossAnalyzer: high loss: {} frames after {} frames without loss",
                    diff - 1,
                    self.loss_period
                );
                let update = Self::step(self.config.correction_base - self.loss_period, 400);
                proposal = self.propose(self.current.saturating_sub(update));
            } else {
                info!(
                    "LossAnalyzer: high loss: {} frames, activate loss monitoring",
                    diff - 1
                );
            }
            self.loss_tracking = true;
            analyzed = true;
        } else if !self.loss_tracking {
            info!(
                "LossAnalyzer: low loss: {} frames, activate loss monitoring",
                diff - 1
            );
            self.loss_tracking = true;
        } else {
            info!(
                "LossAnalyzer: low loss: {} frames after {} frames without loss",
                diff - 1,
                self.loss_period
            );
            proposal = self.propose(self.current + Duration::from_micros(1));
            analyzed = true;
        }
        self.loss_period = 0;

        if analyzed {
            self.last_analysis = now;
            self.passed_window = false;
        }
        proposal
    }

    fn observe_restart_loss(&mut self, diff: i64) -> Option<Duration> {
        let mut proposal = None;
        if self.stuck_tracking || diff > 2 {
            info!(
                "LossAnalyzer: frame loss after reading restart: {} frames, previous {} frames read without restart",
                diff - 1,
                self.no_stuck_period
            );
            let update = Self::step(self.config.correction_base - self.no_stuck_period, 2000);
            proposal = self.propose(self.current + update);
        } else {
            info!(
                "LossAnalyzer: frame loss after reading restart: {} frames, activate reading stuck monitoring",
                diff - 1
            );
            self.stuck_tracking = true;
        }

        self.read_stuck_left = 0;
        self.no_stuck_period = 0;
        self.loss_period = 0;
        self.loss_tracking = false;
        proposal
    }

    /// 修正步长（us），限制在 1..=200
    fn step(numerator: i64, divisor: i64) -> Duration {
        let us = (numerator / divisor).clamp(1, 200);
        Duration::from_micros(us as u64)
    }

    fn propose(&mut self, period: Duration) -> Option<Duration> {
        let period = period.clamp(*self.band.start(), *self.band.end());
        if period == self.current {
            return None;
        }
        info!(
            "LossAnalyzer: request scan period update from {} us to {} us",
            self.current.as_micros(),
            period.as_micros()
        );
        self.current = period;
        Some(period)
    }
}

pub(crate) struct LossAnalyzer {
    config: LossAnalysisConfig,
    scan: Arc<ScanPeriod>,
    channels: Arc<Channels>,
}

impl LossAnalyzer {
    pub fn new(config: LossAnalysisConfig, scan: Arc<ScanPeriod>, channels: Arc<Channels>) -> Self {
        Self {
            config,
            scan,
            channels,
        }
    }
}

impl Operation for LossAnalyzer {
    fn execute(&self, token: &StopToken) {
        let mut tracker = LossTracker::new(
            self.config.clone(),
            self.scan.get(),
            self.scan.band().clone(),
            Instant::now(),
        );
        let mut diff = 0i64;

        info!(
            "LossAnalyzer: started, current scan period {} us",
            tracker.current().as_micros()
        );

        while token.should_continue() {
            if self.channels.diff.wait(&mut diff) != Recv::Data {
                continue;
            }
            if !token.should_continue() {
                break;
            }

            let unsynced = self.channels.unsynced.try_signal();
            if self.channels.read_stuck.try_signal() || unsynced {
                tracker.restart_observed();
            }

            if let Some(mut period) = tracker.observe(diff, Instant::now()) {
                self.channels.scan_feedback.send(&mut period);
            }
        }

        debug!("LossAnalyzer: stopped");
    }

    fn flush_pipes(&self) {
        self.channels.diff.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us(v: u64) -> Duration {
        Duration::from_micros(v)
    }

    fn tracker(now: Instant) -> LossTracker {
        LossTracker::new(
            LossAnalysisConfig::default(),
            us(3900),
            us(3700)..=us(4000),
            now,
        )
    }

    #[test]
    fn test_nominal_frames_do_nothing() {
        let start = Instant::now();
        let mut t = tracker(start);
        for i in 0..100 {
            assert_eq!(t.observe(1, start + Duration::from_secs(2) + us(i)), None);
        }
        assert!(!t.is_loss_tracking());
    }

    #[test]
    fn test_window_gates_analysis() {
        let start = Instant::now();
        let mut t = tracker(start);
        // 窗口内的丢帧被忽略
        assert_eq!(t.observe(5, start + Duration::from_millis(500)), None);
        assert!(!t.is_loss_tracking());

        // 窗口过后：小丢帧开始跟踪但不修正
        assert_eq!(t.observe(5, start + Duration::from_millis(1500)), None);
        assert!(t.is_loss_tracking());

        // 小丢帧且已跟踪：+1us
        assert_eq!(t.observe(5, start + Duration::from_millis(1600)), Some(us(3901)));

        // 分析之后重新进入窗口
        assert_eq!(t.observe(5, start + Duration::from_millis(1700)), None);
        assert_eq!(t.current(), us(3901));
    }

    #[test]
    fn test_big_loss_decreases_period() {
        let start = Instant::now();
        let later = start + Duration::from_secs(2);
        let mut t = tracker(start);

        // 首次大丢帧只激活跟踪
        assert_eq!(t.observe(30, later), None);
        assert!(t.is_loss_tracking());

        // 下一次分析需要再过一个窗口
        let later = later + Duration::from_secs(2);
        // (6000 - 1) / 400 = 14us
        assert_eq!(t.observe(30, later), Some(us(3900 - 14)));
    }

    #[test]
    fn test_huge_gap_is_not_analyzed() {
        let start = Instant::now();
        let mut t = tracker(start);
        assert_eq!(t.observe(5000, start + Duration::from_secs(2)), None);
        assert!(!t.is_loss_tracking());
    }

    #[test]
    fn test_restart_loss_is_attributed_separately() {
        let start = Instant::now();
        let mut t = tracker(start);

        // 重启后小丢帧（diff == 2）：激活卡死跟踪，不修正
        t.restart_observed();
        assert_eq!(t.observe(2, start), None);
        assert!(t.is_stuck_tracking());
        assert!(!t.is_loss_tracking());

        // 再次重启后丢帧：(6000 - 0) / 2000 = 3us
        t.restart_observed();
        assert_eq!(t.observe(2, start), Some(us(3903)));

        // 重启丢帧不计入一般丢帧跟踪
        assert!(!t.is_loss_tracking());
    }

    #[test]
    fn test_restart_hold_expires() {
        let start = Instant::now();
        let mut t = tracker(start);
        t.restart_observed();
        for _ in 0..10 {
            assert_eq!(t.observe(1, start), None);
        }
        // 保持期结束后，丢帧按一般规则处理（仍在窗口内）
        assert_eq!(t.observe(5, start), None);
        assert!(!t.is_stuck_tracking());
    }

    #[test]
    fn test_proposals_stay_in_band() {
        let start = Instant::now();
        let mut t = LossTracker::new(
            LossAnalysisConfig::default(),
            us(4000),
            us(3700)..=us(4000),
            start,
        );
        t.restart_observed();
        // 已在上限，不产生提议
        assert_eq!(t.observe(5, start), None);
        assert_eq!(t.current(), us(4000));
    }

    #[test]
    fn test_stuck_tracking_expires() {
        let start = Instant::now();
        let mut t = tracker(start);
        t.restart_observed();
        t.observe(2, start);
        assert!(t.is_stuck_tracking());
        for _ in 0..=2000 {
            t.observe(1, start);
        }
        assert!(!t.is_stuck_tracking());
    }
}
