//! 帧到运动样本的转换
//!
//! [`MotionFilter`] 是纯状态机：给它一帧报告，它决定丢弃（重复帧）、
//! 输出一个真实样本，或在丢帧时排队若干补帧样本。
//! [`MotionAdapter`] 把它接到 [`FrameSource`] 的广播视图上，
//! 并实现服务端使用的 [`MotionSource`]。

use crate::config::AdapterConfig;
use crate::deck::DeckReport;
use crate::DsuError;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use sdgyro_driver::{Frame, FrameSource, Viewer};
use sdgyro_protocol::MotionData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 服务端拉取运动样本的接口
pub trait MotionSource: Send + Sync {
    /// 启动底层数据源（首个客户端订阅时调用）
    fn start(&self) -> Result<(), DsuError>;

    /// 停止底层数据源（最后一个客户端被剔除后调用）
    fn stop(&self);

    fn is_connected(&self) -> bool;

    /// 阻塞直到下一个样本；没有新数据时返回上一个样本
    fn next_sample(&self) -> MotionData;
}

// ============================================================================
// MotionFilter
// ============================================================================

/// 帧计数判重、补帧与通道换算
#[derive(Debug, Clone)]
pub struct MotionFilter {
    config: AdapterConfig,
    last_increment: Option<u32>,
    last: MotionData,
    /// 加速度平滑状态：右→左、前→后、上→下
    smoothed: [f32; 3],
    replicas_left: u32,
}

impl MotionFilter {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            last_increment: None,
            last: MotionData::default(),
            smoothed: [0.0; 3],
            replicas_left: 0,
        }
    }

    /// 清除帧计数历史；时间戳与平滑状态保留，保证重启后时间戳仍然单调
    pub fn reset(&mut self) {
        self.last_increment = None;
        self.replicas_left = 0;
    }

    /// 上一个输出的样本
    pub fn last(&self) -> MotionData {
        self.last
    }

    /// 待输出的补帧数量
    pub fn pending_replicas(&self) -> u32 {
        self.replicas_left
    }

    /// 取出下一个补帧样本：数值不变，时间戳前进一个设备周期
    pub fn next_replica(&mut self) -> Option<MotionData> {
        if self.replicas_left == 0 {
            return None;
        }
        self.replicas_left -= 1;
        self.last.timestamp += self.config.period_us();
        Some(self.last)
    }

    /// 处理一帧；重复帧返回 `None`
    pub fn accept(&mut self, report: &DeckReport) -> Option<MotionData> {
        let period = self.config.period_us();
        let increment = report.increment;

        let timestamp = match self.last_increment {
            None => (u64::from(increment) * period).max(self.last.timestamp + period),
            Some(last) => {
                let diff = increment.wrapping_sub(last) as i32;
                if diff <= 0 {
                    let back = diff.unsigned_abs();
                    if back < self.config.repeat_tolerance {
                        trace!("MotionAdapter: repeated frame {} (last {})", increment, last);
                        return None;
                    }
                    debug!(
                        "MotionAdapter: frame counter went back from {} to {}, resynchronizing",
                        last, increment
                    );
                    self.last.timestamp + period
                } else {
                    let diff = diff as u32;
                    if diff > self.config.replication_ceiling {
                        // 跳变过大，直接输出跳变
                        debug!(
                            "MotionAdapter: lost {} frames, beyond replication ceiling",
                            diff - 1
                        );
                        self.last.timestamp + u64::from(diff) * period
                    } else {
                        self.replicas_left = diff - 1;
                        self.last.timestamp + period
                    }
                }
            },
        };

        self.last_increment = Some(increment);
        self.last = self.convert(report, timestamp);
        Some(self.last)
    }

    fn convert(&mut self, report: &DeckReport, timestamp: u64) -> MotionData {
        let accel = report.accel;
        let gyro = report.gyro;
        let [rtl, ftb, ttb] = &mut self.smoothed;

        let accel_x = -smooth(accel.right_to_left, rtl, &self.config);
        let accel_y = -smooth(accel.front_to_back, ftb, &self.config);
        let accel_z = smooth(accel.top_to_bottom, ttb, &self.config);

        let scale = self.config.gyro_1dps;
        let deadzone = self.config.gyro_deadzone;
        MotionData {
            timestamp,
            accel_x,
            accel_y,
            accel_z,
            pitch: f32::from(apply_deadzone(gyro.right_to_left, deadzone)) / scale,
            yaw: -f32::from(apply_deadzone(gyro.front_to_back, deadzone)) / scale,
            roll: f32::from(apply_deadzone(gyro.top_to_bottom, deadzone)) / scale,
        }
    }
}

/// 指数平滑；跳变超过阈值时直接跟随新值
fn smooth(raw: i16, state: &mut f32, config: &AdapterConfig) -> f32 {
    let current = f32::from(raw);
    if (current - *state).abs() < config.accel_smooth_threshold as f32 {
        let weight = config.smoothing_weight;
        *state = *state * weight + current * (1.0 - weight);
    } else {
        *state = current;
    }
    *state / config.accel_1g
}

fn apply_deadzone(raw: i16, deadzone: i16) -> i16 {
    if i32::from(raw).abs() < i32::from(deadzone) { 0 } else { raw }
}

// ============================================================================
// MotionAdapter
// ============================================================================

struct AdapterState {
    viewer: Viewer<Frame>,
    filter: MotionFilter,
    last_no_gyro_check: Option<Instant>,
}

/// 订阅帧源并按需产出运动样本
pub struct MotionAdapter {
    source: Arc<FrameSource>,
    config: AdapterConfig,
    state: Mutex<AdapterState>,
    latest: ArcSwap<MotionData>,
}

impl MotionAdapter {
    pub fn new(source: Arc<FrameSource>, config: AdapterConfig) -> Self {
        let viewer = source.subscribe();
        Self {
            state: Mutex::new(AdapterState {
                viewer,
                filter: MotionFilter::new(config.clone()),
                last_no_gyro_check: None,
            }),
            source,
            config,
            latest: ArcSwap::from_pointee(MotionData::default()),
        }
    }

    pub fn source(&self) -> &Arc<FrameSource> {
        &self.source
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// 最近一次产出的样本（不阻塞）
    pub fn latest(&self) -> MotionData {
        **self.latest.load()
    }

    fn publish(&self, sample: MotionData) -> MotionData {
        self.latest.store(Arc::new(sample));
        sample
    }

    /// 六个通道全为零时请求设备重新打开运动数据，受冷却时间限制
    fn check_sensor(&self, last_check: &mut Option<Instant>, report: &DeckReport) {
        if !report.imu_is_zero() {
            return;
        }
        let now = Instant::now();
        let due = last_check.is_none_or(|at| now.duration_since(at) >= self.config.no_gyro_cooldown);
        if due {
            *last_check = Some(now);
            debug!("MotionAdapter: all IMU channels are zero, requesting motion re-enable");
            self.source.request_motion_enable();
        }
    }
}

impl MotionSource for MotionAdapter {
    fn start(&self) -> Result<(), DsuError> {
        {
            let mut state = self.state.lock();
            state.filter.reset();
            // 丢弃停止前残留的帧
            drop(state.viewer.consume_timeout(Duration::ZERO));
        }
        self.source.start()?;
        Ok(())
    }

    fn stop(&self) {
        self.source.stop();
    }

    fn is_connected(&self) -> bool {
        self.source.is_started()
    }

    fn next_sample(&self) -> MotionData {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(sample) = state.filter.next_replica() {
            return self.publish(sample);
        }

        for _ in 0..=self.config.max_repeat_retries {
            let consumed = state
                .viewer
                .consume_timeout(self.config.consume_timeout)
                .map(|frame| DeckReport::decode(&frame));
            let report = match consumed {
                None => break,
                Some(Err(e)) => {
                    debug!("MotionAdapter: skipping frame: {}", e);
                    continue;
                },
                Some(Ok(report)) => report,
            };

            self.check_sensor(&mut state.last_no_gyro_check, &report);
            if let Some(sample) = state.filter.accept(&report) {
                return self.publish(sample);
            }
        }

        state.filter.last()
    }
}

impl Drop for MotionAdapter {
    fn drop(&mut self) {
        let state = self.state.lock();
        self.source.unsubscribe(&state.viewer);
    }
}
