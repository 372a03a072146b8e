//! 管线性能指标
//!
//! 各阶段线程以 `Relaxed` 顺序累加计数器，读取方通过 [`PipelineMetrics::snapshot`]
//! 获取一致性要求不高的快照，用于监控与测试断言。

use std::sync::atomic::{AtomicU64, Ordering};

/// 管线计数器
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// 读取并通过校验的原始记录
    pub frames_read: AtomicU64,
    /// 提取出的帧
    pub frames_extracted: AtomicU64,
    /// 发布到订阅者的帧（每个订阅者计一次）
    pub frames_published: AtomicU64,
    /// 记录错位（重连）次数
    pub unsynced: AtomicU64,
    /// 读取卡死次数
    pub read_stuck: AtomicU64,
    /// 重启读取线程时放弃旧线程的次数
    pub forced_restarts: AtomicU64,
    /// 设备重连次数
    pub reconnects: AtomicU64,
    /// 不完整报告（报告传输下重试）
    pub short_reads: AtomicU64,
    /// 扫描周期更新次数
    pub scan_updates: AtomicU64,
    /// 写出重新启用运动传感器报告的次数
    pub motion_reenables: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frames_extracted: self.frames_extracted.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            unsynced: self.unsynced.load(Ordering::Relaxed),
            read_stuck: self.read_stuck.load(Ordering::Relaxed),
            forced_restarts: self.forced_restarts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
            scan_updates: self.scan_updates.load(Ordering::Relaxed),
            motion_reenables: self.motion_reenables.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_read: u64,
    pub frames_extracted: u64,
    pub frames_published: u64,
    pub unsynced: u64,
    pub read_stuck: u64,
    pub forced_restarts: u64,
    pub reconnects: u64,
    pub short_reads: u64,
    pub scan_updates: u64,
    pub motion_reenables: u64,
}
