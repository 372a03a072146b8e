//! 管线各阶段
//!
//! ```text
//! PaceController ──tick──▶ DeviceReader ──raw──▶ FrameExtractor ──frames──▶ FrameBroadcaster ──▶ Serve × N
//!       ▲                      │                       │
//!       └──scan_feedback── LossAnalyzer ◀──diff────────┘
//!                              ▲ unsynced / read_stuck
//! ```
//!
//! PaceController 与 LossAnalyzer 只在记录流传输（hiddev）下运行。

pub(crate) mod broadcaster;
pub(crate) mod extractor;
pub(crate) mod loss;
pub(crate) mod metronome;
pub(crate) mod reader;

use crate::frame::Frame;
use crate::pipe::Pipe;
use crate::signal::Signal;
use std::time::Duration;

/// 阶段间的管道与信号
pub(crate) struct Channels {
    /// 节拍：PaceController → DeviceReader
    pub tick: Signal,
    /// 原始记录：DeviceReader → FrameExtractor
    pub raw: Pipe<Vec<u8>>,
    /// 帧：FrameExtractor → FrameBroadcaster
    pub frames: Pipe<Frame>,
    /// 相邻帧计数差：FrameExtractor → LossAnalyzer
    pub diff: Pipe<i64>,
    /// 扫描周期提议：LossAnalyzer → PaceController
    pub scan_feedback: Pipe<Duration>,
    /// 记录错位（已重连）
    pub unsynced: Signal,
    /// 读取卡死（已重启读取线程）
    pub read_stuck: Signal,
    /// 请求写出重新启用运动传感器的报告
    pub enable_motion: Signal,
}

impl Channels {
    pub fn new(raw_len: usize, frame_len: usize) -> Self {
        Self {
            tick: Signal::new(),
            raw: Pipe::new(vec![0; raw_len]),
            frames: Pipe::new(Frame::zeroed(frame_len)),
            diff: Pipe::new(0),
            scan_feedback: Pipe::new(Duration::ZERO),
            unsynced: Signal::new(),
            read_stuck: Signal::new(),
            enable_motion: Signal::new(),
        }
    }
}
