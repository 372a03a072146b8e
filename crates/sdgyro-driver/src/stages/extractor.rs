//! FrameExtractor：原始记录 → 帧
//!
//! 等待读取线程的输出，超时即认为读取卡死：发出 `read_stuck` 并重启读取线程
//! （先协作式停止，超时则放弃旧线程）。

use crate::diagnostics::MissedTicks;
use crate::frame::Frame;
use crate::metrics::PipelineMetrics;
use crate::pipe::Recv;
use crate::stages::Channels;
use crate::task::{Operation, PipelineTask, StopOutcome, StopToken};
use sdgyro_hid::Transport;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

/// 连续卡死达到此次数后提升日志级别
const STUCK_WARN_AFTER: u32 = 3;

pub(crate) struct FrameExtractor {
    reader: Arc<PipelineTask>,
    transport: Transport,
    raw_len: usize,
    frame_len: usize,
    analyze_loss: bool,
    stuck_timeout: Duration,
    restart_timeout: Duration,
    report_period: u32,
    channels: Arc<Channels>,
    metrics: Arc<PipelineMetrics>,
}

pub(crate) struct ExtractorSettings {
    pub transport: Transport,
    pub frame_len: usize,
    pub analyze_loss: bool,
    pub stuck_timeout: Duration,
    pub restart_timeout: Duration,
    pub report_period: u32,
}

impl FrameExtractor {
    pub fn new(
        reader: Arc<PipelineTask>,
        settings: ExtractorSettings,
        channels: Arc<Channels>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            reader,
            transport: settings.transport,
            raw_len: settings.transport.raw_len(settings.frame_len),
            frame_len: settings.frame_len,
            analyze_loss: settings.analyze_loss,
            stuck_timeout: settings.stuck_timeout,
            restart_timeout: settings.restart_timeout,
            report_period: settings.report_period.max(1),
            channels,
            metrics,
        }
    }

    fn extract(&self, raw: &[u8], frame: &mut Frame) {
        match self.transport {
            Transport::RecordStream {
                record_len,
                payload_offset,
            } => frame.deinterleave_from(raw, record_len, payload_offset),
            Transport::Report => frame.copy_from(raw),
        }
    }

    fn handle_stuck(&self, consecutive: u32) {
        if consecutive >= STUCK_WARN_AFTER
            && (consecutive - STUCK_WARN_AFTER) % self.report_period == 0
        {
            warn!(
                "FrameExtractor: reading stuck {} times in a row, force-restarting reader",
                consecutive
            );
        } else {
            debug!("FrameExtractor: reading stuck, force-restarting reader");
        }

        self.channels.read_stuck.send();
        self.metrics.read_stuck.fetch_add(1, Ordering::Relaxed);

        match self.reader.try_restart_then_force_restart(self.restart_timeout) {
            Ok(StopOutcome::Abandoned) => {
                self.metrics.forced_restarts.fetch_add(1, Ordering::Relaxed);
            },
            Ok(_) => {},
            Err(e) => debug!("FrameExtractor: failed to restart reader: {}", e),
        }
    }
}

impl Operation for FrameExtractor {
    fn execute(&self, token: &StopToken) {
        let mut raw = vec![0u8; self.raw_len];
        let mut frame = Frame::zeroed(self.frame_len);
        let mut last_increment: Option<u32> = None;
        let mut consecutive_stuck = 0u32;
        let mut missed = MissedTicks::new("FrameExtractor", "frames", self.report_period);

        debug!("FrameExtractor: started");

        while token.should_continue() {
            match self.channels.raw.wait_timeout(&mut raw, self.stuck_timeout) {
                Recv::Data => consecutive_stuck = 0,
                Recv::Flushed => continue,
                Recv::Timeout => {
                    if token.should_continue() {
                        consecutive_stuck += 1;
                        self.handle_stuck(consecutive_stuck);
                    }
                    continue;
                },
            }

            if !token.should_continue() {
                break;
            }

            self.extract(&raw, &mut frame);

            let increment = frame.increment();
            if self.analyze_loss
                && let Some(last) = last_increment
            {
                let mut diff = i64::from(increment.wrapping_sub(last) as i32);
                self.channels.diff.send(&mut diff);
            }
            last_increment = Some(increment);

            self.metrics.frames_extracted.fetch_add(1, Ordering::Relaxed);
            missed.observe(self.channels.frames.was_received());
            self.channels.frames.send(&mut frame);
        }

        debug!("FrameExtractor: stopped");
    }

    fn flush_pipes(&self) {
        self.channels.raw.flush();
    }
}
