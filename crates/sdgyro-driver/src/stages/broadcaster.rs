//! FrameBroadcaster：把每个新帧发布给所有订阅者
//!
//! 每个订阅者拥有独立的 [`Serve`]，慢订阅者不会拖慢其它订阅者。
//! 订阅 / 退订在读写锁下进行，发布只持有读锁。

use crate::diagnostics::MissedTicks;
use crate::frame::Frame;
use crate::metrics::PipelineMetrics;
use crate::pipe::Recv;
use crate::serve::{Serve, Viewer};
use crate::signal::Signal;
use crate::stages::Channels;
use crate::task::{Operation, StopToken};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// 无订阅者时的等待上限（用于观察停止令牌）
const SERVE_WAIT: Duration = Duration::from_millis(50);

struct ServeEntry {
    serve: Arc<Serve<Frame>>,
    missed: Mutex<MissedTicks>,
}

pub(crate) struct FrameBroadcaster {
    serves: RwLock<Vec<ServeEntry>>,
    serve_added: Signal,
    next_id: AtomicUsize,
    frame_len: usize,
    report_period: u32,
    channels: Arc<Channels>,
    metrics: Arc<PipelineMetrics>,
}

impl FrameBroadcaster {
    pub fn new(
        frame_len: usize,
        report_period: u32,
        channels: Arc<Channels>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            serves: RwLock::new(Vec::new()),
            serve_added: Signal::new(),
            next_id: AtomicUsize::new(0),
            frame_len,
            report_period,
            channels,
            metrics,
        }
    }

    /// 注册新的订阅者
    pub fn get_serve(&self) -> Viewer<Frame> {
        let serve = Arc::new(Serve::new(Frame::zeroed(self.frame_len)));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.serves.write().push(ServeEntry {
            serve: serve.clone(),
            missed: Mutex::new(MissedTicks::new(
                format!("FrameBroadcaster::Serve[{}]", id),
                "frames",
                self.report_period,
            )),
        });
        self.serve_added.send();
        debug!("FrameBroadcaster: new consumer of frames");
        Viewer::new(serve)
    }

    /// 注销订阅者；其阻塞中的读取立即返回
    pub fn stop_serve(&self, viewer: &Viewer<Frame>) -> bool {
        let mut serves = self.serves.write();
        let Some(index) = serves
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.serve, viewer.serve()))
        else {
            return false;
        };
        let entry = serves.remove(index);
        entry.serve.close();
        debug!("FrameBroadcaster: stop serving frames to consumer");
        true
    }

    pub fn serve_count(&self) -> usize {
        self.serves.read().len()
    }
}

impl Operation for FrameBroadcaster {
    fn execute(&self, token: &StopToken) {
        let mut frame = Frame::zeroed(self.frame_len);

        debug!("FrameBroadcaster: started");

        while token.should_continue() {
            if self.serves.read().is_empty() {
                self.serve_added.wait_timeout(SERVE_WAIT);
                continue;
            }

            if self.channels.frames.wait(&mut frame) != Recv::Data {
                continue;
            }
            if !token.should_continue() {
                break;
            }

            let serves = self.serves.read();
            for entry in serves.iter() {
                entry.missed.lock().observe(entry.serve.was_consumed());
                entry.serve.publish(|slot| slot.copy_from(&frame));
                self.metrics.frames_published.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!("FrameBroadcaster: stopped");
    }

    fn flush_pipes(&self) {
        self.channels.frames.flush();
        self.serve_added.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::PipelineTask;

    fn frame_with(increment: u32) -> Frame {
        let mut frame = Frame::zeroed(64);
        frame[4..8].copy_from_slice(&increment.to_le_bytes());
        frame
    }

    #[test]
    fn test_publish_to_every_viewer() {
        let channels = Arc::new(Channels::new(512, 64));
        let broadcaster = Arc::new(FrameBroadcaster::new(
            64,
            250,
            channels.clone(),
            Arc::new(PipelineMetrics::new()),
        ));
        let task = PipelineTask::new("broadcaster", broadcaster.clone());
        task.start().unwrap();

        let mut a = broadcaster.get_serve();
        let mut b = broadcaster.get_serve();
        assert_eq!(broadcaster.serve_count(), 2);

        // 等待广播线程进入等帧状态
        std::thread::sleep(Duration::from_millis(60));
        channels.frames.send(&mut frame_with(7));

        let got_a = a.consume_timeout(Duration::from_secs(1)).map(|f| f.increment());
        let got_b = b.consume_timeout(Duration::from_secs(1)).map(|f| f.increment());
        assert_eq!(got_a, Some(7));
        assert_eq!(got_b, Some(7));

        assert!(broadcaster.stop_serve(&a));
        assert!(!broadcaster.stop_serve(&a));
        assert!(a.consume_timeout(Duration::from_millis(1)).is_none());
        assert_eq!(broadcaster.serve_count(), 1);

        task.stop();
    }

    #[test]
    fn test_slow_viewer_does_not_block_others() {
        let channels = Arc::new(Channels::new(512, 64));
        let broadcaster = Arc::new(FrameBroadcaster::new(
            64,
            250,
            channels.clone(),
            Arc::new(PipelineMetrics::new()),
        ));
        let task = PipelineTask::new("broadcaster", broadcaster.clone());
        task.start().unwrap();

        let _slow = broadcaster.get_serve();
        let mut fast = broadcaster.get_serve();

        for i in 1..=5u32 {
            channels.frames.send(&mut frame_with(i));
            let got = fast
                .consume_timeout(Duration::from_secs(1))
                .map(|f| f.increment());
            assert_eq!(got, Some(i));
        }

        task.stop();
    }
}
