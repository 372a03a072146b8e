//! FrameSource：采集管线门面
//!
//! 将各阶段组装为有序的任务列表：
//!
//! 1. PaceController（仅记录流）
//! 2. LossAnalyzer（仅记录流）
//! 3. DeviceReader
//! 4. FrameExtractor
//! 5. FrameBroadcaster
//!
//! `start()` 按顺序启动，`stop()` 逆序停止，每个阶段限时协作式停止、超时放弃。

use crate::config::PipelineConfig;
use crate::error::DriverError;
use crate::frame::Frame;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::scan::ScanPeriod;
use crate::serve::Viewer;
use crate::stages::Channels;
use crate::stages::broadcaster::FrameBroadcaster;
use crate::stages::extractor::{ExtractorSettings, FrameExtractor};
use crate::stages::loss::LossAnalyzer;
use crate::stages::metronome::PaceController;
use crate::stages::reader::DeviceReader;
use crate::task::PipelineTask;
use parking_lot::Mutex;
use sdgyro_hid::{DeviceOpener, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 可启停的帧源
pub struct FrameSource {
    config: PipelineConfig,
    transport: Transport,
    channels: Arc<Channels>,
    scan: Arc<ScanPeriod>,
    metrics: Arc<PipelineMetrics>,
    broadcaster: Arc<FrameBroadcaster>,
    tasks: Vec<Arc<PipelineTask>>,
    /// 防止启动与停止交错
    start_stop: Mutex<()>,
}

impl FrameSource {
    /// 组装管线（不打开设备，不启动线程）
    pub fn new(opener: Arc<dyn DeviceOpener>, config: PipelineConfig) -> Result<Self, DriverError> {
        config.validate()?;

        let transport = opener.transport();
        let paced = transport.is_record_stream();
        let channels = Arc::new(Channels::new(
            transport.raw_len(config.frame_len),
            config.frame_len,
        ));
        let scan = Arc::new(ScanPeriod::new(
            config.scan_period,
            config.scan_period_band.clone(),
        ));
        let metrics = Arc::new(PipelineMetrics::new());

        let mut tasks = Vec::new();
        if paced {
            tasks.push(Arc::new(PipelineTask::new(
                "sdgyro-pace",
                Arc::new(PaceController::new(
                    scan.clone(),
                    config.missed_tick_report_period,
                    channels.clone(),
                    metrics.clone(),
                )),
            )));
            tasks.push(Arc::new(PipelineTask::new(
                "sdgyro-loss",
                Arc::new(LossAnalyzer::new(
                    config.loss.clone(),
                    scan.clone(),
                    channels.clone(),
                )),
            )));
        }

        let reader = Arc::new(PipelineTask::new(
            "sdgyro-reader",
            Arc::new(DeviceReader::new(
                opener,
                &config,
                scan.clone(),
                channels.clone(),
                metrics.clone(),
            )),
        ));
        tasks.push(reader.clone());

        tasks.push(Arc::new(PipelineTask::new(
            "sdgyro-extractor",
            Arc::new(FrameExtractor::new(
                reader,
                ExtractorSettings {
                    transport,
                    frame_len: config.frame_len,
                    analyze_loss: paced,
                    stuck_timeout: config.stuck_timeout,
                    restart_timeout: config.restart_timeout,
                    report_period: config.missed_tick_report_period,
                },
                channels.clone(),
                metrics.clone(),
            )),
        )));

        let broadcaster = Arc::new(FrameBroadcaster::new(
            config.frame_len,
            config.missed_tick_report_period,
            channels.clone(),
            metrics.clone(),
        ));
        tasks.push(Arc::new(PipelineTask::new(
            "sdgyro-broadcaster",
            broadcaster.clone(),
        )));

        debug!("FrameSource: pipeline initialized, waiting for start");

        Ok(Self {
            config,
            transport,
            channels,
            scan,
            metrics,
            broadcaster,
            tasks,
            start_stop: Mutex::new(()),
        })
    }

    /// 按管线顺序启动所有阶段；任一阶段失败则回滚已启动的阶段
    pub fn start(&self) -> Result<(), DriverError> {
        let _guard = self.start_stop.lock();

        debug!("FrameSource: attempting to start the pipeline");

        for (index, task) in self.tasks.iter().enumerate() {
            if let Err(e) = task.start() {
                error!("FrameSource: failed to start {}: {}", task.name(), e);
                for started in self.tasks[..index].iter().rev() {
                    started.try_stop_then_kill(self.config.stop_timeout);
                }
                return Err(e);
            }
        }

        info!("FrameSource: started the pipeline");
        Ok(())
    }

    /// 逆序停止所有阶段
    pub fn stop(&self) {
        let _guard = self.start_stop.lock();

        debug!("FrameSource: attempting to stop the pipeline");

        for task in self.tasks.iter().rev() {
            task.try_stop_then_kill(self.config.stop_timeout);
        }

        info!("FrameSource: stopped the pipeline");
    }

    /// 任一阶段在运行
    pub fn is_started(&self) -> bool {
        self.tasks.iter().any(|task| task.is_started())
    }

    /// 部分阶段已停止或正在停止
    pub fn is_stopping(&self) -> bool {
        self.is_started()
            && self
                .tasks
                .iter()
                .any(|task| !task.is_started() || task.is_stopping())
    }

    /// 订阅帧
    pub fn subscribe(&self) -> Viewer<Frame> {
        self.broadcaster.get_serve()
    }

    /// 退订；返回该视图是否仍在注册中
    pub fn unsubscribe(&self, viewer: &Viewer<Frame>) -> bool {
        self.broadcaster.stop_serve(viewer)
    }

    /// 请求读取线程写出重新启用运动传感器的报告（仅可写传输生效）
    pub fn request_motion_enable(&self) {
        self.channels.enable_motion.send();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 当前扫描周期
    pub fn scan_period(&self) -> Duration {
        self.scan.get()
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}
