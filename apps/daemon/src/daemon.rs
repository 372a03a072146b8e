//! 守护进程核心逻辑
//!
//! 组装 FrameSource → MotionAdapter → DsuServer，按运行模式阻塞直到收到退出信号。

use sdgyro_sdk::driver::Signal;
use sdgyro_sdk::dsu::DeckReport;
use sdgyro_sdk::{
    AdapterConfig, DeviceSpec, DsuError, DsuServer, FrameSource, GyroCalibrator, MotionAdapter,
    MotionSource, PipelineConfig, ServerConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 样本日志间隔（按样本数）
const TEST_RUN_LOG_EVERY: u64 = 250;

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// DSU 服务端，直到 Ctrl+C
    Serve,
    /// 不启动服务端，打印样本
    TestRun(Duration),
    /// 陀螺仪标定
    Calibrate(Duration),
}

/// 守护进程配置
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub device: DeviceSpec,
    pub pipeline: PipelineConfig,
    pub adapter: AdapterConfig,
    pub server: ServerConfig,
    pub mode: Mode,
}

pub struct Daemon {
    config: DaemonConfig,
    source: Arc<FrameSource>,
    adapter: Arc<MotionAdapter>,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Result<Self, DsuError> {
        let source = Arc::new(FrameSource::new(
            Arc::new(config.device.clone()),
            config.pipeline.clone(),
        )?);
        let adapter = Arc::new(MotionAdapter::new(source.clone(), config.adapter.clone()));
        Ok(Self {
            config,
            source,
            adapter,
        })
    }

    /// 阻塞运行，直到模式完成或收到 `shutdown`
    pub fn run(&mut self, shutdown: &Signal) -> Result<(), DsuError> {
        let result = match self.config.mode {
            Mode::Serve => self.serve(shutdown),
            Mode::TestRun(duration) => self.test_run(duration, shutdown),
            Mode::Calibrate(duration) => self.calibrate(duration, shutdown),
        };

        let metrics = self.source.metrics();
        info!(
            "Daemon: frames read {}, published {}, unsynced {}, stuck {}, forced restarts {}, scan updates {}",
            metrics.frames_read,
            metrics.frames_published,
            metrics.unsynced,
            metrics.read_stuck,
            metrics.forced_restarts,
            metrics.scan_updates
        );
        result
    }

    fn serve(&self, shutdown: &Signal) -> Result<(), DsuError> {
        let mut server = DsuServer::bind(self.config.server.clone(), self.adapter.clone())?;
        eprintln!(
            "sdgyrodsu started on {}. Press Ctrl+C to stop.",
            server.local_addr()
        );

        shutdown.wait();
        server.shutdown();
        Ok(())
    }

    fn test_run(&self, duration: Duration, shutdown: &Signal) -> Result<(), DsuError> {
        self.adapter.start()?;
        info!("Daemon: test run for {:?}", duration);

        let deadline = Instant::now() + duration;
        let mut count: u64 = 0;
        while Instant::now() < deadline && !shutdown.try_signal() {
            let sample = self.adapter.next_sample();
            count += 1;
            if count % TEST_RUN_LOG_EVERY == 0 {
                info!(
                    "Daemon: #{} t={}us accel=({:.3}, {:.3}, {:.3}) gyro=({:.2}, {:.2}, {:.2})",
                    count,
                    sample.timestamp,
                    sample.accel_x,
                    sample.accel_y,
                    sample.accel_z,
                    sample.pitch,
                    sample.yaw,
                    sample.roll
                );
            }
        }

        self.adapter.stop();
        info!(
            "Daemon: test run produced {} samples, scan period {:?}",
            count,
            self.source.scan_period()
        );
        Ok(())
    }

    fn calibrate(&self, duration: Duration, shutdown: &Signal) -> Result<(), DsuError> {
        let mut viewer = self.source.subscribe();
        let mut calibrator = GyroCalibrator::new(self.config.adapter.device_period);

        if let Err(e) = self.source.start() {
            self.source.unsubscribe(&viewer);
            return Err(e.into());
        }
        eprintln!(
            "Calibrating for {:?}: rotate the device steadily around its horizontal axis.",
            duration
        );

        let deadline = Instant::now() + duration;
        while Instant::now() < deadline && !shutdown.try_signal() {
            let report = viewer
                .consume_timeout(Duration::from_millis(100))
                .map(|frame| DeckReport::decode(&frame));
            if let Some(Ok(report)) = report {
                calibrator.process(&report);
            }
        }

        self.source.stop();
        self.source.unsubscribe(&viewer);

        match calibrator.estimate() {
            Some(value) => info!(
                "Daemon: {} gyro samples over {:?}, {:.2} raw units per deg/s (nominal {})",
                calibrator.samples(),
                calibrator.elapsed(),
                value,
                self.config.adapter.gyro_1dps
            ),
            None => warn!(
                "Daemon: calibration inconclusive ({} samples), the device did not rotate",
                calibrator.samples()
            ),
        }
        Ok(())
    }
}
