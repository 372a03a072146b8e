//! 采集管线
//!
//! 从 HID 设备读取运动传感器报告，经帧提取、自适应节拍与丢帧恢复后，
//! 分发给任意数量的订阅者：
//!
//! - [`PipelineTask`]: 可协作停止、超时放弃的阶段线程
//! - [`Signal`] / [`Pipe`]: 阶段间的唤醒信号与三缓冲管道
//! - [`Serve`] / [`Viewer`]: 每订阅者独立代数的广播视图
//! - [`FrameSource`]: 组装并启停整条管线
//!
//! # Example
//!
//! ```no_run
//! use sdgyro_driver::{FrameSource, PipelineConfig};
//! use sdgyro_hid::DeviceSpec;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let source = FrameSource::new(
//!     Arc::new(DeviceSpec::HiddevFile { path: "/dev/usb/hiddev0".into() }),
//!     PipelineConfig::default(),
//! )?;
//! let mut viewer = source.subscribe();
//! source.start()?;
//! if let Some(frame) = viewer.consume_timeout(Duration::from_millis(50)) {
//!     println!("increment = {}", frame.increment());
//! }
//! source.stop();
//! # Ok::<(), sdgyro_driver::DriverError>(())
//! ```

mod config;
mod diagnostics;
mod error;
mod frame;
mod metrics;
pub mod pipe;
mod scan;
pub mod serve;
pub mod signal;
mod source;
mod stages;
pub mod task;

pub use config::{
    DEFAULT_ENABLE_MOTION_REPORT, ENABLE_MOTION_REPORT_LEN, LossAnalysisConfig, PipelineConfig,
};
pub use diagnostics::{MissedEvent, MissedTicks};
pub use error::DriverError;
pub use frame::{Frame, INCREMENT_OFFSET};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipe::{Pipe, Recv};
pub use scan::ScanPeriod;
pub use serve::{ConsumeLock, Serve, ServeLock, Viewer};
pub use signal::Signal;
pub use source::FrameSource;
pub use task::{Operation, PipelineTask, StopOutcome, StopToken};
