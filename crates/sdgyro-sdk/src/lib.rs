//! sdgyro SDK - Steam Deck 陀螺仪 DSU 桥
//!
//! 把 Steam Deck 内置 IMU 的 HID 报告转换为 DSU（Cemuhook）协议的运动数据，
//! 供 Cemu、Yuzu、Dolphin 等模拟器通过 UDP 订阅。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): DSU 报文编解码、CRC32
//! - **设备层** (`hid`): hiddev / hidraw / hidapi 传输
//! - **采集层** (`driver`): 读取、解帧、节拍控制、丢帧分析、多视图分发
//! - **服务层** (`dsu`): 运动样本换算、补帧、UDP 服务端
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use sdgyro_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! sdgyro_sdk::init_logger!();
//!
//! let source = Arc::new(FrameSource::new(
//!     Arc::new(DeviceSpec::steam_deck()),
//!     PipelineConfig::default(),
//! )?);
//! let adapter = Arc::new(MotionAdapter::new(source, AdapterConfig::default()));
//! let _server = DsuServer::bind(ServerConfig::from_env(), adapter)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use sdgyro_driver as driver;
pub use sdgyro_dsu as dsu;
pub use sdgyro_hid as hid;
pub use sdgyro_protocol as protocol;

pub mod prelude;

// 各层错误
pub use sdgyro_driver::DriverError;
pub use sdgyro_dsu::DsuError;
pub use sdgyro_hid::HidError;
pub use sdgyro_protocol::ProtocolError;

// 常用入口
pub use sdgyro_driver::{FrameSource, MetricsSnapshot, PipelineConfig};
pub use sdgyro_dsu::{
    AdapterConfig, BindInterface, DsuServer, GyroCalibrator, MotionAdapter, MotionSource,
    ServerConfig,
};
pub use sdgyro_hid::{DeviceOpener, DeviceSpec, Transport};
pub use sdgyro_protocol::MotionData;

#[doc(hidden)]
pub mod __private {
    pub use tracing;
    pub use tracing_log;
    pub use tracing_subscriber;
}

/// 初始化日志
///
/// 使用 `RUST_LOG` 作为过滤规则；未设置时使用传入的默认级别（缺省 `info`）。
/// 同时把 `log` 记录转发到 `tracing`。重复调用无副作用。
///
/// ```rust
/// sdgyro_sdk::init_logger!("debug");
/// sdgyro_sdk::init_logger!();
/// ```
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger!("info")
    };
    ($default:expr) => {{
        use $crate::__private::tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new($default));
        let subscriber = $crate::__private::tracing_subscriber::fmt()
            .with_env_filter(filter)
            .finish();
        if $crate::__private::tracing::subscriber::set_global_default(subscriber).is_ok() {
            let _ = $crate::__private::tracing_log::LogTracer::init();
        }
    }};
}
