//! 常用类型一次性导入
//!
//! ```rust
//! use sdgyro_sdk::prelude::*;
//! ```

pub use crate::{
    AdapterConfig, BindInterface, DeviceOpener, DeviceSpec, DriverError, DsuError, DsuServer,
    FrameSource, GyroCalibrator, HidError, MotionAdapter, MotionData, MotionSource,
    PipelineConfig, ServerConfig, Transport,
};
