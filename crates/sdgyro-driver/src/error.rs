//! 驱动层错误类型定义

use sdgyro_hid::HidError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// HID 设备错误（启动时打开设备失败）
    #[error("HID device error: {0}")]
    Hid(#[from] HidError),

    /// 线程创建失败
    #[error("Failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
