//! HID 传输层抽象
//!
//! 为上层采集管线提供统一的设备读写接口，屏蔽具体后端差异：
//!
//! - `hiddev`: Linux `/dev/usb/hiddevN` 字符设备，每个报告字节封装在一条 8 字节记录中
//! - `hidraw`: Linux `/dev/hidrawN`，按整帧报告读取，可写
//! - `hidapi`（feature）: 通过 VID/PID/接口号打开设备
//! - `mock`（feature）: 无硬件的脚本化设备，用于测试
//!
//! 所有读取都带超时（`poll` 截止时间），调用方可以据此实现协作式停止。

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[cfg(target_os = "linux")]
mod fd;
#[cfg(target_os = "linux")]
pub mod hiddev;
#[cfg(target_os = "linux")]
pub mod hidraw;

#[cfg(feature = "hidapi")]
pub mod hidapi_backend;

#[cfg(feature = "mock")]
pub mod mock;

/// Steam Deck 控制器 USB Vendor ID
pub const STEAM_DECK_VID: u16 = 0x28DE;
/// Steam Deck 控制器 USB Product ID
pub const STEAM_DECK_PID: u16 = 0x1205;
/// 运动传感器所在的 USB 接口号
pub const STEAM_DECK_INTERFACE: i32 = 2;

/// hiddev 单条记录长度（`struct hiddev_event { u32 hid; i32 value; }`）
pub const HIDDEV_RECORD_LEN: usize = 8;
/// 报告字节在记录中的偏移（`value` 的低字节）
pub const HIDDEV_PAYLOAD_OFFSET: usize = 4;
/// 记录的 usage code（小端 `hid` 字段）
pub const HIDDEV_USAGE_CODE: u32 = 0xFFFF_0002;
/// 备用 usage code，仅在帧起始字节匹配时接受
pub const HIDDEV_USAGE_CODE_ALT: u32 = 0xFFFF_0001;

/// HID 传输层错误
#[derive(Error, Debug)]
pub enum HidError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 设备未找到
    #[error("Device not found: {0}")]
    NotFound(String),

    /// 设备已断开（读到 EOF）
    #[error("Device disconnected")]
    Disconnected,

    /// 操作不被该后端支持
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// 后端库错误
    #[error("Backend error: {0}")]
    Backend(String),
}

/// 原始记录的组织方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// 每个报告字节封装在一条定长记录中（hiddev）
    RecordStream {
        record_len: usize,
        payload_offset: usize,
    },
    /// 原始记录即为完整报告（hidraw / hidapi）
    Report,
}

impl Transport {
    /// hiddev 的标准记录格式
    pub const HIDDEV: Transport = Transport::RecordStream {
        record_len: HIDDEV_RECORD_LEN,
        payload_offset: HIDDEV_PAYLOAD_OFFSET,
    };

    /// 一帧报告对应的原始记录长度
    pub fn raw_len(&self, frame_len: usize) -> usize {
        match self {
            Transport::RecordStream { record_len, .. } => frame_len * record_len,
            Transport::Report => frame_len,
        }
    }

    pub fn is_record_stream(&self) -> bool {
        matches!(self, Transport::RecordStream { .. })
    }
}

/// 已打开的 HID 设备
///
/// 实现者只需保证 `read` 在 `timeout` 内返回（超时返回 `Ok(0)`）。
pub trait HidDevice: Send {
    /// 读取一条原始记录到 `buf`
    ///
    /// # 返回值
    /// - `Ok(0)`: 超时，无数据
    /// - `Ok(n)`: 读取了 `n` 字节，`n < buf.len()` 表示记录不完整
    /// - `Err(_)`: 设备错误，调用方应重连
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError>;

    /// 写出一条报告（如重新启用传感器）
    fn write(&mut self, _data: &[u8]) -> Result<usize, HidError> {
        Err(HidError::Unsupported("write"))
    }
}

/// 设备打开器：采集线程每次（重）连接时调用
pub trait DeviceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn HidDevice>, HidError>;

    fn transport(&self) -> Transport;

    /// 是否支持写出报告
    fn writable(&self) -> bool {
        false
    }
}

/// 设备标识（由调用方提供，本 crate 不做枚举发现）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// hiddev 字符设备路径
    HiddevFile { path: PathBuf },
    /// hidraw 设备路径
    Hidraw { path: PathBuf },
    /// 通过 VID/PID/接口号打开（需要 `hidapi` feature）
    HidApi {
        vendor_id: u16,
        product_id: u16,
        interface: i32,
    },
}

impl DeviceSpec {
    /// Steam Deck 控制器的 hidapi 描述
    pub fn steam_deck() -> Self {
        DeviceSpec::HidApi {
            vendor_id: STEAM_DECK_VID,
            product_id: STEAM_DECK_PID,
            interface: STEAM_DECK_INTERFACE,
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::HiddevFile { path } => write!(f, "hiddev:{}", path.display()),
            DeviceSpec::Hidraw { path } => write!(f, "hidraw:{}", path.display()),
            DeviceSpec::HidApi {
                vendor_id,
                product_id,
                interface,
            } => write!(
                f,
                "hidapi:{:04x}:{:04x}#{}",
                vendor_id, product_id, interface
            ),
        }
    }
}

impl DeviceOpener for DeviceSpec {
    fn open(&self) -> Result<Box<dyn HidDevice>, HidError> {
        match self {
            #[cfg(target_os = "linux")]
            DeviceSpec::HiddevFile { path } => Ok(Box::new(hiddev::HiddevFile::open(path)?)),
            #[cfg(target_os = "linux")]
            DeviceSpec::Hidraw { path } => Ok(Box::new(hidraw::HidrawDevice::open(path)?)),
            #[cfg(not(target_os = "linux"))]
            DeviceSpec::HiddevFile { .. } | DeviceSpec::Hidraw { .. } => {
                Err(HidError::Unsupported("hiddev/hidraw require Linux"))
            },
            #[cfg(feature = "hidapi")]
            DeviceSpec::HidApi {
                vendor_id,
                product_id,
                interface,
            } => Ok(Box::new(hidapi_backend::HidApiDevice::open(
                *vendor_id,
                *product_id,
                *interface,
            )?)),
            #[cfg(not(feature = "hidapi"))]
            DeviceSpec::HidApi { .. } => Err(HidError::Unsupported(
                "hidapi backend not compiled in (enable the `hidapi` feature)",
            )),
        }
    }

    fn transport(&self) -> Transport {
        match self {
            DeviceSpec::HiddevFile { .. } => Transport::HIDDEV,
            DeviceSpec::Hidraw { .. } | DeviceSpec::HidApi { .. } => Transport::Report,
        }
    }

    fn writable(&self) -> bool {
        !matches!(self, DeviceSpec::HiddevFile { .. })
    }
}
