//! 服务端与适配器配置

use sdgyro_protocol::{DECK_SLOT, DEFAULT_PORT};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::warn;

/// 覆盖监听端口的环境变量
pub const PORT_ENV: &str = "SDGYRO_SERVER_PORT";

/// 监听地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindInterface {
    /// 仅本机（127.0.0.1）
    Local,
    /// 所有网卡（0.0.0.0）
    #[default]
    All,
}

impl BindInterface {
    pub fn ip(self) -> IpAddr {
        match self {
            BindInterface::Local => IpAddr::V4(Ipv4Addr::LOCALHOST),
            BindInterface::All => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl std::str::FromStr for BindInterface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(BindInterface::Local),
            "all" => Ok(BindInterface::All),
            other => Err(format!("unknown interface '{}', expected 'local' or 'all'", other)),
        }
    }
}

/// DSU 服务端配置
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub interface: BindInterface,
    pub port: u16,
    /// 本机控制器所在槽位
    pub slot: u8,
    /// 接收超时；每次超时都计入客户端超时
    pub receive_timeout: Duration,
    /// 每广播多少个包给所有客户端计一次超时
    pub timeout_check_period: u32,
    /// 超时计数超过该值即剔除客户端
    pub client_timeout_limit: u32,
    /// 两次广播之间的停顿
    pub send_pause: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interface: BindInterface::All,
            port: DEFAULT_PORT,
            slot: DECK_SLOT,
            receive_timeout: Duration::from_secs(2),
            timeout_check_period: 500,
            client_timeout_limit: 3,
            send_pause: Duration::from_micros(2),
        }
    }
}

impl ServerConfig {
    /// 默认配置，端口可由 `SDGYRO_SERVER_PORT` 覆盖
    pub fn from_env() -> Self {
        Self::default().with_port_var(std::env::var(PORT_ENV).ok().as_deref())
    }

    /// 应用端口环境变量的值；无法解析时保留原端口
    pub fn with_port_var(mut self, value: Option<&str>) -> Self {
        if let Some(value) = value {
            match value.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => warn!(
                    "ServerConfig: ignoring invalid {}='{}', using port {}",
                    PORT_ENV, value, self.port
                ),
            }
        }
        self
    }
}

/// 帧到运动样本的换算与补帧参数
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    /// 设备标称报告周期，用于推导时间戳
    pub device_period: Duration,
    /// 1g 对应的加速度原始值
    pub accel_1g: f32,
    /// 1°/s 对应的陀螺仪原始值
    pub gyro_1dps: f32,
    /// 陀螺仪死区（绝对值小于该值归零）
    pub gyro_deadzone: i16,
    /// 加速度跳变超过该值时平滑器直接跟随
    pub accel_smooth_threshold: i32,
    /// 平滑时旧值的权重
    pub smoothing_weight: f32,
    /// 帧计数跳变不超过该值时补帧，否则直接跳变
    pub replication_ceiling: u32,
    /// 帧计数回退在该范围内视为重复帧
    pub repeat_tolerance: u32,
    /// 等待新帧的超时
    pub consume_timeout: Duration,
    /// 连续读到重复帧的最大重试次数
    pub max_repeat_retries: u32,
    /// 传感器关闭检测的冷却时间
    pub no_gyro_cooldown: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            device_period: Duration::from_micros(4000),
            accel_1g: 16384.0,
            gyro_1dps: 16.0,
            gyro_deadzone: 8,
            accel_smooth_threshold: 0x1FF,
            smoothing_weight: 0.95,
            replication_ceiling: 100,
            repeat_tolerance: 40,
            consume_timeout: Duration::from_millis(50),
            max_repeat_retries: 16,
            no_gyro_cooldown: Duration::from_secs(1),
        }
    }
}

impl AdapterConfig {
    pub(crate) fn period_us(&self) -> u64 {
        self.device_period.as_micros() as u64
    }
}
