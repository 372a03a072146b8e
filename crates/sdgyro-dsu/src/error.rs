//! DSU 服务错误类型

use sdgyro_driver::DriverError;
use sdgyro_protocol::ProtocolError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DsuError {
    /// 绑定 UDP 端口失败（启动时致命）
    #[error("Failed to bind UDP socket at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 帧源启动失败（设备不可用等）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 报告长度不足以包含 IMU 数据
    #[error("Report too short: expected at least {expected} bytes, got {actual}")]
    ShortReport { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdgyro_hid::HidError;

    #[test]
    fn test_error_display() {
        let err = DsuError::Bind {
            addr: "0.0.0.0:26760".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.0.0.0:26760") && msg.contains("in use"));

        let err = DsuError::ShortReport {
            expected: 36,
            actual: 8,
        };
        assert_eq!(
            err.to_string(),
            "Report too short: expected at least 36 bytes, got 8"
        );
    }

    #[test]
    fn test_conversions() {
        let err: DsuError = DriverError::Hid(HidError::Disconnected).into();
        assert!(matches!(err, DsuError::Driver(DriverError::Hid(_))));

        let err: DsuError = ProtocolError::UnknownEventType(7).into();
        assert!(matches!(err, DsuError::Protocol(_)));
    }
}
