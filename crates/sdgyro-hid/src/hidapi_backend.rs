//! hidapi 后端
//!
//! 按 VID/PID 枚举设备，并选择指定接口号，与 libhidapi 的 `hid_open_path` 流程一致。

use crate::{HidDevice, HidError};
use std::time::Duration;
use tracing::debug;

pub struct HidApiDevice {
    device: hidapi::HidDevice,
}

impl HidApiDevice {
    pub fn open(vendor_id: u16, product_id: u16, interface: i32) -> Result<Self, HidError> {
        let api = hidapi::HidApi::new().map_err(|e| HidError::Backend(e.to_string()))?;

        let info = api
            .device_list()
            .find(|info| {
                info.vendor_id() == vendor_id
                    && info.product_id() == product_id
                    && info.interface_number() == interface
            })
            .ok_or_else(|| {
                HidError::NotFound(format!(
                    "{:04x}:{:04x} interface {}",
                    vendor_id, product_id, interface
                ))
            })?;

        let device = info
            .open_device(&api)
            .map_err(|e| HidError::Backend(e.to_string()))?;
        device
            .set_blocking_mode(true)
            .map_err(|e| HidError::Backend(e.to_string()))?;

        debug!(
            "HidApiDevice: opened {:04x}:{:04x} interface {}",
            vendor_id, product_id, interface
        );
        Ok(Self { device })
    }
}

impl HidDevice for HidApiDevice {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError> {
        let timeout_ms = timeout.as_millis().clamp(1, i32::MAX as u128) as i32;
        self.device
            .read_timeout(buf, timeout_ms)
            .map_err(|e| HidError::Backend(e.to_string()))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HidError> {
        self.device
            .write(data)
            .map_err(|e| HidError::Backend(e.to_string()))
    }
}
