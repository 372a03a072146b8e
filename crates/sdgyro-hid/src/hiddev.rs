//! hiddev 字符设备传输
//!
//! `/dev/usb/hiddevN` 以 `struct hiddev_event` 记录流的形式输出报告，
//! 每个报告字节占一条 8 字节记录。本模块只负责按截止时间读满一组记录，
//! 帧对齐校验由采集管线完成。

use crate::fd::read_full_until;
use crate::{HidDevice, HidError};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// 以只读方式打开的 hiddev 设备
#[derive(Debug)]
pub struct HiddevFile {
    path: PathBuf,
    file: File,
}

impl HiddevFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HidError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HidError::NotFound(path.display().to_string())
            } else {
                HidError::Io(e)
            }
        })?;
        debug!("HiddevFile: opened {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HidDevice for HiddevFile {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError> {
        read_full_until(&mut self.file, buf, timeout)
    }
}

impl Drop for HiddevFile {
    fn drop(&mut self) {
        debug!("HiddevFile: closing {}", self.path.display());
    }
}
