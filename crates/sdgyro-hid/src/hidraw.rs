//! hidraw 传输
//!
//! `/dev/hidrawN` 每次 `read` 返回一个完整报告，且支持写出报告。

use crate::fd::wait_readable;
use crate::{HidDevice, HidError};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct HidrawDevice {
    path: PathBuf,
    file: File,
}

impl HidrawDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HidError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    HidError::NotFound(path.display().to_string())
                } else {
                    HidError::Io(e)
                }
            })?;
        debug!("HidrawDevice: opened {}", path.display());
        Ok(Self { path, file })
    }
}

impl HidDevice for HidrawDevice {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError> {
        if !wait_readable(&self.file, timeout)? {
            return Ok(0);
        }
        match self.file.read(buf) {
            Ok(0) => Err(HidError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted || e.kind() == ErrorKind::WouldBlock => {
                Ok(0)
            },
            Err(e) => Err(HidError::Io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HidError> {
        trace!("HidrawDevice: writing {} bytes to {}", data.len(), self.path.display());
        Ok(self.file.write(data)?)
    }
}
