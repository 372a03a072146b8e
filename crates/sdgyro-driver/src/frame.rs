//! 帧缓冲

use std::ops::{Deref, DerefMut};

/// 帧计数在报告中的偏移
pub const INCREMENT_OFFSET: usize = 4;

/// 一帧完整的 HID 报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0; len])
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// 硬件帧计数（小端，字节 4..8）；帧过短返回 0
    pub fn increment(&self) -> u32 {
        self.0
            .get(INCREMENT_OFFSET..INCREMENT_OFFSET + 4)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_le_bytes)
            .unwrap_or(0)
    }

    /// 从整帧报告复制
    pub fn copy_from(&mut self, report: &[u8]) {
        let len = self.0.len().min(report.len());
        self.0[..len].copy_from_slice(&report[..len]);
    }

    /// 从记录流中抽取每条记录的负载字节
    pub fn deinterleave_from(&mut self, raw: &[u8], record_len: usize, payload_offset: usize) {
        for (byte, record) in self.0.iter_mut().zip(raw.chunks_exact(record_len)) {
            *byte = record[payload_offset];
        }
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for Frame {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}
