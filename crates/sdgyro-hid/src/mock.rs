//! 脚本化 Mock 设备
//!
//! 按固定周期输出帧计数单调递增的报告，可注入：
//! - 错位记录（错误的记录头 / 不完整报告）
//! - 第 N 次读取时永久阻塞（忽略超时，模拟卡死在系统调用中）
//! - 打开失败
//!
//! 多次打开共享同一份脚本状态，帧计数在重连之间连续。

use crate::{DeviceOpener, HidDevice, HidError, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// hiddev 正常记录头
pub const RECORD_HEADER: u32 = crate::HIDDEV_USAGE_CODE;

/// 注入错位时使用的记录头
pub const BAD_RECORD_HEADER: u32 = 0x1234_5678;

/// Mock 行为脚本
#[derive(Debug, Clone)]
pub struct MockScript {
    pub transport: Transport,
    pub frame_len: usize,
    /// 报告输出周期
    pub period: Duration,
    pub first_increment: u32,
    pub record_header: u32,
    /// 每帧的前导字节
    pub report_prefix: Vec<u8>,
    /// 加速度 RtL/TtB/FtB、陀螺仪 RtL/TtB/FtB（帧偏移 24..36）
    pub imu: [i16; 6],
    /// 输出错位记录的序号（按已输出记录计数，从 0 开始）
    pub malformed: Vec<u64>,
    /// 在该序号的读取上永久阻塞
    pub block_on: Option<u64>,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            transport: Transport::HIDDEV,
            frame_len: 64,
            period: Duration::from_micros(4000),
            first_increment: 1000,
            record_header: RECORD_HEADER,
            report_prefix: vec![0x01, 0x00, 0x09, 0x40],
            imu: [0, 0x4000, 0, 0, 0, 0],
            malformed: Vec::new(),
            block_on: None,
        }
    }
}

struct MockShared {
    script: MockScript,
    emitted: AtomicU64,
    opens: AtomicUsize,
    next_increment: AtomicU32,
    released: AtomicBool,
    fail_open: AtomicBool,
    blocked: AtomicUsize,
    writes: Mutex<Vec<Vec<u8>>>,
    imu: Mutex<[i16; 6]>,
}

/// Mock 设备打开器
#[derive(Clone)]
pub struct MockOpener {
    shared: Arc<MockShared>,
}

impl MockOpener {
    pub fn new(script: MockScript) -> Self {
        Self {
            shared: Arc::new(MockShared {
                next_increment: AtomicU32::new(script.first_increment),
                imu: Mutex::new(script.imu),
                script,
                emitted: AtomicU64::new(0),
                opens: AtomicUsize::new(0),
                released: AtomicBool::new(false),
                fail_open: AtomicBool::new(false),
                blocked: AtomicUsize::new(0),
                writes: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn script(&self) -> &MockScript {
        &self.shared.script
    }

    /// 已输出的记录数（含错位记录）
    pub fn emitted(&self) -> u64 {
        self.shared.emitted.load(Ordering::SeqCst)
    }

    /// 成功打开次数
    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// 当前阻塞在读取中的线程数
    pub fn blocked(&self) -> usize {
        self.shared.blocked.load(Ordering::SeqCst)
    }

    /// 下一帧将使用的帧计数
    pub fn next_increment(&self) -> u32 {
        self.shared.next_increment.load(Ordering::SeqCst)
    }

    /// 已写出的报告
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.writes.lock().clone()
    }

    /// 修改后续帧的 IMU 数据
    pub fn set_imu(&self, imu: [i16; 6]) {
        *self.shared.imu.lock() = imu;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    /// 释放所有永久阻塞的读取
    pub fn release(&self) {
        self.shared.released.store(true, Ordering::SeqCst);
    }
}

impl DeviceOpener for MockOpener {
    fn open(&self) -> Result<Box<dyn HidDevice>, HidError> {
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(HidError::NotFound("mock device".to_string()));
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            shared: self.shared.clone(),
            next_due: Instant::now() + self.shared.script.period,
        }))
    }

    fn transport(&self) -> Transport {
        self.shared.script.transport
    }

    fn writable(&self) -> bool {
        true
    }
}

/// 已打开的 Mock 设备
pub struct MockDevice {
    shared: Arc<MockShared>,
    next_due: Instant,
}

impl MockDevice {
    fn build_frame(&self, increment: u32) -> Vec<u8> {
        let script = &self.shared.script;
        let mut frame = vec![0u8; script.frame_len];
        let prefix = script.report_prefix.len().min(frame.len());
        frame[..prefix].copy_from_slice(&script.report_prefix[..prefix]);
        if frame.len() >= 8 {
            frame[4..8].copy_from_slice(&increment.to_le_bytes());
        }
        if frame.len() >= 36 {
            let imu = *self.shared.imu.lock();
            for (i, value) in imu.iter().enumerate() {
                let offset = 24 + i * 2;
                frame[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
        frame
    }
}

impl HidDevice for MockDevice {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError> {
        let script = &self.shared.script;

        // 按周期输出；周期未到且超时先到，返回无数据
        let now = Instant::now();
        if self.next_due > now {
            let wait = self.next_due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(0);
            }
            thread::sleep(wait);
        }
        self.next_due = self.next_due.max(now) + script.period;

        let index = self.shared.emitted.fetch_add(1, Ordering::SeqCst);

        if script.block_on == Some(index) {
            self.shared.blocked.fetch_add(1, Ordering::SeqCst);
            while !self.shared.released.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            self.shared.blocked.fetch_sub(1, Ordering::SeqCst);
            return Ok(0);
        }

        let malformed = script.malformed.contains(&index);
        let increment = if malformed {
            self.shared.next_increment.load(Ordering::SeqCst)
        } else {
            self.shared.next_increment.fetch_add(1, Ordering::SeqCst)
        };
        let frame = self.build_frame(increment);

        match script.transport {
            Transport::RecordStream {
                record_len,
                payload_offset,
            } => {
                let header = if malformed {
                    BAD_RECORD_HEADER
                } else {
                    script.record_header
                };
                let len = buf.len().min(frame.len() * record_len);
                buf[..len].fill(0);
                for (i, byte) in frame.iter().enumerate() {
                    let start = i * record_len;
                    if start + record_len > len {
                        break;
                    }
                    buf[start..start + 4].copy_from_slice(&header.to_le_bytes());
                    buf[start + payload_offset] = *byte;
                }
                Ok(len)
            },
            Transport::Report => {
                let len = buf.len().min(frame.len());
                buf[..len].copy_from_slice(&frame[..len]);
                // 不完整报告
                if malformed { Ok(len / 2) } else { Ok(len) }
            },
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HidError> {
        self.shared.writes.lock().push(data.to_vec());
        Ok(data.len())
    }
}
