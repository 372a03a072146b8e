//! DeviceReader：从设备读取原始记录
//!
//! 每次读取都带截止时间（系数 × 当前扫描周期），超时返回空读取，
//! 因此停止令牌总能在一个读取周期内被观察到。
//!
//! - 记录流传输：校验记录头，错位或读取失败时重连并发出 `unsynced`
//! - 报告传输：不完整报告视为"尚无数据"并重试；在两次读取之间按需写出
//!   重新启用运动传感器的报告

use crate::config::PipelineConfig;
use crate::diagnostics::MissedTicks;
use crate::error::DriverError;
use crate::metrics::PipelineMetrics;
use crate::scan::ScanPeriod;
use crate::stages::Channels;
use crate::task::{Operation, StopToken};
use parking_lot::Mutex;
use sdgyro_hid::{DeviceOpener, HIDDEV_USAGE_CODE, HIDDEV_USAGE_CODE_ALT, HidDevice, Transport};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

pub(crate) struct DeviceReader {
    opener: Arc<dyn DeviceOpener>,
    transport: Transport,
    raw_len: usize,
    paced: bool,
    writable: bool,
    start_marker: Vec<u8>,
    enable_motion_report: Vec<u8>,
    read_timeout_factor: u32,
    report_period: u32,
    scan: Arc<ScanPeriod>,
    channels: Arc<Channels>,
    metrics: Arc<PipelineMetrics>,
    /// `prepare` 打开的设备，由下一次运行取走
    pending: Mutex<Option<Box<dyn HidDevice>>>,
}

impl DeviceReader {
    pub fn new(
        opener: Arc<dyn DeviceOpener>,
        config: &PipelineConfig,
        scan: Arc<ScanPeriod>,
        channels: Arc<Channels>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let transport = opener.transport();
        Self {
            writable: opener.writable(),
            raw_len: transport.raw_len(config.frame_len),
            paced: transport.is_record_stream(),
            transport,
            opener,
            start_marker: config.start_marker.clone(),
            enable_motion_report: config.enable_motion_report.clone(),
            read_timeout_factor: config.read_timeout_factor,
            report_period: config.missed_tick_report_period,
            scan,
            channels,
            metrics,
            pending: Mutex::new(None),
        }
    }

    fn open(&self) -> Option<Box<dyn HidDevice>> {
        debug!("DeviceReader: opening device");
        match self.opener.open() {
            Ok(device) => {
                self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                Some(device)
            },
            Err(e) => {
                warn!("DeviceReader: failed to reopen device: {}", e);
                None
            },
        }
    }

    /// 记录流的帧起始校验
    fn check_framing(&self, raw: &[u8]) -> bool {
        let Transport::RecordStream {
            record_len,
            payload_offset,
        } = self.transport
        else {
            return true;
        };

        let Some(header) = raw
            .get(0..4)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_le_bytes)
        else {
            return false;
        };

        if header == HIDDEV_USAGE_CODE {
            return true;
        }
        if header != HIDDEV_USAGE_CODE_ALT || self.start_marker.is_empty() {
            return false;
        }
        self.start_marker
            .iter()
            .enumerate()
            .all(|(j, byte)| raw.get(payload_offset + j * record_len) == Some(byte))
    }

    fn desync(&self, device: &mut Option<Box<dyn HidDevice>>) {
        *device = None;
        self.channels.unsynced.send();
        self.metrics.unsynced.fetch_add(1, Ordering::Relaxed);
    }

    fn write_enable_motion(&self, device: &mut dyn HidDevice) {
        match device.write(&self.enable_motion_report) {
            Ok(_) => {
                debug!("DeviceReader: motion sensor re-enable report sent");
                self.metrics.motion_reenables.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => warn!("DeviceReader: failed to send motion re-enable report: {}", e),
        }
    }
}

impl Operation for DeviceReader {
    fn prepare(&self) -> Result<(), DriverError> {
        let device = self.opener.open().map_err(|e| {
            warn!("DeviceReader: problem opening device: {}. Are privileges granted?", e);
            DriverError::Hid(e)
        })?;
        self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
        *self.pending.lock() = Some(device);
        Ok(())
    }

    fn execute(&self, token: &StopToken) {
        #[cfg(feature = "realtime")]
        {
            use thread_priority::*;

            match set_current_thread_priority(ThreadPriority::Max) {
                Ok(_) => debug!("DeviceReader: thread priority set to MAX (realtime)"),
                Err(e) => warn!(
                    "DeviceReader: failed to set thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                ),
            }
        }

        let mut device = self.pending.lock().take();
        let mut fill = vec![0u8; self.raw_len];
        let mut missed = MissedTicks::new("DeviceReader", "HID frames", self.report_period);

        debug!("DeviceReader: started");

        while token.should_continue() {
            let scan_period = self.scan.get();
            let read_timeout = scan_period * self.read_timeout_factor;

            let Some(dev) = device.as_mut() else {
                device = self.open();
                if device.is_none() {
                    std::thread::sleep(read_timeout);
                }
                continue;
            };

            if self.paced {
                self.channels.tick.wait_timeout(read_timeout);
                if !token.should_continue() {
                    break;
                }
            }

            if self.writable && self.channels.enable_motion.try_signal() {
                self.write_enable_motion(&mut **dev);
            }

            match dev.read(&mut fill, read_timeout) {
                Ok(0) => {
                    trace!("DeviceReader: waiting for data timed out");
                    continue;
                },
                Ok(n) if n < fill.len() => {
                    if self.transport.is_record_stream() {
                        debug!("DeviceReader: incomplete read ({} of {} bytes), reconnecting", n, fill.len());
                        self.desync(&mut device);
                    } else {
                        trace!("DeviceReader: incomplete report ({} of {} bytes)", n, fill.len());
                        self.metrics.short_reads.fetch_add(1, Ordering::Relaxed);
                    }
                    continue;
                },
                Ok(_) => {},
                Err(e) => {
                    debug!("DeviceReader: reading failed: {}, reconnecting", e);
                    self.desync(&mut device);
                    continue;
                },
            }

            if !self.check_framing(&fill) {
                debug!("DeviceReader: reading started in the middle of a frame, reconnecting");
                self.desync(&mut device);
                continue;
            }

            // 被放弃的运行不再向下游发送
            if !token.should_continue() {
                break;
            }

            self.metrics.frames_read.fetch_add(1, Ordering::Relaxed);
            missed.observe(self.channels.raw.was_received());
            self.channels.raw.send(&mut fill);
        }

        drop(device);
        debug!("DeviceReader: stopped");
    }

    fn flush_pipes(&self) {
        self.channels.tick.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdgyro_hid::mock::{MockOpener, MockScript};

    fn reader_for(script: MockScript, start_marker: Vec<u8>) -> DeviceReader {
        let config = PipelineConfig {
            start_marker,
            ..Default::default()
        };
        let opener = Arc::new(MockOpener::new(script));
        let transport = opener.transport();
        DeviceReader::new(
            opener,
            &config,
            Arc::new(ScanPeriod::new(config.scan_period, config.scan_period_band.clone())),
            Arc::new(Channels::new(transport.raw_len(config.frame_len), config.frame_len)),
            Arc::new(PipelineMetrics::new()),
        )
    }

    fn records(header: u32, payload: &[u8]) -> Vec<u8> {
        let mut raw = vec![0u8; 64 * 8];
        for i in 0..64 {
            raw[i * 8..i * 8 + 4].copy_from_slice(&header.to_le_bytes());
        }
        for (i, byte) in payload.iter().enumerate() {
            raw[i * 8 + 4] = *byte;
        }
        raw
    }

    #[test]
    fn test_framing_primary_header() {
        let reader = reader_for(MockScript::default(), Vec::new());
        assert!(reader.check_framing(&records(HIDDEV_USAGE_CODE, &[1, 0])));
        assert!(!reader.check_framing(&records(0x1234_5678, &[1, 0])));
        assert!(!reader.check_framing(&[0xFF, 0xFF]));
    }

    #[test]
    fn test_framing_alternative_header_needs_marker() {
        let reader = reader_for(MockScript::default(), Vec::new());
        assert!(!reader.check_framing(&records(HIDDEV_USAGE_CODE_ALT, &[1, 0])));

        let reader = reader_for(MockScript::default(), vec![1, 0, 9]);
        assert!(reader.check_framing(&records(HIDDEV_USAGE_CODE_ALT, &[1, 0, 9, 0x40])));
        assert!(!reader.check_framing(&records(HIDDEV_USAGE_CODE_ALT, &[1, 0, 8, 0x40])));
    }

    #[test]
    fn test_report_transport_skips_framing() {
        let reader = reader_for(
            MockScript {
                transport: Transport::Report,
                ..Default::default()
            },
            Vec::new(),
        );
        assert!(reader.check_framing(&[0u8; 64]));
    }

    #[test]
    fn test_prepare_surfaces_open_failure() {
        let opener = MockOpener::new(MockScript::default());
        opener.set_fail_open(true);
        let config = PipelineConfig::default();
        let reader = DeviceReader::new(
            Arc::new(opener),
            &config,
            Arc::new(ScanPeriod::new(config.scan_period, config.scan_period_band.clone())),
            Arc::new(Channels::new(512, 64)),
            Arc::new(PipelineMetrics::new()),
        );
        assert!(matches!(reader.prepare(), Err(DriverError::Hid(_))));
        assert!(reader.pending.lock().is_none());
    }
}
