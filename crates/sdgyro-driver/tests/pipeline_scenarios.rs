//! 采集管线场景测试（Mock 设备）
//!
//! 覆盖：
//! 1. 正常启动：订阅者收到设备输出的第一帧
//! 2. 记录错位：重连一次并继续输出
//! 3. 读取卡死：检测、放弃旧线程并恢复输出
//! 4. 报告传输：不完整报告重试、重新启用运动传感器
//! 5. 启动失败与重复启停

use sdgyro_driver::{DriverError, Frame, FrameSource, PipelineConfig, Viewer};
use sdgyro_hid::Transport;
use sdgyro_hid::mock::{MockOpener, MockScript};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn test_config() -> PipelineConfig {
    PipelineConfig {
        stuck_timeout: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

/// 读取帧直到帧计数达到 `target`，返回读到的帧计数序列
fn consume_until(viewer: &mut Viewer<Frame>, target: u32, deadline: Duration) -> Vec<u32> {
    let end = Instant::now() + deadline;
    let mut seen = Vec::new();
    while Instant::now() < end {
        if let Some(frame) = viewer.consume_timeout(Duration::from_millis(100)) {
            let increment = frame.increment();
            seen.push(increment);
            if increment >= target {
                break;
            }
        }
    }
    seen
}

fn wait_for(mut condition: impl FnMut() -> bool, deadline: Duration) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_clean_startup_delivers_first_frame() {
    let opener = MockOpener::new(MockScript::default());
    let source = FrameSource::new(Arc::new(opener.clone()), test_config()).unwrap();
    let mut viewer = source.subscribe();

    source.start().unwrap();
    assert!(source.is_started());
    assert!(!source.is_stopping());

    let first = viewer
        .consume_timeout(Duration::from_millis(500))
        .map(|frame| frame.increment());
    assert_eq!(first, Some(opener.script().first_increment));

    let seen = consume_until(&mut viewer, 1010, Duration::from_secs(2));
    assert!(seen.windows(2).all(|w| w[1] > w[0]), "non-monotonic: {:?}", seen);
    assert!(seen.last().is_some_and(|&v| v >= 1010), "{:?}", seen);

    source.stop();
    assert!(!source.is_started());

    let metrics = source.metrics();
    assert!(metrics.frames_read >= 11);
    assert!(metrics.frames_published >= 11);
    assert_eq!(metrics.unsynced, 0);
}

#[test]
fn test_desync_recovery() {
    let opener = MockOpener::new(MockScript {
        malformed: vec![3],
        ..Default::default()
    });
    let source = FrameSource::new(Arc::new(opener.clone()), test_config()).unwrap();
    let mut viewer = source.subscribe();
    source.start().unwrap();

    let seen = consume_until(&mut viewer, 1012, Duration::from_secs(3));
    assert!(seen.last().is_some_and(|&v| v >= 1012), "{:?}", seen);

    let metrics = source.metrics();
    assert_eq!(metrics.unsynced, 1);
    // 启动时打开一次，错位后重连一次
    assert!(opener.opens() >= 2);

    source.stop();
}

#[test]
fn test_stuck_reader_is_replaced() {
    let opener = MockOpener::new(MockScript {
        block_on: Some(5),
        ..Default::default()
    });
    let config = PipelineConfig {
        stuck_timeout: Duration::from_millis(20),
        ..test_config()
    };
    let source = FrameSource::new(Arc::new(opener.clone()), config).unwrap();
    let mut viewer = source.subscribe();
    source.start().unwrap();

    let seen = consume_until(&mut viewer, 1012, Duration::from_secs(3));
    assert!(seen.last().is_some_and(|&v| v >= 1012), "{:?}", seen);

    let metrics = source.metrics();
    assert!(metrics.read_stuck >= 1);
    assert!(metrics.forced_restarts >= 1);
    // 被放弃的读取线程仍阻塞在设备中
    assert_eq!(opener.blocked(), 1);

    opener.release();
    assert!(wait_for(|| opener.blocked() == 0, Duration::from_secs(1)));
    source.stop();
}

#[test]
fn test_report_transport_retries_short_reads_and_reenables_motion() {
    let opener = MockOpener::new(MockScript {
        transport: Transport::Report,
        malformed: vec![2],
        ..Default::default()
    });
    let source = FrameSource::new(Arc::new(opener.clone()), test_config()).unwrap();
    assert_eq!(source.transport(), Transport::Report);
    let mut viewer = source.subscribe();
    source.start().unwrap();

    let seen = consume_until(&mut viewer, 1006, Duration::from_secs(2));
    assert!(seen.last().is_some_and(|&v| v >= 1006), "{:?}", seen);

    source.request_motion_enable();
    assert!(wait_for(
        || source.metrics().motion_reenables == 1,
        Duration::from_secs(1)
    ));
    let writes = opener.writes();
    assert_eq!(writes[0], source.config().enable_motion_report);

    let metrics = source.metrics();
    assert_eq!(metrics.short_reads, 1);
    assert_eq!(metrics.unsynced, 0);

    source.stop();
}

#[test]
fn test_open_failure_is_surfaced() {
    let opener = MockOpener::new(MockScript::default());
    opener.set_fail_open(true);
    let source = FrameSource::new(Arc::new(opener.clone()), test_config()).unwrap();

    match source.start() {
        Err(DriverError::Hid(_)) => {},
        other => panic!("Expected Hid error, got {:?}", other),
    }
    assert!(!source.is_started());

    // 设备恢复后可以重新启动
    opener.set_fail_open(false);
    let mut viewer = source.subscribe();
    source.start().unwrap();
    assert!(viewer.consume_timeout(Duration::from_millis(500)).is_some());
    source.stop();
}

#[test]
fn test_restart_keeps_subscribers() {
    let opener = MockOpener::new(MockScript::default());
    let source = FrameSource::new(Arc::new(opener.clone()), test_config()).unwrap();
    let mut viewer = source.subscribe();

    source.start().unwrap();
    assert!(viewer.consume_timeout(Duration::from_millis(500)).is_some());
    source.stop();
    assert!(!source.is_started());

    let before = opener.next_increment();
    source.start().unwrap();
    let seen = consume_until(&mut viewer, before + 3, Duration::from_secs(2));
    assert!(seen.last().is_some_and(|&v| v >= before + 3), "{:?}", seen);

    assert!(source.unsubscribe(&viewer));
    assert!(!source.unsubscribe(&viewer));
    source.stop();
}

#[test]
fn test_invalid_config_is_rejected() {
    let opener = MockOpener::new(MockScript::default());
    let config = PipelineConfig {
        frame_len: 2,
        ..Default::default()
    };
    assert!(matches!(
        FrameSource::new(Arc::new(opener), config),
        Err(DriverError::InvalidConfig(_))
    ));
}
