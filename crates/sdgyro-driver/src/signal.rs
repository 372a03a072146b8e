//! 单槽唤醒信号
//!
//! 一个布尔标志 + 条件变量，用于两个协作线程之间的边沿触发通知。
//! 多次 `send` 在被接收前会合并为一次。

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct Signal {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 置位并唤醒所有等待者
    pub fn send(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.cv.notify_all();
    }

    /// 阻塞直到置位，然后清除
    pub fn wait(&self) {
        let mut flag = self.flag.lock();
        while !*flag {
            self.cv.wait(&mut flag);
        }
        *flag = false;
    }

    /// 带超时等待，收到信号返回 `true`（并清除）
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock();
        while !*flag {
            if self.cv.wait_until(&mut flag, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *flag, false)
    }

    /// 非阻塞：清除并返回之前是否置位
    pub fn try_signal(&self) -> bool {
        std::mem::replace(&mut *self.flag.lock(), false)
    }

    /// 上一次发送是否已被接收（不清除）
    pub fn was_received(&self) -> bool {
        !*self.flag.lock()
    }

    /// 强制唤醒等待者，用于停止时解除阻塞
    pub fn flush(&self) {
        self.send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sends_coalesce() {
        let signal = Signal::new();
        assert!(signal.was_received());

        signal.send();
        signal.send();
        assert!(!signal.was_received());

        assert!(signal.try_signal());
        assert!(!signal.try_signal());
        assert!(signal.was_received());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let signal = Signal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_wait_wakes_on_send() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || {
                signal.wait();
                true
            })
        };
        thread::sleep(Duration::from_millis(5));
        signal.send();
        assert!(waiter.join().unwrap());
        assert!(signal.was_received());
    }

    #[test]
    fn test_flush_releases_timed_waiter() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(5));
        signal.flush();
        assert!(waiter.join().unwrap());
    }
}
