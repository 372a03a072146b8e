//! 三缓冲单生产者 / 单消费者管道
//!
//! 三个缓冲区分别是：生产者本地的填充区（由调用方持有）、管道内的在途区、
//! 消费者本地的接收区（由调用方持有）。发送和接收都只是一次 `swap`，
//! 不拷贝数据，也不分配内存。
//!
//! 生产者从不阻塞；消费者总是拿到最新一次发送的值。若生产者在消费者取走之前
//! 连续发送两次，前一个值会被直接覆盖。

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// 接收结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recv {
    /// 收到新数据
    Data,
    /// 被 `flush` 唤醒，无新数据
    Flushed,
    /// 等待超时
    Timeout,
}

#[derive(Debug)]
struct Slot<T> {
    in_flight: T,
    has_data: bool,
    flushed: bool,
    sent: u64,
}

#[derive(Debug)]
pub struct Pipe<T> {
    slot: Mutex<Slot<T>>,
    cv: Condvar,
}

impl<T> Pipe<T> {
    /// `initial` 作为在途区的初始缓冲（不会被当作数据交付）
    pub fn new(initial: T) -> Self {
        Self {
            slot: Mutex::new(Slot {
                in_flight: initial,
                has_data: false,
                flushed: false,
                sent: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// 发送：交换 `fill` 与在途区，`fill` 换回一个可复用的旧缓冲
    pub fn send(&self, fill: &mut T) {
        let mut slot = self.slot.lock();
        std::mem::swap(fill, &mut slot.in_flight);
        slot.has_data = true;
        slot.sent += 1;
        self.cv.notify_all();
    }

    /// 阻塞等待新数据或 `flush`
    pub fn wait(&self, received: &mut T) -> Recv {
        let mut slot = self.slot.lock();
        while !slot.has_data && !slot.flushed {
            self.cv.wait(&mut slot);
        }
        Self::take(&mut slot, received)
    }

    /// 带超时等待
    pub fn wait_timeout(&self, received: &mut T, timeout: Duration) -> Recv {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while !slot.has_data && !slot.flushed {
            if self.cv.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        Self::take(&mut slot, received)
    }

    /// 非阻塞接收，有新数据返回 `true`
    pub fn try_recv(&self, received: &mut T) -> bool {
        let mut slot = self.slot.lock();
        if !slot.has_data {
            return false;
        }
        Self::take(&mut slot, received) == Recv::Data
    }

    /// 最近一次发送是否已被取走
    pub fn was_received(&self) -> bool {
        !self.slot.lock().has_data
    }

    /// 累计发送次数
    pub fn sent_count(&self) -> u64 {
        self.slot.lock().sent
    }

    /// 强制唤醒消费者（停止时使用）
    pub fn flush(&self) {
        let mut slot = self.slot.lock();
        slot.flushed = true;
        self.cv.notify_all();
    }

    fn take(slot: &mut Slot<T>, received: &mut T) -> Recv {
        if slot.has_data {
            std::mem::swap(received, &mut slot.in_flight);
            slot.has_data = false;
            Recv::Data
        } else if slot.flushed {
            slot.flushed = false;
            Recv::Flushed
        } else {
            Recv::Timeout
        }
    }
}
