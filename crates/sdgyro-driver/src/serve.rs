//! 广播视图（Serve / Consume）
//!
//! 单生产者、单视图的最新值发布槽。生产者通过 [`ServeLock`] 独占写入并发布，
//! 视图通过 [`ConsumeLock`] 共享读取，锁释放即视为"已消费"。
//!
//! 每个视图持有自己的代数（generation）并与槽内已发布代数比较，
//! 因此多个订阅者各自使用独立的 `Serve`，互不牵制。
//! 发布时需要写锁，会等待该视图正在进行的读取结束。

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ServeState {
    published: u64,
    consumed: u64,
    closed: bool,
}

/// 发布槽
#[derive(Debug)]
pub struct Serve<T> {
    value: RwLock<T>,
    state: Mutex<ServeState>,
    cv: Condvar,
}

impl<T> Serve<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: RwLock::new(initial),
            state: Mutex::new(ServeState::default()),
            cv: Condvar::new(),
        }
    }

    /// 获取发布锁；锁释放时发布新代数并唤醒视图
    pub fn serve_lock(&self) -> ServeLock<'_, T> {
        ServeLock {
            guard: Some(self.value.write()),
            serve: self,
        }
    }

    /// 写入并发布
    pub fn publish(&self, write: impl FnOnce(&mut T)) {
        let mut lock = self.serve_lock();
        write(&mut lock);
    }

    /// 最近一次发布是否已被视图消费
    pub fn was_consumed(&self) -> bool {
        let state = self.state.lock();
        state.consumed >= state.published
    }

    pub fn published(&self) -> u64 {
        self.state.lock().published
    }

    /// 关闭：阻塞中的视图立即返回 `None`
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// 生产者发布锁
pub struct ServeLock<'a, T> {
    guard: Option<RwLockWriteGuard<'a, T>>,
    serve: &'a Serve<T>,
}

impl<T> Deref for ServeLock<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // guard 仅在 drop 中取走
        self.guard.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for ServeLock<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for ServeLock<'_, T> {
    fn drop(&mut self) {
        // 先释放写锁，再发布，被唤醒的视图可以立即读取
        drop(self.guard.take());
        let mut state = self.serve.state.lock();
        state.published += 1;
        self.serve.cv.notify_all();
    }
}

/// 订阅者持有的视图句柄
#[derive(Debug)]
pub struct Viewer<T> {
    serve: Arc<Serve<T>>,
    seen: u64,
}

impl<T> Viewer<T> {
    pub fn new(serve: Arc<Serve<T>>) -> Self {
        Self { serve, seen: 0 }
    }

    pub fn serve(&self) -> &Arc<Serve<T>> {
        &self.serve
    }

    /// 是否有尚未读取的新值
    pub fn has_new(&self) -> bool {
        self.serve.state.lock().published > self.seen
    }

    /// 阻塞直到有新值；槽已关闭返回 `None`
    pub fn consume(&mut self) -> Option<ConsumeLock<'_, T>> {
        self.consume_until(None)
    }

    /// 带超时等待新值；超时或槽已关闭返回 `None`
    pub fn consume_timeout(&mut self, timeout: Duration) -> Option<ConsumeLock<'_, T>> {
        self.consume_until(Some(Instant::now() + timeout))
    }

    fn consume_until(&mut self, deadline: Option<Instant>) -> Option<ConsumeLock<'_, T>> {
        let generation = {
            let mut state = self.serve.state.lock();
            loop {
                if state.closed {
                    return None;
                }
                if state.published > self.seen {
                    break state.published;
                }
                match deadline {
                    Some(deadline) => {
                        if self.serve.cv.wait_until(&mut state, deadline).timed_out()
                            && state.published <= self.seen
                        {
                            return None;
                        }
                    },
                    None => self.serve.cv.wait(&mut state),
                }
            }
        };
        self.seen = generation;

        let serve: &Serve<T> = &self.serve;
        Some(ConsumeLock {
            guard: serve.value.read(),
            serve,
            generation,
        })
    }
}

/// 视图读取锁，释放即标记消费完成
pub struct ConsumeLock<'a, T> {
    guard: RwLockReadGuard<'a, T>,
    serve: &'a Serve<T>,
    generation: u64,
}

impl<T> ConsumeLock<'_, T> {
    /// 本次读取对应的发布代数
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<T> Deref for ConsumeLock<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for ConsumeLock<'_, T> {
    fn drop(&mut self) {
        let mut state = self.serve.state.lock();
        if self.generation > state.consumed {
            state.consumed = self.generation;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_consume_after_publish() {
        let serve = Arc::new(Serve::new(0u32));
        let mut viewer = Viewer::new(serve.clone());

        assert!(!viewer.has_new());
        assert!(viewer.consume_timeout(Duration::from_millis(1)).is_none());

        serve.publish(|v| *v = 7);
        assert!(!serve.was_consumed());
        {
            let lock = viewer.consume().unwrap();
            assert_eq!(*lock, 7);
            assert_eq!(lock.generation(), 1);
        }
        assert!(serve.was_consumed());
        assert!(!viewer.has_new());
    }

    #[test]
    fn test_viewer_skips_to_latest() {
        let serve = Arc::new(Serve::new(0u32));
        let mut viewer = Viewer::new(serve.clone());
        for i in 1..=5 {
            serve.publish(|v| *v = i);
        }
        assert_eq!(*viewer.consume().unwrap(), 5);
        assert!(viewer.consume_timeout(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn test_close_releases_waiter() {
        let serve = Arc::new(Serve::new(0u32));
        let mut viewer = Viewer::new(serve.clone());
        let waiter = thread::spawn(move || viewer.consume().map(|lock| *lock));
        thread::sleep(Duration::from_millis(5));
        serve.close();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(serve.is_closed());
    }

    #[test]
    fn test_publish_waits_for_reader() {
        let serve = Arc::new(Serve::new(0u32));
        let mut viewer = Viewer::new(serve.clone());
        serve.publish(|v| *v = 1);

        let lock = viewer.consume().unwrap();
        let publisher = {
            let serve = serve.clone();
            thread::spawn(move || serve.publish(|v| *v = 2))
        };
        thread::sleep(Duration::from_millis(10));
        // 读取期间值保持不变
        assert_eq!(*lock, 1);
        assert_eq!(serve.published(), 1);
        drop(lock);

        publisher.join().unwrap();
        assert_eq!(*viewer.consume().unwrap(), 2);
    }

    #[test]
    fn test_blocked_viewer_wakes_on_publish() {
        let serve = Arc::new(Serve::new(0u32));
        let mut viewer = Viewer::new(serve.clone());
        let waiter = thread::spawn(move || viewer.consume_timeout(Duration::from_secs(5)).map(|l| *l));
        thread::sleep(Duration::from_millis(5));
        serve.publish(|v| *v = 3);
        assert_eq!(waiter.join().unwrap(), Some(3));
    }
}
