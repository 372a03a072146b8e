//! 可取消的管线任务
//!
//! 每个管线阶段实现 [`Operation`]，由 [`PipelineTask`] 在独立线程上运行。
//!
//! # 停止语义
//!
//! - `stop()`: 协作式停止（置位停止令牌 → `flush_pipes` → join）
//! - `kill()`: 不等待，直接放弃（detach）线程句柄
//! - `try_stop_then_kill(timeout)`: 限时协作式停止，超时则放弃
//!
//! Rust 无法安全地终止一个线程。所有阶段的阻塞点都带截止时间（`poll` / 条件变量超时），
//! 协作式停止通常足够；若线程仍卡在不可中断的调用中，则放弃其句柄。
//! 每次运行使用独立的停止令牌，被放弃的线程在下一次检查时自行退出，
//! 不会与新启动的运行互相干扰。

use crate::error::DriverError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// 单次运行的停止令牌
#[derive(Debug, Default)]
pub struct StopToken {
    stop: AtomicBool,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 工作循环是否应继续
    pub fn should_continue(&self) -> bool {
        !self.stop.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// 管线阶段的工作函数
pub trait Operation: Send + Sync + 'static {
    /// 在调用 `start()` 的线程上执行，失败则不启动工作线程
    fn prepare(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// 工作循环，直到 `token.should_continue()` 为 false
    fn execute(&self, token: &StopToken);

    /// 唤醒阻塞在输入上的工作循环
    fn flush_pipes(&self) {}
}

/// 停止结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// 任务未在运行
    NotRunning,
    /// 线程已退出并回收
    Joined,
    /// 线程未在期限内退出，句柄已放弃
    Abandoned,
}

trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        if self.is_finished() {
            return self.join().map(|_| ());
        }

        let (tx, rx) = crossbeam_channel::bounded(1);

        // 看门狗线程负责 join；超时后看门狗随目标线程一起被放弃
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(Box::new(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "Thread join timeout"),
            )),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(Box::new(
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "Thread panicked during join"),
            )),
        }
    }
}

struct Running {
    handle: JoinHandle<()>,
    token: Arc<StopToken>,
}

/// 在独立线程上运行的管线阶段
pub struct PipelineTask {
    name: String,
    operation: Arc<dyn Operation>,
    running: Mutex<Option<Running>>,
    stopping: AtomicBool,
}

impl PipelineTask {
    pub fn new(name: impl Into<String>, operation: Arc<dyn Operation>) -> Self {
        Self {
            name: name.into(),
            operation,
            running: Mutex::new(None),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 启动工作线程；已在运行时为空操作
    pub fn start(&self) -> Result<(), DriverError> {
        let mut running = self.running.lock();

        if let Some(run) = running.as_ref() {
            if !run.handle.is_finished() {
                return Ok(());
            }
            // 上一次运行已自行结束，回收后重新启动
            if let Some(run) = running.take()
                && run.handle.join().is_err()
            {
                error!("{}: previous run panicked", self.name);
            }
        }

        self.operation.prepare()?;

        let token = Arc::new(StopToken::new());
        let handle = {
            let token = token.clone();
            let operation = self.operation.clone();
            thread::Builder::new()
                .name(self.name.clone())
                .spawn(move || operation.execute(&token))
                .map_err(|source| DriverError::ThreadSpawn {
                    name: self.name.clone(),
                    source,
                })?
        };

        *running = Some(Running { handle, token });
        debug!("{}: started", self.name);
        Ok(())
    }

    /// 协作式停止并等待线程退出
    pub fn stop(&self) -> StopOutcome {
        self.stop_with(Some(None))
    }

    /// 放弃线程（不等待）
    pub fn kill(&self) -> StopOutcome {
        self.stop_with(None)
    }

    /// 限时协作式停止，超时则放弃线程
    pub fn try_stop_then_kill(&self, timeout: Duration) -> StopOutcome {
        self.stop_with(Some(Some(timeout)))
    }

    pub fn restart(&self) -> Result<StopOutcome, DriverError> {
        let outcome = self.stop();
        self.start()?;
        Ok(outcome)
    }

    pub fn force_restart(&self) -> Result<StopOutcome, DriverError> {
        let outcome = self.kill();
        self.start()?;
        Ok(outcome)
    }

    /// 限时协作式重启，超时则放弃旧线程并启动新线程
    pub fn try_restart_then_force_restart(
        &self,
        timeout: Duration,
    ) -> Result<StopOutcome, DriverError> {
        let outcome = self.try_stop_then_kill(timeout);
        self.start()?;
        Ok(outcome)
    }

    /// 线程存活或正在停止
    pub fn is_started(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
            || self
                .running
                .lock()
                .as_ref()
                .is_some_and(|run| !run.handle.is_finished())
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// `wait`: `None` 不等待，`Some(None)` 无限等待，`Some(Some(t))` 限时等待
    fn stop_with(&self, wait: Option<Option<Duration>>) -> StopOutcome {
        let Some(run) = self.running.lock().take() else {
            return StopOutcome::NotRunning;
        };

        self.stopping.store(true, Ordering::Release);
        run.token.request_stop();
        self.operation.flush_pipes();

        let outcome = match wait {
            None => {
                warn!("{}: killing task, thread handle abandoned", self.name);
                StopOutcome::Abandoned
            },
            Some(None) => {
                if run.handle.join().is_err() {
                    error!("{}: thread panicked", self.name);
                }
                StopOutcome::Joined
            },
            Some(Some(timeout)) => match run.handle.join_timeout(timeout) {
                Ok(()) => StopOutcome::Joined,
                Err(e) => match e.downcast_ref::<std::io::Error>() {
                    Some(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                        debug!(
                            "{}: did not stop within {:?}, thread handle abandoned",
                            self.name, timeout
                        );
                        StopOutcome::Abandoned
                    },
                    _ => {
                        error!("{}: thread panicked", self.name);
                        StopOutcome::Joined
                    },
                },
            },
        };

        self.stopping.store(false, Ordering::Release);
        debug!("{}: stopped ({:?})", self.name, outcome);
        outcome
    }
}

impl Drop for PipelineTask {
    fn drop(&mut self) {
        let _ = self.try_stop_then_kill(Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// 循环计数，直到停止
    #[derive(Default)]
    struct Counter {
        runs: AtomicUsize,
        ticks: AtomicUsize,
        wake: Signal,
    }

    impl Operation for Counter {
        fn execute(&self, token: &StopToken) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            while token.should_continue() {
                self.wake.wait();
                self.ticks.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn flush_pipes(&self) {
            self.wake.flush();
        }
    }

    /// 忽略停止请求，阻塞直到 `release`
    #[derive(Default)]
    struct Stubborn {
        release: AtomicBool,
        exited: AtomicUsize,
    }

    impl Operation for Stubborn {
        fn execute(&self, _token: &StopToken) {
            while !self.release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(2));
            }
            self.exited.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingPrepare;

    impl Operation for FailingPrepare {
        fn prepare(&self) -> Result<(), DriverError> {
            Err(DriverError::InvalidConfig("prepare".to_string()))
        }

        fn execute(&self, _token: &StopToken) {}
    }

    #[test]
    fn test_start_is_idempotent() {
        let op = Arc::new(Counter::default());
        let task = PipelineTask::new("counter", op.clone());

        task.start().unwrap();
        task.start().unwrap();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(op.runs.load(Ordering::SeqCst), 1);
        assert!(task.is_started());

        assert_eq!(task.stop(), StopOutcome::Joined);
        assert!(!task.is_started());
        assert_eq!(task.stop(), StopOutcome::NotRunning);
    }

    #[test]
    fn test_flush_unblocks_cooperative_stop() {
        let op = Arc::new(Counter::default());
        let task = PipelineTask::new("counter", op.clone());
        task.start().unwrap();

        let start = Instant::now();
        assert_eq!(
            task.try_stop_then_kill(Duration::from_secs(2)),
            StopOutcome::Joined
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_stuck_thread_is_abandoned() {
        let op = Arc::new(Stubborn::default());
        let task = PipelineTask::new("stubborn", op.clone());
        task.start().unwrap();

        let start = Instant::now();
        assert_eq!(
            task.try_stop_then_kill(Duration::from_millis(20)),
            StopOutcome::Abandoned
        );
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(!task.is_started());
        assert!(!task.is_stopping());

        op.release.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(1);
        while op.exited.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(op.exited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_force_restart_runs_again() {
        let op = Arc::new(Counter::default());
        let task = PipelineTask::new("counter", op.clone());
        task.start().unwrap();

        assert_eq!(
            task.try_restart_then_force_restart(Duration::from_millis(500))
                .unwrap(),
            StopOutcome::Joined
        );
        thread::sleep(Duration::from_millis(10));
        assert_eq!(op.runs.load(Ordering::SeqCst), 2);
        assert!(task.is_started());

        assert_eq!(task.force_restart().unwrap(), StopOutcome::Abandoned);
        task.stop();
    }

    #[test]
    fn test_prepare_failure_prevents_start() {
        let task = PipelineTask::new("failing", Arc::new(FailingPrepare));
        assert!(matches!(
            task.start(),
            Err(DriverError::InvalidConfig(_))
        ));
        assert!(!task.is_started());
    }

    #[derive(Default)]
    struct OneShot {
        runs: AtomicUsize,
    }

    impl Operation for OneShot {
        fn execute(&self, _token: &StopToken) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_finished_run_can_be_started_again() {
        let op = Arc::new(OneShot::default());
        let task = PipelineTask::new("oneshot", op.clone());
        assert_eq!(task.kill(), StopOutcome::NotRunning);

        task.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        while task.is_started() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!task.is_started());

        task.start().unwrap();
        assert_eq!(task.stop(), StopOutcome::Joined);
        assert_eq!(op.runs.load(Ordering::SeqCst), 2);
    }
}
