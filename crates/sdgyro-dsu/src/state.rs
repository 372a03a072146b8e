//! 广播任务状态
//!
//! 状态只由接收循环切换：
//!
//! ```text
//! Idle ──首个订阅──▶ Starting ──帧源启动──▶ Broadcasting
//!  ▲                    │                       │
//!  └────启动失败────────┘        客户端全部超时  ▼
//!  └──────────────────────────────────────── Stopping
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BroadcastState {
    /// 没有客户端，帧源已停止
    #[default]
    Idle = 0,
    /// 收到首个数据订阅，正在启动帧源
    Starting = 1,
    /// 广播线程运行中
    Broadcasting = 2,
    /// 客户端全部超时，正在停止
    Stopping = 3,
}

impl BroadcastState {
    /// 从 u8 转换，无效值视为 Idle
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Broadcasting,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_broadcasting(self) -> bool {
        self == Self::Broadcasting
    }
}

/// 线程间共享的广播状态
#[derive(Debug, Default)]
pub struct AtomicBroadcastState {
    inner: AtomicU8,
}

impl AtomicBroadcastState {
    pub fn new(state: BroadcastState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> BroadcastState {
        BroadcastState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: BroadcastState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conversion() {
        for state in [
            BroadcastState::Idle,
            BroadcastState::Starting,
            BroadcastState::Broadcasting,
            BroadcastState::Stopping,
        ] {
            assert_eq!(BroadcastState::from_u8(state.as_u8()), state);
        }
        assert_eq!(BroadcastState::from_u8(200), BroadcastState::Idle);
        assert_eq!(BroadcastState::default(), BroadcastState::Idle);
        assert!(BroadcastState::Broadcasting.is_broadcasting());
        assert!(!BroadcastState::Stopping.is_broadcasting());
    }

    #[test]
    fn test_atomic_state() {
        let state = AtomicBroadcastState::default();
        assert_eq!(state.get(Ordering::Relaxed), BroadcastState::Idle);
        state.set(BroadcastState::Starting, Ordering::Relaxed);
        assert_eq!(state.get(Ordering::Relaxed), BroadcastState::Starting);
        let state = AtomicBroadcastState::new(BroadcastState::Broadcasting);
        assert!(state.get(Ordering::Relaxed).is_broadcasting());
    }
}
