//! 扫描周期（读取节拍）
//!
//! 由节拍线程写入，读取线程频繁读取，写入只经由丢帧分析的反馈。

use parking_lot::RwLock;
use std::ops::RangeInclusive;
use std::time::Duration;

#[derive(Debug)]
pub struct ScanPeriod {
    current: RwLock<Duration>,
    initial: Duration,
    band: RangeInclusive<Duration>,
}

impl ScanPeriod {
    pub fn new(initial: Duration, band: RangeInclusive<Duration>) -> Self {
        Self {
            current: RwLock::new(initial),
            initial,
            band,
        }
    }

    pub fn get(&self) -> Duration {
        *self.current.read()
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn band(&self) -> &RangeInclusive<Duration> {
        &self.band
    }

    /// 更新周期；超出允许范围返回 `false` 并保持不变
    pub fn try_set(&self, period: Duration) -> bool {
        if !self.band.contains(&period) {
            return false;
        }
        *self.current.write() = period;
        true
    }

    /// 恢复初始周期
    pub fn reset(&self) {
        *self.current.write() = self.initial;
    }

    /// 将提议值限制在允许范围内
    pub fn clamp(&self, period: Duration) -> Duration {
        period.clamp(*self.band.start(), *self.band.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us(v: u64) -> Duration {
        Duration::from_micros(v)
    }

    #[test]
    fn test_band_is_enforced() {
        let scan = ScanPeriod::new(us(4000), us(3700)..=us(4000));
        assert_eq!(scan.get(), us(4000));

        assert!(scan.try_set(us(3800)));
        assert_eq!(scan.get(), us(3800));

        assert!(!scan.try_set(us(3600)));
        assert!(!scan.try_set(us(4001)));
        assert_eq!(scan.get(), us(3800));

        scan.reset();
        assert_eq!(scan.get(), scan.initial());
    }

    #[test]
    fn test_clamp() {
        let scan = ScanPeriod::new(us(4000), us(3700)..=us(4000));
        assert_eq!(scan.clamp(us(3000)), us(3700));
        assert_eq!(scan.clamp(us(4200)), us(4000));
        assert_eq!(scan.clamp(us(3850)), us(3850));
    }
}
