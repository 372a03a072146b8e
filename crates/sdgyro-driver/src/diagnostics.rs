//! 漏取计数诊断
//!
//! 生产者在每次发送前检查上一次发送是否已被下游取走，连续未取走的次数按周期汇总，
//! 只用于日志观测，不影响管线行为。

use tracing::debug;

/// 一次观测产生的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissedEvent {
    /// 开始出现漏取
    Started,
    /// 连续漏取达到一个报告周期
    StillMissing { missed: u32, after: u32 },
    /// 漏取结束
    Recovered { missed: u32, after: u32 },
}

/// 单个生产者 / 视图的漏取计数
#[derive(Debug, Clone)]
pub struct MissedTicks {
    name: String,
    what: &'static str,
    period: u32,
    missed: u32,
    delivered: u32,
}

impl MissedTicks {
    pub fn new(name: impl Into<String>, what: &'static str, period: u32) -> Self {
        Self {
            name: name.into(),
            what,
            period: period.max(1),
            missed: 0,
            delivered: 0,
        }
    }

    /// 记录一次观测：`received` 为上一次发送是否已被取走
    pub fn observe(&mut self, received: bool) -> Option<MissedEvent> {
        let event = if !received {
            self.missed += 1;
            if self.missed == 1 {
                Some(MissedEvent::Started)
            } else if self.missed % self.period == 0 {
                Some(MissedEvent::StillMissing {
                    missed: self.period,
                    after: self.delivered,
                })
            } else {
                None
            }
        } else if self.missed > 0 {
            let missed = if self.missed > self.period {
                self.missed % self.period
            } else {
                self.missed
            };
            let event = MissedEvent::Recovered {
                missed,
                after: self.delivered,
            };
            self.missed = 0;
            self.delivered = 0;
            Some(event)
        } else {
            self.delivered = self.delivered.saturating_add(1);
            None
        };

        if let Some(event) = event {
            self.log(event);
        }
        event
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    fn log(&self, event: MissedEvent) {
        match event {
            MissedEvent::Started => debug!("{}: start missing {}", self.name, self.what),
            MissedEvent::StillMissing { missed, after } => debug!(
                "{}: missed {} {} after {} {}, still being missed",
                self.name, missed, self.what, after, self.what
            ),
            MissedEvent::Recovered { missed, after } => debug!(
                "{}: missed {} {} after {} {}",
                self.name, missed, self.what, after, self.what
            ),
        }
    }
}
