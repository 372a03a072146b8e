//! PaceController：按当前扫描周期发出读取节拍

use crate::diagnostics::MissedTicks;
use crate::metrics::PipelineMetrics;
use crate::scan::ScanPeriod;
use crate::stages::Channels;
use crate::task::{Operation, StopToken};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) struct PaceController {
    scan: Arc<ScanPeriod>,
    report_period: u32,
    channels: Arc<Channels>,
    metrics: Arc<PipelineMetrics>,
}

impl PaceController {
    pub fn new(
        scan: Arc<ScanPeriod>,
        report_period: u32,
        channels: Arc<Channels>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            scan,
            report_period,
            channels,
            metrics,
        }
    }

    /// 应用丢帧分析的周期提议
    fn apply_feedback(&self, proposal: &mut Duration) {
        if !self.channels.scan_feedback.try_recv(proposal) {
            return;
        }
        if self.scan.try_set(*proposal) {
            self.metrics.scan_updates.fetch_add(1, Ordering::Relaxed);
            info!(
                "PaceController: changed scan period to {} us",
                proposal.as_micros()
            );
        } else {
            warn!(
                "PaceController: incoming scan period outside limits: {} us",
                proposal.as_micros()
            );
        }
    }
}

impl Operation for PaceController {
    fn execute(&self, token: &StopToken) {
        let mut proposal = Duration::ZERO;
        let mut missed = MissedTicks::new("PaceController", "ticks", self.report_period);

        info!(
            "PaceController: started with scan period {} us",
            self.scan.get().as_micros()
        );

        while token.should_continue() {
            self.apply_feedback(&mut proposal);

            spin_sleep::sleep(self.scan.get());

            missed.observe(self.channels.tick.was_received());
            self.channels.tick.send();
        }

        debug!("PaceController: stopped");
    }
}
