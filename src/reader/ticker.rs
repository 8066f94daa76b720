//! 可取消的刷新定时器

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// 停止信号，可以 clone 到其他任务中使用
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            // notify_one 会保留一个许可，stop 早于等待也不会丢失
            self.notify.notify_one();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    async fn stopped(&self) {
        if self.is_stopped() {
            return;
        }
        self.notify.notified().await;
    }
}

pub struct RefreshTicker {
    interval: Interval,
    handle: StopHandle,
}

impl RefreshTicker {
    pub fn new(period: Duration, handle: StopHandle) -> Self {
        // 第一次触发也要等满一个周期
        let period = period.max(Duration::from_millis(1));
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, handle }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    /// 等待下一次刷新；已停止时返回 false
    pub async fn tick(&mut self) -> bool {
        if self.handle.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = self.interval.tick() => !self.handle.is_stopped(),
            _ = self.handle.stopped() => false,
        }
    }
}
