use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide counters. Lock-free; shared through an `Arc`.
#[derive(Debug, Default)]
pub struct MarketMetrics {
    races_lost: AtomicU64,
    gateway_failures: AtomicU64,
    notifications_pending: AtomicU64,
    notifications_delivered: AtomicU64,
    notifications_failed: AtomicU64,
}

/// Point-in-time copy of [`MarketMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub races_lost: u64,
    pub gateway_failures: u64,
    pub notifications_pending: u64,
    pub notifications_delivered: u64,
    pub notifications_failed: u64,
}

impl MarketMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_race_lost(&self) {
        self.races_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gateway_failure(&self) {
        self.gateway_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn notification_queued(&self) {
        self.notifications_pending.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn notification_finished(&self, delivered: bool) {
        if delivered {
            self.notifications_delivered.fetch_add(1, Ordering::SeqCst);
        } else {
            self.notifications_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.notifications_pending.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            races_lost: self.races_lost.load(Ordering::Relaxed),
            gateway_failures: self.gateway_failures.load(Ordering::Relaxed),
            notifications_pending: self.notifications_pending.load(Ordering::SeqCst),
            notifications_delivered: self.notifications_delivered.load(Ordering::SeqCst),
            notifications_failed: self.notifications_failed.load(Ordering::SeqCst),
        }
    }
}
