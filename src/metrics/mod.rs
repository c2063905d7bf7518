//! 指标收集模块

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 指标快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub full_fetches: u64,
    pub fetch_failures: u64,
    pub not_found_fetches: u64,
    pub incremental_updates: u64,
    pub expires: u64,
    pub refreshes: u64,
    pub root_rebuilds: u64,
    pub temporary_roots: u64,
    pub resolutions: u64,
    pub reruns: u64,
}

/// 服务发现指标收集器
///
/// 计数器在同步路径上更新，全部使用原子操作
#[derive(Debug, Default)]
pub struct DiscoveryMetrics {
    full_fetches: AtomicU64,
    fetch_failures: AtomicU64,
    not_found_fetches: AtomicU64,
    incremental_updates: AtomicU64,
    expires: AtomicU64,
    refreshes: AtomicU64,
    root_rebuilds: AtomicU64,
    temporary_roots: AtomicU64,
    resolutions: AtomicU64,
    reruns: AtomicU64,
}

impl DiscoveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_full_fetch(&self) {
        self.full_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incremental_update(&self) {
        self.incremental_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expire(&self) {
        self.expires.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_root_rebuild(&self) {
        self.root_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_temporary_root(&self) {
        self.temporary_roots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rerun(&self) {
        self.reruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            full_fetches: self.full_fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            not_found_fetches: self.not_found_fetches.load(Ordering::Relaxed),
            incremental_updates: self.incremental_updates.load(Ordering::Relaxed),
            expires: self.expires.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            root_rebuilds: self.root_rebuilds.load(Ordering::Relaxed),
            temporary_roots: self.temporary_roots.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            reruns: self.reruns.load(Ordering::Relaxed),
        }
    }
}
