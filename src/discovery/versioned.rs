//! 带版本号的快照
//!
//! 实例缓存和发现树根节点都带版本号，解析器只比较版本即可决定复用还是重建，
//! 无需比较内容。

use std::sync::atomic::{AtomicU64, Ordering};

static LAST_VERSION: AtomicU64 = AtomicU64::new(0);

/// 生成新的缓存版本号
///
/// 以拉取时刻（纳秒）为基础，并保证在进程内严格递增。
pub fn next_version() -> u64 {
    let now = chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|nanos| nanos.max(0) as u64)
        .unwrap_or(0);

    let mut last = LAST_VERSION.load(Ordering::Acquire);
    loop {
        let next = now.max(last + 1);
        match LAST_VERSION.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// 携带缓存版本号的对象
pub trait Versioned {
    fn cache_version(&self) -> u64;

    /// 版本是否相同
    fn is_same_version(&self, other: &dyn Versioned) -> bool {
        self.cache_version() == other.cache_version()
    }

    /// 是否比 `other` 旧
    fn is_expired(&self, other: &dyn Versioned) -> bool {
        self.cache_version() < other.cache_version()
    }
}

/// `{version, name, payload}` 快照
#[derive(Debug, Clone)]
pub struct VersionedSnapshot<T> {
    version: u64,
    name: String,
    payload: T,
}

impl<T> VersionedSnapshot<T> {
    /// 以新生成的版本号创建快照
    pub fn new(name: impl Into<String>, payload: T) -> Self {
        Self::with_version(next_version(), name, payload)
    }

    pub fn with_version(version: u64, name: impl Into<String>, payload: T) -> Self {
        Self {
            version,
            name: name.into(),
            payload,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }
}

impl<T> Versioned for VersionedSnapshot<T> {
    fn cache_version(&self) -> u64 {
        self.version
    }
}

/// `existing` 存在且版本相同
pub fn is_match<E: Versioned + ?Sized>(existing: Option<&E>, input: &dyn Versioned) -> bool {
    existing.is_some_and(|e| e.cache_version() == input.cache_version())
}

/// `existing` 不存在或比 `input` 旧
pub fn is_expired<E: Versioned + ?Sized>(existing: Option<&E>, input: &dyn Versioned) -> bool {
    existing.is_none_or(|e| e.cache_version() < input.cache_version())
}
