//! Per-container quota accounting and limit enforcement (§4.5).

use std::sync::Mutex;

use crate::error::{ErrorKind, Result};

/// Resource limits for a container. A value of `0` means unbounded for that
/// dimension.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_storage: u64,
    pub max_memory: u64,
    pub max_files: u64,
    pub max_file_size: u64,
}

/// A snapshot of the monitor's usage counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub storage_usage: u64,
    pub memory_usage: u64,
    pub file_count: u64,
    pub directory_count: u64,
}

type UsageCallback = Box<dyn Fn(&ResourceUsage) + Send + Sync>;

struct State {
    usage: ResourceUsage,
    limits: ResourceLimits,
    callback: Option<UsageCallback>,
}

/// Guards container-wide usage counters behind a single mutex (§4.5, §5).
pub struct ResourceMonitor {
    state: Mutex<State>,
}

impl ResourceMonitor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self { state: Mutex::new(State { usage: ResourceUsage::default(), limits, callback: None }) }
    }

    /// Registers a callback invoked (under the monitor's lock) after every
    /// successful [`ResourceMonitor::update_usage`].
    pub fn set_callback(&self, callback: impl Fn(&ResourceUsage) + Send + Sync + 'static) {
        self.state.lock().expect("resource monitor mutex poisoned").callback = Some(Box::new(callback));
    }

    /// Checks whether applying the given deltas (and writing a file of
    /// `file_size` bytes) would exceed any non-zero limit.
    pub fn check_limits(
        &self,
        delta_storage: i64,
        delta_memory: i64,
        delta_file_count: i64,
        file_size: u64,
    ) -> Result<()> {
        let state = self.state.lock().expect("resource monitor mutex poisoned");

        if state.limits.max_file_size != 0 && file_size > state.limits.max_file_size {
            return Err(ErrorKind::ResourceExhausted);
        }

        if exceeds(state.usage.storage_usage, delta_storage, state.limits.max_storage) {
            return Err(ErrorKind::ResourceExhausted);
        }
        if exceeds(state.usage.memory_usage, delta_memory, state.limits.max_memory) {
            return Err(ErrorKind::ResourceExhausted);
        }
        if exceeds(state.usage.file_count, delta_file_count, state.limits.max_files) {
            return Err(ErrorKind::ResourceExhausted);
        }

        Ok(())
    }

    /// Applies saturating-at-zero deltas to the usage counters.
    pub fn update_usage(&self, delta_storage: i64, delta_memory: i64, delta_file_count: i64) {
        let mut state = self.state.lock().expect("resource monitor mutex poisoned");
        state.usage.storage_usage = apply_delta(state.usage.storage_usage, delta_storage);
        state.usage.memory_usage = apply_delta(state.usage.memory_usage, delta_memory);
        state.usage.file_count = apply_delta(state.usage.file_count, delta_file_count);

        if let Some(callback) = state.callback.as_ref() {
            callback(&state.usage);
        }
    }

    /// Applies a saturating-at-zero delta to the directory counter. Kept
    /// separate from [`ResourceMonitor::update_usage`] since directories do
    /// not consume storage or file-count quota.
    pub fn update_directory_count(&self, delta: i64) {
        let mut state = self.state.lock().expect("resource monitor mutex poisoned");
        state.usage.directory_count = apply_delta(state.usage.directory_count, delta);
    }

    pub fn get_usage(&self) -> ResourceUsage {
        self.state.lock().expect("resource monitor mutex poisoned").usage
    }

    pub fn limits(&self) -> ResourceLimits {
        self.state.lock().expect("resource monitor mutex poisoned").limits
    }
}

fn exceeds(current: u64, delta: i64, limit: u64) -> bool {
    if limit == 0 {
        return false;
    }
    let projected = if delta >= 0 {
        current.saturating_add(delta as u64)
    } else {
        current.saturating_sub(delta.unsigned_abs())
    };
    projected > limit
}

fn apply_delta(current: u64, delta: i64) -> u64 {
    if delta >= 0 {
        current.saturating_add(delta as u64)
    } else {
        current.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn zero_limit_is_unbounded() {
        let monitor = ResourceMonitor::new(ResourceLimits::default());
        assert!(monitor.check_limits(1_000_000, 0, 1, 1_000_000).is_ok());
    }

    #[test]
    fn file_size_limit_allows_exact_boundary() {
        let monitor = ResourceMonitor::new(ResourceLimits { max_file_size: 199, ..Default::default() });
        assert!(monitor.check_limits(199, 0, 1, 199).is_ok());
        assert_eq!(monitor.check_limits(200, 0, 1, 200), Err(ErrorKind::ResourceExhausted));
    }

    #[test]
    fn update_usage_saturates_at_zero() {
        let monitor = ResourceMonitor::new(ResourceLimits::default());
        monitor.update_usage(10, 0, 1);
        monitor.update_usage(-100, 0, -5);
        let usage = monitor.get_usage();
        assert_eq!(usage.storage_usage, 0);
        assert_eq!(usage.file_count, 0);
    }

    #[test]
    fn callback_observes_every_mutation() {
        let monitor = ResourceMonitor::new(ResourceLimits::default());
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();
        monitor.set_callback(move |usage| {
            seen_clone.store(usage.file_count, Ordering::SeqCst);
        });
        monitor.update_usage(0, 0, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
