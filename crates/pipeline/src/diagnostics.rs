//! System resource snapshots logged next to item failures

use std::fmt;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Memory levels at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub available_memory: u64,
    pub total_memory: u64,
}

impl ResourceSnapshot {
    pub fn capture() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            available_memory: sys.available_memory(),
            total_memory: sys.total_memory(),
        }
    }

    /// Share of memory in use, in percent
    pub fn used_percent(&self) -> f64 {
        if self.total_memory == 0 {
            return 0.0;
        }
        100.0 * (1.0 - self.available_memory as f64 / self.total_memory as f64)
    }
}

impl fmt::Display for ResourceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RAM {:.2} GiB free of {:.2} GiB ({:.0}% used)",
            self.available_memory as f64 / GIB,
            self.total_memory as f64 / GIB,
            self.used_percent()
        )
    }
}
