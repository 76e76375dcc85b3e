//! Switch points: shared, one-way invalidation flags.
//!
//! A linker attaches a switch point to an invocation whose validity depends
//! on something other than the arguments (a class being redefined, a global
//! being rebound). Invalidating the switch point retires every cached entry
//! that carries it, across all call sites, without touching those sites.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct SwitchPoint {
    valid: Arc<AtomicBool>,
}

impl SwitchPoint {
    pub fn new() -> Self {
        Self {
            valid: Arc::new(AtomicBool::new(true)),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Invalidate this switch point; there is no way back
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn invalidate_all(points: &[SwitchPoint]) {
        for point in points {
            point.invalidate();
        }
    }

    /// True if both handles share one flag
    pub fn same_as(&self, other: &SwitchPoint) -> bool {
        Arc::ptr_eq(&self.valid, &other.valid)
    }
}

impl Default for SwitchPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SwitchPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchPoint")
            .field("valid", &self.is_valid())
            .finish()
    }
}
