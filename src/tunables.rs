// BALLAST TUNABLES
// ONE PROCESS-WIDE KNOB: THE BASE UP-THRESHOLD.
// READ BY EVERY DOMAIN'S ITERATION, WRITTEN BY THE ADMIN SURFACE.
// ATOMIC SNAPSHOT SEMANTICS: NO MUTEX, WRITES NEVER BLOCK ITERATIONS.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{bail, Result};

use crate::policy::{DEFAULT_UP_THRESHOLD, MAX_UP_THRESHOLD};

static UP_THRESHOLD: AtomicU32 = AtomicU32::new(DEFAULT_UP_THRESHOLD);

// ONE CONSISTENT VALUE PER ITERATION: CALLERS SNAPSHOT ONCE AT THE TOP
pub fn up_threshold() -> u32 {
    UP_THRESHOLD.load(Ordering::Relaxed)
}

// RANGE-CHECKED WRITE. OUT-OF-RANGE INPUT LEAVES THE PRIOR VALUE INTACT.
pub fn set_up_threshold(value: u32) -> Result<()> {
    if value > MAX_UP_THRESHOLD {
        bail!(
            "up_threshold {} out of range (0-{})",
            value,
            MAX_UP_THRESHOLD
        );
    }
    UP_THRESHOLD.store(value, Ordering::Relaxed);
    Ok(())
}
