// BALLAST LOAD SAMPLER
// CUMULATIVE COUNTERS IN, 0-128 LOAD FRACTION OUT.
// DELTAS AGAINST THE PREVIOUS READING ONLY -- NOTHING SURVIVES AN ITERATION.

use anyhow::Result;

use crate::policy::LOAD_SCALE;

// ONE READING OF A CORE'S CUMULATIVE TIME COUNTERS, MICROSECONDS,
// MONOTONICALLY NON-DECREASING.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreCounters {
    pub busy_us: u64,
    pub idle_us: u64,
    pub iowait_us: u64,
    pub wall_us: u64,
}

// COLLABORATOR SEAM: WHOEVER CAN PRODUCE CUMULATIVE COUNTERS FOR A CORE.
// PRODUCTION IMPLEMENTATION IS proc_stat::ProcStatSource.
pub trait CounterSource {
    fn read(&self, core: u32) -> Result<CoreCounters>;

    // ONE READING FOR A WHOLE DOMAIN, SAME ORDER AS cores. None MARKS A
    // CORE THE SOURCE COULD NOT PRODUCE. BACKENDS WITH ONE SHARED
    // UNDERLYING FILE OVERRIDE THIS TO READ IT ONCE PER ITERATION
    // INSTEAD OF ONCE PER CORE.
    fn read_domain(&self, cores: &[u32]) -> Vec<Option<CoreCounters>> {
        cores.iter().map(|core| self.read(*core).ok()).collect()
    }
}

// PER-CORE PREVIOUS READING. CREATED AT GOVERNANCE START (PRIMED FROM A
// FRESH READ SO THE FIRST DELTA IS NOT THE WHOLE UPTIME), DESTROYED AT STOP.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreLoadState {
    prev_idle_us: u64,
    prev_iowait_us: u64,
    prev_wall_us: u64,
}

impl CoreLoadState {
    pub fn primed(c: CoreCounters) -> Self {
        Self {
            prev_idle_us: c.idle_us,
            prev_iowait_us: c.iowait_us,
            prev_wall_us: c.wall_us,
        }
    }

    // DELTA AGAINST THE STORED READING -> LOAD ON THE 0-128 SCALE.
    // None MEANS "NO NEW INFORMATION": ZERO-WIDTH INTERVAL OR COUNTER
    // WRAP. THE STORED READING STILL ADVANCES SO ONE BAD SAMPLE DOES NOT
    // POISON THE NEXT.
    pub fn sample(&mut self, c: CoreCounters) -> Option<u32> {
        let wall_delta = c.wall_us.wrapping_sub(self.prev_wall_us);
        let idle_delta = c.idle_us.wrapping_sub(self.prev_idle_us);
        let iowait_delta = c.iowait_us.wrapping_sub(self.prev_iowait_us);

        self.prev_wall_us = c.wall_us;
        self.prev_idle_us = c.idle_us;
        self.prev_iowait_us = c.iowait_us;

        // IOWAIT COUNTS AS BUSY FOR SCALING PURPOSES
        let idle_adjusted = idle_delta.saturating_sub(iowait_delta);

        if wall_delta == 0 || idle_adjusted > wall_delta {
            return None;
        }

        Some((LOAD_SCALE as u64 * (wall_delta - idle_adjusted) / wall_delta) as u32)
    }
}

// DOMAIN LOAD = THE BUSIEST SIBLING GOVERNS. CORES WITH DISCARDED
// SAMPLES DROP OUT; ZERO IF NOBODY PRODUCED A VALID ONE.
pub fn aggregate_load<S: CounterSource>(
    source: &S,
    cores: &[u32],
    states: &mut [CoreLoadState],
) -> u32 {
    let mut max_load = 0;
    for (counters, state) in source.read_domain(cores).into_iter().zip(states.iter_mut()) {
        let counters = match counters {
            Some(c) => c,
            None => continue,
        };
        if let Some(load) = state.sample(counters) {
            if load > max_load {
                max_load = load;
            }
        }
    }
    max_load
}
