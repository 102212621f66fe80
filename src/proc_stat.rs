// BALLAST /proc/stat COUNTER SOURCE
// PER-CORE CUMULATIVE CPU TIME, USER_HZ TICKS CONVERTED TO MICROSECONDS.
//
// FIELD ORDER (man proc): user nice system idle iowait irq softirq steal
// BUSY = EVERYTHING EXCEPT IDLE AND IOWAIT. WALL = BUSY + IDLE + IOWAIT.

use std::collections::HashMap;
use std::fs;

use anyhow::{bail, Context, Result};

use crate::sampler::{CoreCounters, CounterSource};

const PROC_STAT: &str = "/proc/stat";

pub struct ProcStatSource {
    path: String,
    tick_us: u64,
}

impl ProcStatSource {
    pub fn new() -> Self {
        Self::with_path(PROC_STAT)
    }

    pub fn with_path(path: &str) -> Self {
        Self {
            path: path.to_string(),
            tick_us: tick_us(),
        }
    }
}

impl Default for ProcStatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for ProcStatSource {
    fn read(&self, core: u32) -> Result<CoreCounters> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path))?;
        let prefix = format!("cpu{} ", core);

        for line in raw.lines() {
            if let Some(rest) = line.strip_prefix(&prefix) {
                return parse_counters(rest, self.tick_us)
                    .with_context(|| format!("parsing {} line for cpu{}", self.path, core));
            }
        }
        bail!("cpu{} not present in {}", core, self.path);
    }

    // ONE READ AND ONE PARSE PER ITERATION FOR THE WHOLE DOMAIN.
    // CORES MISSING FROM THE FILE (OFFLINED MID-RUN) COME BACK None.
    fn read_domain(&self, cores: &[u32]) -> Vec<Option<CoreCounters>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return vec![None; cores.len()],
        };

        let mut per_core: HashMap<u32, CoreCounters> = HashMap::new();
        for line in raw.lines() {
            let rest = match line.strip_prefix("cpu") {
                Some(r) => r,
                None => continue,
            };
            // THE AGGREGATE "cpu " LINE HAS NO INDEX AND FALLS OUT HERE
            let (index, fields) = match rest.split_once(' ') {
                Some(pair) => pair,
                None => continue,
            };
            if let Ok(core) = index.parse::<u32>() {
                if let Ok(counters) = parse_counters(fields, self.tick_us) {
                    per_core.insert(core, counters);
                }
            }
        }

        cores.iter().map(|core| per_core.get(core).copied()).collect()
    }
}

fn parse_counters(fields: &str, tick_us: u64) -> Result<CoreCounters> {
    let mut ticks = [0u64; 8];
    let mut n = 0;
    for (slot, field) in ticks.iter_mut().zip(fields.split_whitespace()) {
        *slot = field.parse::<u64>().context("non-numeric counter field")?;
        n += 1;
    }
    if n < 5 {
        bail!("expected at least 5 counter fields, got {}", n);
    }

    let [user, nice, system, idle, iowait, irq, softirq, steal] = ticks;
    let busy = user + nice + system + irq + softirq + steal;

    Ok(CoreCounters {
        busy_us: busy * tick_us,
        idle_us: idle * tick_us,
        iowait_us: iowait * tick_us,
        wall_us: (busy + idle + iowait) * tick_us,
    })
}

fn tick_us() -> u64 {
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz <= 0 {
        10_000 // USER_HZ=100 FALLBACK
    } else {
        1_000_000 / hz as u64
    }
}
