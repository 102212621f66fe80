// BALLAST CLOCK DOMAIN
// ONE GOVERNED FREQUENCY CONTROL POINT (ONE OR MORE SIBLING CPUS).
// ALL MUTABLE STATE LIVES UNDER ONE MUTEX, HELD FOR A FULL ITERATION.
// ASYNC INPUTS (EXTERNAL FREQUENCY CHANGES) ARE ENQUEUED AND DRAINED AT
// THE TOP OF THE NEXT ITERATION -- THE HOT PATH NEVER WAITS ON THEM.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::event::EventLog;
use crate::log_warn;
use crate::policy::{FreqTable, PolicyState};
use crate::sampler::{aggregate_load, CoreLoadState, CounterSource};

// COMMIT ROUNDING: NEAREST ALLOWED FREQUENCY AT-OR-BELOW / AT-OR-ABOVE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

// COLLABORATOR SEAM: THE THING THAT ACTUALLY MOVES THE CLOCK.
// PRODUCTION IMPLEMENTATION IS sysfs::SysfsPolicy.
pub trait FreqControl {
    fn current_frequency(&self) -> Result<u32>;
    // RECOVERABLE ON FAILURE: NO RETRY, THE NEXT CADENCE RE-EVALUATES
    fn set_frequency(&self, khz: u32, rounding: Rounding) -> Result<()>;
}

// ASYNC NOTIFICATIONS DELIVERED BETWEEN ITERATIONS
#[derive(Debug, Clone, Copy)]
enum Notice {
    FrequencyChanged { khz: u32 },
}

// EXTERNAL-CHANGE RECONCILIATION. ONLY RESYNC WHEN OUR TRACKED REQUEST
// FELL OUTSIDE THE ALLOWED BAND -- THAT MEANS SOMEBODY ELSE CLAMPED THE
// DOMAIN (THERMAL, ADMIN) AND FIGHTING THEM WOULD OSCILLATE. OUR OWN
// COMMITS ALWAYS LAND INSIDE THE BAND AND PASS THROUGH UNTOUCHED.
pub fn reconcile_requested(
    requested_khz: u32,
    min_khz: u32,
    max_khz: u32,
    observed_khz: u32,
) -> u32 {
    if requested_khz > max_khz || requested_khz < min_khz {
        observed_khz
    } else {
        requested_khz
    }
}

struct DomainState {
    policy: PolicyState,
    requested_khz: u32,
    min_khz: u32,
    max_khz: u32,
    core_states: Vec<CoreLoadState>,
    notices: VecDeque<Notice>,
    log: EventLog,
}

pub struct Domain<S, F> {
    label: String,
    cores: Vec<u32>,
    table: FreqTable,
    source: S,
    control: F,
    state: Mutex<DomainState>,
}

// 1HZ TELEMETRY SNAPSHOT FOR THE RUN LOOP
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainStatus {
    pub load: u32,
    pub position: usize,
    pub freq_khz: u32,
    pub threshold: i32,
    pub down_votes: u32,
    pub suspended: bool,
}

impl<S: CounterSource, F: FreqControl> Domain<S, F> {
    // BEGIN GOVERNANCE. FAILS WHEN THE DOMAIN REPORTS NO USABLE CURRENT
    // FREQUENCY. PRIMES PER-CORE COUNTERS SO THE FIRST DELTA COVERS ONE
    // INTERVAL, NOT THE WHOLE UPTIME.
    pub fn start(
        label: &str,
        cores: Vec<u32>,
        table: FreqTable,
        min_khz: u32,
        max_khz: u32,
        source: S,
        control: F,
    ) -> Result<Self> {
        let current = control.current_frequency()?;
        if current == 0 {
            bail!("{}: no usable current frequency, refusing to govern", label);
        }

        let mut core_states = Vec::with_capacity(cores.len());
        for core in &cores {
            let counters = source.read(*core).unwrap_or_default();
            core_states.push(CoreLoadState::primed(counters));
        }

        let position = table.position_at_or_above(current);
        let requested_khz = table.get(position);

        Ok(Self {
            label: label.to_string(),
            cores,
            table,
            source,
            control,
            state: Mutex::new(DomainState {
                policy: PolicyState::new(position),
                requested_khz,
                min_khz,
                max_khz,
                core_states,
                notices: VecDeque::new(),
                log: EventLog::new(),
            }),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cores(&self) -> &[u32] {
        &self.cores
    }

    pub fn table(&self) -> &FreqTable {
        &self.table
    }

    // ONE CONTROL ITERATION: DRAIN NOTICES -> SAMPLE -> DECIDE -> COMMIT.
    // base_threshold IS SNAPSHOTTED BY THE CALLER (ONE VALUE PER ITERATION).
    pub fn iterate(&self, base_threshold: u32) {
        let mut st = self.state.lock().unwrap();
        let st = &mut *st;

        while let Some(notice) = st.notices.pop_front() {
            match notice {
                Notice::FrequencyChanged { khz } => {
                    st.requested_khz =
                        reconcile_requested(st.requested_khz, st.min_khz, st.max_khz, khz);
                }
            }
        }

        let load = aggregate_load(&self.source, &self.cores, &mut st.core_states);
        let position = st.policy.decide(load, base_threshold, &self.table);
        st.requested_khz = self.table.get(position);

        let threshold = st.policy.effective_threshold(base_threshold);
        let down_votes = st.policy.down_votes();

        // ALREADY ON TARGET: BREAK OUT EARLY, NO COMMIT
        let current = self.control.current_frequency().unwrap_or(0);
        if current == st.requested_khz {
            st.policy.note_on_target();
            st.log
                .snapshot(load, position, st.requested_khz, threshold, down_votes, false);
            return;
        }

        if let Err(e) = self.control.set_frequency(st.requested_khz, Rounding::Down) {
            log_warn!("{}: commit {} khz failed: {:#}", self.label, st.requested_khz, e);
        }

        // POST-COMMIT STEP: DELAYED HYSTERESIS CORRECTION LANDS HERE
        st.policy.note_committed();
        st.log
            .snapshot(load, position, st.requested_khz, threshold, down_votes, true);
    }

    // FAST PATH FOR POLICY BOUND CHANGES: CLAMP IMMEDIATELY, OUTSIDE THE
    // NORMAL CADENCE.
    pub fn limits_changed(&self, min_khz: u32, max_khz: u32) {
        let mut st = self.state.lock().unwrap();
        st.min_khz = min_khz;
        st.max_khz = max_khz;

        let current = self.control.current_frequency().unwrap_or(0);
        if current > max_khz {
            if let Err(e) = self.control.set_frequency(max_khz, Rounding::Down) {
                log_warn!("{}: max clamp to {} khz failed: {:#}", self.label, max_khz, e);
            }
        } else if current < min_khz {
            if let Err(e) = self.control.set_frequency(min_khz, Rounding::Up) {
                log_warn!("{}: min clamp to {} khz failed: {:#}", self.label, min_khz, e);
            }
        }
    }

    // ASYNC INPUT: THE COMMITTED FREQUENCY MOVED FOR A REASON OTHER THAN
    // OUR OWN COMMIT. SHORT LOCK, PROCESSED AT THE NEXT ITERATION TOP.
    pub fn notify_frequency_change(&self, khz: u32) {
        let mut st = self.state.lock().unwrap();
        st.notices.push_back(Notice::FrequencyChanged { khz });
    }

    pub fn set_suspended(&self, suspended: bool) {
        let mut st = self.state.lock().unwrap();
        st.policy.set_suspended(suspended);
    }

    pub fn request_boost(&self) {
        let mut st = self.state.lock().unwrap();
        st.policy.request_boost();
    }

    pub fn requested_khz(&self) -> u32 {
        self.state.lock().unwrap().requested_khz
    }

    pub fn status(&self) -> DomainStatus {
        let st = self.state.lock().unwrap();
        let mut status = DomainStatus {
            suspended: st.policy.suspended(),
            position: st.policy.position(),
            freq_khz: self.table.get(st.policy.position()),
            ..Default::default()
        };
        if let Some(s) = st.log.latest() {
            status.load = s.load;
            status.threshold = s.threshold;
            status.down_votes = s.down_votes;
        }
        status
    }

    pub fn dump_log(&self) {
        self.state.lock().unwrap().log.dump();
    }

    pub fn print_summary(&self) {
        self.state.lock().unwrap().log.summary(&self.label);
    }
}
