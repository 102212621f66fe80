// BALLAST POLICY CORE
// PURE-RUST MODULE: ZERO SYSFS/PROC DEPENDENCIES
// SHARED BETWEEN BINARY CRATE (domain.rs, governor.rs) AND LIB CRATE (tests)
//
// THE DECISION PIPELINE FOR ONE CLOCK DOMAIN, ONCE PER TICK:
//   AGGREGATED LOAD -> THRESHOLD ADJUST -> POSITION SELECT -> HYSTERESIS GATE
// EVERYTHING INTEGER, 0-128 LOAD SCALE. TRUNCATION IS PART OF THE ALGORITHM.

use anyhow::{bail, Result};

// SAMPLING CADENCE. PRIME-ISH ON PURPOSE: AVOIDS PHASE-LOCKING WITH
// 10MS/100MS PERIODIC WORKLOADS.
pub const SAMPLE_RATE_US: u64 = 40_009;

// RESTING TABLE INDEX WHEN AWAKE. SUSPEND DROPS THE DYNAMIC OPTIMAL TO 1
// BUT THE SUSPEND CEILING STILL CLAMPS TO THIS CONSTANT.
pub const OPTIMAL_POSITION: usize = 3;
pub const SUSPEND_OPTIMAL_POSITION: usize = 1;

// CONSECUTIVE DOWN-VOTES REQUIRED BEFORE A DOWNWARD MOVE IS ALLOWED
pub const HYSTERESIS_DEPTH: u32 = 7;

// LOAD AND THRESHOLD LIVE ON A 0-128 SCALE
pub const LOAD_SCALE: u32 = 128;
pub const DEFAULT_UP_THRESHOLD: u32 = 100;
pub const MAX_UP_THRESHOLD: u32 = 127;

// EFFECTIVE THRESHOLD (BASE + ADJUSTMENT) STAYS INSIDE THIS BAND
pub const THRESHOLD_FLOOR: i32 = 40;
pub const THRESHOLD_CEIL: i32 = 128;

// --- FREQUENCY TABLE ---

// ORDERED SET OF ALLOWED FREQUENCIES (KHZ). IMMUTABLE AFTER VALIDATION.
#[derive(Debug, Clone)]
pub struct FreqTable {
    freqs: Vec<u32>,
}

impl FreqTable {
    pub fn new(freqs: Vec<u32>) -> Result<Self> {
        if freqs.is_empty() {
            bail!("frequency table is empty");
        }
        if !freqs.windows(2).all(|w| w[0] < w[1]) {
            bail!("frequency table is not strictly increasing");
        }
        Ok(Self { freqs })
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn get(&self, position: usize) -> u32 {
        self.freqs[position.min(self.freqs.len() - 1)]
    }

    pub fn top(&self) -> usize {
        self.freqs.len() - 1
    }

    pub fn freqs(&self) -> &[u32] {
        &self.freqs
    }

    // COUNT OF ENTRIES STRICTLY BELOW target_khz, CAPPED AT THE TOP INDEX.
    // ASCENDING TABLE: THIS IS THE SMALLEST INDEX WHOSE FREQUENCY >= TARGET,
    // TIES BROKEN TOWARD THE LOWER INDEX.
    pub fn entries_below(&self, target_khz: u32) -> usize {
        self.freqs
            .iter()
            .take_while(|&&f| f < target_khz)
            .count()
            .min(self.top())
    }

    // SMALLEST INDEX WHOSE FREQUENCY >= khz (TOP IF NONE) -- ROUND-UP LOOKUP
    pub fn position_at_or_above(&self, khz: u32) -> usize {
        self.freqs
            .iter()
            .position(|&f| f >= khz)
            .unwrap_or(self.top())
    }

    // LARGEST INDEX WHOSE FREQUENCY <= khz (0 IF NONE) -- ROUND-DOWN LOOKUP
    pub fn position_at_or_below(&self, khz: u32) -> usize {
        self.freqs
            .iter()
            .rposition(|&f| f <= khz)
            .unwrap_or(0)
    }
}

// --- THRESHOLD ADJUSTER ---

// SLOW INTEGRATOR ON TOP OF THE BASE UP-THRESHOLD.
// PINNED AT THE TOP OF THE TABLE: NUDGE THE THRESHOLD UP (HARDER TO
// JUSTIFY STAYING AT MAX). AT OR BELOW OPTIMAL: NUDGE IT DOWN (EASIER
// TO CLIMB OUT OF IDLE). THE TWO CHECKS ARE MUTUALLY EXCLUSIVE BY
// POSITION FOR ANY SANE TABLE.
pub fn adjust_threshold(
    adj: i32,
    base: u32,
    position: usize,
    table_len: usize,
    optimal: usize,
) -> i32 {
    let base = base as i32;
    let mut adj = adj;

    if position == table_len - 1 {
        adj += 1;
        if adj < 0 {
            adj = 0;
        }
        if base + adj > THRESHOLD_CEIL {
            adj = THRESHOLD_CEIL - base;
        }
    }
    if position <= optimal {
        adj -= 1;
        if adj > 0 {
            adj = 0;
        }
        if base + adj < THRESHOLD_FLOOR {
            adj = THRESHOLD_FLOOR - base;
        }
    }

    adj
}

// --- FREQUENCY SELECTOR ---

// OVERLOADED: CLIMB. NEVER STRAIGHT TO MAX -- AVERAGE WITH THE TOP,
// THEN AVERAGE WITH RECENT HISTORY (+1 ROUNDS THE CLIMB UPWARD).
// FROM BELOW THE RESTING POINT, GO TO THE RESTING POINT FIRST.
//
// UNDER THRESHOLD: FIND THE FREQUENCY THAT WOULD EXACTLY SATURATE THE
// DOMAIN AT ITS CURRENT SPEED, LOCATE IT IN THE TABLE, AVERAGE WITH THE
// CURRENT POSITION. THE +1 WHEN AWAKE BIASES TRUNCATION TOWARD CLIMBING.
pub fn select_position(
    position: usize,
    prev_position: usize,
    load: u32,
    threshold: i32,
    optimal: usize,
    suspended: bool,
    table: &FreqTable,
) -> usize {
    let n = table.len();

    let candidate = if (load as i32) > threshold {
        if position < optimal {
            optimal
        } else {
            let p = (position + n) / 2;
            (p + prev_position + 1) / 2
        }
    } else {
        let target_khz = (load as u64 * table.get(position) as u64 / LOAD_SCALE as u64) as u32;
        let target_position = table.entries_below(target_khz);
        (position + target_position + usize::from(!suspended)) / 2
    };

    candidate.min(n - 1)
}

// --- DOMAIN POLICY STATE MACHINE ---

// DECISION-SIDE STATE FOR ONE CLOCK DOMAIN. NO FREQUENCIES OR I/O IN
// HERE; THE DRIVER (domain.rs) OWNS THE COMMIT PATH AND FEEDS OUTCOMES
// BACK VIA note_committed() / note_on_target().
#[derive(Debug, Clone)]
pub struct PolicyState {
    position: usize,
    prev_position: usize,
    down_votes: u32,
    thresh_adj: i32,
    hysteresis_fired: bool,
    boost_pending: bool,
    suspended: bool,
}

impl PolicyState {
    pub fn new(start_position: usize) -> Self {
        Self {
            position: start_position,
            prev_position: start_position,
            down_votes: 0,
            thresh_adj: 0,
            hysteresis_fired: false,
            boost_pending: false,
            suspended: false,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn prev_position(&self) -> usize {
        self.prev_position
    }

    pub fn down_votes(&self) -> u32 {
        self.down_votes
    }

    pub fn effective_threshold(&self, base: u32) -> i32 {
        base as i32 + self.thresh_adj
    }

    pub fn suspended(&self) -> bool {
        self.suspended
    }

    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    // ONE-SHOT: CONSUMED BY THE NEXT decide() CALL
    pub fn request_boost(&mut self) {
        self.boost_pending = true;
    }

    pub fn optimal_position(&self) -> usize {
        if self.suspended {
            SUSPEND_OPTIMAL_POSITION
        } else {
            OPTIMAL_POSITION
        }
    }

    // ONE DECISION STEP: AGGREGATED LOAD -> GATED TABLE POSITION.
    // UPDATES position/prev_position/down_votes AND SETS THE ONE-SHOT
    // HYSTERESIS FLAG FOR THE POST-COMMIT STEP.
    pub fn decide(&mut self, load: u32, base_threshold: u32, table: &FreqTable) -> usize {
        let optimal = self.optimal_position();
        let n = table.len();

        self.thresh_adj = adjust_threshold(
            self.thresh_adj,
            base_threshold,
            self.position,
            n,
            optimal,
        );

        let mut position = select_position(
            self.position,
            self.prev_position,
            load,
            base_threshold as i32 + self.thresh_adj,
            optimal,
            self.suspended,
            table,
        );

        if !self.suspended {
            // HYSTERESIS BEFORE DROPPING BELOW THE RESTING POINT
            if position < optimal {
                self.down_votes += 1;
                if self.down_votes >= HYSTERESIS_DEPTH {
                    self.hysteresis_fired = true;
                    self.down_votes = 0;
                } else {
                    // SHORT HARDWARE TABLES CAN END BELOW THE RESTING
                    // POINT CONSTANT; THE HOLD CLAMPS LIKE THE SUSPEND
                    // CEILING DOES
                    position = optimal.min(n - 1);
                }
            } else {
                self.down_votes = 0;
            }

            if self.boost_pending {
                position = n - 1; // HOTPLUG/EXTERNAL BOOST: STRAIGHT TO MAX
                self.boost_pending = false;
                self.down_votes = 0;
            }
        } else if position > optimal {
            // SUSPEND CEILING. CLAMPS TO THE FIXED CONSTANT, NOT THE
            // DYNAMIC OPTIMAL -- LITERAL REFERENCE BEHAVIOR.
            position = OPTIMAL_POSITION.min(n - 1);
        }

        self.position = position;
        self.prev_position = position;
        position
    }

    // POST-COMMIT BOOKKEEPING. THE HYSTERESIS CORRECTION IS DELAYED ONE
    // ITERATION ON PURPOSE: THE DECREMENT AND THE ZEROED BASELINE ONLY
    // APPLY AFTER A COMMIT ACTUALLY WENT OUT.
    pub fn note_committed(&mut self) {
        if self.hysteresis_fired {
            self.prev_position = 0;
            self.position = self.position.saturating_sub(1);
            self.hysteresis_fired = false;
        } else {
            self.prev_position = self.position;
        }
    }

    // ALREADY ON TARGET: NO COMMIT, HYSTERESIS FLAG (IF ANY) CARRIES
    // OVER TO THE NEXT COMMITTED CYCLE.
    pub fn note_on_target(&mut self) {
        self.prev_position = self.position;
    }
}

// REFERENCE 14-ENTRY TABLE (MSM8960-CLASS), USED THROUGHOUT THE TESTS
pub const REFERENCE_TABLE_KHZ: [u32; 14] = [
    384_000, 486_000, 594_000, 702_000, 810_000, 918_000, 1_026_000, 1_134_000, 1_242_000,
    1_350_000, 1_458_000, 1_566_000, 1_674_000, 1_728_000,
];
