// BALLAST POLICY CORE TESTS
// SELECTOR ARITHMETIC, THRESHOLD INTEGRATOR, HYSTERESIS, BOOST, SUSPEND
//
// ALL TESTS USE PURE TYPES FROM ballast::policy. ZERO SYSFS/PROC
// DEPENDENCIES. RUN OFFLINE.

use ballast::policy::{
    adjust_threshold, select_position, FreqTable, PolicyState, HYSTERESIS_DEPTH,
    OPTIMAL_POSITION, REFERENCE_TABLE_KHZ, THRESHOLD_CEIL, THRESHOLD_FLOOR,
};

fn table() -> FreqTable {
    FreqTable::new(REFERENCE_TABLE_KHZ.to_vec()).unwrap()
}

// === SELECTOR ===

#[test]
fn select_never_leaves_table_bounds() {
    let t = table();
    let n = t.len();
    for load in 0..=128u32 {
        for threshold in THRESHOLD_FLOOR..=THRESHOLD_CEIL {
            for position in 0..n {
                for prev in 0..n {
                    for suspended in [false, true] {
                        let p = select_position(
                            position,
                            prev,
                            load,
                            threshold,
                            OPTIMAL_POSITION,
                            suspended,
                            &t,
                        );
                        assert!(p < n, "load={} thr={} pos={} prev={}", load, threshold, position, prev);
                    }
                }
            }
        }
    }
}

#[test]
fn under_threshold_scenario_load_50_at_optimal() {
    // TARGET FREQ = 50 * 702000 / 128 = 274218 -> SMALLEST INDEX WITH
    // FREQ >= TARGET IS 0 -> CANDIDATE = (3 + 0 + 1) / 2 = 2
    let t = table();
    assert_eq!(select_position(3, 3, 50, 100, OPTIMAL_POSITION, false, &t), 2);
    // SUSPENDED DROPS THE +1 CLIMB BIAS: (3 + 0 + 0) / 2 = 1
    assert_eq!(select_position(3, 3, 50, 100, OPTIMAL_POSITION, true, &t), 1);
}

#[test]
fn overload_scenario_double_averaged_climb() {
    // POSITION == OPTIMAL, NOT BELOW: NO JUMP. (3+14)/2 = 8, (8+3+1)/2 = 6
    let t = table();
    assert_eq!(select_position(3, 3, 100, 99, OPTIMAL_POSITION, false, &t), 6);
}

#[test]
fn overload_below_optimal_jumps_to_optimal_first() {
    let t = table();
    for position in 0..OPTIMAL_POSITION {
        assert_eq!(
            select_position(position, 0, 128, 40, OPTIMAL_POSITION, false, &t),
            OPTIMAL_POSITION
        );
    }
}

#[test]
fn overload_at_top_stays_at_top() {
    // (13+14)/2 = 13, (13+13+1)/2 = 13
    let t = table();
    assert_eq!(select_position(13, 13, 128, 100, OPTIMAL_POSITION, false, &t), 13);
}

#[test]
fn idle_at_bottom_stays_at_bottom() {
    // TARGET 0 -> INDEX 0 -> (0+0+1)/2 = 0 EVEN WITH THE CLIMB BIAS
    let t = table();
    assert_eq!(select_position(0, 0, 0, 100, OPTIMAL_POSITION, false, &t), 0);
}

#[test]
fn climb_is_damped_by_history() {
    // SAME OVERLOAD, LOWER PREVIOUS POSITION -> LOWER CANDIDATE
    let t = table();
    let fresh = select_position(8, 8, 128, 100, OPTIMAL_POSITION, false, &t);
    let damped = select_position(8, 3, 128, 100, OPTIMAL_POSITION, false, &t);
    assert!(damped < fresh);
}

// === THRESHOLD INTEGRATOR ===

#[test]
fn threshold_stays_in_band_forever() {
    let t = table();
    let n = t.len();
    for base in [0u32, 40, 100, 127] {
        let mut adj = 0i32;
        // SWEEP EVERY POSITION MANY TIMES IN BOTH DIRECTIONS
        for round in 0..50 {
            for i in 0..n {
                let position = if round % 2 == 0 { i } else { n - 1 - i };
                adj = adjust_threshold(adj, base, position, n, OPTIMAL_POSITION);
                let effective = base as i32 + adj;
                assert!(
                    (THRESHOLD_FLOOR..=THRESHOLD_CEIL).contains(&effective),
                    "base={} pos={} adj={}",
                    base,
                    position,
                    adj
                );
            }
        }
    }
}

#[test]
fn pinned_at_top_raises_threshold() {
    let n = table().len();
    let mut adj = 0i32;
    for _ in 0..5 {
        adj = adjust_threshold(adj, 100, n - 1, n, OPTIMAL_POSITION);
    }
    assert_eq!(adj, 5);
    // CAPPED AT 128 - BASE
    for _ in 0..100 {
        adj = adjust_threshold(adj, 100, n - 1, n, OPTIMAL_POSITION);
    }
    assert_eq!(adj, 28);
}

#[test]
fn resting_at_optimal_lowers_threshold() {
    let n = table().len();
    let mut adj = 0i32;
    for _ in 0..5 {
        adj = adjust_threshold(adj, 100, OPTIMAL_POSITION, n, OPTIMAL_POSITION);
    }
    assert_eq!(adj, -5);
    // FLOORED AT 40 - BASE
    for _ in 0..100 {
        adj = adjust_threshold(adj, 100, 0, n, OPTIMAL_POSITION);
    }
    assert_eq!(adj, -60);
}

#[test]
fn mid_table_leaves_adjustment_alone() {
    let n = table().len();
    assert_eq!(adjust_threshold(-3, 100, 7, n, OPTIMAL_POSITION), -3);
    assert_eq!(adjust_threshold(0, 100, OPTIMAL_POSITION + 1, n, OPTIMAL_POSITION), 0);
}

// === STATE MACHINE: HYSTERESIS ===

#[test]
fn hysteresis_holds_until_seventh_down_vote() {
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);

    // LOAD 50 AT THE RESTING POINT COMPUTES CANDIDATE 2 EVERY TIME
    for vote in 1..HYSTERESIS_DEPTH {
        assert_eq!(st.decide(50, 100, &t), OPTIMAL_POSITION, "vote {}", vote);
        assert_eq!(st.down_votes(), vote);
        st.note_on_target();
    }

    // SEVENTH VOTE: THE DOWNWARD MOVE GOES THROUGH, COUNTER RESETS
    assert_eq!(st.decide(50, 100, &t), 2);
    assert_eq!(st.down_votes(), 0);

    // POST-COMMIT: ONE-ITERATION-DELAYED CORRECTION -- START ONE LOWER,
    // SMOOTHING BASELINE ZEROED
    st.note_committed();
    assert_eq!(st.position(), 1);
    assert_eq!(st.prev_position(), 0);
}

#[test]
fn recovery_above_optimal_resets_down_votes() {
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);

    for _ in 0..3 {
        st.decide(50, 100, &t);
        st.note_on_target();
    }
    assert_eq!(st.down_votes(), 3);

    // OVERLOAD CLIMB: CANDIDATE ABOVE OPTIMAL WIPES THE COUNT
    assert!(st.decide(128, 100, &t) > OPTIMAL_POSITION);
    assert_eq!(st.down_votes(), 0);
}

#[test]
fn hysteresis_correction_waits_for_a_commit() {
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);

    for _ in 0..HYSTERESIS_DEPTH {
        st.decide(50, 100, &t);
        st.note_on_target(); // NEVER COMMITTED: FLAG MUST CARRY OVER
    }
    assert_eq!(st.position(), 2);

    // THE NEXT COMMITTED CYCLE APPLIES THE PENDING CORRECTION
    st.note_committed();
    assert_eq!(st.position(), 1);
    assert_eq!(st.prev_position(), 0);
}

// === STATE MACHINE: BOOST ===

#[test]
fn boost_overrides_hysteresis_and_clears_votes() {
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);

    for _ in 0..4 {
        st.decide(50, 100, &t);
        st.note_on_target();
    }
    assert_eq!(st.down_votes(), 4);

    st.request_boost();
    assert_eq!(st.decide(50, 100, &t), t.top());
    assert_eq!(st.down_votes(), 0);
}

#[test]
fn boost_is_one_shot() {
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);

    st.request_boost();
    assert_eq!(st.decide(50, 100, &t), t.top());
    st.note_committed();

    // CONSUMED: THE NEXT DECISION IS ORDINARY AGAIN
    assert!(st.decide(50, 100, &t) < t.top());
}

// === STATE MACHINE: SUSPEND ===

#[test]
fn suspend_ceiling_caps_every_load() {
    let t = table();
    for load in 0..=128u32 {
        let mut st = PolicyState::new(t.top());
        st.set_suspended(true);
        for _ in 0..20 {
            let p = st.decide(load, 100, &t);
            assert!(p <= OPTIMAL_POSITION, "load={} pos={}", load, p);
            st.note_committed();
        }
    }
}

#[test]
fn suspend_bypasses_hysteresis() {
    // SUSPENDED DOWNSCALING IS IMMEDIATE: NO VOTES ACCUMULATE
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);
    st.set_suspended(true);

    let p = st.decide(0, 100, &t);
    assert!(p < OPTIMAL_POSITION);
    assert_eq!(st.down_votes(), 0);
}

#[test]
fn suspend_uses_lower_resting_point() {
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);
    assert_eq!(st.optimal_position(), OPTIMAL_POSITION);
    st.set_suspended(true);
    assert_eq!(st.optimal_position(), 1);
}

// === FULL-PIPELINE SCENARIOS ===

#[test]
fn decide_applies_threshold_adjustment_before_selection() {
    // BASE 100 AT THE RESTING POINT: THE INTEGRATOR DIPS THE EFFECTIVE
    // THRESHOLD TO 99, SO LOAD 100 COUNTS AS OVERLOAD -> (3+14)/2 = 8,
    // (8+3+1)/2 = 6
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);
    assert_eq!(st.decide(100, 100, &t), 6);
    assert_eq!(st.effective_threshold(100), 99);
}

#[test]
fn held_scenario_load_50() {
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);
    // CANDIDATE 2 < OPTIMAL: ONE DOWN-VOTE, HELD AT THE RESTING POINT
    assert_eq!(st.decide(50, 100, &t), OPTIMAL_POSITION);
    assert_eq!(st.down_votes(), 1);
}

#[test]
fn sustained_overload_reaches_the_top() {
    let t = table();
    let mut st = PolicyState::new(OPTIMAL_POSITION);
    let mut last = 0;
    for _ in 0..20 {
        last = st.decide(128, 100, &t);
        st.note_committed();
    }
    assert_eq!(last, t.top());
}

#[test]
fn short_table_hold_stays_in_bounds() {
    // TWO-ENTRY HARDWARE TABLE: THE RESTING POINT CONSTANT EXCEEDS THE
    // TOP INDEX, SO EVERY GATED RESULT MUST STILL CLAMP TO THE TABLE
    let t = FreqTable::new(vec![300_000, 600_000]).unwrap();
    let mut st = PolicyState::new(0);
    for load in [0u32, 50, 128, 0, 0, 0, 0, 0, 0, 0, 128, 0] {
        let p = st.decide(load, 100, &t);
        assert!(p < t.len(), "load={} pos={}", load, p);
        st.note_committed();
        assert!(st.position() < t.len());
    }
}

#[test]
fn positions_stay_in_bounds_for_any_load_walk() {
    let t = table();
    let mut st = PolicyState::new(0);
    // DETERMINISTIC PSEUDO-RANDOM LOAD SEQUENCE
    let mut x: u32 = 12345;
    for i in 0..10_000 {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let load = (x >> 16) % 129;
        if i % 97 == 0 {
            st.request_boost();
        }
        st.set_suspended(i % 1000 >= 900);
        let p = st.decide(load, 100, &t);
        assert!(p < t.len());
        if i % 3 == 0 {
            st.note_committed();
        } else {
            st.note_on_target();
        }
        assert!(st.position() < t.len());
    }
}
