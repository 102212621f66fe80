// BALLAST EVENT LOG
// RECORDS ONE SNAPSHOT PER CONTROL ITERATION
// PRE-ALLOCATED RING BUFFER. NO HEAP ALLOCATION WHILE GOVERNING.
// WRAPS AROUND AT CAPACITY -- OLDEST ENTRIES OVERWRITTEN.

const MAX_SNAPSHOTS: usize = 8192; // ~5.5 MINUTES AT THE 40MS CADENCE

#[derive(Clone, Copy)]
pub struct Snapshot {
    pub ts_ns: u64,
    pub load: u32,
    pub position: usize,
    pub freq_khz: u32,
    pub threshold: i32,
    pub down_votes: u32,
    pub committed: bool,
}

pub struct EventLog {
    snapshots: Vec<Snapshot>,
    head: usize,
    len: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            snapshots: vec![
                Snapshot {
                    ts_ns: 0,
                    load: 0,
                    position: 0,
                    freq_khz: 0,
                    threshold: 0,
                    down_votes: 0,
                    committed: false,
                };
                MAX_SNAPSHOTS
            ],
            head: 0,
            len: 0,
        }
    }

    // RECORD ONE ITERATION. OVERWRITES OLDEST ENTRY WHEN FULL.
    pub fn snapshot(
        &mut self,
        load: u32,
        position: usize,
        freq_khz: u32,
        threshold: i32,
        down_votes: u32,
        committed: bool,
    ) {
        self.snapshots[self.head] = Snapshot {
            ts_ns: now_ns(),
            load,
            position,
            freq_khz,
            threshold,
            down_votes,
            committed,
        };
        self.head = (self.head + 1) % MAX_SNAPSHOTS;
        if self.len < MAX_SNAPSHOTS {
            self.len += 1;
        }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        if self.len == 0 {
            return None;
        }
        Some(&self.snapshots[(self.head + MAX_SNAPSHOTS - 1) % MAX_SNAPSHOTS])
    }

    // ITERATE SNAPSHOTS IN CHRONOLOGICAL ORDER
    fn iter_chronological(&self) -> impl Iterator<Item = &Snapshot> {
        let start = if self.len < MAX_SNAPSHOTS { 0 } else { self.head };
        (0..self.len).map(move |i| &self.snapshots[(start + i) % MAX_SNAPSHOTS])
    }

    // DUMP THE TIME SERIES AFTER GOVERNANCE STOPS
    pub fn dump(&self) {
        if self.len == 0 {
            return;
        }

        let mut iter = self.iter_chronological();
        let first = iter.next().unwrap();
        let base_ts = first.ts_ns;

        println!(
            "\n{:<10} {:<6} {:<5} {:<10} {:<7} {:<6} {:<9}",
            "TIME_S", "LOAD", "POS", "FREQ_KHZ", "THRESH", "DOWN", "COMMITTED"
        );
        println!("{}", "-".repeat(58));

        print_row(first, 0.0);
        for s in iter {
            let elapsed_s = (s.ts_ns - base_ts) as f64 / 1_000_000_000.0;
            print_row(s, elapsed_s);
        }

        if self.len == MAX_SNAPSHOTS {
            println!(
                "\n(RING BUFFER WRAPPED -- SHOWING MOST RECENT {} SNAPSHOTS)",
                MAX_SNAPSHOTS
            );
        }
        println!("TOTAL SNAPSHOTS: {}", self.len);
    }

    // SUMMARY STATISTICS
    pub fn summary(&self, label: &str) {
        if self.len < 2 {
            return;
        }

        let snapshots: Vec<&Snapshot> = self.iter_chronological().collect();

        let commits: u64 = snapshots.iter().filter(|s| s.committed).count() as u64;
        let load_sum: u64 = snapshots.iter().map(|s| s.load as u64).sum();
        let peak_load = snapshots.iter().map(|s| s.load).max().unwrap_or(0);
        let top_pos = snapshots.iter().map(|s| s.position).max().unwrap_or(0);
        let at_top = snapshots.iter().filter(|s| s.position == top_pos).count();

        let elapsed_ns = snapshots.last().unwrap().ts_ns - snapshots.first().unwrap().ts_ns;
        let elapsed_s = elapsed_ns as f64 / 1_000_000_000.0;

        println!("\n{}", "=".repeat(50));
        println!("BALLAST SUMMARY [{}]", label);
        println!("{}", "=".repeat(50));
        println!("  ITERATIONS:        {}", self.len);
        println!("  COMMITS:           {}", commits);
        println!("  AVG LOAD (0-128):  {}", load_sum / self.len as u64);
        println!("  PEAK LOAD (0-128): {}", peak_load);
        println!(
            "  HIGHEST POSITION:  {} ({:.1}% OF ITERATIONS)",
            top_pos,
            at_top as f64 / self.len as f64 * 100.0
        );
        if elapsed_s > 0.0 {
            println!("  COMMITS/S:         {:.2}", commits as f64 / elapsed_s);
        }
        println!("  ELAPSED:           {:.1}s", elapsed_s);
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

fn print_row(s: &Snapshot, elapsed_s: f64) {
    println!(
        "{:<10.2} {:<6} {:<5} {:<10} {:<7} {:<6} {:<9}",
        elapsed_s, s.load, s.position, s.freq_khz, s.threshold, s.down_votes, s.committed
    );
}

pub fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}
