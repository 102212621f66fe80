// LOAD PROBE -- PRINTS EACH CORE'S 0-128 LOAD FRACTION ONCE PER SECOND
// SAME SAMPLER THE GOVERNOR USES, NO FREQUENCY CHANGES. CTRL+C TO EXIT.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;

use crate::proc_stat::ProcStatSource;
use crate::sampler::{CoreLoadState, CounterSource};
use crate::sysfs::parse_cpu_list;

static RUNNING: AtomicBool = AtomicBool::new(true);

pub fn run_probe() -> Result<()> {
    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::Relaxed);
    })
    .ok();

    let raw = std::fs::read_to_string("/sys/devices/system/cpu/online")?;
    let cpus = parse_cpu_list(&raw);

    let source = ProcStatSource::new();
    let mut states: Vec<CoreLoadState> = cpus
        .iter()
        .map(|cpu| CoreLoadState::primed(source.read(*cpu).unwrap_or_default()))
        .collect();

    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_secs(1));

        let mut line = String::new();
        for (cpu, state) in cpus.iter().zip(states.iter_mut()) {
            let load = source.read(*cpu).ok().and_then(|c| state.sample(c));
            match load {
                Some(l) => line.push_str(&format!("cpu{}: {:<4} ", cpu, l)),
                None => line.push_str(&format!("cpu{}: -    ", cpu)),
            }
        }
        println!("{}", line.trim_end());
    }

    Ok(())
}
