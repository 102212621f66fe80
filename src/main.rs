// BALLAST -- USERSPACE CPUFREQ GOVERNOR FOR LINUX
// LOAD-DRIVEN FREQUENCY SELECTION, DAMPED BY AN ADAPTIVE UP-THRESHOLD
// AND SEVEN-DEEP DOWNSCALE HYSTERESIS
//
// THE KERNEL'S userspace GOVERNOR EXPOSES THE CONTROL POINT
// (scaling_setspeed); BALLAST SUPPLIES THE POLICY.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use ballast::cli;
use ballast::domain::Domain;
use ballast::governor::Governor;
use ballast::policy::{MAX_UP_THRESHOLD, SAMPLE_RATE_US};
use ballast::proc_stat::ProcStatSource;
use ballast::sysfs::{parse_cpu_list, SysfsPolicy};
use ballast::{log_info, log_warn, tunables};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

// SIGNAL-DRIVEN INPUTS: SIGUSR1 TOGGLES SUSPEND, SIGUSR2 REQUESTS BOOST
static SUSPEND: AtomicBool = AtomicBool::new(false);
static BOOST: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigusr1(_: libc::c_int) {
    SUSPEND.fetch_xor(true, Ordering::Relaxed);
}

extern "C" fn on_sigusr2(_: libc::c_int) {
    BOOST.store(true, Ordering::Relaxed);
}

#[derive(Parser)]
#[command(name = "ballast")]
#[command(about = "BALLAST -- LOAD-ADAPTIVE CPUFREQ GOVERNOR")]
struct Cli {
    // SAMPLING INTERVAL IN MICROSECONDS. ZERO WOULD KILL THE
    // PHASE-ALIGNMENT ARITHMETIC IN THE DOMAIN TASKS.
    #[arg(long, default_value_t = SAMPLE_RATE_US,
          value_parser = clap::value_parser!(u64).range(1..))]
    sample_us: u64,

    // BASE UP-THRESHOLD ON THE 0-128 LOAD SCALE
    #[arg(long, default_value_t = ballast::policy::DEFAULT_UP_THRESHOLD,
          value_parser = clap::value_parser!(u32).range(0..=MAX_UP_THRESHOLD as i64))]
    up_threshold: u32,

    // START IN THE SUSPENDED (FREQUENCY-CAPPED) STATE
    #[arg(long)]
    suspended: bool,

    // DUMP THE FULL PER-ITERATION LOG ON EXIT
    #[arg(long)]
    dump_log: bool,

    // PRINT THE 1HZ STATUS LINE
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    // PREFLIGHT: COUNTER SOURCE, CPUFREQ SYSFS, KERNEL CONFIG
    Check,
    // PRINT PER-CORE LOAD ONCE PER SECOND (NO FREQUENCY CHANGES)
    Probe,
}

fn online_cpu_count() -> usize {
    std::fs::read_to_string("/sys/devices/system/cpu/online")
        .map(|raw| parse_cpu_list(&raw).len())
        .unwrap_or(0)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Check) => return cli::check::run_check(),
        Some(Command::Probe) => return cli::probe::run_probe(),
        None => {}
    }

    tunables::set_up_threshold(cli.up_threshold)?;

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;
    unsafe {
        libc::signal(libc::SIGUSR1, on_sigusr1 as libc::sighandler_t);
        libc::signal(libc::SIGUSR2, on_sigusr2 as libc::sighandler_t);
    }
    SUSPEND.store(cli.suspended, Ordering::Relaxed);

    let policies = SysfsPolicy::discover()?;

    println!("BALLAST v1.3.2");
    println!("SAMPLE INTERVAL: {} us", cli.sample_us);
    println!("UP-THRESHOLD:    {} / 128", tunables::up_threshold());
    println!("DOMAINS:         {}", policies.len());
    println!();

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut governor: Governor<ProcStatSource, SysfsPolicy> =
        Governor::new(cli.sample_us, shutdown.clone());

    for policy in policies {
        let label = policy.name();
        let cores = policy.related_cpus()?;
        let table = policy.table().clone();
        let (min_khz, max_khz) = policy.bounds()?;
        let governor_name = policy.scaling_governor();
        if governor_name != "userspace" {
            log_warn!(
                "{}: scaling_governor is {:?}, commits will fail until it is userspace",
                label,
                governor_name
            );
        }

        match Domain::start(
            &label,
            cores.clone(),
            table,
            min_khz,
            max_khz,
            ProcStatSource::new(),
            policy,
        ) {
            Ok(domain) => {
                log_info!(
                    "{}: governing cpus {:?} ({}-{} khz)",
                    label,
                    cores,
                    min_khz,
                    max_khz
                );
                let domain = governor.add(domain);
                domain.set_suspended(cli.suspended);
            }
            Err(e) => log_warn!("{}: not governing ({:#})", label, e),
        }
    }

    if governor.domains().is_empty() {
        anyhow::bail!("no governable domains");
    }

    governor.start();
    println!("BALLAST IS ACTIVE (CTRL+C TO EXIT)");

    // SUPERVISION LOOP: PROPAGATE SUSPEND/BOOST, WATCH FOR HOTPLUG,
    // PRINT THE 1HZ STATUS LINE
    let mut suspended = cli.suspended;
    let mut online = online_cpu_count();

    while !SHUTDOWN.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_secs(1));

        let want_suspend = SUSPEND.load(Ordering::Relaxed);
        if want_suspend != suspended {
            suspended = want_suspend;
            log_info!("suspend = {}", suspended);
            for d in governor.domains() {
                d.set_suspended(suspended);
            }
        }

        // A CPU CAME ONLINE: BOOST SO THE NEWCOMER IS NOT STARVED
        let now_online = online_cpu_count();
        if now_online > online {
            log_info!("hotplug: {} -> {} cpus online, boosting", online, now_online);
            BOOST.store(true, Ordering::Relaxed);
        }
        online = now_online;

        if BOOST.swap(false, Ordering::Relaxed) {
            for d in governor.domains() {
                d.request_boost();
            }
        }

        if cli.verbose {
            let mut line = String::new();
            for d in governor.domains() {
                let s = d.status();
                line.push_str(&format!(
                    "{}: load={:<3} pos={:<2} freq={:<8} thresh={:<3} down={} {}  ",
                    d.label(),
                    s.load,
                    s.position,
                    s.freq_khz,
                    s.threshold,
                    s.down_votes,
                    if s.suspended { "[SUSP]" } else { "" }
                ));
            }
            println!("{}", line.trim_end());
        }
    }

    println!("BALLAST IS SHUTTING DOWN");
    governor.stop();

    for d in governor.domains() {
        if cli.dump_log {
            d.dump_log();
        }
        d.print_summary();
    }

    println!("BALLAST OUT.");
    Ok(())
}
