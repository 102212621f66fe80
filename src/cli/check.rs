// BALLAST ENVIRONMENT CHECK
// PREFLIGHT FOR THE GOVERNOR: COUNTER SOURCE, CPUFREQ SYSFS, KERNEL CONFIG

use std::io::Read;
use std::path::Path;

use anyhow::Result;

use crate::sysfs::SysfsPolicy;

fn check_kernel_config() -> bool {
    let file = match std::fs::File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz       NOT FOUND (SKIPPED)");
            return true;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz       UNREADABLE (SKIPPED)");
        return true;
    }
    let found = config.contains("CONFIG_CPU_FREQ=y");
    if found {
        println!("  CONFIG_CPU_FREQ       OK");
    } else {
        println!("  CONFIG_CPU_FREQ       NOT FOUND -- cpufreq may not be available");
    }
    found
}

pub fn run_check() -> Result<()> {
    println!("BALLAST DEPENDENCY CHECK");
    println!();

    let mut ok = true;

    if Path::new("/proc/stat").exists() {
        println!("  /proc/stat            OK");
    } else {
        println!("  /proc/stat            MISSING");
        ok = false;
    }
    println!();

    println!("KERNEL CONFIG:");
    if !check_kernel_config() {
        ok = false;
    }
    println!();

    println!("CPUFREQ POLICIES:");
    match SysfsPolicy::discover() {
        Ok(policies) => {
            for p in &policies {
                let cpus = p.related_cpus().unwrap_or_default();
                let governor = p.scaling_governor();
                println!(
                    "  {:<10} cpus={:?} table={} entries governor={}",
                    p.name(),
                    cpus,
                    p.table().len(),
                    governor
                );
                if governor != "userspace" {
                    println!(
                        "    NOTE: scaling_setspeed needs scaling_governor=userspace (currently {})",
                        governor
                    );
                }
            }
        }
        Err(e) => {
            println!("  NONE USABLE ({:#})", e);
            println!("  NEED A frequency-table DRIVER (scaling_available_frequencies)");
            ok = false;
        }
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        std::process::exit(1);
    }

    Ok(())
}
