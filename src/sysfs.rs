// BALLAST CPUFREQ SYSFS BACKEND
// DISCOVERS /sys/devices/system/cpu/cpufreq/policy* AND DRIVES ONE OF
// THEM THROUGH THE KERNEL'S USERSPACE GOVERNOR (scaling_setspeed).
//
// REQUIRES: CONFIG_CPU_FREQ, A FREQUENCY-TABLE DRIVER
// (scaling_available_frequencies PRESENT), scaling_governor=userspace.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::domain::{FreqControl, Rounding};
use crate::policy::FreqTable;

pub const CPUFREQ_ROOT: &str = "/sys/devices/system/cpu/cpufreq";

pub struct SysfsPolicy {
    path: PathBuf,
    table: FreqTable,
}

impl SysfsPolicy {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = read_attr(path, "scaling_available_frequencies")?;
        let mut freqs = Vec::new();
        for field in raw.split_whitespace() {
            freqs.push(
                field
                    .parse::<u32>()
                    .with_context(|| format!("bad frequency {:?} in {}", field, path.display()))?,
            );
        }
        // SOME DRIVERS PUBLISH DESCENDING
        freqs.sort_unstable();
        freqs.dedup();
        let table = FreqTable::new(freqs)
            .with_context(|| format!("frequency table for {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    // EVERY policy* DIRECTORY WITH A USABLE FREQUENCY TABLE
    pub fn discover() -> Result<Vec<SysfsPolicy>> {
        Self::discover_under(Path::new(CPUFREQ_ROOT))
    }

    pub fn discover_under(root: &Path) -> Result<Vec<SysfsPolicy>> {
        let mut found = Vec::new();
        let entries = fs::read_dir(root)
            .with_context(|| format!("no cpufreq sysfs at {}", root.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with("policy") {
                continue;
            }
            match Self::open(&entry.path()) {
                Ok(p) => found.push(p),
                Err(e) => {
                    crate::log_warn!("skipping {}: {:#}", entry.path().display(), e);
                }
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        if found.is_empty() {
            bail!("no governable cpufreq policies under {}", root.display());
        }
        Ok(found)
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn table(&self) -> &FreqTable {
        &self.table
    }

    pub fn related_cpus(&self) -> Result<Vec<u32>> {
        let raw = read_attr(&self.path, "related_cpus")?;
        let cpus = parse_cpu_list(&raw);
        if cpus.is_empty() {
            bail!("{}: empty related_cpus", self.path.display());
        }
        Ok(cpus)
    }

    pub fn bounds(&self) -> Result<(u32, u32)> {
        let min = read_attr(&self.path, "scaling_min_freq")?.parse::<u32>()?;
        let max = read_attr(&self.path, "scaling_max_freq")?.parse::<u32>()?;
        Ok((min, max))
    }

    pub fn scaling_governor(&self) -> String {
        read_attr(&self.path, "scaling_governor").unwrap_or_default()
    }
}

impl FreqControl for SysfsPolicy {
    fn current_frequency(&self) -> Result<u32> {
        Ok(read_attr(&self.path, "scaling_cur_freq")?.parse::<u32>()?)
    }

    fn set_frequency(&self, khz: u32, rounding: Rounding) -> Result<()> {
        // scaling_setspeed ONLY ACCEPTS TABLE FREQUENCIES
        let position = match rounding {
            Rounding::Down => self.table.position_at_or_below(khz),
            Rounding::Up => self.table.position_at_or_above(khz),
        };
        let target = self.table.get(position);
        let attr = self.path.join("scaling_setspeed");
        fs::write(&attr, format!("{}\n", target))
            .with_context(|| format!("writing {} to {}", target, attr.display()))?;
        Ok(())
    }
}

fn read_attr(dir: &Path, attr: &str) -> Result<String> {
    let path = dir.join(attr);
    let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(raw.trim().to_string())
}

// "0-3,5" -> [0,1,2,3,5]. SAME SHAPE AS /sys/devices/system/cpu/online.
pub fn parse_cpu_list(raw: &str) -> Vec<u32> {
    let mut cpus = Vec::new();
    for range in raw.trim().split(',') {
        let parts: Vec<&str> = range.split('-').collect();
        match parts.len() {
            1 => {
                if let Ok(cpu) = parts[0].trim().parse::<u32>() {
                    cpus.push(cpu);
                }
            }
            2 => {
                if let (Ok(lo), Ok(hi)) = (
                    parts[0].trim().parse::<u32>(),
                    parts[1].trim().parse::<u32>(),
                ) {
                    cpus.extend(lo..=hi);
                }
            }
            _ => {}
        }
    }
    cpus
}
