// BALLAST -- USERSPACE CPUFREQ GOVERNOR
// LOAD-DRIVEN FREQUENCY SELECTION WITH ADAPTIVE THRESHOLD AND
// HYSTERESIS-GATED DOWNSCALING
//
// DECISION LOGIC LIVES IN policy (PURE, TESTABLE OFFLINE).
// RUNTIME PLUMBING LIVES IN domain/governor/sysfs/proc_stat.

pub mod logging;

pub mod cli;
pub mod domain;
pub mod event;
pub mod governor;
pub mod policy;
pub mod proc_stat;
pub mod sampler;
pub mod sysfs;
pub mod tunables;
