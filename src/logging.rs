// BALLAST LOG MACROS
// TAGGED, TIMESTAMPED ONE-LINERS. INFO TO STDOUT, WARNINGS TO STDERR.

pub fn uptime_s() -> f64 {
    crate::event::now_ns() as f64 / 1_000_000_000.0
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        println!("[{:10.3}] INFO  {}", $crate::logging::uptime_s(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        eprintln!("[{:10.3}] WARN  {}", $crate::logging::uptime_s(), format_args!($($arg)*))
    };
}
