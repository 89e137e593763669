//! Process metrics read from procfs.
//!
//! Only collected on Linux with the `process` feature enabled. Everywhere else
//! [`write_process_metrics_into`] writes nothing.

/// Appends process metrics (CPU time, page faults, threads, memory, start time, file descriptors)
/// to `buffer`.
///
/// Failures to read or parse procfs are logged and the affected lines are skipped.
pub fn write_process_metrics_into(buffer: &mut String) {
    #[cfg(all(target_os = "linux", feature = "process"))]
    linux::write_process_metrics_into(buffer);

    #[cfg(not(all(target_os = "linux", feature = "process")))]
    let _ = buffer;
}

#[cfg(all(target_os = "linux", feature = "process"))]
mod linux {
    use std::fs;
    use std::io;
    use std::path::Path;
    use std::time::{SystemTime, UNIX_EPOCH};

    use once_cell::sync::Lazy;
    use tracing::error;

    use crate::global::{write_counter_f64, write_counter_u64, write_gauge_u64};

    const STAT_PATH: &str = "/proc/self/stat";
    const FD_PATH: &str = "/proc/self/fd";
    const LIMITS_PATH: &str = "/proc/self/limits";
    const BOOT_STAT_PATH: &str = "/proc/stat";

    // Clock ticks per second used by procfs.
    const USER_HZ: f64 = 100.0;
    const PAGE_SIZE: u64 = 4096;

    static START_TIME_SECONDS: Lazy<u64> = Lazy::new(process_start_time_seconds);

    #[derive(Debug, thiserror::Error)]
    pub(super) enum ProcError {
        #[error("cannot read {path}: {source}")]
        Io {
            path: &'static str,
            #[source]
            source: io::Error,
        },

        #[error("cannot find command in parentheses in {0:?}")]
        MissingCommand(String),

        #[error("stat field {field} is missing or malformed in {line:?}")]
        BadField { field: &'static str, line: String },

        #[error("max open files limit wasn't found")]
        MissingLimit,

        #[error("cannot parse max open files limit {0:?}")]
        BadLimit(String),
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    pub(super) struct ProcStat {
        pub(super) minflt: u64,
        pub(super) majflt: u64,
        pub(super) utime: u64,
        pub(super) stime: u64,
        pub(super) num_threads: u64,
        pub(super) starttime: u64,
        pub(super) vsize: u64,
        pub(super) rss: u64,
    }

    pub(super) fn write_process_metrics_into(buffer: &mut String) {
        match read_to_string(STAT_PATH).and_then(|data| parse_stat(&data)) {
            Ok(stat) => {
                let utime = stat.utime as f64 / USER_HZ;
                let stime = stat.stime as f64 / USER_HZ;
                write_counter_f64(buffer, "process_cpu_seconds_system_total", stime);
                write_counter_f64(buffer, "process_cpu_seconds_total", utime + stime);
                write_counter_f64(buffer, "process_cpu_seconds_user_total", utime);
                write_counter_u64(buffer, "process_major_pagefaults_total", stat.majflt);
                write_counter_u64(buffer, "process_minor_pagefaults_total", stat.minflt);
                write_gauge_u64(buffer, "process_num_threads", stat.num_threads);
                write_gauge_u64(buffer, "process_resident_memory_bytes", stat.rss * PAGE_SIZE);
                write_gauge_u64(buffer, "process_start_time_seconds", *START_TIME_SECONDS);
                write_gauge_u64(buffer, "process_virtual_memory_bytes", stat.vsize);
            }
            Err(e) => error!(error = %e, "failed to collect process metrics"),
        }

        match count_open_fds(Path::new(FD_PATH)).and_then(|open| {
            let max = read_to_string(LIMITS_PATH).and_then(|data| parse_max_open_files(&data))?;
            Ok((open, max))
        }) {
            Ok((open, max)) => {
                write_gauge_u64(buffer, "process_max_fds", max);
                write_gauge_u64(buffer, "process_open_fds", open);
            }
            Err(e) => error!(error = %e, "failed to collect file descriptor metrics"),
        }
    }

    fn read_to_string(path: &'static str) -> Result<String, ProcError> {
        fs::read_to_string(path).map_err(|source| ProcError::Io { path, source })
    }

    /// Parses the contents of `/proc/<pid>/stat`.
    pub(super) fn parse_stat(data: &str) -> Result<ProcStat, ProcError> {
        // The command may itself contain ") ", so search from the end.
        let n = data.rfind(") ").ok_or_else(|| ProcError::MissingCommand(data.to_string()))?;
        let fields = data[n + 2..].split_ascii_whitespace().collect::<Vec<_>>();

        // Offsets are relative to the state field, which is field 3 in proc(5).
        let field = |name: &'static str, idx: usize| -> Result<u64, ProcError> {
            fields.get(idx).and_then(|s| s.parse::<i64>().ok()).map(|v| v.max(0) as u64).ok_or_else(
                || ProcError::BadField { field: name, line: data.trim_end().to_string() },
            )
        };

        Ok(ProcStat {
            minflt: field("minflt", 7)?,
            majflt: field("majflt", 9)?,
            utime: field("utime", 11)?,
            stime: field("stime", 12)?,
            num_threads: field("num_threads", 17)?,
            starttime: field("starttime", 19)?,
            vsize: field("vsize", 20)?,
            rss: field("rss", 21)?,
        })
    }

    /// Extracts the soft limit from the `Max open files` row of `/proc/<pid>/limits`.
    ///
    /// `unlimited` maps to `u64::MAX`.
    pub(super) fn parse_max_open_files(data: &str) -> Result<u64, ProcError> {
        let row = data
            .lines()
            .skip(1)
            .find_map(|line| line.strip_prefix("Max open files"))
            .ok_or(ProcError::MissingLimit)?;

        let soft = row
            .split_ascii_whitespace()
            .next()
            .ok_or_else(|| ProcError::BadLimit(row.trim().to_string()))?;
        if soft == "unlimited" {
            return Ok(u64::MAX);
        }
        soft.parse().map_err(|_| ProcError::BadLimit(soft.to_string()))
    }

    pub(super) fn count_open_fds(path: &Path) -> Result<u64, ProcError> {
        let entries = fs::read_dir(path).map_err(|source| ProcError::Io { path: FD_PATH, source })?;
        let mut total = 0;
        for entry in entries {
            entry.map_err(|source| ProcError::Io { path: FD_PATH, source })?;
            total += 1;
        }
        Ok(total)
    }

    fn process_start_time_seconds() -> u64 {
        let from_procfs = read_to_string(STAT_PATH)
            .and_then(|data| parse_stat(&data))
            .and_then(|stat| {
                let btime = read_to_string(BOOT_STAT_PATH).map(|data| parse_boot_time(&data))?;
                Ok(btime.map(|btime| btime + (stat.starttime as f64 / USER_HZ) as u64))
            });

        match from_procfs {
            Ok(Some(start)) => start,
            _ => SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0),
        }
    }

    /// Extracts `btime` (boot time, seconds since the epoch) from `/proc/stat`.
    pub(super) fn parse_boot_time(data: &str) -> Option<u64> {
        data.lines()
            .find_map(|line| line.strip_prefix("btime "))
            .and_then(|v| v.trim().parse().ok())
    }
}
