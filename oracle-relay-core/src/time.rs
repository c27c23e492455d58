use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time
pub fn now() -> SystemTime {
    // nosemgrep: ban-system-time-now
    SystemTime::now()
}

/// Seconds since the unix epoch, the unit contracts store ages in
pub fn to_unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub fn from_unix_secs(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}
