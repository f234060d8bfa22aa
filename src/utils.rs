use hifitime::prelude::Duration;

/// Converts a [Duration] to a [std::time::Duration], negative durations saturate to zero.
pub fn to_std_duration(dt: Duration) -> std::time::Duration {
    let nanos = dt.total_nanoseconds();
    if nanos <= 0 {
        std::time::Duration::ZERO
    } else {
        std::time::Duration::from_nanos(nanos.min(u64::MAX as i128) as u64)
    }
}

/// Readable name of a U-Blox GNSS id
pub fn gnss_name(gnss_id: u8) -> &'static str {
    match gnss_id {
        0 => "GPS",
        1 => "SBAS",
        2 => "Galileo",
        3 => "BeiDou",
        4 => "IMES",
        5 => "QZSS",
        6 => "Glonass",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn std_durations() {
        let dt = Duration::from_str("5 s").unwrap();
        assert_eq!(to_std_duration(dt), std::time::Duration::from_secs(5));

        let dt = Duration::from_milliseconds(100.0);
        assert_eq!(to_std_duration(dt), std::time::Duration::from_millis(100));

        let dt = Duration::from_seconds(-1.0);
        assert_eq!(to_std_duration(dt), std::time::Duration::ZERO);
    }

    #[test]
    fn gnss_names() {
        assert_eq!(gnss_name(0), "GPS");
        assert_eq!(gnss_name(2), "Galileo");
        assert_eq!(gnss_name(6), "Glonass");
        assert_eq!(gnss_name(42), "Unknown");
    }
}
