//! IMF-fixdate formatting for the `Date` header
//!
//! RFC 9110 fixed-length format, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`,
//! computed from `SystemTime` with plain calendar arithmetic.

use std::time::{SystemTime, UNIX_EPOCH};

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Format a timestamp as an IMF-fixdate string
pub fn imf_fixdate(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let days = (secs / 86_400) as i64;
    let tod = secs % 86_400;
    let (year, month, day) = civil_from_days(days);

    // The epoch fell on a Thursday
    let weekday = ((days + 4) % 7) as usize;

    format!(
        "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[weekday],
        day,
        MONTHS[(month - 1) as usize],
        year,
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60
    )
}

/// Days since the epoch to (year, month, day) in the proleptic Gregorian
/// calendar
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

/// IMF-fixdate for the current time
pub fn now() -> String {
    imf_fixdate(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(epoch_secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(epoch_secs)
    }

    #[test]
    fn test_rfc_example() {
        // The RFC 9110 example date
        assert_eq!(imf_fixdate(at(784_887_151)), "Tue, 15 Nov 1994 08:12:31 GMT");
    }

    #[test]
    fn test_epoch() {
        assert_eq!(imf_fixdate(at(0)), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn test_leap_day() {
        // 2024-02-29 12:00:00 UTC
        assert_eq!(imf_fixdate(at(1_709_208_000)), "Thu, 29 Feb 2024 12:00:00 GMT");
    }

    #[test]
    fn test_fixed_length() {
        assert_eq!(now().len(), 29);
    }
}
