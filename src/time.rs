//! Conversions between `SystemTime` and the packed 16-bit Human68k date/time
//! fields a directory entry or FCB carries (spec §3, `wire::pack_date`/
//! `wire::pack_time`'s bit layout).

use std::convert::TryFrom;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Converts a `SystemTime` to a tuple of (seconds, nanoseconds) since the Unix epoch.
///
/// This handles times before the Unix epoch by returning negative seconds.
/// Values that overflow `i64` are saturated to `i64::MAX` or `i64::MIN`.
pub(crate) fn time_from_system_time(system_time: &SystemTime) -> (i64, u32) {
    // Convert to signed 64-bit time with epoch at 0
    match system_time.duration_since(UNIX_EPOCH) {
        Ok(duration) => match i64::try_from(duration.as_secs()) {
            Ok(secs) => (secs, duration.subsec_nanos()),
            Err(_) => (i64::MAX, 999_999_999),
        },
        Err(before_epoch_error) => {
            let d = before_epoch_error.duration();
            let secs = d.as_secs();
            let nanos = d.subsec_nanos();

            // Minus min representable value.
            if (secs, nanos) >= (i64::MAX as u64 + 1, 0) {
                // Saturate.
                (i64::MIN, 0)
            } else if nanos == 0 {
                (-(secs as i64), 0)
            } else {
                (-(secs as i64) - 1, 1_000_000_000 - nanos)
            }
        }
    }
}

/// Converts a tuple of (seconds, nanoseconds) since the Unix epoch to a `SystemTime`.
///
/// This handles negative seconds (times before the Unix epoch).
pub(crate) fn system_time_from_time(secs: i64, nsecs: u32) -> SystemTime {
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::new(secs as u64, nsecs)
    } else {
        // TODO: overflow
        // TODO: 1_000_000_000 - nsec
        SystemTime::UNIX_EPOCH - Duration::new((-secs) as u64, nsecs)
    }
}

/// Civil calendar conversion (Howard Hinnant's `civil_from_days`/
/// `days_from_civil`), used to translate between Unix time and the
/// Human68k packed date/time fields without pulling in a calendar crate.
fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as i64;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as i64;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = if m > 2 { m - 3 } else { m + 9 } as u64;
    let doy = (153 * mp + 2) / 5 + d as u64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe as i64 - 719468
}

/// Packs a `SystemTime`'s calendar date and time-of-day into Human68k's
/// bit layouts (spec's packed-date/packed-time formulas).
pub(crate) fn pack_mtime_fields(mtime: SystemTime) -> (u16, u16) {
    let (secs, _) = time_from_system_time(&mtime);
    let days = secs.div_euclid(86400);
    let tod = secs.rem_euclid(86400);
    let (year, month, day) = civil_from_days(days);
    let hour = (tod / 3600) as u8;
    let minute = ((tod % 3600) / 60) as u8;
    let second = (tod % 60) as u8;
    (
        crate::wire::pack_date(year as u16, month as u8, day as u8),
        crate::wire::pack_time(hour, minute, second),
    )
}

/// Inverse of [`pack_mtime_fields`]: unpacks a Human68k date/time pair back
/// into a `SystemTime`, truncated to whole seconds.
pub(crate) fn system_time_from_packed(date: u16, time: u16) -> SystemTime {
    let year = 1980 + ((date >> 9) & 0x7f) as i64;
    let month = ((date >> 5) & 0x0f) as i64;
    let day = (date & 0x1f) as i64;
    let hour = ((time >> 11) & 0x1f) as i64;
    let minute = ((time >> 5) & 0x3f) as i64;
    let second = (time & 0x1f) as i64 * 2;

    let days = days_from_civil(year, month.max(1), day.max(1));
    let secs = days * 86400 + hour * 3600 + minute * 60 + second;
    system_time_from_time(secs, 0)
}

#[cfg(test)]
mod test {
    use std::time::Duration;
    use std::time::UNIX_EPOCH;

    use crate::time::time_from_system_time;

    #[test]
    fn test_time_from_system_time_negative() {
        let before_epoch = UNIX_EPOCH - Duration::new(1, 200_000_000);
        let (secs, nanos) = time_from_system_time(&before_epoch);
        assert_eq!((-2, 800_000_000), (secs, nanos));
    }

    #[test]
    fn test_time_from_system_time_i64_min_boundary() {
        // timespec { tv_sec: i64::MIN, tv_nsec: 0 }
        let min_system_time = UNIX_EPOCH - Duration::new(i64::MAX as u64 + 1, 0);
        let (secs, nanos) = time_from_system_time(&min_system_time);
        assert_eq!((i64::MIN, 0), (secs, nanos));

        let min_system_time_plus_eps = UNIX_EPOCH - Duration::new(i64::MAX as u64, 800_000_000);
        let (secs, nanos) = time_from_system_time(&min_system_time_plus_eps);
        assert_eq!((i64::MIN, 200_000_000), (secs, nanos));

        let min_system_time_plus_one = UNIX_EPOCH - Duration::new(i64::MAX as u64, 0);
        let (secs, nanos) = time_from_system_time(&min_system_time_plus_one);
        assert_eq!((i64::MIN + 1, 0), (secs, nanos));
    }

    #[test]
    fn pack_and_unpack_mtime_round_trips_to_the_second() {
        use super::{pack_mtime_fields, system_time_from_packed};
        use std::time::Duration;

        let original = UNIX_EPOCH + Duration::new(1_700_000_000, 0);
        let (date, time) = pack_mtime_fields(original);
        let restored = system_time_from_packed(date, time);
        let (orig_secs, _) = time_from_system_time(&original);
        let (restored_secs, _) = time_from_system_time(&restored);
        // Packed time only stores 2-second resolution.
        assert!((orig_secs - restored_secs).abs() <= 1);
    }
}
