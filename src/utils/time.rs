use chrono::{DateTime, NaiveDateTime};

/// Converts epoch seconds to a calendar time, if representable.
pub fn epoch_to_datetime(time_d: f64) -> Option<NaiveDateTime> {
    if !time_d.is_finite() {
        return None;
    }
    let secs = time_d.floor();
    let nanos = ((time_d - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos).map(|dt| dt.naive_utc())
}

/// Formats epoch seconds as `YYYY/MM/DD HH:MM:SS.ffffff`.
pub fn format_epoch(time_d: f64) -> String {
    match epoch_to_datetime(time_d) {
        Some(dt) => dt.format("%Y/%m/%d %H:%M:%S%.6f").to_string(),
        None => format!("{time_d:.6}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_fractional_seconds() {
        assert_eq!(format_epoch(0.5), "1970/01/01 00:00:00.500000");
        assert_eq!(format_epoch(86400.0 + 61.25), "1970/01/02 00:01:01.250000");
    }

    #[test]
    fn non_finite_falls_back() {
        assert!(epoch_to_datetime(f64::NAN).is_none());
        assert_eq!(format_epoch(f64::INFINITY), "inf");
    }
}
