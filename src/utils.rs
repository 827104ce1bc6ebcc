use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use regex::Regex;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*?)\]").expect("valid timestamp regex"));

/// Reads the leading `[HH:MM:SS]` of a console line as a time today.
pub fn extract_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let time_s = BRACKETED.captures(input)?.get(1)?.as_str();
    let time = NaiveTime::parse_from_str(time_s, "%H:%M:%S").ok()?;

    let naive_dt = Local::now().date_naive().and_time(time);
    let local_dt = Local.from_local_datetime(&naive_dt).single()?;

    Some(local_dt.with_timezone(&Utc))
}

/// Local-time stamp safe for file names, e.g. `2024-05-01_13-45-09`.
pub fn file_timestamp() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_from_console_line() {
        let ts = extract_timestamp("[13:45:09] [Server thread/INFO]: Done").unwrap();
        assert_eq!(
            ts.with_timezone(&Local).format("%H:%M:%S").to_string(),
            "13:45:09"
        );
        assert!(extract_timestamp("no brackets here").is_none());
        assert!(extract_timestamp("[Server thread/INFO]: x").is_none());
    }

    #[test]
    fn file_timestamp_shape() {
        let ts = file_timestamp();
        assert_eq!(ts.len(), 19);
        assert!(!ts.contains(':'));
    }
}
