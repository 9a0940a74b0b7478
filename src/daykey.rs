use chrono::{DateTime, Local, TimeZone, Weekday};

pub const WEEKDAYS: [(&str, &str); 7] = [
    ("Mon", "Monday"),
    ("Tue", "Tuesday"),
    ("Wed", "Wednesday"),
    ("Thu", "Thursday"),
    ("Fri", "Friday"),
    ("Sat", "Saturday"),
    ("Sun", "Sunday"),
];

pub fn parse_epoch_ms(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

pub fn day_key_in<Tz: TimeZone>(tz: &Tz, epoch_ms: i64) -> Option<String>
where
    Tz::Offset: std::fmt::Display,
{
    tz.timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

pub fn day_key_local(epoch_ms: i64) -> Option<String> {
    day_key_in(&Local, epoch_ms)
}

// Grouping key for a record carrying an epoch-ms string; malformed input is
// dropped by callers rather than crashing a whole transform.
pub fn day_key_of(timestamp: &str) -> Option<String> {
    parse_epoch_ms(timestamp).and_then(day_key_local)
}

pub fn local_datetime(epoch_ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(epoch_ms).single()
}

// "YYYY-MM-DD" -> "MM-DD", the axis-label form for bar charts.
pub fn month_day(day_key: &str) -> &str {
    if day_key.len() > 5 && day_key.is_char_boundary(day_key.len() - 5) {
        &day_key[day_key.len() - 5..]
    } else {
        day_key
    }
}

pub fn weekday_index(weekday: Weekday) -> usize {
    weekday.num_days_from_monday() as usize
}

pub fn weekday_short(weekday: Weekday) -> &'static str {
    WEEKDAYS[weekday_index(weekday)].0
}
