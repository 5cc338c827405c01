use chrono::{DateTime, Utc};
use thiserror::Error;

/// RFC 1123 with a numeric zone, minus the leading weekday.
const DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Error)]
#[error("Invalid publish date {raw:?}: {reason}")]
pub struct DateError {
    raw: String,
    reason: String,
}

impl DateError {
    fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a publish date of the form `Mon, 02 Jan 2006 15:04:05 -0700`.
///
/// Named zones (`GMT`, `EST`), colon offsets, single-digit fields and other
/// RFC 822 variants are rejected, as is surrounding whitespace. The weekday
/// must be a valid abbreviation but is not checked against the date itself.
pub fn parse_pub_date(raw: &str) -> Result<DateTime<Utc>, DateError> {
    let (weekday, rest) = raw
        .split_once(", ")
        .ok_or_else(|| DateError::new(raw, "missing weekday"))?;

    if !WEEKDAYS.contains(&weekday) {
        return Err(DateError::new(raw, format!("unknown weekday {weekday:?}")));
    }

    let fields: Vec<&str> = rest.split(' ').collect();
    let [day, _month, year, time, zone] = fields.as_slice() else {
        return Err(DateError::new(raw, "expected day, month, year, time and zone"));
    };
    // chrono accepts narrower fields and `-07:00` offsets; the format does not.
    if day.len() != 2 || year.len() != 4 {
        return Err(DateError::new(raw, "day or year has the wrong width"));
    }
    if !is_clock(time) {
        return Err(DateError::new(raw, "time must be HH:MM:SS"));
    }
    if !is_numeric_zone(zone) {
        return Err(DateError::new(raw, "zone must be a numeric offset like -0700"));
    }

    DateTime::parse_from_str(rest, DATE_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DateError::new(raw, e.to_string()))
}

/// `HH:MM:SS`, digits only.
fn is_clock(field: &str) -> bool {
    let bytes = field.as_bytes();
    bytes.len() == 8
        && bytes.iter().enumerate().all(|(i, b)| match i {
            2 | 5 => *b == b':',
            _ => b.is_ascii_digit(),
        })
}

/// `+HHMM` or `-HHMM`.
fn is_numeric_zone(field: &str) -> bool {
    match field.as_bytes() {
        [sign, digits @ ..] => {
            matches!(sign, b'+' | b'-')
                && digits.len() == 4
                && digits.iter().all(u8::is_ascii_digit)
        }
        [] => false,
    }
}
