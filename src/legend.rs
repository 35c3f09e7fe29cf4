//! Opening-hour legend parsing.
//!
//! Calendar legends are short free-form strings in English or French, e.g.
//! `"10:00 am - 6:00 pm"`, `"10h - 19h"` or `"10h-13h / 20h-0h30"`. These
//! functions never fail: anything that cannot be read yields `None` or an
//! empty list, and the day type is then treated as non-operating.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ClockTime, TimeRange};

/// hour, optional `:`/`h` minute, optional meridiem.
const TIME_PATTERN: &str = r"(?i)(\d{1,2})(?:\s*[:h]\s*(\d{2})?)?\s*(?:([ap])\.?\s?m\b\.?)?";

/// start time, dash-like separator, end time.
const RANGE_PATTERN: &str = concat!(
    r"(?i)(?P<start>\d{1,2}(?:\s*[:h]\s*\d{2}|\s*h)?(?:\s*[ap]\.?\s?m\.?)?)",
    r"\s*(?:-|–|—|to|à)\s*",
    r"(?P<end>\d{1,2}(?:\s*[:h]\s*\d{2}|\s*h)?(?:\s*[ap]\.?\s?m\.?)?)",
);

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIME_PATTERN).expect("time pattern is valid"))
}

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(RANGE_PATTERN).expect("range pattern is valid"))
}

/// Parse the first time of day found in `text`.
///
/// `pm` adds 12 to hours below 12. Any other marker, or none at all, maps
/// 12 to midnight. Without a marker the hour is otherwise read as a 24-hour
/// clock, with `24` meaning 0.
pub fn parse_time(text: &str) -> Option<ClockTime> {
    let caps = time_regex().captures(text)?;

    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };

    let meridiem = caps.get(3).map(|m| m.as_str().to_ascii_lowercase());

    match meridiem.as_deref() {
        Some("p") if hour < 12 => hour += 12,
        None | Some("a") if hour == 12 => hour = 0,
        _ => {}
    }
    if hour == 24 {
        hour = 0;
    }

    if hour > 23 || minute > 59 {
        return None;
    }
    Some(ClockTime { hour, minute })
}

/// Parse the first `start - end` range found in `text`.
pub fn parse_range(text: &str) -> Option<TimeRange> {
    let caps = range_regex().captures(text)?;
    range_from_captures(&caps)
}

/// Parse every range in a legend value, in source order.
///
/// Slash-separated alternatives (split schedules) are read independently;
/// an alternative that does not parse is dropped and the others are kept.
pub fn parse_legend(text: &str) -> Vec<TimeRange> {
    text.split('/')
        .flat_map(|alternative| {
            range_regex()
                .captures_iter(alternative)
                .filter_map(|caps| range_from_captures(&caps))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn range_from_captures(caps: &regex::Captures<'_>) -> Option<TimeRange> {
    let start = parse_time(caps.name("start")?.as_str())?;
    let end = parse_time(caps.name("end")?.as_str())?;
    Some(TimeRange { start, end })
}
